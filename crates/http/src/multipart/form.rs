use http::HeaderMap;
use mime::Mime;

use crate::multipart::StoredFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartKind {
    Form,
    File,
}

/// A classified multipart part, as seen by part policies before its content is read.
#[derive(Debug, Clone, PartialEq)]
pub struct PartInfo {
    pub(crate) kind: PartKind,
    pub(crate) name: String,
    pub(crate) filename: Option<String>,
    pub(crate) content_type: Option<Mime>,
    pub(crate) headers: HeaderMap,
}

impl PartInfo {
    pub fn new(kind: PartKind, name: impl Into<String>) -> Self {
        Self { kind, name: name.into(), filename: None, content_type: None, headers: HeaderMap::new() }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_content_type(mut self, content_type: Mime) -> Self {
        self.content_type = Some(content_type);
        self
    }

    pub fn kind(&self) -> PartKind {
        self.kind
    }

    pub fn is_file(&self) -> bool {
        self.kind == PartKind::File
    }

    /// The form name, inherited from the enclosing multipart section for unnamed files.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub fn content_type(&self) -> Option<&Mime> {
        self.content_type.as_ref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub name: String,
    pub value: String,
}

#[derive(Debug)]
pub struct FileField {
    pub name: String,
    pub filename: String,
    pub content_type: Option<Mime>,
    pub size: u64,
    pub file: StoredFile,
}

/// The parts of a multipart body in the order they were received.
#[derive(Debug, Default)]
pub struct MultipartForm {
    fields: Vec<FormField>,
    files: Vec<FileField>,
}

impl MultipartForm {
    pub(crate) fn push_field(&mut self, field: FormField) {
        self.fields.push(field);
    }

    pub(crate) fn push_file(&mut self, file: FileField) {
        self.files.push(file);
    }

    pub fn fields(&self) -> &[FormField] {
        &self.fields
    }

    pub fn files(&self) -> &[FileField] {
        &self.files
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.iter().find(|field| field.name == name).map(|field| field.value.as_str())
    }

    pub fn file(&self, name: &str) -> Option<&FileField> {
        self.files.iter().find(|file| file.name == name)
    }

    pub fn into_parts(self) -> (Vec<FormField>, Vec<FileField>) {
        (self.fields, self.files)
    }
}
