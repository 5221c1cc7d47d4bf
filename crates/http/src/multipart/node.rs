//! The multipart node arena.
//!
//! Nodes are addressed by [`NodeId`]; a node stores its parent as an id and its children as
//! an id list, so the tree has no ownership cycles.

use mime::Mime;
use tracing::warn;

use crate::multipart::{Boundary, PartInfo, PartSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubcontentType {
    /// The request body itself.
    Root,
    FormData,
    Mixed,
    Alternative,
    Digest,
    Other,
}

impl SubcontentType {
    pub fn from_mime(mime: &Mime) -> Self {
        match mime.subtype().as_str() {
            "form-data" => SubcontentType::FormData,
            "mixed" => SubcontentType::Mixed,
            "alternative" => SubcontentType::Alternative,
            "digest" => SubcontentType::Digest,
            _ => SubcontentType::Other,
        }
    }
}

#[derive(Debug)]
pub enum NodeKind {
    /// Headers are still being read.
    Unclassified,
    Subcontent { subtype: SubcontentType, boundary: Boundary, name: Option<String> },
    Form { info: PartInfo, value: Vec<u8> },
    File { info: PartInfo, sink: Option<Box<dyn PartSink>>, written: u64 },
}

#[derive(Debug)]
pub struct MultipartNode {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    kind: NodeKind,
}

impl MultipartNode {
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub(crate) fn kind_mut(&mut self) -> &mut NodeKind {
        &mut self.kind
    }

    pub(crate) fn set_kind(&mut self, kind: NodeKind) {
        self.kind = kind;
    }
}

#[derive(Debug)]
pub struct MultipartTree {
    nodes: Vec<MultipartNode>,
}

impl MultipartTree {
    pub fn new(boundary: Boundary) -> Self {
        let root = MultipartNode {
            parent: None,
            children: Vec::new(),
            kind: NodeKind::Subcontent { subtype: SubcontentType::Root, boundary, name: None },
        };
        Self { nodes: vec![root] }
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> &MultipartNode {
        &self.nodes[id.0]
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> &mut MultipartNode {
        &mut self.nodes[id.0]
    }

    /// Appends an unclassified node as the last child of `parent`.
    pub(crate) fn append_child(&mut self, parent: NodeId) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(MultipartNode { parent: Some(parent), children: Vec::new(), kind: NodeKind::Unclassified });
        self.nodes[parent.0].children.push(id);
        id
    }

    fn ancestors_or_self(&self, id: NodeId) -> impl Iterator<Item = &MultipartNode> {
        std::iter::successors(Some(self.get(id)), |node| node.parent.map(|parent| self.get(parent)))
    }

    /// The boundary of the nearest subcontent at or above `id`.
    pub fn boundary(&self, id: NodeId) -> Option<&Boundary> {
        self.ancestors_or_self(id).find_map(|node| match &node.kind {
            NodeKind::Subcontent { boundary, .. } => Some(boundary),
            _ => None,
        })
    }

    /// The name of the nearest named subcontent above `id`.
    pub fn inherited_name(&self, id: NodeId) -> Option<&str> {
        self.ancestors_or_self(id).skip(1).find_map(|node| match &node.kind {
            NodeKind::Subcontent { name: Some(name), .. } => Some(name.as_str()),
            _ => None,
        })
    }

    /// Closes and deletes every file sink still open anywhere in the tree.
    pub(crate) fn discard_open_sinks(&mut self) {
        for node in &mut self.nodes {
            if let NodeKind::File { sink, .. } = &mut node.kind
                && let Some(sink) = sink.take()
            {
                let path = sink.path().to_path_buf();
                if let Err(e) = sink.discard() {
                    warn!(cause = %e, path = %path.display(), "failed to remove temp file");
                }
            }
        }
    }

    pub(crate) fn open_sinks(&self) -> usize {
        self.nodes.iter().filter(|node| matches!(&node.kind, NodeKind::File { sink: Some(_), .. })).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subcontent(name: Option<&str>, token: &str) -> NodeKind {
        NodeKind::Subcontent {
            subtype: SubcontentType::Mixed,
            boundary: Boundary::new(token).unwrap(),
            name: name.map(str::to_string),
        }
    }

    #[test]
    fn boundary_and_name_come_from_ancestors() {
        let mut tree = MultipartTree::new(Boundary::new("outer").unwrap());
        let root = tree.root();

        let mixed = tree.append_child(root);
        tree.get_mut(mixed).set_kind(subcontent(Some("files"), "inner"));
        let file = tree.append_child(mixed);

        assert_eq!(tree.get(file).parent(), Some(mixed));
        assert_eq!(tree.get(root).children(), &[mixed]);
        assert_eq!(tree.get(mixed).children(), &[file]);

        assert_eq!(tree.boundary(file).unwrap().token(), "inner");
        assert_eq!(tree.boundary(mixed).unwrap().token(), "inner");
        assert_eq!(tree.boundary(root).unwrap().token(), "outer");

        assert_eq!(tree.inherited_name(file), Some("files"));
        assert_eq!(tree.inherited_name(mixed), None);
        assert_eq!(tree.len(), 3);
    }
}
