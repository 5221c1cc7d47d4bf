use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use micro_mvc::policy::{BearerToken, FileConstraints, FilterPolicy, FilterRule, FormConstraints, TokenVerifier};
use micro_mvc::router::{get, post, Router};
use micro_mvc::{handler_fn, Request, Server, ServerOptions};

struct StaticToken(String);

#[async_trait]
impl TokenVerifier for StaticToken {
    async fn verify(&self, token: &str) -> bool {
        token == self.0
    }
}

// curl -v http://127.0.0.1:8080/users/42
async fn user(request: Arc<Request>) -> String {
    format!("user {}\r\n", request.param("id").unwrap_or_default())
}

// curl -v -H 'Authorization: Bearer let-me-in' http://127.0.0.1:8080/users/admin/stats
async fn admin_stats(_request: Arc<Request>) -> &'static str {
    "all systems nominal\r\n"
}

// curl -v -F title=me -F avatar=@avatar.png http://127.0.0.1:8080/avatars
async fn upload_avatar(request: Arc<Request>) -> (StatusCode, String) {
    let Some(avatar) = request.file("avatar") else {
        return (StatusCode::BAD_REQUEST, "avatar is missing\r\n".to_string());
    };
    let title = request.form("title").unwrap_or("untitled");
    (StatusCode::CREATED, format!("stored '{}' ({} bytes) as {title}\r\n", avatar.filename, avatar.size))
}

#[tokio::main]
async fn main() {
    let options = ServerOptions::from_json(r#"{ "log_level": "debug", "parser": { "max_body_size": 4194304 } }"#).unwrap();

    let admin = Router::builder("/users/admin")
        .policy(FilterPolicy::new().rule(FilterRule::access(BearerToken::new(StaticToken("let-me-in".into())))))
        .route("/stats", get(handler_fn(admin_stats)))
        .build()
        .unwrap();

    let avatars = FilterPolicy::new()
        .rule(FilterRule::multipart_form(FormConstraints::new().names(["title"]).max_size(256)))
        .rule(FilterRule::multipart_file(FileConstraints::new().names(["avatar"]).mime_types(["image/*"]).max_size(1 << 20)));

    let router = Router::builder("/")
        .route(r"/users/:id(\d+)", get(handler_fn(user)))
        .route("/avatars", post(handler_fn(upload_avatar)).policy(avatars))
        .router(admin)
        .build()
        .unwrap();

    Server::builder().router(router).address("127.0.0.1:8080").options(options).build().unwrap().start().await;
}
