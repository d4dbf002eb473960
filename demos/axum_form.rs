use std::net::SocketAddr;

use axum::{
    Form, Router,
    response::Html,
    routing::get,
};
use time::Duration;
use tower_csrf_cookie::{CsrfConfig, CsrfLayer, CsrfToken, Expiry, SameSite, Secret};

async fn show_form(token: CsrfToken) -> Html<String> {
    Html(format!(
        r#"<form method="post">{}<input name="comment"><button>Send</button></form>"#,
        token.hidden_input()
    ))
}

async fn submit(Form(fields): Form<Vec<(String, String)>>) -> String {
    // The token field has already been removed by the layer.
    format!("received {fields:?}")
}

#[tokio::main]
async fn main() {
    let secret = Secret::generate();
    let csrf_config = CsrfConfig::default()
        // Default: "csrfToken"
        .with_cookie_name("csrfToken")
        // Default: Expiry::OnSessionEnd
        .with_expiry(Expiry::AfterDuration(Duration::hours(4)))
        // Default: false (set to true when serving over HTTPS)
        .with_secure(false)
        // Default: false
        .with_http_only(true)
        // Default: unset
        .with_same_site(SameSite::Lax)
        // Default: "/"
        .with_path("/")
        // Default: "_csrfToken"
        .with_field("_csrfToken")
        // Default: "X-CSRF-Token"
        .with_header_name("X-CSRF-Token")
        // Default: 1 MiB
        .with_max_body_bytes(64 * 1024)
        // Default: none
        .with_skip_check(|req| req.path().starts_with("/webhooks/"));
    let csrf_layer = CsrfLayer::new(secret).with_config(csrf_config);

    let app = Router::new()
        .route("/", get(show_form).post(submit))
        .layer(csrf_layer);

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("tcp listener binds successfully");
    let local_addr = listener.local_addr().expect("local address is available");
    println!("listening at http://{local_addr}");

    axum::serve(listener, app)
        .await
        .expect("server runs successfully");
}
