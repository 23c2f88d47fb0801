//! Embedded browser pages
//!
//! Both pages are static HTML driving the JSON API; the admin page is only
//! reachable through the configured obscure path.

use axum::response::Html;

const INDEX_HTML: &str = include_str!("ui/index.html");
const ADMIN_HTML: &str = include_str!("ui/admin.html");

/// GET / - song browser and queue view
pub async fn index_page() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// GET /<admin_path> - queue management
pub async fn admin_page() -> Html<&'static str> {
    Html(ADMIN_HTML)
}
