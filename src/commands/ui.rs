//! Browser UI

use axum::response::Html;

const INDEX_HTML: &str = include_str!("../../assets/index.html");

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serves_page_with_queue_controls() {
        let Html(page) = index().await;
        assert!(page.contains("Video Download Manager"));
        assert!(page.contains("Add to Queue"));
        assert!(page.contains("Clear Completed"));
        assert!(page.contains("/api/queue"));
    }

    #[tokio::test]
    async fn url_input_leaves_validation_to_the_server() {
        let Html(page) = index().await;
        // bare ids and scheme-less links must reach POST /api/queue
        assert!(!page.contains(r#"type="url""#));
        assert!(page.contains(r#"<input id="url" type="text""#));
        assert!(page.contains("novalidate"));
    }
}
