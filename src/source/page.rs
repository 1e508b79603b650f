//! Pull the human-written context out of a PR/MR page.

use std::sync::LazyLock;

use scraper::{Html, Selector};

use crate::models::{PageContext, Provider};

static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("title selector is valid"));
static GITHUB_DESCRIPTION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".markdown-body").expect("github selector is valid"));
static GITLAB_DESCRIPTION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".description textarea").expect("gitlab selector is valid"));

/// Extract the page title and the change description.
///
/// GitHub renders the description as the first `.markdown-body`; GitLab
/// keeps the raw markdown in the `data-value` attribute of the description
/// textarea. A page without a description yields an empty one.
pub fn extract_context(provider: Provider, html: &str) -> PageContext {
    let document = Html::parse_document(html);

    let title = document
        .select(&TITLE)
        .next()
        .map(|t| collapse_whitespace(&t.text().collect::<String>()))
        .unwrap_or_default();

    let description = match provider {
        Provider::GitHub => document
            .select(&GITHUB_DESCRIPTION)
            .next()
            .map(|body| body.text().collect::<String>()),
        Provider::GitLab => document
            .select(&GITLAB_DESCRIPTION)
            .next()
            .and_then(|area| area.value().attr("data-value").map(str::to_string)),
    }
    .map(|d| d.trim().to_string())
    .unwrap_or_default();

    if description.is_empty() {
        tracing::debug!(%provider, "page has no description");
    }

    PageContext { title, description }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn github_description_is_markdown_body_text() {
        let html = r#"<html><head><title>
            Add retry logic by octocat · Pull Request #12 · o/r
        </title></head><body>
        <div class="comment-body markdown-body"><p>Retries <code>fetch</code> on 503.</p>
        <ul><li>adds backoff</li></ul></div>
        <div class="markdown-body"><p>second comment</p></div>
        </body></html>"#;
        let ctx = extract_context(Provider::GitHub, html);
        assert_eq!(ctx.title, "Add retry logic by octocat · Pull Request #12 · o/r");
        assert!(ctx.description.starts_with("Retries fetch on 503."));
        assert!(ctx.description.contains("adds backoff"));
        assert!(!ctx.description.contains("second comment"));
    }

    #[test]
    fn gitlab_description_is_textarea_data_value() {
        let html = r###"<html><head><title>Fix cache (!9) · Merge requests · g / p · GitLab</title></head>
        <body><div class="description"><textarea data-value="## Why&#10;Cache was stale">ignored</textarea></div></body></html>"###;
        let ctx = extract_context(Provider::GitLab, html);
        assert_eq!(ctx.title, "Fix cache (!9) · Merge requests · g / p · GitLab");
        assert_eq!(ctx.description, "## Why\nCache was stale");
    }

    #[test]
    fn missing_description_is_empty() {
        let html = "<html><head><title>t</title></head><body><p>no body</p></body></html>";
        assert_eq!(extract_context(Provider::GitHub, html).description, "");
        assert_eq!(extract_context(Provider::GitLab, html).description, "");
    }

    #[test]
    fn missing_title_is_empty() {
        assert_eq!(extract_context(Provider::GitHub, "<p>x</p>").title, "");
    }
}
