//! Review presentation: markdown to HTML, and the sinks that display it.

pub mod terminal;

use pulldown_cmark::{Options, Parser, html};

pub use terminal::TerminalSink;

/// Where a review session is displayed.
///
/// Mirrors the affordances of a review popup: a progress indicator, the
/// review body, a status icon with an optional rerun button, and a link to
/// an external review tool.
pub trait RenderSink: Send {
    /// Work has started; show a spinner.
    fn show_progress(&mut self);

    /// Replace the review body with `html`.
    fn show_result(&mut self, html: &str);

    /// Replace the review body with an error message.
    fn show_error(&mut self, html: &str);

    /// Work has stopped. `rerun_available` is false when retrying cannot help.
    fn show_done(&mut self, failed: bool, rerun_available: bool);

    /// Show a link to an external review tool.
    fn show_link(&mut self, url: &str);

    /// Dismiss the display.
    fn close(&mut self);
}

/// Render markdown to HTML with GitHub-flavored extensions.
pub fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let parser = Parser::new_ext(markdown, options);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_review_markdown() {
        let html = markdown_to_html("## Summary\n\n- **Bug**: off by one in `len()`\n- ~~nit~~\n");
        assert!(html.contains("<h2>Summary</h2>"));
        assert!(html.contains("<strong>Bug</strong>"));
        assert!(html.contains("<code>len()</code>"));
        assert!(html.contains("<del>nit</del>"));
    }

    #[test]
    fn renders_tables_and_fences() {
        let html = markdown_to_html("| a | b |\n|---|---|\n| 1 | 2 |\n\n```rust\nfn x() {}\n```\n");
        assert!(html.contains("<table>"));
        assert!(html.contains("<code class=\"language-rust\">"));
    }

    #[test]
    fn escapes_raw_angle_brackets_in_code() {
        let html = markdown_to_html("`Vec<u8>`");
        assert!(html.contains("Vec&lt;u8&gt;"));
    }

    #[test]
    fn empty_input_is_empty_html() {
        assert_eq!(markdown_to_html(""), "");
    }
}
