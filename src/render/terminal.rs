//! Terminal sink: a live status line on stderr while the review streams,
//! then the finished review as styled text on stdout.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::LazyLock;

use colored::{ColoredString, Colorize};
use scraper::{ElementRef, Html, Node, Selector};

use super::RenderSink;

static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").expect("row selector is valid"));
static CELL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("th, td").expect("cell selector is valid"));

/// Renders a review session to the terminal.
pub struct TerminalSink {
    out: Box<dyn Write + Send>,
    label: String,
    styled: bool,
    live_status: bool,
    interactive: bool,
    output_file: Option<PathBuf>,
    html: String,
    closed: bool,
}

impl TerminalSink {
    /// Sink writing the review to stdout, with a status line on stderr when
    /// it is a terminal.
    pub fn stdout(label: impl Into<String>) -> Self {
        Self {
            out: Box::new(io::stdout()),
            label: label.into(),
            styled: atty::is(atty::Stream::Stdout),
            live_status: atty::is(atty::Stream::Stderr),
            interactive: false,
            output_file: None,
            html: String::new(),
            closed: false,
        }
    }

    /// Sink writing plain text to `out`, without a status line.
    pub fn with_writer(out: Box<dyn Write + Send>, label: impl Into<String>) -> Self {
        Self {
            out,
            label: label.into(),
            styled: false,
            live_status: false,
            interactive: false,
            output_file: None,
            html: String::new(),
            closed: false,
        }
    }

    /// Also save the final review as an HTML document.
    pub fn output_file(mut self, path: Option<PathBuf>) -> Self {
        self.output_file = path;
        self
    }

    /// Print key hints after each round.
    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    /// The review body currently displayed.
    pub fn html(&self) -> &str {
        &self.html
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn emit(&mut self, text: &str) {
        if let Err(e) = self.out.write_all(text.as_bytes()).and_then(|_| self.out.flush()) {
            tracing::debug!(error = %e, "failed to write review output");
        }
    }

    fn status(&self, message: &str) {
        if self.live_status {
            eprint!("\r\x1b[2K{} {}", "⠿".cyan(), message.dimmed());
            let _ = io::stderr().flush();
        }
    }

    fn clear_status(&self) {
        if self.live_status {
            eprint!("\r\x1b[2K");
            let _ = io::stderr().flush();
        }
    }

    fn save_document(&self) {
        let Some(ref path) = self.output_file else {
            return;
        };
        let document = format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>\n{}</body>\n</html>\n",
            escape_html(&self.label),
            self.html
        );
        if let Err(e) = std::fs::write(path, document) {
            tracing::warn!(path = %path.display(), error = %e, "failed to save review");
        }
    }
}

impl RenderSink for TerminalSink {
    fn show_progress(&mut self) {
        self.status(&format!("Reviewing {}...", self.label));
    }

    fn show_result(&mut self, html: &str) {
        self.html = html.to_string();
        if !html.is_empty() {
            self.status(&format!("Receiving review of {} ({} bytes)", self.label, html.len()));
        }
    }

    fn show_error(&mut self, html: &str) {
        self.html = html.to_string();
    }

    fn show_done(&mut self, failed: bool, rerun_available: bool) {
        self.clear_status();
        let body = html_to_text(&self.html, self.styled);
        let footer = match (failed, self.styled) {
            (false, true) => format!("{} Review complete\n", "✔".green().bold()),
            (false, false) => "✔ Review complete\n".to_string(),
            (true, true) => format!("{} Review failed\n", "✖".red().bold()),
            (true, false) => "✖ Review failed\n".to_string(),
        };
        let mut text = format!("{body}\n{footer}");
        if self.interactive && rerun_available {
            text.push_str("  [r] rerun   [o] open link   [q] quit\n");
        }
        self.emit(&text);
        if !failed {
            self.save_document();
        }
    }

    fn show_link(&mut self, url: &str) {
        let line = if self.styled {
            format!("  {} {}\n", "→".cyan(), url.underline())
        } else {
            format!("  → {url}\n")
        };
        self.emit(&line);
    }

    fn close(&mut self) {
        if !self.closed {
            self.clear_status();
            self.closed = true;
        }
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Turn review HTML into terminal text. `styled` adds ANSI styling.
pub fn html_to_text(html: &str, styled: bool) -> String {
    let fragment = Html::parse_fragment(html);
    let mut writer = TextWriter {
        buf: String::new(),
        styled,
        list_depth: 0,
        in_pre: false,
    };
    writer.children(fragment.root_element());

    let mut text = writer.buf;
    while text.contains("\n\n\n") {
        text = text.replace("\n\n\n", "\n\n");
    }
    // Leading spaces are table and list indentation.
    let text = text.trim_start_matches('\n').trim_end();
    if text.is_empty() {
        String::new()
    } else {
        format!("{text}\n")
    }
}

struct TextWriter {
    buf: String,
    styled: bool,
    list_depth: usize,
    in_pre: bool,
}

impl TextWriter {
    fn children(&mut self, element: ElementRef<'_>) {
        for child in element.children() {
            match child.value() {
                Node::Text(text) => self.text(text),
                Node::Element(_) => {
                    if let Some(child) = ElementRef::wrap(child) {
                        self.element(child);
                    }
                }
                _ => {}
            }
        }
    }

    fn text(&mut self, text: &str) {
        if self.in_pre {
            self.buf.push_str(text);
            return;
        }
        let words: Vec<&str> = text.split_whitespace().collect();
        let at_line_start = self.buf.is_empty() || self.buf.ends_with('\n');
        if words.is_empty() {
            if !at_line_start && !self.buf.ends_with(' ') && !text.is_empty() {
                self.buf.push(' ');
            }
            return;
        }
        if text.starts_with(char::is_whitespace) && !at_line_start && !self.buf.ends_with(' ') {
            self.buf.push(' ');
        }
        self.buf.push_str(&words.join(" "));
        if text.ends_with(char::is_whitespace) {
            self.buf.push(' ');
        }
    }

    /// Render `element`'s children into a separate buffer.
    fn capture(&mut self, element: ElementRef<'_>) -> String {
        let saved = std::mem::take(&mut self.buf);
        self.children(element);
        std::mem::replace(&mut self.buf, saved)
    }

    fn styled_inline(&mut self, element: ElementRef<'_>, style: fn(ColoredString) -> ColoredString) {
        let inner = self.capture(element);
        if self.styled {
            self.buf.push_str(&style(inner.normal()).to_string());
        } else {
            self.buf.push_str(&inner);
        }
    }

    fn block_start(&mut self) {
        if !self.buf.is_empty() && !self.buf.ends_with('\n') {
            self.buf.push('\n');
        }
    }

    fn element(&mut self, element: ElementRef<'_>) {
        match element.value().name() {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                self.block_start();
                self.styled_inline(element, |s| s.bold().underline());
                self.buf.push_str("\n\n");
            }
            "p" => {
                self.block_start();
                self.children(element);
                self.buf.push_str("\n\n");
            }
            "ul" | "ol" => self.list(element),
            "pre" => {
                self.block_start();
                self.in_pre = true;
                let inner = self.capture(element);
                self.in_pre = false;
                for line in inner.trim_end_matches('\n').lines() {
                    let line = format!("    {line}");
                    if self.styled {
                        self.buf.push_str(&line.cyan().to_string());
                    } else {
                        self.buf.push_str(&line);
                    }
                    self.buf.push('\n');
                }
                self.buf.push('\n');
            }
            "code" if !self.in_pre => {
                let inner = self.capture(element);
                if self.styled {
                    self.buf.push_str(&inner.cyan().to_string());
                } else {
                    self.buf.push_str(&format!("`{inner}`"));
                }
            }
            "strong" | "b" => self.styled_inline(element, |s| s.bold()),
            "em" | "i" => self.styled_inline(element, |s| s.italic()),
            "del" | "s" => self.styled_inline(element, |s| s.strikethrough()),
            "a" => {
                let inner = self.capture(element);
                self.buf.push_str(&inner);
                if let Some(href) = element.value().attr("href") {
                    if href != inner.trim() {
                        self.buf.push_str(&format!(" ({href})"));
                    }
                }
            }
            "br" => self.buf.push('\n'),
            "hr" => {
                self.block_start();
                self.buf.push_str("────────────────────────────────\n\n");
            }
            "blockquote" => {
                self.block_start();
                let inner = self.capture(element);
                for line in inner.trim().lines() {
                    self.buf.push_str(&format!("│ {line}\n"));
                }
                self.buf.push('\n');
            }
            "table" => {
                self.block_start();
                for row in element.select(&ROW) {
                    let cells: Vec<String> = row
                        .select(&CELL)
                        .map(|cell| cell.text().collect::<String>().trim().to_string())
                        .collect();
                    self.buf.push_str(&format!("  {}\n", cells.join(" | ")));
                }
                self.buf.push('\n');
            }
            "input" if element.value().attr("type") == Some("checkbox") => {
                let mark = if element.value().attr("checked").is_some() {
                    "[x] "
                } else {
                    "[ ] "
                };
                self.buf.push_str(mark);
            }
            _ => self.children(element),
        }
    }

    fn list(&mut self, element: ElementRef<'_>) {
        let ordered = element.value().name() == "ol";
        let start: usize = element
            .value()
            .attr("start")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1);
        self.block_start();
        self.list_depth += 1;
        let indent = "  ".repeat(self.list_depth);

        let items = element
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|child| child.value().name() == "li");
        for (index, item) in items.enumerate() {
            let marker = if ordered {
                format!("{}.", start + index)
            } else {
                "•".to_string()
            };
            self.block_start();
            self.buf.push_str(&format!("{indent}{marker} "));
            let inner = self.capture(item);
            let inner = inner.trim();
            self.buf.push_str(&inner.replace("\n\n", "\n"));
            self.buf.push('\n');
        }

        self.list_depth -= 1;
        if self.list_depth == 0 {
            self.buf.push('\n');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::markdown_to_html;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn plain(markdown: &str) -> String {
        html_to_text(&markdown_to_html(markdown), false)
    }

    #[test]
    fn headings_paragraphs_and_lists() {
        let text = plain("## Summary\n\nLooks **mostly** fine.\n\n- one\n- two `x`\n\n1. first\n2. second\n");
        assert_eq!(
            text,
            "Summary\n\nLooks mostly fine.\n\n  • one\n  • two `x`\n\n  1. first\n  2. second\n"
        );
    }

    #[test]
    fn code_blocks_are_indented_verbatim() {
        let text = plain("Use this:\n\n```rust\nfn main() {\n    run();\n}\n```\n");
        assert_eq!(text, "Use this:\n\n    fn main() {\n        run();\n    }\n");
    }

    #[test]
    fn links_show_their_target() {
        assert_eq!(
            plain("See [docs](https://example.com/docs)."),
            "See docs (https://example.com/docs).\n"
        );
        assert_eq!(
            plain("<https://example.com>"),
            "https://example.com\n"
        );
    }

    #[test]
    fn tables_render_rows() {
        let text = plain("| file | issue |\n|---|---|\n| a.rs | leak |\n");
        assert_eq!(text, "  file | issue\n  a.rs | leak\n");
    }

    #[test]
    fn leading_list_keeps_its_indent() {
        assert_eq!(plain("- first\n- second\n"), "  • first\n  • second\n");
    }

    #[test]
    fn empty_html_is_empty_text() {
        assert_eq!(html_to_text("", false), "");
    }

    #[test]
    fn sink_prints_on_done() {
        let buf = SharedBuf::default();
        let mut sink = TerminalSink::with_writer(Box::new(buf.clone()), "o/r#1").interactive(true);
        sink.show_progress();
        sink.show_result(&markdown_to_html("Hel"));
        sink.show_result(&markdown_to_html("Hello"));
        assert_eq!(buf.contents(), "");

        sink.show_done(false, true);
        let out = buf.contents();
        assert!(out.starts_with("Hello\n"));
        assert!(out.contains("✔ Review complete"));
        assert!(out.contains("[r] rerun"));

        sink.show_link("https://example.com/review");
        assert!(buf.contents().ends_with("  → https://example.com/review\n"));

        sink.close();
        assert!(sink.is_closed());
    }

    #[test]
    fn failed_round_hides_rerun_when_unavailable() {
        let buf = SharedBuf::default();
        let mut sink = TerminalSink::with_writer(Box::new(buf.clone()), "x").interactive(true);
        sink.show_error("Only github.com or gitlab.com are supported.");
        sink.show_done(true, false);
        let out = buf.contents();
        assert!(out.contains("Only github.com or gitlab.com are supported."));
        assert!(out.contains("✖ Review failed"));
        assert!(!out.contains("[r] rerun"));
    }

    #[test]
    fn completed_review_is_saved_as_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("review.html");
        let mut sink = TerminalSink::with_writer(Box::new(io::sink()), "o/r#<1>")
            .output_file(Some(path.clone()));
        sink.show_result("<p>ok</p>\n");
        sink.show_done(false, true);

        let saved = std::fs::read_to_string(&path).unwrap();
        assert!(saved.contains("<title>o/r#&lt;1&gt;</title>"));
        assert!(saved.contains("<p>ok</p>"));
        assert_eq!(sink.html(), "<p>ok</p>\n");
    }
}
