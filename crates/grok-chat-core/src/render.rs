//! Markdown to HTML for painting a (possibly still growing) reply.

use pulldown_cmark::{Event, Options, Parser, html};

/// Converts reply text into HTML that is safe to insert into a page.
pub trait MarkdownRenderer: Send + Sync {
    fn render(&self, markdown: &str) -> String;
}

/// Default renderer built on pulldown-cmark.
///
/// GFM tables, strikethrough and task lists are enabled, single newlines
/// become `<br />`, and raw HTML in the source is escaped instead of
/// passed through.
#[derive(Clone, Copy, Debug, Default)]
pub struct PulldownMarkdownRenderer;

impl MarkdownRenderer for PulldownMarkdownRenderer {
    fn render(&self, markdown: &str) -> String {
        let options = Options::ENABLE_TABLES
            | Options::ENABLE_STRIKETHROUGH
            | Options::ENABLE_TASKLISTS;
        let events = Parser::new_ext(markdown, options).map(|event| match event {
            Event::SoftBreak => Event::HardBreak,
            Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
            other => other,
        });
        let mut out = String::with_capacity(markdown.len() * 3 / 2);
        html::push_html(&mut out, events);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_common_markdown() {
        let html = PulldownMarkdownRenderer.render("# Hi\n**bold** and `code`");
        assert!(html.contains("<h1>Hi</h1>"));
        assert!(html.contains("<strong>bold</strong>"));
        assert!(html.contains("<code>code</code>"));
    }

    #[test]
    fn raw_html_is_escaped() {
        let html = PulldownMarkdownRenderer.render("<script>alert(1)</script>\n\nok <b>x</b>");
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<b>"));
    }

    #[test]
    fn single_newlines_become_line_breaks() {
        let html = PulldownMarkdownRenderer.render("line one\nline two");
        assert!(html.contains("line one<br />"));
    }

    #[test]
    fn partial_reply_still_renders() {
        let html = PulldownMarkdownRenderer.render("Here is code:\n```rust\nfn main() {");
        assert!(html.contains("<pre><code class=\"language-rust\">"));
        assert!(html.contains("fn main() {"));
    }

    #[test]
    fn tables_are_enabled() {
        let html = PulldownMarkdownRenderer.render("| a | b |\n|---|---|\n| 1 | 2 |");
        assert!(html.contains("<table>"));
    }
}
