//! HTML helpers: `lol_html` for href collection, `scraper` for text extraction.

use lol_html::{element, HtmlRewriter, OutputSink, Settings};
use scraper::{ElementRef, Html, Node};

const NON_TEXT_TAGS: &[&str] = &["script", "style", "template", "noscript"];

/// Errors surfaced while scanning markup.
#[derive(Debug, thiserror::Error)]
pub enum HtmlError {
    /// The rewriter rejected the markup.
    #[error("html rewrite error: {0}")]
    Rewrite(#[from] lol_html::errors::RewritingError),
}

/// Collects every `href` of `<a>` elements in document order.
pub fn extract_hrefs(html: &str) -> Result<Vec<String>, HtmlError> {
    let mut hrefs = Vec::new();
    {
        let handler = element!("a[href]", |el| {
            if let Some(href) = el.get_attribute("href") {
                hrefs.push(href);
            }
            Ok(())
        });

        let mut rewriter = HtmlRewriter::new(
            Settings {
                element_content_handlers: vec![handler],
                ..Settings::default()
            },
            NoopSink,
        );
        rewriter.write(html.as_bytes())?;
        rewriter.end()?;
    }
    Ok(hrefs)
}

struct NoopSink;

impl OutputSink for NoopSink {
    fn handle_chunk(&mut self, _chunk: &[u8]) {}
}

/// Visible document text with whitespace collapsed.
///
/// Script, style, template and noscript contents are skipped.
pub fn plain_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut raw = String::with_capacity(html.len() / 2);
    for node in document.root_element().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| NON_TEXT_TAGS.contains(&el.name()))
        });
        if hidden {
            continue;
        }
        raw.push_str(text);
        raw.push(' ');
    }
    collapse_whitespace(&raw)
}

/// Contents of the first `<title>` element, or an empty string.
pub fn page_title(html: &str) -> String {
    let document = Html::parse_document(html);
    document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "title")
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .unwrap_or_default()
}

/// Sentence-like fragments of the body used for snippets.
///
/// Every element whose own text contains a Cyrillic letter yields its full
/// collapsed text, in document order. Nested matches repeat the inner text.
pub fn text_fragments(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let root = document.root_element();
    let body = root
        .descendants()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "body")
        .unwrap_or(root);

    let mut fragments = Vec::new();
    for element in body.descendants().filter_map(ElementRef::wrap) {
        if NON_TEXT_TAGS.contains(&element.value().name()) {
            continue;
        }
        let own_cyrillic = element.children().any(|child| match child.value() {
            Node::Text(text) => text.chars().any(is_cyrillic),
            _ => false,
        });
        if !own_cyrillic {
            continue;
        }
        let text = collapse_whitespace(&element.text().collect::<String>());
        if !text.is_empty() {
            fragments.push(text);
        }
    }
    fragments
}

fn is_cyrillic(ch: char) -> bool {
    ('\u{0400}'..='\u{04FF}').contains(&ch)
}

/// Collapses whitespace runs into single spaces and trims both ends.
pub fn collapse_whitespace(input: &str) -> String {
    let mut buf = String::with_capacity(input.len());
    let mut last_space = false;
    for ch in input.chars() {
        if ch.is_whitespace() {
            if !last_space && !buf.is_empty() {
                buf.push(' ');
            }
            last_space = true;
        } else {
            buf.push(ch);
            last_space = false;
        }
    }
    buf.trim_end().to_string()
}
