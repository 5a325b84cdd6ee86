//! Markdown rendering and allow-list sanitization for post bodies.
//!
//! Author text goes through three steps: markdown is converted to HTML, every
//! element or attribute outside the allow-list is stripped (its text content
//! survives, scripting elements are dropped whole), then bare URLs and email
//! addresses left in the text are wrapped as links. Characters markdown would
//! act on are then written as character references, so rendering the output
//! again shows the same text. The excerpt runs the same
//! clean/linkify policy with an empty allow-list and is cut to
//! [`EXCERPT_CAP`] characters followed by [`TRUNCATION_MARKER`].

mod linkify;

use std::collections::{HashMap, HashSet};

use ammonia::Builder;
use pulldown_cmark::{html, Options, Parser};
use thiserror::Error;

use self::linkify::{closes_anchor, opens_anchor, Segment, Segments};
pub use self::linkify::{escape_attr, linkify};

/// Elements allowed to survive in a rendered body.
pub const ALLOWED_TAGS: &[&str] = &[
    "a",
    "abbr",
    "acronym",
    "b",
    "blockquote",
    "code",
    "em",
    "i",
    "li",
    "ol",
    "pre",
    "strong",
    "ul",
    "h1",
    "h2",
    "h3",
    "p",
];

/// Maximum number of characters kept in an excerpt before the marker.
pub const EXCERPT_CAP: usize = 42;

/// Appended to every excerpt, whether or not anything was cut.
pub const TRUNCATION_MARKER: &str = "...";

/// Elements removed together with their content.
const DROPPED_WITH_CONTENT: &[&str] = &["script", "style"];

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("post body is not valid UTF-8: {0}")]
    InvalidEncoding(#[from] std::str::Utf8Error),
}

/// The derived fields of a post body, always computed together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub body_html: String,
    pub excerpt: String,
}

/// Render a raw body and derive the excerpt from the rendered HTML.
pub fn render(raw: &str) -> Rendered {
    let body_html = render_body(raw);
    let excerpt = render_excerpt(&body_html);
    Rendered { body_html, excerpt }
}

/// Markdown to safe HTML: convert, strip to the allow-list, linkify.
pub fn render_body(raw: &str) -> String {
    let cleaned = body_policy().clean(&markdown_to_html(raw)).to_string();
    escape_markdown(&linkify(&cleaned))
}

/// Same as [`render_body`] for bytes received off the wire.
pub fn render_body_bytes(raw: &[u8]) -> Result<String, ContentError> {
    Ok(render_body(std::str::from_utf8(raw)?))
}

/// Plain-text summary: strip every tag, linkify, truncate, append the marker.
pub fn render_excerpt(text: &str) -> String {
    let plain = linkify(&excerpt_policy().clean(text).to_string());
    let mut excerpt = truncate(&plain, EXCERPT_CAP);
    excerpt.push_str(TRUNCATION_MARKER);
    excerpt
}

/// Visible text of an HTML fragment, with entities left escaped.
pub fn text_content(html: &str) -> String {
    excerpt_policy().clean(html).to_string()
}

fn markdown_to_html(raw: &str) -> String {
    let parser = Parser::new_ext(raw, Options::empty());
    let mut out = String::with_capacity(raw.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

fn body_policy() -> Builder<'static> {
    let mut builder = Builder::default();
    builder
        .tags(ALLOWED_TAGS.iter().copied().collect())
        .clean_content_tags(DROPPED_WITH_CONTENT.iter().copied().collect())
        .generic_attributes(HashSet::new())
        .tag_attributes(HashMap::from([
            ("a", HashSet::from(["href", "title"])),
            ("abbr", HashSet::from(["title"])),
            ("acronym", HashSet::from(["title"])),
        ]))
        .url_schemes(HashSet::from(["http", "https", "mailto"]))
        .link_rel(Some("nofollow"));
    builder
}

fn excerpt_policy() -> Builder<'static> {
    let mut builder = Builder::default();
    builder
        .tags(HashSet::new())
        .clean_content_tags(DROPPED_WITH_CONTENT.iter().copied().collect())
        .generic_attributes(HashSet::new())
        .tag_attributes(HashMap::new())
        .link_rel(None);
    builder
}

/// Rewrite markdown syntax characters in the text nodes of sanitized HTML as
/// numeric character references. Text left behind by a stripped element
/// (a `<div>`, an `<h4>`) is otherwise parsed as markdown again.
///
/// Inline markers are escaped anywhere. Block markers only count at the
/// start of a line, where leading blanks are also dropped outside `<pre>`
/// so no line turns into an indented code block.
fn escape_markdown(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut line_start = true;
    let mut in_pre = 0usize;

    for segment in Segments::new(html) {
        match segment {
            Segment::Tag(tag) => {
                if tag.eq_ignore_ascii_case("<pre>") {
                    in_pre += 1;
                } else if tag.eq_ignore_ascii_case("</pre>") {
                    in_pre = in_pre.saturating_sub(1);
                }
                out.push_str(tag);
                line_start = false;
            }
            Segment::Text(text) => {
                let mut list_number = false;
                for c in text.chars() {
                    if c == '\n' {
                        out.push(c);
                        line_start = true;
                        list_number = false;
                        continue;
                    }
                    if line_start && (c == ' ' || c == '\t') {
                        if in_pre > 0 {
                            out.push(c);
                        }
                        continue;
                    }

                    let special = match c {
                        '*' | '_' | '`' | '[' | ']' | '\\' => true,
                        '#' | '-' | '+' | '=' | '~' => line_start,
                        '.' | ')' => list_number,
                        _ => false,
                    };
                    if special {
                        out.push_str(&format!("&#{};", c as u32));
                    } else {
                        out.push(c);
                    }
                    list_number = c.is_ascii_digit() && (line_start || list_number);
                    line_start = false;
                }
            }
        }
    }
    out
}

/// Keep at most `cap` characters. A cut that lands inside a tag or an entity
/// drops the partial construct, and an anchor left open is closed.
fn truncate(text: &str, cap: usize) -> String {
    let end = text
        .char_indices()
        .nth(cap)
        .map_or(text.len(), |(idx, _)| idx);
    let mut cut = &text[..end];

    if let Some(open) = cut.rfind('<') {
        if !cut[open..].contains('>') {
            cut = &cut[..open];
        }
    }
    if let Some(amp) = cut.rfind('&') {
        if !cut[amp..].contains(';') {
            cut = &cut[..amp];
        }
    }
    // an anchor with nothing left of its label
    if cut.ends_with('>') {
        if let Some(open) = cut.rfind('<') {
            if opens_anchor(&cut[open..]) {
                cut = &cut[..open];
            }
        }
    }

    let open_anchors = Segments::new(cut).fold(0usize, |depth, segment| match segment {
        Segment::Tag(tag) if opens_anchor(tag) => depth + 1,
        Segment::Tag(tag) if closes_anchor(tag) => depth.saturating_sub(1),
        _ => depth,
    });
    let mut out = cut.to_string();
    for _ in 0..open_anchors {
        out.push_str("</a>");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_never_survives() {
        let inputs = [
            "<script>alert(1)</script>",
            "hello <script src=\"x.js\"></script> world",
            "<SCRIPT>document.cookie</SCRIPT>",
            "```\n<script>inside code</script>\n```",
            "<p onclick=\"evil()\">click</p><img src=x onerror=alert(1)>",
        ];
        for input in inputs {
            let out = render_body(input).to_lowercase();
            assert!(!out.contains("<script"), "{input:?} -> {out:?}");
            assert!(!out.contains("onclick"), "{input:?} -> {out:?}");
            assert!(!out.contains("onerror"), "{input:?} -> {out:?}");
        }
    }

    #[test]
    fn test_disallowed_tags_are_stripped_not_escaped() {
        let out = render_body("<div><span>kept text</span></div>");
        assert!(out.contains("kept text"));
        assert!(!out.contains("div"));
        assert!(!out.contains("&lt;span"));
    }

    #[test]
    fn test_heading_and_link_render() {
        let out = render_body("# Hi [link](http://x.com)");
        assert!(out.contains("<h1>"));
        assert!(out.contains("href=\"http://x.com\""));
        assert!(out.contains("rel=\"nofollow\""));
    }

    #[test]
    fn test_javascript_links_lose_their_href() {
        let out = render_body("[bad](javascript:alert(1))");
        assert!(!out.contains("javascript:"));
        assert!(out.contains("bad"));
    }

    #[test]
    fn test_images_are_stripped() {
        let out = render_body("![cover](http://x.com/a.png)");
        assert!(!out.contains("<img"));
    }

    #[test]
    fn test_bare_url_is_linkified() {
        let out = render_body("see https://example.com/page for more");
        assert!(out.contains(
            "<a href=\"https://example.com/page\" rel=\"nofollow\">https://example.com/page</a>"
        ));
    }

    #[test]
    fn test_email_is_linkified() {
        let out = render_body("write to me@example.com today");
        assert!(out.contains("href=\"mailto:me@example.com\""));
    }

    #[test]
    fn test_link_text_is_not_linkified_twice() {
        let out = render_body("[https://example.com](https://example.com)");
        assert_eq!(out.matches("<a ").count(), 1);
    }

    #[test]
    fn test_rerendering_keeps_visible_text() {
        let inputs = [
            "# Title\n\nSome *emphasis* and a [link](https://x.com).",
            "- one\n- two\n\n> quoted https://example.org",
            "plain text with <b>bold</b> and 1 < 2 & 3 > 2",
            "```\nlet x = 1;\n```",
            "<div>\n*x*\n</div>\n\n<div>\n_y_\n</div>",
            "#### \\*starred\\* heading",
            "<div>\n# not a heading\n- not a list\n1. not ordered\n    not code\n</div>",
            "<div><b>**bold?**</b> [text](http://x.com)</div>",
            "snake_case and `ticks` in prose",
        ];
        for input in inputs {
            let once = render_body(input);
            let twice = render_body(&once);
            assert_eq!(
                text_content(&once).split_whitespace().collect::<Vec<_>>(),
                text_content(&twice).split_whitespace().collect::<Vec<_>>(),
                "{input:?}"
            );
        }
    }

    #[test]
    fn test_excerpt_always_has_marker_and_cap() {
        let long = "word ".repeat(200);
        let inputs = ["", "short", long.as_str(), "<p>éàü ünïcödé ✓ text that keeps going and going</p>"];
        for input in inputs {
            let excerpt = render_excerpt(input);
            assert!(excerpt.ends_with(TRUNCATION_MARKER), "{excerpt:?}");
            let head = &excerpt[..excerpt.len() - TRUNCATION_MARKER.len()];
            assert!(head.chars().count() <= EXCERPT_CAP, "{excerpt:?}");
        }
    }

    #[test]
    fn test_short_excerpt_still_gets_marker() {
        assert_eq!(render_excerpt("<p>Hello</p>"), "Hello...");
    }

    #[test]
    fn test_excerpt_strips_tags() {
        let excerpt = render_excerpt("<h1>Hi <a href=\"http://x.com\">link</a></h1>");
        assert_eq!(excerpt, "Hi link...");
    }

    #[test]
    fn test_excerpt_never_ends_in_partial_tag() {
        let excerpt = render_excerpt("<p>intro https://example.com/a/very/long/path/that/keeps/going</p>");
        let head = &excerpt[..excerpt.len() - TRUNCATION_MARKER.len()];
        if let Some(open) = head.rfind('<') {
            assert!(head[open..].contains('>'), "{excerpt:?}");
        }
        assert!(head.starts_with("intro "));
    }

    #[test]
    fn test_truncate_drops_partial_entity() {
        assert_eq!(truncate("ab&amp;cd", 4), "ab");
        assert_eq!(truncate("ab&amp;cd", 7), "ab&amp;");
    }

    #[test]
    fn test_truncate_closes_open_anchor() {
        let html = r#"ab <a href="http://x.com" rel="nofollow">http://x.com</a>"#;
        assert_eq!(
            truncate(html, 45),
            r#"ab <a href="http://x.com" rel="nofollow">http</a>"#
        );
        // cut right after the opening tag
        assert_eq!(truncate(html, 41), "ab ");
        assert_eq!(truncate(html, 100), html);
    }

    #[test]
    fn test_excerpt_cut_inside_link_label_is_balanced() {
        let excerpt = render_excerpt("<p>see http://a.io ok</p>");
        assert_eq!(excerpt.matches("<a ").count(), excerpt.matches("</a>").count());
        assert!(excerpt.ends_with("</a>..."), "{excerpt:?}");
    }

    #[test]
    fn test_stripped_block_text_is_not_markdown_again() {
        let once = render_body("<div>\n*x*\n</div>");
        assert!(!once.contains('*'), "{once:?}");
        assert_eq!(text_content(&once).trim(), "*x*");
        assert!(!render_body(&once).contains("<em>"));
    }

    #[test]
    fn test_markdown_escapes_stay_out_of_attributes() {
        let out = render_body("[a_b](http://x.com/a_b)");
        assert!(out.contains(r#"href="http://x.com/a_b""#), "{out:?}");
        assert!(out.contains(">a&#95;b</a>"), "{out:?}");
    }

    #[test]
    fn test_render_derives_excerpt_from_html() {
        let rendered = render("# Hi [link](http://x.com)");
        assert_eq!(rendered.excerpt, render_excerpt(&rendered.body_html));
        assert!(!rendered.excerpt.contains('<'));
    }

    #[test]
    fn test_invalid_utf8_is_reported() {
        let err = render_body_bytes(&[0x66, 0x6f, 0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, ContentError::InvalidEncoding(_)));
        assert_eq!(render_body_bytes(b"*hi*").unwrap(), render_body("*hi*"));
    }

    #[test]
    fn test_malformed_markdown_does_not_panic() {
        let out = render_body("**unclosed [link]( ``` <b");
        assert!(out.contains("unclosed"));
    }
}
