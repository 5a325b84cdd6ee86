use ::linkify::{LinkFinder, LinkKind};

/// Wrap bare http(s) URLs and email addresses found in the text nodes of a
/// sanitized HTML fragment. Text already inside an anchor is left alone.
///
/// Expects serializer output: every `<` in text is escaped, so a raw `<`
/// always opens a tag.
pub fn linkify(html: &str) -> String {
    let finder = {
        let mut finder = LinkFinder::new();
        finder.kinds(&[LinkKind::Url, LinkKind::Email]);
        finder
    };

    let mut out = String::with_capacity(html.len());
    let mut anchor_depth = 0usize;

    for segment in Segments::new(html) {
        match segment {
            Segment::Tag(tag) => {
                if opens_anchor(tag) {
                    anchor_depth += 1;
                } else if closes_anchor(tag) {
                    anchor_depth = anchor_depth.saturating_sub(1);
                }
                out.push_str(tag);
            }
            Segment::Text(text) if anchor_depth > 0 => out.push_str(text),
            Segment::Text(text) => link_text(&finder, text, &mut out),
        }
    }
    out
}

fn link_text(finder: &LinkFinder, escaped: &str, out: &mut String) {
    let text = unescape(escaped);
    for span in finder.spans(&text) {
        let piece = span.as_str();
        match span.kind() {
            Some(LinkKind::Url) if has_web_scheme(piece) => push_anchor(out, piece, piece),
            Some(LinkKind::Email) => push_anchor(out, &format!("mailto:{}", piece), piece),
            _ => out.push_str(&escape_text(piece)),
        }
    }
}

fn push_anchor(out: &mut String, href: &str, label: &str) {
    out.push_str("<a href=\"");
    out.push_str(&escape_attr(href));
    out.push_str("\" rel=\"nofollow\">");
    out.push_str(&escape_text(label));
    out.push_str("</a>");
}

fn has_web_scheme(url: &str) -> bool {
    let lower = url.get(..8).unwrap_or(url).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

pub(super) fn opens_anchor(tag: &str) -> bool {
    let rest = tag.strip_prefix("<a").or_else(|| tag.strip_prefix("<A"));
    matches!(rest.and_then(|r| r.chars().next()), Some(c) if c == '>' || c.is_whitespace())
}

pub(super) fn closes_anchor(tag: &str) -> bool {
    let lower = tag.to_ascii_lowercase();
    lower == "</a>" || lower.starts_with("</a ")
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&nbsp;", "\u{a0}")
        .replace("&amp;", "&")
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Escape text for use inside a double-quoted attribute or element body.
pub fn escape_attr(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}

pub(super) enum Segment<'a> {
    Tag(&'a str),
    Text(&'a str),
}

/// Splits markup into tags and the text between them. Quoted attribute values
/// may contain `>`.
pub(super) struct Segments<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Segments<'a> {
    pub(super) fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn tag_end(&self, start: usize) -> Option<usize> {
        let mut quote: Option<u8> = None;
        for (offset, &b) in self.src.as_bytes()[start + 1..].iter().enumerate() {
            match quote {
                Some(q) if b == q => quote = None,
                Some(_) => {}
                None if b == b'"' || b == b'\'' => quote = Some(b),
                None if b == b'>' => return Some(start + 1 + offset + 1),
                None => {}
            }
        }
        None
    }
}

impl<'a> Iterator for Segments<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.src.len() {
            return None;
        }
        let start = self.pos;
        let rest = &self.src[start..];

        if rest.starts_with('<') {
            if let Some(end) = self.tag_end(start) {
                self.pos = end;
                return Some(Segment::Tag(&self.src[start..end]));
            }
            // unterminated: treat the remainder as text
            self.pos = self.src.len();
            return Some(Segment::Text(rest));
        }

        let end = rest.find('<').map_or(self.src.len(), |i| start + i);
        self.pos = end;
        Some(Segment::Text(&self.src[start..end]))
    }
}
