//! Splits an assistant buffer into text runs and inline images.
//!
//! Four recognizers each propose candidate image tokens over byte ranges of
//! the buffer. Candidates are ranked (markdown image, then HTML `<img>`, then
//! image-looking markdown link, then bare image-looking URL), overlaps are
//! resolved greedily from left to right, and the text around the accepted
//! tokens is normalized into `Text` parts. Parsing is pure: callers re-run it
//! on the whole buffer every time it changes.
use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;

use crate::models::content::{ContentPart, ImageRef};

pub const PRIORITY_MARKDOWN_IMAGE: u8 = 0;
pub const PRIORITY_HTML_IMAGE: u8 = 1;
pub const PRIORITY_MARKDOWN_LINK: u8 = 2;
pub const PRIORITY_BARE_URL: u8 = 3;

const IMAGE_HINTS: [&str; 9] = [
    ".png", ".jpg", ".jpeg", ".gif", ".webp", "/image", "/img", "photo", "picture",
];

/// Sentence punctuation that is never part of a bare URL's tail
const URL_TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?'];

/// A candidate image occurrence in the source buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageToken {
    pub range: Range<usize>,
    pub image: ImageRef,
    /// Lower wins on overlap
    pub priority: u8,
}

impl ImageToken {
    pub fn new(range: Range<usize>, image: ImageRef, priority: u8) -> Self {
        ImageToken {
            range,
            image,
            priority,
        }
    }

    pub fn len(&self) -> usize {
        self.range.end - self.range.start
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

static MARKDOWN_IMAGE_REGEX: OnceLock<Regex> = OnceLock::new();
static HTML_IMAGE_REGEX: OnceLock<Regex> = OnceLock::new();
static HTML_ALT_REGEX: OnceLock<Regex> = OnceLock::new();
static MARKDOWN_LINK_REGEX: OnceLock<Regex> = OnceLock::new();
static BARE_URL_REGEX: OnceLock<Regex> = OnceLock::new();
static BLANK_LINES_REGEX: OnceLock<Regex> = OnceLock::new();

fn markdown_image_regex() -> &'static Regex {
    MARKDOWN_IMAGE_REGEX.get_or_init(|| {
        // ![alt](source) with an optional "title"
        Regex::new(r#"!\[([^\]]*)\]\(\s*([^)\s]+)(?:\s+"[^"]*")?\s*\)"#)
            .expect("Failed to compile markdown image regex")
    })
}

fn html_image_regex() -> &'static Regex {
    HTML_IMAGE_REGEX.get_or_init(|| {
        Regex::new(r#"(?is)<img\b[^>]*?\bsrc\s*=\s*["']([^"']+)["'][^>]*>"#)
            .expect("Failed to compile html image regex")
    })
}

fn html_alt_regex() -> &'static Regex {
    HTML_ALT_REGEX.get_or_init(|| {
        Regex::new(r#"(?is)\balt\s*=\s*["']([^"']*)["']"#)
            .expect("Failed to compile html alt regex")
    })
}

fn markdown_link_regex() -> &'static Regex {
    MARKDOWN_LINK_REGEX.get_or_init(|| {
        Regex::new(r#"\[([^\]]*)\]\(\s*((?i:https?)://[^)\s]+)\s*\)"#)
            .expect("Failed to compile markdown link regex")
    })
}

fn bare_url_regex() -> &'static Regex {
    BARE_URL_REGEX.get_or_init(|| {
        Regex::new(r#"(?i)https?://[^\s<>"'()\[\]（）【】，。；：！？、“”]+"#)
            .expect("Failed to compile bare url regex")
    })
}

fn blank_lines_regex() -> &'static Regex {
    BLANK_LINES_REGEX
        .get_or_init(|| Regex::new(r"\n{3,}").expect("Failed to compile blank lines regex"))
}

/// Case-insensitive check for the usual image extensions and path words.
pub fn looks_like_image(url: &str) -> bool {
    let lowered = url.to_lowercase();
    IMAGE_HINTS.iter().any(|hint| lowered.contains(hint))
}

/// Every candidate image token in `text`, unresolved and unsorted.
pub fn find_image_tokens(text: &str) -> Vec<ImageToken> {
    let mut tokens = Vec::new();

    for caps in markdown_image_regex().captures_iter(text) {
        let (Some(whole), Some(alt), Some(source)) = (caps.get(0), caps.get(1), caps.get(2))
        else {
            continue;
        };
        tokens.push(ImageToken::new(
            whole.range(),
            ImageRef::new(alt.as_str().trim(), source.as_str()),
            PRIORITY_MARKDOWN_IMAGE,
        ));
    }

    for caps in html_image_regex().captures_iter(text) {
        let (Some(whole), Some(source)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let alt = html_alt_regex()
            .captures(whole.as_str())
            .and_then(|alt| alt.get(1))
            .map(|alt| alt.as_str().trim())
            .unwrap_or_default();
        tokens.push(ImageToken::new(
            whole.range(),
            ImageRef::new(alt, source.as_str().trim()),
            PRIORITY_HTML_IMAGE,
        ));
    }

    for caps in markdown_link_regex().captures_iter(text) {
        let (Some(whole), Some(title), Some(url)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        if !looks_like_image(url.as_str()) {
            continue;
        }
        tokens.push(ImageToken::new(
            whole.range(),
            ImageRef::new(title.as_str().trim(), url.as_str()),
            PRIORITY_MARKDOWN_LINK,
        ));
    }

    for found in bare_url_regex().find_iter(text) {
        let url = found.as_str().trim_end_matches(URL_TRAILING_PUNCTUATION);
        if url.is_empty() || !looks_like_image(url) {
            continue;
        }
        let start = found.start();
        tokens.push(ImageToken::new(
            start..start + url.len(),
            ImageRef::new("", url),
            PRIORITY_BARE_URL,
        ));
    }

    tokens
}

/// Order candidates by start, then priority, then longest span, and keep
/// each one that begins at or after the end of the previously kept token.
pub fn resolve_overlaps(mut tokens: Vec<ImageToken>) -> Vec<ImageToken> {
    tokens.sort_by(|a, b| {
        a.range
            .start
            .cmp(&b.range.start)
            .then(a.priority.cmp(&b.priority))
            .then(b.len().cmp(&a.len()))
    });

    let mut selected: Vec<ImageToken> = Vec::new();
    let mut last_end = 0;
    for token in tokens {
        if token.range.start < last_end {
            continue;
        }
        last_end = token.range.end;
        selected.push(token);
    }
    selected
}

/// Collapse CRLF, squeeze runs of blank lines to one, and trim.
pub fn normalize_text(segment: &str) -> String {
    let unified = segment.replace("\r\n", "\n");
    blank_lines_regex()
        .replace_all(&unified, "\n\n")
        .trim()
        .to_string()
}

/// Parse a message buffer into its ordered text and image parts.
///
/// An empty (or whitespace-only) buffer yields no parts at all, which lets a
/// renderer tell "still waiting for the first chunk" apart from any answer.
pub fn parse_content_parts(text: &str) -> Vec<ContentPart> {
    let tokens = resolve_overlaps(find_image_tokens(text));
    let mut parts = Vec::with_capacity(tokens.len() * 2 + 1);
    let mut cursor = 0;

    for token in tokens {
        push_text(&mut parts, &text[cursor..token.range.start]);
        parts.push(ContentPart::Image(token.image));
        cursor = token.range.end;
    }
    push_text(&mut parts, &text[cursor..]);

    parts
}

fn push_text(parts: &mut Vec<ContentPart>, segment: &str) {
    let normalized = normalize_text(segment);
    if !normalized.is_empty() {
        parts.push(ContentPart::text(normalized));
    }
}
