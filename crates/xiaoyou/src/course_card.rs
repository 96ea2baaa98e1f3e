use crate::models::payload::{StreamPayload, VideoItem};

/// A course or video thumbnail found in a stream payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseCard {
    pub title: String,
    pub thumbnail_url: String,
}

impl CourseCard {
    /// Markdown image marker embedded into the assistant buffer.
    /// `]` would terminate the alt text early, so it is dropped from the title.
    pub fn markdown(&self) -> String {
        let title: String = self.title.chars().filter(|c| *c != ']').collect();
        format!("![{}]({})", title, self.marker_url())
    }

    /// The thumbnail URL as written into the marker. Whitespace and
    /// parentheses are percent-encoded so the marker stays one token.
    pub fn marker_url(&self) -> String {
        let mut encoded = String::with_capacity(self.thumbnail_url.len());
        for c in self.thumbnail_url.chars() {
            if c.is_whitespace() || c == '(' || c == ')' {
                let mut utf8 = [0u8; 4];
                for byte in c.encode_utf8(&mut utf8).bytes() {
                    encoded.push_str(&format!("%{:02X}", byte));
                }
            } else {
                encoded.push(c);
            }
        }
        encoded
    }
}

/// Find the card a payload carries, if any.
///
/// Sources are tried in order: the top-level thumbnail, the nested
/// `data`/`result` thumbnail, the nested video list, then the top-level video
/// list. Titles fall back to `default_title` when missing or blank.
pub fn extract_course_card(payload: &StreamPayload, default_title: &str) -> Option<CourseCard> {
    let top_title = trimmed(payload.title.as_deref());

    if let Some(thumbnail) = trimmed(payload.thumbnail.as_deref()) {
        return Some(card(top_title, thumbnail, default_title));
    }

    if let Some(nested) = payload.nested() {
        let nested_title = trimmed(nested.title.as_deref());

        if let Some(thumbnail) = trimmed(nested.thumbnail.as_deref()) {
            return Some(card(nested_title, thumbnail, default_title));
        }

        if let Some(thumbnail) = first_thumbnail(nested.video_array.as_deref()) {
            return Some(card(nested_title, thumbnail, default_title));
        }
    }

    first_thumbnail(payload.video_array.as_deref())
        .map(|thumbnail| card(top_title, thumbnail, default_title))
}

fn card(title: Option<&str>, thumbnail: &str, default_title: &str) -> CourseCard {
    CourseCard {
        title: title.unwrap_or(default_title).to_string(),
        thumbnail_url: thumbnail.to_string(),
    }
}

fn trimmed(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

fn first_thumbnail(items: Option<&[VideoItem]>) -> Option<&str> {
    items?
        .iter()
        .find_map(|item| trimmed(item.thumbnail.as_deref()))
}
