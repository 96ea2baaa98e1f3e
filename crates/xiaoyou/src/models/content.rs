use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub alt: String,
    pub source: String,
}

impl ImageRef {
    pub fn new<S: Into<String>, T: Into<String>>(alt: S, source: T) -> Self {
        ImageRef {
            alt: alt.into(),
            source: source.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
/// One contiguous renderable unit of an assistant answer
pub enum ContentPart {
    Text { text: String },
    Image(ImageRef),
}

impl ContentPart {
    pub fn text<S: Into<String>>(text: S) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn image<S: Into<String>, T: Into<String>>(alt: S, source: T) -> Self {
        ContentPart::Image(ImageRef::new(alt, source))
    }

    /// Get the text if this is a Text variant
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentPart::Text { text } => Some(text),
            _ => None,
        }
    }

    /// Get the image if this is an Image variant
    pub fn as_image(&self) -> Option<&ImageRef> {
        match self {
            ContentPart::Image(image) => Some(image),
            _ => None,
        }
    }
}
