use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::Value;

/// One item of a `videoArray` list
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct VideoItem {
    #[serde(default, deserialize_with = "lenient")]
    pub thumbnail: Option<String>,
}

/// The `data` / `result` object some payloads nest their media under
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NestedPayload {
    #[serde(default, deserialize_with = "lenient")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub thumbnail: Option<String>,
    #[serde(default, rename = "videoArray", deserialize_with = "lenient")]
    pub video_array: Option<Vec<VideoItem>>,
}

/// A decoded `data:` line. Every field is optional; fields of the wrong JSON
/// type are treated as absent instead of rejecting the whole line.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StreamPayload {
    #[serde(default, deserialize_with = "lenient")]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub thumbnail: Option<String>,
    #[serde(default, rename = "videoArray", deserialize_with = "lenient")]
    pub video_array: Option<Vec<VideoItem>>,
    #[serde(default, deserialize_with = "lenient")]
    pub data: Option<NestedPayload>,
    #[serde(default, deserialize_with = "lenient")]
    pub result: Option<NestedPayload>,
}

impl StreamPayload {
    pub fn text<S: Into<String>>(text: S) -> Self {
        StreamPayload {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// Best available chunk text: `text`, falling back to `content`.
    pub fn chunk_text(&self) -> Option<&str> {
        non_empty(self.text.as_deref()).or_else(|| non_empty(self.content.as_deref()))
    }

    /// The nested media object, preferring `data` over `result`.
    pub fn nested(&self) -> Option<&NestedPayload> {
        self.data.as_ref().or(self.result.as_ref())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}
