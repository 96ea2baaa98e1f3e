use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::content::ContentPart;
use crate::content_parts::parse_content_parts;

pub type MessageId = Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// A chat message. User messages never change after creation; assistant
/// messages only ever grow by appending streamed text.
pub struct Message {
    pub id: MessageId,
    pub content: String,
    pub is_from_user: bool,
}

impl Message {
    /// Create a new user message with a fresh id
    pub fn user<S: Into<String>>(content: S) -> Self {
        Message {
            id: Uuid::new_v4(),
            content: content.into(),
            is_from_user: true,
        }
    }

    /// Create an empty assistant placeholder with a fresh id
    pub fn assistant() -> Self {
        Message {
            id: Uuid::new_v4(),
            content: String::new(),
            is_from_user: false,
        }
    }

    /// An assistant message that has not received its first chunk yet
    pub fn is_pending(&self) -> bool {
        !self.is_from_user && self.content.is_empty()
    }

    /// Renderable parts of the current buffer, recomputed on every call
    pub fn parts(&self) -> Vec<ContentPart> {
        parse_content_parts(&self.content)
    }
}
