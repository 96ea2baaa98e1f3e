//! Message store shared between streaming tasks and renderers.
//!
//! Writers go through a `StreamLease`: only the holder of an assistant
//! message's current lease may append to it, and every append is a single
//! critical section. Each change is announced on a broadcast channel so
//! renderers can re-read and re-parse the buffer at their own pace.
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;

use crate::course_card::{extract_course_card, CourseCard};
use crate::models::message::{Message, MessageId};
use crate::models::payload::StreamPayload;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationEvent {
    MessageAdded(MessageId),
    ContentAppended(MessageId),
    StreamFinished(MessageId),
}

/// Write permission over one assistant message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamLease {
    message_id: MessageId,
    generation: u64,
}

impl StreamLease {
    pub fn message_id(&self) -> MessageId {
        self.message_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardInsertion {
    Inserted,
    AlreadyPresent,
    Rejected,
}

struct Entry {
    message: Message,
    lease: Option<u64>,
}

#[derive(Default)]
struct Inner {
    entries: Vec<Entry>,
    next_generation: u64,
}

impl Inner {
    fn leased_mut(&mut self, lease: &StreamLease) -> Option<&mut Message> {
        self.entries
            .iter_mut()
            .find(|entry| entry.message.id == lease.message_id)
            .filter(|entry| entry.lease == Some(lease.generation))
            .map(|entry| &mut entry.message)
    }
}

#[derive(Clone)]
pub struct Conversation {
    inner: Arc<Mutex<Inner>>,
    events: broadcast::Sender<ConversationEvent>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.events.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: ConversationEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    /// Append a user message and its empty assistant placeholder, returning
    /// the placeholder's write lease.
    pub fn begin_exchange<S: Into<String>>(&self, user_text: S) -> (Message, StreamLease) {
        let user = Message::user(user_text);
        let assistant = Message::assistant();
        let lease = {
            let mut inner = self.lock();
            let generation = inner.next_generation;
            inner.next_generation += 1;
            inner.entries.push(Entry {
                message: user.clone(),
                lease: None,
            });
            inner.entries.push(Entry {
                message: assistant.clone(),
                lease: Some(generation),
            });
            StreamLease {
                message_id: assistant.id,
                generation,
            }
        };
        self.publish(ConversationEvent::MessageAdded(user.id));
        self.publish(ConversationEvent::MessageAdded(assistant.id));
        (user, lease)
    }

    /// Append `chunk` to the leased message. Returns false if the lease is no
    /// longer current, in which case nothing changed.
    pub fn append_text(&self, lease: &StreamLease, chunk: &str) -> bool {
        if chunk.is_empty() {
            return self.is_current(lease);
        }
        let applied = match self.lock().leased_mut(lease) {
            Some(message) => {
                message.content.push_str(chunk);
                true
            }
            None => false,
        };
        if applied {
            self.publish(ConversationEvent::ContentAppended(lease.message_id));
        }
        applied
    }

    /// Embed a course card unless its thumbnail URL is already in the buffer.
    pub fn append_course_card(&self, lease: &StreamLease, card: &CourseCard) -> CardInsertion {
        let insertion = match self.lock().leased_mut(lease) {
            None => CardInsertion::Rejected,
            Some(message)
                if message.content.contains(&card.thumbnail_url)
                    || message.content.contains(&card.marker_url()) =>
            {
                CardInsertion::AlreadyPresent
            }
            Some(message) => {
                message.content.push_str(&card.markdown());
                CardInsertion::Inserted
            }
        };
        if insertion == CardInsertion::Inserted {
            self.publish(ConversationEvent::ContentAppended(lease.message_id));
        }
        insertion
    }

    pub fn is_current(&self, lease: &StreamLease) -> bool {
        self.lock().leased_mut(lease).is_some()
    }

    /// Give up the lease; later appends through it are rejected.
    pub fn release(&self, lease: &StreamLease) {
        let released = {
            let mut inner = self.lock();
            match inner
                .entries
                .iter_mut()
                .find(|entry| entry.message.id == lease.message_id)
            {
                Some(entry) if entry.lease == Some(lease.generation) => {
                    entry.lease = None;
                    true
                }
                _ => false,
            }
        };
        if released {
            self.publish(ConversationEvent::StreamFinished(lease.message_id));
        }
    }

    pub fn message(&self, id: MessageId) -> Option<Message> {
        self.lock()
            .entries
            .iter()
            .find(|entry| entry.message.id == id)
            .map(|entry| entry.message.clone())
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.lock()
            .entries
            .iter()
            .map(|entry| entry.message.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }
}

/// What happened to one payload handed to the accumulator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accepted {
    /// Text or a course card was present; retries are off from now on
    Delivered,
    /// Nothing usable, e.g. a keep-alive
    Empty,
    /// The lease was revoked; the stream should stop
    Revoked,
}

/// Routes decoded payloads into one assistant message: text first, then any
/// course card the payload carries.
pub struct ChunkAccumulator {
    conversation: Conversation,
    lease: StreamLease,
    default_card_title: String,
}

impl ChunkAccumulator {
    pub fn new<S: Into<String>>(
        conversation: Conversation,
        lease: StreamLease,
        default_card_title: S,
    ) -> Self {
        Self {
            conversation,
            lease,
            default_card_title: default_card_title.into(),
        }
    }

    pub fn lease(&self) -> &StreamLease {
        &self.lease
    }

    pub fn accept(&self, payload: &StreamPayload) -> Accepted {
        let mut delivered = false;

        if let Some(chunk) = payload.chunk_text() {
            if !self.conversation.append_text(&self.lease, chunk) {
                return Accepted::Revoked;
            }
            delivered = true;
        }

        if let Some(card) = extract_course_card(payload, &self.default_card_title) {
            if self.conversation.append_course_card(&self.lease, &card) == CardInsertion::Rejected {
                return Accepted::Revoked;
            }
            delivered = true;
        }

        if delivered {
            Accepted::Delivered
        } else if self.conversation.is_current(&self.lease) {
            Accepted::Empty
        } else {
            Accepted::Revoked
        }
    }

    /// Append a user-visible line outside the payload path (errors, canned answers).
    pub fn append_notice(&self, text: &str) -> bool {
        self.conversation.append_text(&self.lease, text)
    }

    pub fn is_current(&self) -> bool {
        self.conversation.is_current(&self.lease)
    }

    pub fn finish(&self) {
        self.conversation.release(&self.lease);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_CARD_TITLE;

    fn payload(json: &str) -> StreamPayload {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_begin_exchange_pairs_messages() {
        let conversation = Conversation::new();
        let (user, lease) = conversation.begin_exchange("how to squat?");

        let messages = conversation.snapshot();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], user);
        assert!(messages[0].is_from_user);
        assert_eq!(messages[1].id, lease.message_id());
        assert!(messages[1].is_pending());
    }

    #[test]
    fn test_append_text_in_order() {
        let conversation = Conversation::new();
        let (_, lease) = conversation.begin_exchange("q");

        assert!(conversation.append_text(&lease, "Hello"));
        assert!(conversation.append_text(&lease, ", world"));

        let message = conversation.message(lease.message_id()).unwrap();
        assert_eq!(message.content, "Hello, world");
    }

    #[test]
    fn test_released_lease_rejects_appends() {
        let conversation = Conversation::new();
        let (_, lease) = conversation.begin_exchange("q");

        assert!(conversation.append_text(&lease, "partial"));
        conversation.release(&lease);

        assert!(!conversation.is_current(&lease));
        assert!(!conversation.append_text(&lease, " stale"));
        assert_eq!(
            conversation.append_course_card(
                &lease,
                &CourseCard {
                    title: "t".into(),
                    thumbnail_url: "http://x/a.png".into()
                }
            ),
            CardInsertion::Rejected
        );
        assert_eq!(conversation.message(lease.message_id()).unwrap().content, "partial");
    }

    #[test]
    fn test_lease_does_not_cross_messages() {
        let conversation = Conversation::new();
        let (_, first) = conversation.begin_exchange("one");
        let (_, second) = conversation.begin_exchange("two");

        conversation.release(&first);
        assert!(!conversation.append_text(&first, "late"));
        assert!(conversation.append_text(&second, "fresh"));

        assert_eq!(conversation.message(first.message_id()).unwrap().content, "");
        assert_eq!(conversation.message(second.message_id()).unwrap().content, "fresh");
    }

    #[test]
    fn test_course_card_inserted_once() {
        let conversation = Conversation::new();
        let (_, lease) = conversation.begin_exchange("q");
        let accumulator = ChunkAccumulator::new(conversation.clone(), lease, DEFAULT_CARD_TITLE);

        let card = payload(r#"{"thumbnail":"http://x/a.png"}"#);
        assert_eq!(accumulator.accept(&card), Accepted::Delivered);
        assert_eq!(accumulator.accept(&card), Accepted::Delivered);

        let content = conversation.message(lease.message_id()).unwrap().content;
        assert_eq!(content, "![课程封面](http://x/a.png)");
        assert_eq!(content.matches("http://x/a.png").count(), 1);
    }

    #[test]
    fn test_encoded_card_inserted_once() {
        let conversation = Conversation::new();
        let (_, lease) = conversation.begin_exchange("q");
        let card = CourseCard {
            title: "c".into(),
            thumbnail_url: "http://x/my card.png".into(),
        };

        assert_eq!(conversation.append_course_card(&lease, &card), CardInsertion::Inserted);
        assert_eq!(
            conversation.append_course_card(&lease, &card),
            CardInsertion::AlreadyPresent
        );
        assert_eq!(
            conversation.message(lease.message_id()).unwrap().content,
            "![c](http://x/my%20card.png)"
        );
    }

    #[test]
    fn test_card_skipped_when_url_already_in_text() {
        let conversation = Conversation::new();
        let (_, lease) = conversation.begin_exchange("q");
        conversation.append_text(&lease, "see http://x/a.png");

        let card = CourseCard {
            title: "c".into(),
            thumbnail_url: "http://x/a.png".into(),
        };
        assert_eq!(
            conversation.append_course_card(&lease, &card),
            CardInsertion::AlreadyPresent
        );
    }

    #[test]
    fn test_accept_text_then_card() {
        let conversation = Conversation::new();
        let (_, lease) = conversation.begin_exchange("q");
        let accumulator = ChunkAccumulator::new(conversation.clone(), lease, DEFAULT_CARD_TITLE);

        let accepted = accumulator.accept(&payload(
            r#"{"text":"推荐课程：","title":"核心训练","thumbnail":"http://x/core.png"}"#,
        ));
        assert_eq!(accepted, Accepted::Delivered);
        assert_eq!(
            conversation.message(lease.message_id()).unwrap().content,
            "推荐课程：![核心训练](http://x/core.png)"
        );
    }

    #[test]
    fn test_keep_alive_is_empty() {
        let conversation = Conversation::new();
        let (_, lease) = conversation.begin_exchange("q");
        let accumulator = ChunkAccumulator::new(conversation.clone(), lease, DEFAULT_CARD_TITLE);

        assert_eq!(accumulator.accept(&payload(r#"{"text":""}"#)), Accepted::Empty);
        accumulator.finish();
        assert_eq!(accumulator.accept(&payload(r#"{"text":""}"#)), Accepted::Revoked);
        assert_eq!(accumulator.accept(&payload(r#"{"text":"x"}"#)), Accepted::Revoked);
    }

    #[tokio::test]
    async fn test_events_published() {
        let conversation = Conversation::new();
        let mut events = conversation.subscribe();

        let (user, lease) = conversation.begin_exchange("q");
        conversation.append_text(&lease, "a");
        conversation.append_text(&lease, "");
        conversation.release(&lease);

        assert_eq!(events.recv().await.unwrap(), ConversationEvent::MessageAdded(user.id));
        assert_eq!(
            events.recv().await.unwrap(),
            ConversationEvent::MessageAdded(lease.message_id())
        );
        assert_eq!(
            events.recv().await.unwrap(),
            ConversationEvent::ContentAppended(lease.message_id())
        );
        assert_eq!(
            events.recv().await.unwrap(),
            ConversationEvent::StreamFinished(lease.message_id())
        );
    }
}
