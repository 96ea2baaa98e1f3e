use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::ChatConfig;
use crate::conversation::{ChunkAccumulator, Conversation, StreamLease};
use crate::errors::StreamResult;
use crate::intent::{is_video_generation_request, VIDEO_FALLBACK_ANSWER};
use crate::models::message::MessageId;
use crate::streamer::{StreamOutcome, StreamRunner};
use crate::transport::{ReqwestTransport, Transport};
use crate::voice::{UnsupportedVoiceInput, VoiceInput};

/// Stops one in-flight stream and revokes its write lease.
#[derive(Clone)]
pub struct StreamCanceller {
    cancel_tx: Arc<watch::Sender<bool>>,
    conversation: Conversation,
    lease: StreamLease,
}

impl StreamCanceller {
    pub fn cancel(&self) {
        // the task may already be gone
        let _ = self.cancel_tx.send(true);
        self.conversation.release(&self.lease);
    }
}

pub struct StreamHandle {
    message_id: MessageId,
    canceller: StreamCanceller,
    task: Option<JoinHandle<StreamOutcome>>,
}

impl StreamHandle {
    /// The assistant message this stream writes into
    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    pub fn canceller(&self) -> StreamCanceller {
        self.canceller.clone()
    }

    pub fn cancel(&self) {
        self.canceller.cancel();
    }

    pub async fn join(self) -> StreamOutcome {
        match self.task {
            None => StreamOutcome::AnsweredLocally,
            Some(task) => task.await.unwrap_or_else(|e| {
                error!("Stream task failed: {}", e);
                StreamOutcome::Cancelled
            }),
        }
    }
}

/// Entry point for the input surface: turns user text into an exchange in the
/// conversation and streams the answer in the background.
pub struct ChatSession {
    conversation: Conversation,
    config: Arc<ChatConfig>,
    runner: Arc<StreamRunner>,
    voice: Arc<dyn VoiceInput>,
    active: Mutex<Option<StreamCanceller>>,
}

impl ChatSession {
    pub fn new(config: ChatConfig, transport: Arc<dyn Transport>) -> Self {
        let config = Arc::new(config);
        Self {
            conversation: Conversation::new(),
            runner: Arc::new(StreamRunner::new(transport, config.clone())),
            config,
            voice: Arc::new(UnsupportedVoiceInput),
            active: Mutex::new(None),
        }
    }

    /// A session talking to the configured service over HTTP.
    pub fn connect(config: ChatConfig) -> StreamResult<Self> {
        let transport = ReqwestTransport::new(config.timeout())?;
        Ok(Self::new(config, Arc::new(transport)))
    }

    pub fn with_voice_input(mut self, voice: Arc<dyn VoiceInput>) -> Self {
        self.voice = voice;
        self
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Send a user message. Blank input is ignored and yields `None`.
    ///
    /// Any stream still running for an earlier message is cancelled first.
    /// Must be called from within a tokio runtime.
    pub fn send(&self, text: &str) -> Option<StreamHandle> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        if let Some(previous) = self.lock_active().take() {
            previous.cancel();
        }

        let (_, lease) = self.conversation.begin_exchange(text);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let canceller = StreamCanceller {
            cancel_tx: Arc::new(cancel_tx),
            conversation: self.conversation.clone(),
            lease,
        };

        if is_video_generation_request(text) {
            info!("Answering video request locally");
            self.conversation.append_text(&lease, VIDEO_FALLBACK_ANSWER);
            self.conversation.release(&lease);
            return Some(StreamHandle {
                message_id: lease.message_id(),
                canceller,
                task: None,
            });
        }

        let accumulator = ChunkAccumulator::new(
            self.conversation.clone(),
            lease,
            self.config.default_card_title.clone(),
        );
        let runner = self.runner.clone();
        let query = text.to_string();
        let task = tokio::spawn(async move { runner.run(&query, &accumulator, cancel_rx).await });

        *self.lock_active() = Some(canceller.clone());
        Some(StreamHandle {
            message_id: lease.message_id(),
            canceller,
            task: Some(task),
        })
    }

    /// Transcribe speech and send the result like typed input.
    pub async fn send_voice(&self) -> Option<StreamHandle> {
        let text = self.voice.transcribe().await;
        self.send(&text)
    }

    /// Cancel the most recent stream, if it is still running.
    pub fn cancel_active(&self) {
        if let Some(active) = self.lock_active().take() {
            active.cancel();
        }
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, Option<StreamCanceller>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
