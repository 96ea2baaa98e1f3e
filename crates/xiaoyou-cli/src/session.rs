use anyhow::Result;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;

use crate::prompt::{InputType, Prompt};
use crate::render::ParagraphCursor;

use xiaoyou::content_parts::parse_content_parts;
use xiaoyou::conversation::ConversationEvent;
use xiaoyou::models::message::MessageId;
use xiaoyou::session::{ChatSession, StreamHandle};

pub struct Session<'a> {
    chat: ChatSession,
    prompt: Box<dyn Prompt + 'a>,
}

impl<'a> Session<'a> {
    pub fn new(chat: ChatSession, prompt: Box<impl Prompt + 'a>) -> Self {
        Session { chat, prompt }
    }

    pub async fn start(&mut self) -> Result<()> {
        self.prompt.ready();

        loop {
            let input = self.prompt.get_input()?;
            // subscribe first so nothing published during send is missed
            let events = self.chat.conversation().subscribe();
            let handle = match input.input_type {
                InputType::Exit => break,
                InputType::AskAgain => continue,
                InputType::Message => input.content.as_deref().and_then(|text| self.chat.send(text)),
                InputType::Voice => {
                    let handle = self.chat.send_voice().await;
                    if handle.is_none() {
                        self.prompt.render_notice("当前设备暂不支持语音输入，请直接输入文字。");
                    }
                    handle
                }
            };

            if let Some(handle) = handle {
                self.stream_reply(handle, events).await;
            }
        }
        self.prompt.close();
        Ok(())
    }

    pub async fn headless_start(&mut self, query: &str) -> Result<()> {
        let events = self.chat.conversation().subscribe();
        if let Some(handle) = self.chat.send(query) {
            self.stream_reply(handle, events).await;
        }
        self.prompt.close();
        Ok(())
    }

    async fn stream_reply(
        &mut self,
        handle: StreamHandle,
        mut events: broadcast::Receiver<ConversationEvent>,
    ) {
        let id = handle.message_id();
        let mut cursor = ParagraphCursor::default();
        let mut busy = true;
        let mut interrupted = false;
        self.prompt.show_busy();

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(ConversationEvent::ContentAppended(message_id)) if message_id == id => {
                        if busy {
                            self.prompt.hide_busy();
                            busy = false;
                        }
                        self.render_settled(&mut cursor, id);
                    }
                    Ok(ConversationEvent::StreamFinished(message_id)) if message_id == id => break,
                    Ok(_) => {}
                    // the next append re-reads the whole buffer anyway
                    Err(RecvError::Lagged(skipped)) => debug!("Skipped {} conversation events", skipped),
                    Err(RecvError::Closed) => break,
                },
                _ = tokio::signal::ctrl_c() => {
                    handle.cancel();
                    interrupted = true;
                    break;
                }
            }
        }

        if busy {
            self.prompt.hide_busy();
        }
        self.render_rest(&mut cursor, id);
        if interrupted {
            self.prompt.render_notice("已停止回答。");
        }

        let outcome = handle.join().await;
        debug!(?outcome, "Reply finished");
    }

    fn render_settled(&mut self, cursor: &mut ParagraphCursor, id: MessageId) {
        if let Some(message) = self.chat.conversation().message(id) {
            if let Some(settled) = cursor.take_settled(&message.content) {
                self.prompt.render(&parse_content_parts(settled));
            }
        }
    }

    fn render_rest(&mut self, cursor: &mut ParagraphCursor, id: MessageId) {
        if let Some(message) = self.chat.conversation().message(id) {
            if let Some(rest) = cursor.take_rest(&message.content) {
                self.prompt.render(&parse_content_parts(rest));
            }
        }
    }
}
