use crate::client::ClientEvent;
use tracing::{debug, warn};
use watashi_shared::{ChatMessage, FinishReason, MessageRole, StreamChunk};

pub const WELCOME: &str = "Welcome to Watashi AI! Ask me anything.";

/// A transcript line. Notices are shown but never sent to the relay.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Message(ChatMessage),
    Notice(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    Idle,
    Waiting,
    Streaming,
    Error(String),
}

pub struct App {
    pub transcript: Vec<Entry>,
    pub input: String,
    pub scroll: u16,
    max_scroll: u16,
    pub status: Status,
    streaming_message: Option<String>,
}

impl App {
    pub fn new() -> Self {
        Self {
            transcript: vec![Entry::Notice(WELCOME.to_string())],
            input: String::new(),
            scroll: 0,
            max_scroll: 0,
            status: Status::Idle,
            streaming_message: None,
        }
    }

    /// The conversation as sent to the relay, in order.
    pub fn conversation(&self) -> Vec<ChatMessage> {
        self.transcript
            .iter()
            .filter_map(|entry| match entry {
                Entry::Message(message) => Some(message.clone()),
                Entry::Notice(_) => None,
            })
            .collect()
    }

    pub fn is_busy(&self) -> bool {
        self.streaming_message.is_some()
    }

    pub fn streaming_message(&self) -> Option<&str> {
        self.streaming_message.as_deref()
    }

    /// Take the input as a user message and return the conversation to send.
    /// Returns `None` for blank input or while a response is in flight.
    pub fn submit(&mut self) -> Option<Vec<ChatMessage>> {
        if self.is_busy() || self.input.trim().is_empty() {
            return None;
        }
        let content = std::mem::take(&mut self.input);
        self.transcript.push(Entry::Message(ChatMessage::user(content)));
        self.streaming_message = Some(String::new());
        self.status = Status::Waiting;
        self.scroll = 0;
        Some(self.conversation())
    }

    pub fn apply(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Chunk(StreamChunk::Text(delta)) => self.append_stream_chunk(&delta),
            ClientEvent::Chunk(StreamChunk::Error(message)) => self.fail_turn(message),
            ClientEvent::Chunk(StreamChunk::Finish(meta)) => {
                debug!("Finish reason: {:?}, usage: {:?}", meta.finish_reason, meta.usage);
                let truncated = meta.finish_reason == FinishReason::Length;
                if self.finish_streaming() && truncated {
                    self.transcript
                        .push(Entry::Notice("Response was cut off at the length limit.".to_string()));
                }
            }
            // A body that closes before its finish frame is a broken turn
            ClientEvent::Finished => self.fail_turn("Stream ended unexpectedly".to_string()),
            ClientEvent::Failed(message) => self.fail_turn(message),
        }
    }

    fn append_stream_chunk(&mut self, chunk: &str) {
        match self.streaming_message.as_mut() {
            Some(msg) => {
                msg.push_str(chunk);
                self.status = Status::Streaming;
            }
            None => warn!("Dropping chunk that arrived outside a turn"),
        }
    }

    /// Returns true when a turn was open.
    fn finish_streaming(&mut self) -> bool {
        let Some(content) = self.streaming_message.take() else {
            return false;
        };
        if !content.is_empty() {
            self.transcript.push(Entry::Message(ChatMessage {
                role: MessageRole::Assistant,
                content,
            }));
        }
        self.status = Status::Idle;
        true
    }

    /// The partial reply is discarded; the failure is shown as a notice.
    fn fail_turn(&mut self, message: String) {
        if self.streaming_message.take().is_none() {
            return;
        }
        self.transcript.push(Entry::Notice(format!("Error: {message}")));
        self.status = Status::Error(message);
    }

    /// Lines hidden above the view at the last draw.
    pub fn set_max_scroll(&mut self, max: u16) {
        self.max_scroll = max;
        self.scroll = self.scroll.min(max);
    }

    pub fn scroll_up(&mut self) {
        self.scroll = self.scroll.saturating_add(1).min(self.max_scroll);
    }

    pub fn scroll_down(&mut self) {
        self.scroll = self.scroll.saturating_sub(1);
    }
}
