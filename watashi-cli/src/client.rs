use anyhow::{anyhow, Result};
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use watashi_shared::{ChatMessage, ChatRequest, ErrorBody, FrameDecoder, StreamChunk};

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Chunk(StreamChunk),
    /// The request or the stream failed; no more events for this turn.
    Failed(String),
    /// The response body ended.
    Finished,
}

/// Posts conversations to the relay and turns each streamed response into
/// `ClientEvent`s on one channel.
pub struct RelayClient {
    http: reqwest::Client,
    url: String,
    events: mpsc::UnboundedSender<ClientEvent>,
}

impl RelayClient {
    pub fn new(url: String) -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let client = Self {
            http: reqwest::Client::new(),
            url,
            events,
        };
        (client, events_rx)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn send(&self, messages: Vec<ChatMessage>) {
        let http = self.http.clone();
        let url = self.url.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            info!("Sending {} message(s) to {}", messages.len(), url);
            let request = ChatRequest { messages };
            match stream_response(&http, &url, &request, &events).await {
                Ok(()) => {
                    let _ = events.send(ClientEvent::Finished);
                }
                Err(e) => {
                    error!("Chat request failed: {:#}", e);
                    let _ = events.send(ClientEvent::Failed(e.to_string()));
                }
            }
        });
    }
}

async fn stream_response(
    http: &reqwest::Client,
    url: &str,
    request: &ChatRequest,
    events: &mpsc::UnboundedSender<ClientEvent>,
) -> Result<()> {
    let response = http
        .post(url)
        .json(request)
        .send()
        .await
        .map_err(|e| anyhow!("Could not reach server: {e}"))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(anyhow!(describe_failure(status, &body)));
    }

    let mut decoder = FrameDecoder::new();
    let mut body = response.bytes_stream();
    while let Some(bytes) = body.next().await {
        let bytes = bytes.map_err(|e| anyhow!("Connection interrupted: {e}"))?;
        debug!("Received {} bytes", bytes.len());
        for chunk in decoder.push(&bytes) {
            forward(chunk, events)?;
        }
    }
    if let Some(chunk) = decoder.finish() {
        forward(chunk, events)?;
    }
    Ok(())
}

fn forward(
    chunk: Result<StreamChunk, watashi_shared::FrameError>,
    events: &mpsc::UnboundedSender<ClientEvent>,
) -> Result<()> {
    let chunk = chunk.map_err(|e| {
        warn!("Unreadable stream content: {}", e);
        anyhow!("Received unreadable data from the server")
    })?;
    events
        .send(ClientEvent::Chunk(chunk))
        .map_err(|_| anyhow!("UI stopped listening"))
}

/// Human-readable message for a non-success response.
pub fn describe_failure(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(error) => error.summary(),
        Err(_) => format!("Server returned {status}"),
    }
}
