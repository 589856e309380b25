//! Single-shot passthrough from the provider channel to the HTTP body.

use crate::error::RelayError;
use crate::llm::{ModelProvider, ModelRequest};
use futures_util::{stream, Stream};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};
use watashi_shared::StreamChunk;

/// Wall-clock budget for one request, started when the request arrives.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn start(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    fn expired_message(&self) -> String {
        format!("Response exceeded the {}s time limit", self.budget.as_secs())
    }
}

/// Open the provider stream. Fails with `RelayError::Timeout` if the provider
/// has not started streaming by the deadline.
pub async fn open(
    provider: &dyn ModelProvider,
    request: ModelRequest,
    deadline: Deadline,
) -> Result<mpsc::UnboundedReceiver<StreamChunk>, RelayError> {
    match timeout_at(deadline.at, provider.stream_chat(request)).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(RelayError::Timeout(deadline.budget())),
    }
}

/// Encode chunks onto the response body in arrival order. When the deadline
/// passes mid-stream an error frame is written and the stream ends, which
/// drops the receiver and stops the provider task.
pub fn forward(
    rx: mpsc::UnboundedReceiver<StreamChunk>,
    deadline: Deadline,
) -> impl Stream<Item = Result<String, Infallible>> + Send + 'static {
    stream::unfold(Some(rx), move |state| async move {
        let mut rx = state?;
        match timeout_at(deadline.at, rx.recv()).await {
            Ok(Some(chunk)) => Some((Ok(chunk.encode()), Some(rx))),
            Ok(None) => {
                debug!("provider stream closed");
                None
            }
            Err(_) => {
                warn!("deadline of {:?} reached mid-stream", deadline.budget());
                let frame = StreamChunk::Error(deadline.expired_message()).encode();
                Some((Ok(frame), None))
            }
        }
    })
}
