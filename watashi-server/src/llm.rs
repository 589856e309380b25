use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
        CreateChatCompletionStreamResponse,
        FinishReason as OpenAiFinishReason,
    },
    Client,
};
use async_trait::async_trait;
use futures_util::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use watashi_shared::{ChatMessage, FinishMetadata, FinishReason, MessageRole, StreamChunk, Usage};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{0}")]
    Api(#[from] OpenAIError),
    #[error("{0}")]
    Unavailable(String),
}

/// Everything the provider needs for one completion.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub system_prompt: String,
    pub temperature: f32,
    pub messages: Vec<ChatMessage>,
}

/// The hosted model. Implementations spawn a producer that pushes chunks into
/// the returned channel in provider order and closes it when done. A closed
/// receiver means the caller went away and the producer should stop.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn stream_chat(
        &self,
        request: ModelRequest,
    ) -> Result<mpsc::UnboundedReceiver<StreamChunk>, ProviderError>;
}

/// Provider backed by an OpenAI-compatible chat completions endpoint.
pub struct LlmService {
    client: Client<OpenAIConfig>,
    model: String,
    max_tokens: u32,
}

impl LlmService {
    pub fn new(api_key: String, api_base: String, model: String, max_tokens: u32) -> Self {
        info!("Initializing LLM service with model: {} at {}", model, api_base);
        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base);
        let client = Client::with_config(config);
        Self {
            client,
            model,
            max_tokens,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    #[allow(deprecated)]
    fn build_request(&self, request: ModelRequest) -> Result<CreateChatCompletionRequest, OpenAIError> {
        let history = request
            .messages
            .into_iter()
            .map(convert_message)
            .collect::<Result<Vec<_>, _>>()?;

        let system_message = ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(request.system_prompt)
                .build()?,
        );

        let mut messages = Vec::with_capacity(1 + history.len());
        messages.push(system_message);
        messages.extend(history);

        CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(request.temperature)
            .max_tokens(self.max_tokens)
            .stream(true)
            .build()
    }
}

#[async_trait]
impl ModelProvider for LlmService {
    async fn stream_chat(
        &self,
        request: ModelRequest,
    ) -> Result<mpsc::UnboundedReceiver<StreamChunk>, ProviderError> {
        let message_count = request.messages.len();
        let request = self.build_request(request)?;
        debug!(
            model = %self.model,
            messages = message_count,
            temperature = ?request.temperature,
            "opening provider stream"
        );

        let mut stream = self.client.chat().create_stream(request).await.map_err(|e| {
            error!("Failed to create provider stream: {:?}", e);
            ProviderError::from(e)
        })?;

        // The request is only sent once the stream is polled, so wait for the
        // first event here; connection and status failures surface as errors.
        let first = match stream.next().await {
            Some(Ok(response)) => Some(response),
            Some(Err(e)) => {
                error!("Provider rejected the request: {:?}", e);
                return Err(ProviderError::from(e));
            }
            None => None,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let mut progress = StreamProgress::default();
        if let Some(response) = first {
            // rx is still held here, so this send cannot fail
            progress.absorb(response, &tx);
        }

        tokio::spawn(async move {
            while let Some(result) = stream.next().await {
                match result {
                    Ok(response) => {
                        if !progress.absorb(response, &tx) {
                            debug!("Caller dropped the stream, stopping provider read");
                            return;
                        }
                    }
                    Err(e) => {
                        error!("Provider stream error: {:?}", e);
                        let message = match &e {
                            OpenAIError::ApiError(api_err) => {
                                format!("Provider API error: {}", api_err.message)
                            }
                            _ => format!("Provider error: {}", e),
                        };
                        let _ = tx.send(StreamChunk::Error(message));
                        return;
                    }
                }
            }

            if tx.send(progress.finish()).is_err() {
                debug!("Caller dropped the stream before finish");
            }
        });

        Ok(rx)
    }
}

/// Finish metadata gathered while forwarding provider events.
#[derive(Default)]
struct StreamProgress {
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
}

impl StreamProgress {
    /// Forward the text of one event. Returns false once the caller is gone.
    fn absorb(
        &mut self,
        response: CreateChatCompletionStreamResponse,
        tx: &mpsc::UnboundedSender<StreamChunk>,
    ) -> bool {
        if let Some(reported) = response.usage {
            self.usage = Some(Usage {
                prompt_tokens: reported.prompt_tokens,
                completion_tokens: reported.completion_tokens,
            });
        }
        let Some(choice) = response.choices.first() else {
            return true;
        };
        if let Some(delta) = choice.delta.content.as_ref().filter(|d| !d.is_empty()) {
            if tx.send(StreamChunk::Text(delta.clone())).is_err() {
                return false;
            }
        }
        if let Some(reason) = &choice.finish_reason {
            self.finish_reason = Some(convert_finish_reason(reason));
        }
        true
    }

    fn finish(self) -> StreamChunk {
        StreamChunk::Finish(FinishMetadata {
            finish_reason: self.finish_reason.unwrap_or(FinishReason::Unknown),
            usage: self.usage,
        })
    }
}

fn convert_message(msg: ChatMessage) -> Result<ChatCompletionRequestMessage, OpenAIError> {
    let message = match msg.role {
        MessageRole::System => ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(msg.content)
                .build()?,
        ),
        MessageRole::User => ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessageArgs::default()
                .content(msg.content)
                .build()?,
        ),
        MessageRole::Assistant => ChatCompletionRequestMessage::Assistant(
            ChatCompletionRequestAssistantMessageArgs::default()
                .content(msg.content)
                .build()?,
        ),
    };
    Ok(message)
}

fn convert_finish_reason(reason: &OpenAiFinishReason) -> FinishReason {
    match reason {
        OpenAiFinishReason::Stop => FinishReason::Stop,
        OpenAiFinishReason::Length => FinishReason::Length,
        OpenAiFinishReason::ContentFilter => FinishReason::ContentFilter,
        OpenAiFinishReason::ToolCalls | OpenAiFinishReason::FunctionCall => FinishReason::ToolCalls,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> LlmService {
        LlmService::new(
            "sk-test".to_string(),
            "http://127.0.0.1:9/v1".to_string(),
            "claude-3-haiku-20240307".to_string(),
            512,
        )
    }

    #[test]
    #[allow(deprecated)]
    fn request_puts_system_prompt_first_and_keeps_history_order() {
        let request = service()
            .build_request(ModelRequest {
                system_prompt: "be nice".to_string(),
                temperature: 0.0,
                messages: vec![
                    ChatMessage::user("one"),
                    ChatMessage::assistant("two"),
                    ChatMessage::user("three"),
                ],
            })
            .unwrap();

        assert_eq!(request.model, "claude-3-haiku-20240307");
        assert_eq!(request.temperature, Some(0.0));
        assert_eq!(request.max_tokens, Some(512));
        assert_eq!(request.stream, Some(true));

        let json = serde_json::to_value(&request.messages).unwrap();
        let roles: Vec<_> = json
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(json[0]["content"], "be nice");
        assert_eq!(json[3]["content"], "three");
    }

    #[test]
    fn finish_reasons_map_onto_stream_vocabulary() {
        assert_eq!(convert_finish_reason(&OpenAiFinishReason::Stop), FinishReason::Stop);
        assert_eq!(
            convert_finish_reason(&OpenAiFinishReason::FunctionCall),
            FinishReason::ToolCalls
        );
    }
}
