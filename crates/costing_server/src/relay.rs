//! Streaming relay to an OpenAI-compatible chat completion endpoint.
//!
//! # Responsibility
//! - Send one user message with a system prompt and stream back text deltas.
//! - Replace any upstream failure with a single apology chunk.
//!
//! # Invariants
//! - The returned stream is lazy: nothing is sent until it is first polled.
//! - Dropping the stream drops the upstream response body.
//! - The stream always ends normally; errors never surface to the caller.

use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::time::Instant;

use crate::config::{LlmConfig, StartupError};

/// Chunk emitted in place of model output when the upstream cannot be used.
pub const FALLBACK_MESSAGE: &str = "对不起，我在连接AI模型时遇到了一个网络问题。请检查Ollama服务是否正在运行，或者网络代理设置是否正确。";

const SSE_DATA_PREFIX: &str = "data:";
const SSE_DONE_MARKER: &str = "[DONE]";

pub struct ChatRelay {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug)]
enum RelayError {
    Status(u16),
    Transport(reqwest::Error),
    Decode(String),
}

impl Display for RelayError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Status(code) => write!(f, "upstream returned status {code}"),
            Self::Transport(err) => write!(f, "upstream transport error: {err}"),
            Self::Decode(message) => write!(f, "undecodable upstream event: {message}"),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum SseEvent {
    Content(String),
    Done,
}

type ByteStream = BoxStream<'static, Result<Vec<u8>, RelayError>>;

/// Incremental `data:` line reader over a chunked body.
struct SseReader {
    body: ByteStream,
    buffer: Vec<u8>,
    exhausted: bool,
}

impl SseReader {
    fn new(body: ByteStream) -> Self {
        Self {
            body,
            buffer: Vec::new(),
            exhausted: false,
        }
    }

    /// Returns the next meaningful event, or `None` at end of body.
    async fn next_event(&mut self) -> Result<Option<SseEvent>, RelayError> {
        loop {
            if let Some(end) = self.buffer.iter().position(|byte| *byte == b'\n') {
                let line: Vec<u8> = self.buffer.drain(..=end).collect();
                if let Some(event) = parse_sse_line(&line)? {
                    return Ok(Some(event));
                }
                continue;
            }

            if self.exhausted {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                let line = std::mem::take(&mut self.buffer);
                return parse_sse_line(&line);
            }

            match self.body.next().await {
                Some(Ok(bytes)) => self.buffer.extend_from_slice(&bytes),
                Some(Err(err)) => return Err(err),
                None => self.exhausted = true,
            }
        }
    }
}

enum RelayState {
    Pending(reqwest::RequestBuilder),
    Streaming(SseReader),
    Finished,
}

impl ChatRelay {
    pub fn new(config: &LlmConfig) -> Result<Self, StartupError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.timeout)
            .read_timeout(config.timeout)
            .no_proxy()
            .build()
            .map_err(|err| StartupError {
                code: "ERR_HTTP_CLIENT",
                message: format!("failed to build chat relay client: {err}"),
            })?;
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.base_url),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }

    /// Streams the completion for `user_message` as text chunks.
    pub fn stream_completion(
        &self,
        user_message: &str,
        system_prompt: &str,
    ) -> impl Stream<Item = String> + Send + 'static {
        let body = CompletionRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_message,
                },
            ],
            temperature: 0.0,
            stream: true,
        };
        let request = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body);

        info!(
            "event=chat_relay module=relay status=start model={} message_chars={}",
            self.model,
            user_message.chars().count()
        );
        relay_events(RelayState::Pending(request))
    }
}

fn relay_events(initial: RelayState) -> impl Stream<Item = String> + Send + 'static {
    let started_at = Instant::now();
    stream::unfold(initial, move |state| async move {
        let mut state = state;
        loop {
            match state {
                RelayState::Pending(request) => match request.send().await {
                    Ok(response) if response.status().is_success() => {
                        let body = response
                            .bytes_stream()
                            .map(|chunk| {
                                chunk
                                    .map(|bytes| bytes.to_vec())
                                    .map_err(RelayError::Transport)
                            })
                            .boxed();
                        state = RelayState::Streaming(SseReader::new(body));
                    }
                    Ok(response) => {
                        return Some(fallback(RelayError::Status(response.status().as_u16())));
                    }
                    Err(err) => return Some(fallback(RelayError::Transport(err))),
                },
                RelayState::Streaming(mut reader) => {
                    return match reader.next_event().await {
                        Ok(Some(SseEvent::Content(text))) => {
                            Some((text, RelayState::Streaming(reader)))
                        }
                        Ok(Some(SseEvent::Done)) | Ok(None) => {
                            info!(
                                "event=chat_relay module=relay status=ok duration_ms={}",
                                started_at.elapsed().as_millis()
                            );
                            None
                        }
                        Err(err) => Some(fallback(err)),
                    };
                }
                RelayState::Finished => return None,
            }
        }
    })
}

fn fallback(err: RelayError) -> (String, RelayState) {
    warn!(
        "event=chat_relay module=relay status=fallback error={}",
        err
    );
    (FALLBACK_MESSAGE.to_string(), RelayState::Finished)
}

/// Interprets one SSE line; non-data lines and empty deltas yield `None`.
fn parse_sse_line(line: &[u8]) -> Result<Option<SseEvent>, RelayError> {
    let line = std::str::from_utf8(line)
        .map_err(|_| RelayError::Decode("non-utf8 line".to_string()))?
        .trim();
    let Some(payload) = line.strip_prefix(SSE_DATA_PREFIX) else {
        return Ok(None);
    };
    let payload = payload.trim();
    if payload.is_empty() {
        return Ok(None);
    }
    if payload == SSE_DONE_MARKER {
        return Ok(Some(SseEvent::Done));
    }

    let chunk: CompletionChunk =
        serde_json::from_str(payload).map_err(|err| RelayError::Decode(err.to_string()))?;
    let content = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta)
        .and_then(|delta| delta.content)
        .filter(|content| !content.is_empty());
    Ok(content.map(SseEvent::Content))
}
