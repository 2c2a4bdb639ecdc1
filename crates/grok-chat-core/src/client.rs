use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, StreamExt as _};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ChatClientConfig;
use crate::errors::ChatError;
use crate::exchange::ExchangeStream;
use crate::stream::describe_error;
use crate::transcript::{RequestMessage, Role};

/// Response body as a stream of byte chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ChatError>> + Send + 'static>>;

/// Body of a chat-completions request.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatRequest {
    pub messages: Vec<RequestMessage>,
    pub model: String,
    pub stream: bool,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl ChatRequest {
    /// Builds a request from history, validating that there is something to
    /// answer.
    pub fn new(
        config: &ChatClientConfig,
        messages: Vec<RequestMessage>,
    ) -> Result<Self, ChatError> {
        if !messages.iter().any(|m| m.role == Role::User) {
            return Err(ChatError::Validation(
                "at least one user message is required".into(),
            ));
        }
        if let Some(last) = messages.last()
            && last.role == Role::User
            && last.content.trim().is_empty()
        {
            return Err(ChatError::Validation(
                "user message must not be empty".into(),
            ));
        }
        let messages = messages
            .into_iter()
            .filter(|m| matches!(m.role, Role::User | Role::Assistant))
            .collect();
        Ok(Self {
            messages,
            model: config.model.clone(),
            stream: config.stream,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

/// Opens response bodies for chat requests.
///
/// [`ChatClient`] is the HTTP implementation; tests substitute canned
/// streams.
#[async_trait::async_trait]
pub trait ChatTransport: Send + Sync {
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream, ChatError>;
}

/// Opens a stream through `transport` and drives it on a background task.
pub async fn start_exchange<T>(
    transport: &T,
    request: &ChatRequest,
    event_buffer_capacity: usize,
) -> Result<ExchangeStream, ChatError>
where
    T: ChatTransport + ?Sized,
{
    if event_buffer_capacity == 0 {
        return Err(ChatError::Validation(
            "event buffer capacity must be greater than 0".into(),
        ));
    }
    let body = transport.open_stream(request).await?;
    ExchangeStream::spawn(body, event_buffer_capacity)
}

/// HTTP client for an OpenAI-compatible chat-completions endpoint.
pub struct ChatClient {
    http: reqwest::Client,
    config: ChatClientConfig,
}

impl ChatClient {
    pub fn new(config: ChatClientConfig) -> Result<Self, ChatError> {
        config.validate()?;
        let mut builder = reqwest::Client::builder().connect_timeout(config.connect_timeout);
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| ChatError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    /// Creates a client using `GROK_API_KEY`.
    pub fn from_env() -> Result<Self, ChatError> {
        Self::new(ChatClientConfig::from_env()?)
    }

    pub fn config(&self) -> &ChatClientConfig {
        &self.config
    }

    pub fn request(&self, messages: Vec<RequestMessage>) -> Result<ChatRequest, ChatError> {
        ChatRequest::new(&self.config, messages)
    }

    /// Checks the key against the models endpoint.
    pub async fn verify_api_key(&self) -> Result<(), ChatError> {
        let response = self
            .http
            .get(self.config.models_url())
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| ChatError::Transport(format!("models request failed: {e}")))?;
        let response = ensure_success(response).await?;
        info!(status = %response.status(), "api key accepted");
        Ok(())
    }

    /// Sends `messages` and streams the reply.
    pub async fn start_exchange(
        &self,
        messages: Vec<RequestMessage>,
    ) -> Result<ExchangeStream, ChatError> {
        let mut request = self.request(messages)?;
        request.stream = true;
        start_exchange(self, &request, self.config.event_buffer_capacity).await
    }

    /// Non-streaming fallback: one request, one complete reply.
    pub async fn complete(&self, messages: Vec<RequestMessage>) -> Result<String, ChatError> {
        let mut request = self.request(messages)?;
        request.stream = false;
        let response = self.post(&request).await?;
        let body: CompletionResponse = response
            .json()
            .await
            .map_err(|e| ChatError::Protocol(format!("invalid completion body: {e}")))?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| ChatError::Protocol("completion has no message content".into()))
    }

    async fn post(&self, request: &ChatRequest) -> Result<reqwest::Response, ChatError> {
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            stream = request.stream,
            "sending chat completion request"
        );
        let response = self
            .http
            .post(self.config.chat_completions_url())
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| ChatError::Transport(format!("chat request failed: {e}")))?;
        ensure_success(response).await
    }
}

#[async_trait::async_trait]
impl ChatTransport for ChatClient {
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream, ChatError> {
        let response = self.post(request).await?;
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| ChatError::Transport(e.to_string())));
        Ok(Box::pin(body))
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ChatError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    let message = api_error_message(&body, status.canonical_reason().unwrap_or("request failed"));
    let err = ChatError::api(status.as_u16(), message);
    warn!(error = %err, "chat api rejected request");
    Err(err)
}

/// Extracts the most useful text from an error response body.
pub(crate) fn api_error_message(body: &str, status_text: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return status_text.to_string();
    }
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => match value.get("error") {
            Some(error) if !error.is_null() => describe_error(error),
            _ => value.to_string(),
        },
        Err(_) => body.to_string(),
    }
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    message: Option<CompletionMessage>,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::ExchangeEvent;
    use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
    use tokio::net::TcpListener;

    fn user(content: &str) -> RequestMessage {
        RequestMessage {
            role: Role::User,
            content: content.into(),
        }
    }

    struct CannedTransport {
        chunks: Vec<Result<&'static str, &'static str>>,
    }

    #[async_trait::async_trait]
    impl ChatTransport for CannedTransport {
        async fn open_stream(&self, _request: &ChatRequest) -> Result<ByteStream, ChatError> {
            let items: Vec<Result<Bytes, ChatError>> = self
                .chunks
                .iter()
                .map(|c| match c {
                    Ok(text) => Ok(Bytes::from_static(text.as_bytes())),
                    Err(message) => Err(ChatError::Transport((*message).to_string())),
                })
                .collect();
            Ok(Box::pin(futures::stream::iter(items)))
        }
    }

    /// Serves one canned HTTP response and returns the base URL plus the
    /// raw request it received.
    async fn serve_once(
        status_line: &'static str,
        content_type: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut request = Vec::new();
            let mut buf = [0_u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.expect("read");
                request.extend_from_slice(&buf[..n]);
                if n == 0 || request_complete(&request) {
                    break;
                }
            }
            let response = format!(
                "{status_line}\r\ncontent-type: {content_type}\r\nconnection: close\r\n\r\n{body}"
            );
            socket.write_all(response.as_bytes()).await.expect("write");
            socket.shutdown().await.expect("shutdown");
            String::from_utf8_lossy(&request).into_owned()
        });
        (format!("http://{addr}"), handle)
    }

    fn request_complete(raw: &[u8]) -> bool {
        let text = String::from_utf8_lossy(raw);
        let Some(header_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let content_length = text[..header_end]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        raw.len() >= header_end + 4 + content_length
    }

    #[test]
    fn request_body_has_web_client_parameters() {
        let config = ChatClientConfig::new("k");
        let request = ChatRequest::new(
            &config,
            vec![
                user("hi"),
                RequestMessage {
                    role: Role::System,
                    content: "skip".into(),
                },
            ],
        )
        .expect("request");
        let body = serde_json::to_value(&request).expect("json");
        assert_eq!(
            body,
            serde_json::json!({
                "messages": [{"role": "user", "content": "hi"}],
                "model": "grok-3-mini-beta",
                "stream": true,
                "temperature": 0.7,
                "max_tokens": 8192
            })
        );
    }

    #[test]
    fn request_requires_a_non_empty_user_turn() {
        let config = ChatClientConfig::new("k");
        assert!(matches!(
            ChatRequest::new(&config, vec![]),
            Err(ChatError::Validation(_))
        ));
        assert!(matches!(
            ChatRequest::new(&config, vec![user("  ")]),
            Err(ChatError::Validation(_))
        ));
    }

    #[test]
    fn api_error_message_prefers_structured_fields() {
        assert_eq!(
            api_error_message(r#"{"error":{"message":"Incorrect API key"}}"#, "Unauthorized"),
            "Incorrect API key"
        );
        assert_eq!(
            api_error_message(r#"{"error":"quota"}"#, "Too Many Requests"),
            "quota"
        );
        assert_eq!(
            api_error_message(r#"{"detail":"x"}"#, "Bad Request"),
            r#"{"detail":"x"}"#
        );
        assert_eq!(api_error_message("upstream down", "Bad Gateway"), "upstream down");
        assert_eq!(api_error_message("", "Bad Gateway"), "Bad Gateway");
    }

    #[test]
    fn client_rejects_empty_key() {
        assert!(matches!(
            ChatClient::new(ChatClientConfig::new("")),
            Err(ChatError::Config(_))
        ));
    }

    #[tokio::test]
    async fn start_exchange_over_fake_transport() {
        let transport = CannedTransport {
            chunks: vec![
                Ok("data: {\"choices\":[{\"delta\":{\"content\":\"Par\"}}]}\n"),
                Ok("data: {\"choices\":[{\"delta\":{\"content\":\"tial\"}}]}\n"),
                Err("socket closed"),
            ],
        };
        let request = ChatRequest::new(&ChatClientConfig::new("k"), vec![user("hi")])
            .expect("request");
        let exchange = start_exchange(&transport, &request, 4).await.expect("start");
        let outcome = exchange.finish().await.expect("finish");
        assert!(outcome.message.content().starts_with("Partial"));
        assert!(outcome.message.content().contains("socket closed"));
        assert!(outcome.message.is_finished());
    }

    #[tokio::test]
    async fn streams_reply_from_http_server() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" there\"},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
        );
        let (base_url, server) = serve_once("HTTP/1.1 200 OK", "text/event-stream", body).await;
        let client = ChatClient::new(ChatClientConfig::new("secret").base_url(base_url))
            .expect("client");

        let mut exchange = client.start_exchange(vec![user("hi")]).await.expect("start");
        let mut saw_update = false;
        while let Some(event) = exchange.next_event().await {
            match event {
                ExchangeEvent::Updated { .. } => saw_update = true,
                ExchangeEvent::Finalized { .. } => break,
                ExchangeEvent::Started { .. } => {}
            }
        }
        let outcome = exchange.finish().await.expect("finish");
        assert!(saw_update);
        assert_eq!(outcome.message.content(), "Hello there");
        assert_eq!(outcome.message.finish_reason(), Some("stop"));

        let raw_request = server.await.expect("server");
        assert!(raw_request.starts_with("POST /v1/chat/completions"));
        assert!(raw_request.to_ascii_lowercase().contains("authorization: bearer secret"));
        assert!(raw_request.contains("\"stream\":true"));
    }

    #[tokio::test]
    async fn unauthorized_status_becomes_auth_rejected_api_error() {
        let (base_url, _server) = serve_once(
            "HTTP/1.1 401 Unauthorized",
            "application/json",
            r#"{"error":{"message":"Incorrect API key provided"}}"#,
        )
        .await;
        let client = ChatClient::new(ChatClientConfig::new("bad").base_url(base_url))
            .expect("client");
        let err = match client.start_exchange(vec![user("hi")]).await {
            Ok(_) => panic!("401 must fail before streaming"),
            Err(err) => err,
        };
        assert!(err.is_auth_rejected());
        let ChatError::Api { status, message, .. } = &err else {
            panic!("expected api error, got {err:?}");
        };
        assert_eq!(*status, 401);
        assert_eq!(message, "Incorrect API key provided");
    }

    #[tokio::test]
    async fn complete_returns_trimmed_message_content() {
        let (base_url, server) = serve_once(
            "HTTP/1.1 200 OK",
            "application/json",
            r#"{"choices":[{"message":{"role":"assistant","content":"  42 \n"}}]}"#,
        )
        .await;
        let client = ChatClient::new(ChatClientConfig::new("k").base_url(base_url))
            .expect("client");
        let reply = client.complete(vec![user("6*7?")]).await.expect("complete");
        assert_eq!(reply, "42");
        assert!(server.await.expect("server").contains("\"stream\":false"));
    }

    #[tokio::test]
    async fn verify_api_key_hits_models_endpoint() {
        let (base_url, server) =
            serve_once("HTTP/1.1 200 OK", "application/json", r#"{"data":[]}"#).await;
        let client = ChatClient::new(ChatClientConfig::new("k").base_url(base_url))
            .expect("client");
        client.verify_api_key().await.expect("verify");
        assert!(server.await.expect("server").starts_with("GET /v1/models"));
    }
}
