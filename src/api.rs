use crate::{
    config::Config,
    constants::CHAT_COMPLETIONS_PATH,
    errors::{InferenceError, InferenceResult},
    logging::log_api_call,
    media::ImageResolver,
    models::{ApiCallLog, Message},
    payload::{build_chat_request, ChatCompletionRequest, ChatParams},
    stream::{read_event_stream, StreamEvent, StreamStats},
    utils::join_url,
};
use chrono::Utc;
use log::{debug, error, warn};
use reqwest::{header::ACCEPT, Client, Response};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Receives streamed output as it arrives.
pub trait InferenceStreamingCallback: Send + 'static {
    fn on_stream_received(&mut self, message: &str);
    fn on_stat_stream_received(&mut self, tps: f32);
}

/// Events of one in-flight completion, fed by a background task.
#[derive(Debug)]
pub struct ChatStream {
    receiver: mpsc::UnboundedReceiver<StreamEvent>,
}

impl ChatStream {
    /// Next event, or `None` once the stream is finished.
    pub async fn next(&mut self) -> Option<StreamEvent> {
        match self.receiver.recv().await {
            Some(StreamEvent::Done) | None => None,
            Some(event) => Some(event),
        }
    }

    /// Drains the stream and returns the concatenated reply.
    pub async fn collect_text(mut self) -> String {
        let mut text = String::new();
        while let Some(event) = self.next().await {
            if let StreamEvent::Fragment(fragment) = event {
                text.push_str(&fragment);
            }
        }
        text
    }
}

/// Client for an OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Clone)]
pub struct RemoteInference {
    remote_url: String,
    api_key: String,
    api_log_path: Option<String>,
    client: Client,
}

impl RemoteInference {
    pub fn new(remote_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            remote_url: remote_url.into(),
            api_key: api_key.into(),
            api_log_path: None,
            // No timeout: a streamed reply may stay open as long as the model writes.
            client: Client::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let mut remote = Self::new(&config.remote_url, &config.api_key);
        remote.api_log_path = config.api_log_path.clone();
        remote
    }

    pub fn endpoint(&self) -> String {
        join_url(&self.remote_url, CHAT_COMPLETIONS_PATH)
    }

    /// Sends the request and returns the open response once the status is known.
    pub async fn start_chat_stream(
        &self,
        request: &ChatCompletionRequest,
    ) -> InferenceResult<Response> {
        if self.api_key.is_empty() {
            warn!("API key not set, configure it in the config file or LLAMA_API_KEY");
        }

        let endpoint = self.endpoint();
        let start_time = Instant::now();
        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .header(ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        log_api_call(
            &ApiCallLog {
                timestamp: Utc::now(),
                endpoint,
                request_summary: format!(
                    "chat_completion model={} turns={}",
                    request.model,
                    request.messages.len()
                ),
                response_status: status.as_u16(),
                response_time_ms: start_time.elapsed().as_millis(),
            },
            self.api_log_path.as_deref(),
        );

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(InferenceError::api_error(status.as_u16(), error_text));
        }

        Ok(response)
    }

    async fn run_stream<F>(&self, request: &ChatCompletionRequest, on_event: F) -> InferenceResult<()>
    where
        F: FnMut(StreamEvent),
    {
        let stats = StreamStats::start();
        let response = self.start_chat_stream(request).await?;
        read_event_stream(response.bytes_stream(), stats, on_event).await
    }

    /// Starts a completion on a background task and returns its event stream.
    ///
    /// Failures end the stream early; they are logged, not returned.
    pub fn stream_chat(&self, request: ChatCompletionRequest) -> ChatStream {
        let (sender, receiver) = mpsc::unbounded_channel();
        let remote = self.clone();

        tokio::spawn(async move {
            let result = remote
                .run_stream(&request, |event| {
                    // The consumer may have gone away; nothing to do then.
                    let _ = sender.send(event);
                })
                .await;
            if let Err(e) = result {
                error!("Chat completion stream failed: {}", e);
                let _ = sender.send(StreamEvent::Done);
            }
        });

        ChatStream { receiver }
    }

    /// Callback flavour of [`stream_chat`](Self::stream_chat).
    pub fn spawn_chat_completion<C>(
        &self,
        request: ChatCompletionRequest,
        mut callback: C,
    ) -> JoinHandle<()>
    where
        C: InferenceStreamingCallback,
    {
        let remote = self.clone();
        tokio::spawn(async move {
            let result = remote
                .run_stream(&request, |event| match event {
                    StreamEvent::Fragment(text) => callback.on_stream_received(&text),
                    StreamEvent::TokenRate(tps) => callback.on_stat_stream_received(tps),
                    StreamEvent::Done => {}
                })
                .await;
            if let Err(e) = result {
                error!("Chat completion failed: {}", e);
            }
        })
    }

    /// Builds the request for `history` from `config` and streams the reply.
    pub fn chat(
        &self,
        history: &[Message],
        config: &Config,
        resolver: &dyn ImageResolver,
    ) -> InferenceResult<ChatStream> {
        let request = build_chat_request(
            history,
            &config.system_prompt,
            &ChatParams::from(config),
            resolver,
        )?;
        debug!("Sending {} turns to {}", request.messages.len(), self.endpoint());
        Ok(self.stream_chat(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::LocalFileResolver;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use wiremock::{
        matchers::{body_partial_json, header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    const SSE_BODY: &str = "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n\
data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n\
data: \n\n\
data: {\"choices\":[{\"delta\":{\"content\":\"!\"}}]}\n\n\
data: {\"choices\":[],\"usage\":{\"completion_tokens\":2}}\n\n\
data: [DONE]\n\n";

    fn sse_response(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/event-stream")
    }

    fn config_for(server: &MockServer) -> Config {
        Config {
            api_key: "test-api-key".to_string(),
            remote_url: server.uri(),
            system_prompt: "Be brief.".to_string(),
            ..Config::default()
        }
    }

    #[derive(Clone, Default)]
    struct Recorder {
        fragments: Arc<Mutex<Vec<String>>>,
        rates: Arc<Mutex<Vec<f32>>>,
    }

    impl InferenceStreamingCallback for Recorder {
        fn on_stream_received(&mut self, message: &str) {
            self.fragments.lock().unwrap().push(message.to_string());
        }

        fn on_stat_stream_received(&mut self, tps: f32) {
            self.rates.lock().unwrap().push(tps);
        }
    }

    #[tokio::test]
    async fn test_stream_chat_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer test-api-key"))
            .and(header("accept", "text/event-stream"))
            .and(body_partial_json(json!({
                "stream": true,
                "messages": [
                    {"role": "system", "content": "Be brief."},
                    {"role": "user", "content": "Hello"}
                ]
            })))
            .respond_with(sse_response(SSE_BODY))
            .expect(1)
            .mount(&mock_server)
            .await;

        let config = config_for(&mock_server);
        let remote = RemoteInference::from_config(&config);
        let stream = remote
            .chat(&[Message::user_text("Hello")], &config, &LocalFileResolver)
            .unwrap();

        assert_eq!(stream.collect_text().await, "Hi!");
    }

    #[tokio::test]
    async fn test_callback_receives_fragments_and_rate() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(sse_response(SSE_BODY))
            .mount(&mock_server)
            .await;

        let config = config_for(&mock_server);
        let remote = RemoteInference::from_config(&config);
        let request = build_chat_request(
            &[Message::user_text("Hello")],
            "",
            &ChatParams::from(&config),
            &LocalFileResolver,
        )
        .unwrap();

        let recorder = Recorder::default();
        remote
            .spawn_chat_completion(request, recorder.clone())
            .await
            .unwrap();

        assert_eq!(*recorder.fragments.lock().unwrap(), vec!["Hi", "!"]);
        assert_eq!(recorder.rates.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_non_success_status_stops_quietly() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_raw(SSE_BODY.as_bytes().to_vec(), "text/event-stream"),
            )
            .mount(&mock_server)
            .await;

        let config = config_for(&mock_server);
        let remote = RemoteInference::from_config(&config);
        let request = build_chat_request(
            &[Message::user_text("Hello")],
            "",
            &ChatParams::from(&config),
            &LocalFileResolver,
        )
        .unwrap();

        let err = remote.start_chat_stream(&request).await.unwrap_err();
        assert!(matches!(err, InferenceError::Api { status: 401, .. }));

        // Callback path: the task finishes cleanly and nothing is forwarded.
        let recorder = Recorder::default();
        let handle = remote.spawn_chat_completion(request.clone(), recorder.clone());
        assert!(handle.await.is_ok());
        assert!(recorder.fragments.lock().unwrap().is_empty());

        let stream = remote.stream_chat(request);
        assert_eq!(stream.collect_text().await, "");
    }

    #[test]
    fn test_endpoint_joins_path() {
        let remote = RemoteInference::new("https://api.example.com/compat/", "k");
        assert_eq!(
            remote.endpoint(),
            "https://api.example.com/compat/v1/chat/completions"
        );
    }
}
