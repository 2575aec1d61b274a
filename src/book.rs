// src/book.rs

use crate::constants::*;
use crate::errors::{InferenceError, InferenceResult};
use crate::graph::{extract_graph_json, verify_graph_data, BookGraph, GraphData};
use crate::logging::log_api_call;
use crate::models::{ApiCallLog, Sender};
use crate::utils::join_url;
use chrono::Utc;
use log::{debug, error};
use reqwest::{multipart, Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use std::time::Instant;

/// Result of uploading a book to the inference server.
#[derive(Debug, Clone, PartialEq)]
pub struct BookAnalysis {
    pub num_input_tokens: u64,
    /// Free-text character analysis; sent back with every chat question.
    pub relationship_text: String,
    pub book: BookGraph,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookChatMessage {
    pub text: String,
    pub sender: Sender,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    response: String,
}

/// Client for the local book analysis server.
#[derive(Debug, Clone)]
pub struct BookClient {
    base_url: String,
    api_log_path: Option<String>,
    client: Client,
}

impl BookClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_log_path: None,
            client: Client::new(),
        }
    }

    pub fn with_api_log(mut self, api_log_path: Option<String>) -> Self {
        self.api_log_path = api_log_path;
        self
    }

    async fn check(
        &self,
        endpoint: String,
        summary: &str,
        start_time: Instant,
        response: Response,
    ) -> InferenceResult<Response> {
        let status = response.status();
        log_api_call(
            &ApiCallLog {
                timestamp: Utc::now(),
                endpoint,
                request_summary: summary.to_string(),
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

    /// Uploads a document and returns its validated character graph.
    pub async fn analyze_book(&self, path: &Path) -> InferenceResult<BookAnalysis> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "book.txt".to_string());

        let form = multipart::Form::new().part(
            "file",
            multipart::Part::bytes(bytes).file_name(file_name.clone()),
        );

        let endpoint = join_url(&self.base_url, BOOK_INFERENCE_PATH);
        let start_time = Instant::now();
        let response = self
            .client
            .post(&endpoint)
            .multipart(form)
            .send()
            .await?;
        let response = self
            .check(endpoint, &format!("analyze_book {}", file_name), start_time, response)
            .await?;

        let body: Value = response.json().await?;
        parse_analysis(body)
    }

    /// Asks a question about the analyzed book.
    pub async fn ask(
        &self,
        query: &str,
        relationship_data: &str,
        history: &[BookChatMessage],
    ) -> InferenceResult<String> {
        let endpoint = join_url(&self.base_url, BOOK_CHAT_PATH);
        let start_time = Instant::now();
        let response = self
            .client
            .post(&endpoint)
            .json(&json!({
                "query": query,
                "relationship_data": relationship_data,
                "chat_history_data": history,
            }))
            .send()
            .await?;
        let response = self
            .check(endpoint, "book_chat", start_time, response)
            .await?;

        let reply: ChatReply = response.json().await?;
        Ok(reply.response)
    }
}

fn parse_analysis(body: Value) -> InferenceResult<BookAnalysis> {
    let num_input_tokens = body["num_input_tokens"].as_u64().unwrap_or(0);
    let relationship_text = body["character_response_text"]
        .as_str()
        .unwrap_or_default()
        .to_string();

    // The graph is either nested under `graph_data` (possibly still as raw
    // model text) or spread over the top level.
    let graph_value = match body.get("graph_data") {
        Some(Value::Object(_)) => body["graph_data"].clone(),
        Some(Value::String(text)) => extract_graph_json(text)
            .ok_or_else(|| InferenceError::graph_error("graph_data is not valid JSON"))?,
        _ if body.get("nodes").is_some() => body.clone(),
        _ => return Err(InferenceError::graph_error("server returned no graph")),
    };

    let title = graph_value["title"].as_str().unwrap_or_default().to_string();
    let summary = graph_value["summary"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    let graph: GraphData = serde_json::from_value(verify_graph_data(graph_value))
        .map_err(|e| InferenceError::graph_error(format!("malformed graph: {}", e)))?;

    debug!(
        "Book '{}' analyzed: {} nodes, {} links",
        title,
        graph.nodes.len(),
        graph.links.len()
    );

    Ok(BookAnalysis {
        num_input_tokens,
        relationship_text,
        book: BookGraph {
            title,
            summary,
            graph,
        },
    })
}

/// Q&A session about one analyzed book.
#[derive(Debug, Clone)]
pub struct BookChat {
    client: BookClient,
    relationship_data: String,
    history: Vec<BookChatMessage>,
}

impl BookChat {
    pub fn new(client: BookClient, relationship_data: impl Into<String>) -> Self {
        Self {
            client,
            relationship_data: relationship_data.into(),
            history: vec![BookChatMessage {
                text: BOOK_CHAT_GREETING.to_string(),
                sender: Sender::Assistant,
            }],
        }
    }

    pub fn history(&self) -> &[BookChatMessage] {
        &self.history
    }

    /// Sends a question and returns the reply that was appended.
    ///
    /// Blank input is ignored. Failures are logged and answered with a
    /// fallback message instead of an error.
    pub async fn send(&mut self, query: &str) -> Option<&str> {
        let query = query.trim();
        if query.is_empty() {
            return None;
        }

        // The server receives the history as it was before this question.
        let previous = self.history.clone();
        self.history.push(BookChatMessage {
            text: query.to_string(),
            sender: Sender::User,
        });

        let text = match self
            .client
            .ask(query, &self.relationship_data, &previous)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                error!("Error sending message: {}", e);
                BOOK_CHAT_FALLBACK.to_string()
            }
        };

        self.history.push(BookChatMessage {
            text,
            sender: Sender::Assistant,
        });
        self.history.last().map(|m| m.text.as_str())
    }
}
