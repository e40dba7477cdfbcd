//! Messages API interpretation client
//!
//! Handles communication with the hosted model, including:
//! - Document and image attachments (base64 sources)
//! - Rate limiting and retry logic
//! - Token usage tracking

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore, SemaphorePermit};

use super::engine::InterpretationEngine;
use super::json_parser::extract_json;
use super::prompts::{build_interpretation_prompt, INTERPRETATION_SYSTEM_PROMPT};
use super::types::{InterpretedDocument, InterpreterConfig};
use crate::error::InterpretationError;
use crate::takeoff::model::DocumentInput;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Interpretation engine backed by the Messages API, with rate limiting
pub struct HttpInterpreter {
    client: Client,
    config: InterpreterConfig,
    rate_limiter: Arc<RateLimiter>,
    tokens_used: AtomicU64,
}

impl HttpInterpreter {
    pub fn new(config: InterpreterConfig) -> Result<Self, InterpretationError> {
        if config.api_key.trim().is_empty() {
            return Err(InterpretationError::Request(
                "API key is not configured".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| InterpretationError::Request(format!("Failed to create HTTP client: {}", e)))?;

        let rate_limiter = Arc::new(RateLimiter::new(
            config.max_concurrent_requests,
            config.requests_per_second,
        ));

        Ok(Self {
            client,
            config,
            rate_limiter,
            tokens_used: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    /// Get total tokens used (input + output) across all requests
    pub fn tokens_used(&self) -> u64 {
        self.tokens_used.load(Ordering::Relaxed)
    }

    fn build_request(
        &self,
        target: &DocumentInput,
        references: &[&DocumentInput],
        context_digest: &str,
    ) -> MessagesRequest {
        let mut content = Vec::with_capacity(references.len() * 2 + 3);

        for (i, reference) in references.iter().enumerate() {
            content.push(ContentBlock::Text {
                text: format!("--- Reference document {}: {} ---", i + 1, reference.name),
            });
            content.push(ContentBlock::attachment(reference));
        }

        content.push(ContentBlock::Text {
            text: format!("--- Document to analyze: {} ---", target.name),
        });
        content.push(ContentBlock::attachment(target));

        let reference_names: Vec<&str> = references.iter().map(|d| d.name.as_str()).collect();
        content.push(ContentBlock::Text {
            text: build_interpretation_prompt(&target.name, &reference_names, context_digest),
        });

        MessagesRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            system: INTERPRETATION_SYSTEM_PROMPT.to_string(),
            messages: vec![Message {
                role: "user".to_string(),
                content,
            }],
        }
    }

    /// Send request with retry logic
    async fn send_request(&self, request: &MessagesRequest) -> Result<MessagesResponse, InterpretationError> {
        let mut retry_delay = self.config.initial_backoff;
        let max_retries = self.config.max_retries;
        let mut last_error = InterpretationError::Request("Max retries exceeded".to_string());

        for retry in 0..=max_retries {
            if retry > 0 {
                tokio::time::sleep(retry_delay).await;
                retry_delay *= 2;
            }

            let _permit = self.rate_limiter.acquire().await?;

            let resp = self
                .client
                .post(format!("{}/v1/messages", self.config.base_url.trim_end_matches('/')))
                .header("x-api-key", &self.config.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(request)
                .send()
                .await;

            match resp {
                Ok(r) if r.status().as_u16() == 429 => {
                    tracing::warn!("[Interpreter] Rate limited, retry {}/{}", retry + 1, max_retries);
                    let body = r.text().await.unwrap_or_default();
                    last_error = InterpretationError::Upstream { status: 429, body };
                    continue;
                }
                Ok(r) if r.status().is_success() => {
                    return r.json().await.map_err(|e| {
                        InterpretationError::Schema(format!("Failed to parse API envelope: {}", e))
                    });
                }
                Ok(r) => {
                    let status = r.status().as_u16();
                    let text = r.text().await.unwrap_or_default();
                    let body = serde_json::from_str::<ApiError>(&text)
                        .map(|api_error| api_error.error.message)
                        .unwrap_or(text);
                    return Err(InterpretationError::Upstream { status, body });
                }
                Err(e) => {
                    tracing::warn!("[Interpreter] Request failed, retry {}/{}: {}", retry + 1, max_retries, e);
                    last_error = InterpretationError::Request(format!("Request failed after retries: {}", e));
                    continue;
                }
            }
        }

        Err(last_error)
    }
}

#[async_trait]
impl InterpretationEngine for HttpInterpreter {
    async fn interpret(
        &self,
        target: &DocumentInput,
        references: &[&DocumentInput],
        context_digest: &str,
    ) -> Result<InterpretedDocument, InterpretationError> {
        tracing::debug!(
            "[Interpreter] {} with {} reference(s), digest {} chars",
            target.name,
            references.len(),
            context_digest.len()
        );

        let request = self.build_request(target, references, context_digest);
        let response = self.send_request(&request).await?;

        if let Some(usage) = &response.usage {
            self.tokens_used
                .fetch_add(u64::from(usage.input_tokens) + u64::from(usage.output_tokens), Ordering::Relaxed);
        }

        let text = response
            .content
            .iter()
            .filter_map(|block| match block {
                ResponseBlock::Text { text } => Some(text.as_str()),
                ResponseBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            return Err(InterpretationError::EmptyResponse);
        }

        extract_json::<InterpretedDocument>(&text).map_err(InterpretationError::Schema)
    }
}

/// Rate limiter for API requests
struct RateLimiter {
    semaphore: Semaphore,
    min_interval: Duration,
    last_request: Mutex<Instant>,
}

impl RateLimiter {
    fn new(max_concurrent: usize, requests_per_second: f32) -> Self {
        let min_interval = if requests_per_second > 0.0 && requests_per_second.is_finite() {
            Duration::from_secs_f32(1.0 / requests_per_second)
        } else {
            Duration::ZERO
        };

        Self {
            semaphore: Semaphore::new(max_concurrent.max(1)),
            min_interval,
            last_request: Mutex::new(Instant::now() - Duration::from_secs(10)),
        }
    }

    /// Wait for a slot; the permit is held for the duration of the request
    async fn acquire(&self) -> Result<SemaphorePermit<'_>, InterpretationError> {
        let permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| InterpretationError::Request("Rate limiter closed".to_string()))?;

        let wait_time = {
            let mut last = self.last_request.lock().await;
            let elapsed = last.elapsed();
            let wait = self.min_interval.saturating_sub(elapsed);
            *last = Instant::now() + wait;
            wait
        };

        if !wait_time.is_zero() {
            tokio::time::sleep(wait_time).await;
        }

        Ok(permit)
    }
}

// API request/response types

#[derive(Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: Vec<ContentBlock>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    Document { source: Base64Source },
    Image { source: Base64Source },
}

impl ContentBlock {
    /// PDFs go as document blocks, everything else as images
    fn attachment(document: &DocumentInput) -> Self {
        let source = Base64Source {
            source_type: "base64",
            media_type: document.media_type().to_string(),
            data: base64::engine::general_purpose::STANDARD.encode(&document.content),
        };

        if document.is_pdf() {
            Self::Document { source }
        } else {
            Self::Image { source }
        }
    }
}

#[derive(Serialize)]
struct Base64Source {
    #[serde(rename = "type")]
    source_type: &'static str,
    media_type: String,
    data: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn config(base_url: String) -> InterpreterConfig {
        InterpreterConfig {
            api_key: "test-key".to_string(),
            base_url,
            max_retries: 2,
            initial_backoff: Duration::from_millis(10),
            requests_per_second: 1000.0,
            request_timeout: Duration::from_secs(5),
            ..Default::default()
        }
    }

    fn analysis_text() -> String {
        json!({
            "documentName": "Dakplan",
            "isRelevant": true,
            "documentKind": "roof_plan",
            "detectedLanguage": "nl",
            "scale": "1:100",
            "materials": [{"name": "EPDM", "area": 120.5, "unit": "m2", "confidence": 0.9}],
            "totalArea": 120.5,
            "materialCount": 1
        })
        .to_string()
    }

    fn envelope(text: &str) -> serde_json::Value {
        json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": text}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 1200, "output_tokens": 300}
        })
    }

    fn pdf(name: &str) -> DocumentInput {
        DocumentInput::new(name, b"%PDF-1.7 test".to_vec())
    }

    #[test]
    fn test_missing_api_key_is_rejected() {
        let result = HttpInterpreter::new(InterpreterConfig::default());
        assert!(matches!(result, Err(InterpretationError::Request(_))));
    }

    #[test]
    fn test_request_orders_references_before_target() {
        let client = HttpInterpreter::new(config("http://localhost".to_string())).unwrap();
        let floor = pdf("floor.pdf");
        let photo = DocumentInput::new("photo.png", vec![0x89, 0x50, 0x4E, 0x47, 0, 0]);
        let target = pdf("roof.pdf");

        let request = client.build_request(&target, &[&floor, &photo], "digest line");
        let value = serde_json::to_value(&request).unwrap();
        let blocks = value["messages"][0]["content"].as_array().unwrap().clone();

        assert_eq!(blocks.len(), 7);
        assert_eq!(blocks[0]["text"], "--- Reference document 1: floor.pdf ---");
        assert_eq!(blocks[1]["type"], "document");
        assert_eq!(blocks[1]["source"]["media_type"], "application/pdf");
        assert_eq!(blocks[3]["type"], "image");
        assert_eq!(blocks[3]["source"]["media_type"], "image/png");
        assert_eq!(blocks[4]["text"], "--- Document to analyze: roof.pdf ---");
        assert_eq!(blocks[5]["type"], "document");
        assert!(blocks[6]["text"].as_str().unwrap().contains("digest line"));
        assert_eq!(value["system"], INTERPRETATION_SYSTEM_PROMPT);
    }

    #[tokio::test]
    async fn test_interpret_parses_analysis() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/messages")
                    .header("x-api-key", "test-key")
                    .header("anthropic-version", ANTHROPIC_VERSION);
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(envelope(&format!("```json\n{}\n```", analysis_text())));
            })
            .await;

        let client = HttpInterpreter::new(config(server.base_url())).unwrap();
        let result = client.interpret(&pdf("roof.pdf"), &[], "").await.unwrap();

        mock.assert_async().await;
        assert_eq!(result.document_kind, "roof_plan");
        assert_eq!(result.total_area, Some(120.5));
        assert_eq!(result.materials[0].name.as_deref(), Some("EPDM"));
        assert_eq!(client.tokens_used(), 1500);
    }

    #[tokio::test]
    async fn test_token_count_does_not_wrap() {
        let server = MockServer::start_async().await;
        let mut body = envelope(&analysis_text());
        body["usage"] = json!({"input_tokens": u32::MAX, "output_tokens": u32::MAX});
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/messages");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(body.clone());
            })
            .await;

        let client = HttpInterpreter::new(config(server.base_url())).unwrap();
        client.interpret(&pdf("a.pdf"), &[], "").await.unwrap();
        client.interpret(&pdf("b.pdf"), &[], "").await.unwrap();

        mock.assert_calls_async(2).await;
        assert_eq!(client.tokens_used(), 4 * u64::from(u32::MAX));
    }

    #[tokio::test]
    async fn test_upstream_error_is_not_retried() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/messages");
                then.status(400)
                    .header("content-type", "application/json")
                    .json_body(json!({"type": "error", "error": {"type": "invalid_request_error", "message": "bad pdf"}}));
            })
            .await;

        let client = HttpInterpreter::new(config(server.base_url())).unwrap();
        let err = client.interpret(&pdf("roof.pdf"), &[], "").await.unwrap_err();

        mock.assert_calls_async(1).await;
        assert_eq!(
            err,
            InterpretationError::Upstream {
                status: 400,
                body: "bad pdf".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_rate_limited_requests_are_retried() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/messages");
                then.status(429).body("slow down");
            })
            .await;

        let client = HttpInterpreter::new(config(server.base_url())).unwrap();
        let err = client.interpret(&pdf("roof.pdf"), &[], "").await.unwrap_err();

        mock.assert_calls_async(3).await;
        assert!(matches!(err, InterpretationError::Upstream { status: 429, .. }));
    }

    #[tokio::test]
    async fn test_empty_text_is_empty_response() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/messages");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(envelope("   "));
            })
            .await;

        let client = HttpInterpreter::new(config(server.base_url())).unwrap();
        let err = client.interpret(&pdf("roof.pdf"), &[], "").await.unwrap_err();
        assert_eq!(err, InterpretationError::EmptyResponse);
    }

    #[tokio::test]
    async fn test_wrong_shape_is_schema_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/messages");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(envelope(r#"{"documentName": "x", "materials": []}"#));
            })
            .await;

        let client = HttpInterpreter::new(config(server.base_url())).unwrap();
        let err = client.interpret(&pdf("roof.pdf"), &[], "").await.unwrap_err();
        assert!(matches!(err, InterpretationError::Schema(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_request_error() {
        let mut cfg = config("http://127.0.0.1:1".to_string());
        cfg.max_retries = 1;
        let client = HttpInterpreter::new(cfg).unwrap();
        let err = client.interpret(&pdf("roof.pdf"), &[], "").await.unwrap_err();
        assert!(matches!(err, InterpretationError::Request(_)), "{err:?}");
    }
}
