//! Inference endpoint client. One request/response exchange per call; the
//! trait keeps the contract testable with a scripted mock.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use super::ExtractionError;

/// A single outbound inference request.
#[derive(Debug, Clone)]
pub struct InferenceRequest<'a> {
    pub system: &'a str,
    pub prompt: &'a str,
    /// Low temperature keeps extraction deterministic-leaning.
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Raw response plus token accounting for provenance.
#[derive(Debug, Clone)]
pub struct InferenceResponse {
    pub text: String,
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
}

pub trait InferenceClient {
    fn complete(&self, request: &InferenceRequest<'_>) -> Result<InferenceResponse, ExtractionError>;

    /// Model identity recorded in `extraction_metadata`.
    fn model_id(&self) -> &str;
}

/// Shared handles count too, letting tests keep a handle on a scripted client
/// after handing it to the extractor.
impl<T: InferenceClient + ?Sized> InferenceClient for std::sync::Arc<T> {
    fn complete(&self, request: &InferenceRequest<'_>) -> Result<InferenceResponse, ExtractionError> {
        (**self).complete(request)
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}

/// HTTP client for an Ollama-compatible `/api/generate` endpoint.
pub struct HttpInferenceClient {
    base_url: String,
    model: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl HttpInferenceClient {
    pub fn new(base_url: &str, model: &str, timeout_secs: u64) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
            timeout_secs,
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
}

impl InferenceClient for HttpInferenceClient {
    fn complete(&self, request: &InferenceRequest<'_>) -> Result<InferenceResponse, ExtractionError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model: &self.model,
            prompt: request.prompt,
            system: request.system,
            stream: false,
            options: GenerateOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        let response = self.client.post(&url).json(&body).send().map_err(|e| {
            if e.is_connect() {
                ExtractionError::Connection(self.base_url.clone())
            } else if e.is_timeout() {
                ExtractionError::HttpClient(format!(
                    "request timed out after {}s",
                    self.timeout_secs
                ))
            } else {
                ExtractionError::HttpClient(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ExtractionError::Endpoint {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .map_err(|e| ExtractionError::JsonParsing(e.to_string()))?;

        Ok(InferenceResponse {
            text: parsed.response,
            input_tokens: parsed.prompt_eval_count,
            output_tokens: parsed.eval_count,
        })
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// Scripted client for tests. Replays responses in order (the last one
/// repeats) and counts calls, so tests can assert the single-call invariant.
pub struct MockInferenceClient {
    responses: Vec<String>,
    fail_connect: bool,
    calls: AtomicUsize,
}

impl MockInferenceClient {
    pub fn new(response: &str) -> Self {
        Self::with_responses(vec![response.to_string()])
    }

    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses,
            fail_connect: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// A client whose every call fails with a connection error.
    pub fn unreachable() -> Self {
        Self {
            responses: Vec::new(),
            fail_connect: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl InferenceClient for MockInferenceClient {
    fn complete(&self, _request: &InferenceRequest<'_>) -> Result<InferenceResponse, ExtractionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect {
            return Err(ExtractionError::Connection("mock://unreachable".into()));
        }
        let index = call.min(self.responses.len().saturating_sub(1));
        let text = self
            .responses
            .get(index)
            .cloned()
            .unwrap_or_default();
        Ok(InferenceResponse {
            text,
            input_tokens: Some(100),
            output_tokens: Some(200),
        })
    }

    fn model_id(&self) -> &str {
        "mock-extraction-model"
    }
}
