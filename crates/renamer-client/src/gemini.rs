use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use renamer_core::error::ExtractError;
use renamer_core::traits::Extractor;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_PROMPT: &str = "You are a document analysis assistant. Find the primary identifier of the attached PDF (a short alphanumeric reference code, usually printed near the top of the first page). Respond ONLY with JSON matching the requested schema; use null when the document carries no identifier.";
const PDF_MIME_TYPE: &str = "application/pdf";

/// Gemini `generateContent` client for identifier extraction.
///
/// Sends the document inline as base64 PDF data and constrains the reply
/// to a single-field JSON object via a response schema.
#[derive(Clone)]
pub struct GeminiExtractor {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout_secs: u64,
    prompt: String,
}

impl GeminiExtractor {
    pub fn new(api_key: &str, model: &str) -> Result<Self, ExtractError> {
        Self::with_base_url(api_key, model, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: &str, model: &str, base_url: &str) -> Result<Self, ExtractError> {
        Self::build(api_key, model, base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(self, timeout: Duration) -> Result<Self, ExtractError> {
        let mut rebuilt = Self::build(&self.api_key, &self.model, &self.base_url, timeout)?;
        rebuilt.prompt = self.prompt;
        Ok(rebuilt)
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    fn build(
        api_key: &str,
        model: &str,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, ExtractError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExtractError::Unknown(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            timeout_secs: timeout.as_secs(),
            prompt: DEFAULT_PROMPT.to_string(),
        })
    }

    fn response_schema() -> serde_json::Value {
        serde_json::json!({
            "type": "OBJECT",
            "properties": {
                "identifier": {
                    "type": "STRING",
                    "nullable": true,
                    "description": "The document's primary identifier, or null if absent"
                }
            },
            "required": ["identifier"]
        })
    }
}

// ---- Gemini API types ----

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    #[serde(rename = "inlineData", skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Serialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    response_schema: serde_json::Value,
    thinking_config: ThinkingConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    /// Identifier lookup is a retrieval task; model thinking is disabled.
    thinking_budget: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    parts: Option<Vec<CandidatePart>>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl Extractor for GeminiExtractor {
    async fn extract(&self, content: &[u8]) -> Result<String, ExtractError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        tracing::debug!(model = %self.model, bytes = content.len(), "Requesting identifier extraction");

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    Part {
                        inline_data: Some(InlineData {
                            mime_type: PDF_MIME_TYPE.to_string(),
                            data: BASE64.encode(content),
                        }),
                        text: None,
                    },
                    Part {
                        inline_data: None,
                        text: Some(self.prompt.clone()),
                    },
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema: Self::response_schema(),
                thinking_config: ThinkingConfig { thinking_budget: 0 },
            },
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ExtractError::Connection(format!(
                        "no response within {}s",
                        self.timeout_secs
                    ))
                } else if e.is_connect() {
                    ExtractError::Connection(format!("connection failed: {}", e))
                } else {
                    ExtractError::Unknown(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let status_code = status.as_u16();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| format!("HTTP {}: {}", status_code, body));
            return Err(classify_status(status_code, message));
        }

        let generate_response: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ExtractError::MalformedResponse(format!("unparseable body: {}", e)))?;

        let text = generate_response
            .candidates
            .as_ref()
            .and_then(|c| c.first())
            .and_then(|c| c.content.as_ref())
            .and_then(|c| c.parts.as_ref())
            .and_then(|p| p.first())
            .and_then(|p| p.text.as_deref())
            .ok_or_else(|| {
                ExtractError::MalformedResponse("response carries no candidate text".to_string())
            })?;

        parse_identifier(text)
    }
}

/// Map a non-success HTTP status onto the failure taxonomy.
fn classify_status(status_code: u16, message: String) -> ExtractError {
    match status_code {
        401 | 403 => ExtractError::Auth(message),
        429 => ExtractError::QuotaExceeded(message),
        _ => ExtractError::Unknown(format!("HTTP {}: {}", status_code, message)),
    }
}

/// Pull the identifier out of the model's reply.
///
/// The reply should be bare JSON, but models occasionally wrap it in a
/// markdown fence or lead with prose, so the parse falls back to the
/// outermost brace-delimited slice before giving up.
fn parse_identifier(raw: &str) -> Result<String, ExtractError> {
    let candidate = strip_fences(raw);

    let value: serde_json::Value = match serde_json::from_str(candidate) {
        Ok(v) => v,
        Err(first_err) => {
            let sliced = brace_slice(candidate).ok_or_else(|| {
                ExtractError::MalformedResponse(format!("not JSON: {}. Raw: {}", first_err, raw))
            })?;
            serde_json::from_str(sliced).map_err(|e| {
                ExtractError::MalformedResponse(format!("not JSON: {}. Raw: {}", e, raw))
            })?
        }
    };

    match value.get("identifier") {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(serde_json::Value::String(_)) | Some(serde_json::Value::Null) => {
            Err(ExtractError::NotFound)
        }
        _ => Err(ExtractError::MalformedResponse(format!(
            "missing identifier field. Raw: {}",
            raw
        ))),
    }
}

fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn brace_slice(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}
