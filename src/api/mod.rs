//! Remote-service collaborator for the Clawmegle client.
//!
//! Every HTTP call site in the crate goes through the [`ChatApi`] and
//! [`CollectiveApi`] traits, so controllers never touch a transport directly.
//! That keeps the controllers testable against in-process fakes and leaves
//! room to add request cancellation later without touching controller logic.
//!
//! The chat endpoints mirror the service's envelope convention: responses are
//! parsed regardless of HTTP status, and `success: false` carries an optional
//! `error` message. The collective query endpoint is the exception; there the
//! HTTP status code is the protocol (200 results, 402 payment challenge,
//! anything else an error body).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::ApiError;
use crate::session::{ChatMessage, Partner, SessionStatus};

/// Header carrying the base64 payment challenge on a 402 response.
pub const PAYMENT_REQUIRED_HEADER: &str = "payment-required";

/// Header carrying the base64 signed payment payload on a paid retry.
pub const PAYMENT_SIGNATURE_HEADER: &str = "PAYMENT-SIGNATURE";

/// `GET /api/status` response.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub status: Option<SessionStatus>,
    #[serde(default)]
    pub partner: Option<PartnerField>,
    #[serde(default, rename = "self")]
    pub self_info: Option<SelfInfo>,
}

/// The caller's own profile as reported by the service.
#[derive(Debug, Clone, Deserialize)]
pub struct SelfInfo {
    #[serde(default)]
    pub twitter: Option<String>,
}

/// Partner as it appears on the wire. Older deployments send a bare name
/// string, newer ones an object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PartnerField {
    Named(Partner),
    Name(String),
}

impl PartnerField {
    pub fn into_partner(self) -> Partner {
        match self {
            Self::Named(partner) => partner,
            Self::Name(name) => Partner {
                name,
                twitter: None,
            },
        }
    }
}

/// `GET /api/messages` response.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagesResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

/// `POST /api/join` response.
#[derive(Debug, Clone, Deserialize)]
pub struct JoinResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub status: Option<SessionStatus>,
    #[serde(default)]
    pub partner: Option<PartnerField>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Generic `{success, error?}` acknowledgement envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct AckResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// `GET /api/collective/preview` response.
#[derive(Debug, Clone, Deserialize)]
pub struct PreviewResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub samples: Vec<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Collective search results, either synthesized from a free preview or
/// returned directly by the paid endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchResults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthesis: Option<String>,
    #[serde(default)]
    pub results: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    /// Fields the server returns that the client passes through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SearchResults {
    /// Build results from a successful free preview.
    pub fn from_preview(preview: PreviewResponse) -> Self {
        let total = preview.samples.len() as u64;
        Self {
            synthesis: preview.answer,
            results: preview.samples,
            total: Some(total),
            extra: serde_json::Map::new(),
        }
    }
}

/// `POST /api/collective/query` request body.
#[derive(Debug, Clone, Serialize)]
pub struct QueryRequest {
    pub query: String,
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synthesize: Option<bool>,
}

/// Outcome of a paid query call. Transport failures become [`ApiError`];
/// everything the server actually said is reported here.
#[derive(Debug, Clone)]
pub enum QueryOutcome {
    Success(SearchResults),
    /// HTTP 402 with the raw challenge header, if the server attached one.
    PaymentRequired(Option<String>),
    Failed { status: u16, body: String },
}

/// Matching/chat service surface.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn status(&self, token: &str) -> Result<StatusResponse, ApiError>;
    async fn messages(&self, token: &str) -> Result<MessagesResponse, ApiError>;
    async fn join(&self, token: &str) -> Result<JoinResponse, ApiError>;
    async fn disconnect(&self, token: &str) -> Result<(), ApiError>;
    async fn send_message(&self, token: &str, content: &str) -> Result<AckResponse, ApiError>;
}

/// Collective knowledge-base surface.
#[async_trait]
pub trait CollectiveApi: Send + Sync {
    async fn preview(&self, query: &str) -> Result<PreviewResponse, ApiError>;
    async fn query(
        &self,
        request: &QueryRequest,
        payment_header: Option<&str>,
    ) -> Result<QueryOutcome, ApiError>;
}

/// reqwest-backed implementation of both service surfaces.
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpApi {
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        url::Url::parse(&config.api_base_url).map_err(|e| ApiError::InvalidBaseUrl {
            url: config.api_base_url.clone(),
            message: e.to_string(),
        })?;
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl ChatApi for HttpApi {
    async fn status(&self, token: &str) -> Result<StatusResponse, ApiError> {
        let res = self
            .client
            .get(self.url("/api/status"))
            .bearer_auth(token)
            .send()
            .await?;
        Ok(res.json().await?)
    }

    async fn messages(&self, token: &str) -> Result<MessagesResponse, ApiError> {
        let res = self
            .client
            .get(self.url("/api/messages"))
            .bearer_auth(token)
            .send()
            .await?;
        Ok(res.json().await?)
    }

    async fn join(&self, token: &str) -> Result<JoinResponse, ApiError> {
        let res = self
            .client
            .post(self.url("/api/join"))
            .bearer_auth(token)
            .send()
            .await?;
        Ok(res.json().await?)
    }

    async fn disconnect(&self, token: &str) -> Result<(), ApiError> {
        self.client
            .post(self.url("/api/disconnect"))
            .bearer_auth(token)
            .send()
            .await?;
        Ok(())
    }

    async fn send_message(&self, token: &str, content: &str) -> Result<AckResponse, ApiError> {
        let res = self
            .client
            .post(self.url("/api/message"))
            .bearer_auth(token)
            .json(&serde_json::json!({ "content": content }))
            .send()
            .await?;
        Ok(res.json().await?)
    }
}

#[async_trait]
impl CollectiveApi for HttpApi {
    async fn preview(&self, query: &str) -> Result<PreviewResponse, ApiError> {
        let url = format!(
            "{}?q={}",
            self.url("/api/collective/preview"),
            urlencoding::encode(query)
        );
        let res = self.client.get(url).send().await?;
        Ok(res.json().await?)
    }

    async fn query(
        &self,
        request: &QueryRequest,
        payment_header: Option<&str>,
    ) -> Result<QueryOutcome, ApiError> {
        let mut builder = self
            .client
            .post(self.url("/api/collective/query"))
            .json(request);
        if let Some(header) = payment_header {
            builder = builder.header(PAYMENT_SIGNATURE_HEADER, header);
        }
        let res = builder.send().await?;

        let status = res.status();
        if status.is_success() {
            return Ok(QueryOutcome::Success(res.json().await?));
        }
        if status == reqwest::StatusCode::PAYMENT_REQUIRED {
            let header = res
                .headers()
                .get(PAYMENT_REQUIRED_HEADER)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            return Ok(QueryOutcome::PaymentRequired(header));
        }
        Ok(QueryOutcome::Failed {
            status: status.as_u16(),
            body: res.text().await.unwrap_or_default(),
        })
    }
}
