use std::time::Duration;

use async_trait::async_trait;
use presence_core::biometric::{VerificationError, VerificationReport, VerificationService};
use presence_core::config::VerificationConfig;
use presence_core::types::ImageRef;
use serde::{Deserialize, Serialize};

use crate::error::{FaceVerifyError, Result};

/// Upper bound on a single HTTP exchange. The biometric gate applies its own,
/// usually tighter, timeout on top.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest service error body carried into a `VerificationError::Service`.
const MAX_ERROR_BODY: usize = 512;

// ─── Wire types ───────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyRequest<'a> {
    selfie_base64: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    avatar_url: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyResult {
    face_detected: bool,
    #[serde(rename = "match", default)]
    matched: bool,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    reason: String,
}

/// The service answers either bare or inside a `{"data": ...}` envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Envelope {
    Wrapped { data: VerifyResult },
    Bare(VerifyResult),
}

impl Envelope {
    fn into_report(self) -> VerificationReport {
        let result = match self {
            Envelope::Wrapped { data } => data,
            Envelope::Bare(result) => result,
        };
        VerificationReport {
            face_detected: result.face_detected,
            match_score: result.confidence,
            matched: result.matched,
            reason: result.reason,
        }
    }
}

// ─── VerifyClient ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct VerifyClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl VerifyClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self> {
        let base = base_url.trim().trim_end_matches('/');
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(FaceVerifyError::InvalidBaseUrl(base_url.to_string()));
        }
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            endpoint: format!("{base}/face/verify"),
            api_key,
        })
    }

    /// Build from config, reading the bearer token from `api_key_env` when set.
    pub fn from_config(config: &VerificationConfig) -> Result<Self> {
        let api_key = match &config.api_key_env {
            Some(var) => Some(
                std::env::var(var).map_err(|_| FaceVerifyError::MissingApiKey(var.clone()))?,
            ),
            None => None,
        };
        Self::new(&config.base_url, api_key)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl VerificationService for VerifyClient {
    async fn verify(
        &self,
        image: &ImageRef,
        reference: Option<&ImageRef>,
    ) -> std::result::Result<VerificationReport, VerificationError> {
        let body = VerifyRequest {
            selfie_base64: image.as_str(),
            avatar_url: reference.map(ImageRef::as_str),
        };
        let mut req = self.http.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await.map_err(transport_error)?;
        let status = resp.status();
        if !status.is_success() {
            let mut message = resp.text().await.unwrap_or_default();
            if message.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !message.is_char_boundary(cut) {
                    cut -= 1;
                }
                message.truncate(cut);
            }
            tracing::warn!(status = status.as_u16(), "face verification rejected request");
            return Err(VerificationError::Service {
                status: status.as_u16(),
                message,
            });
        }

        let envelope: Envelope = resp.json().await.map_err(transport_error)?;
        let report = envelope.into_report();
        tracing::debug!(
            face_detected = report.face_detected,
            score = report.match_score,
            matched = report.matched,
            "face verification answered"
        );
        Ok(report)
    }
}

fn transport_error(e: reqwest::Error) -> VerificationError {
    if e.is_timeout() {
        VerificationError::Timeout
    } else {
        VerificationError::Network(e.to_string())
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
