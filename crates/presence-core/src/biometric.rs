//! Biometric gate: normalizes an external face-verification call into a
//! pass/fail decision.
//!
//! The gate never caches and never retries. Any failure to obtain a verdict
//! (network, service error, timeout) is a failed decision flagged
//! `unavailable`, so callers can offer a retry instead of an ineligibility
//! message.

use crate::config::{BiometricPolicy, MissingReferencePolicy};
use crate::types::ImageRef;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const REASON_UNAVAILABLE: &str = "verification unavailable";
pub const REASON_NO_REFERENCE: &str = "no enrolled reference";

// ---------------------------------------------------------------------------
// Verification service interface
// ---------------------------------------------------------------------------

/// Raw verdict from the verification service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub face_detected: bool,
    /// Similarity score, nominally 0–100.
    pub match_score: f64,
    #[serde(rename = "match")]
    pub matched: bool,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("network error: {0}")]
    Network(String),

    #[error("verification service returned {status}: {message}")]
    Service { status: u16, message: String },

    #[error("verification timed out")]
    Timeout,
}

#[async_trait]
pub trait VerificationService: Send + Sync {
    async fn verify(
        &self,
        image: &ImageRef,
        reference: Option<&ImageRef>,
    ) -> Result<VerificationReport, VerificationError>;
}

// ---------------------------------------------------------------------------
// BiometricDecision
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiometricDecision {
    pub face_detected: bool,
    /// Clamped to 0–100.
    pub match_score: u8,
    pub pass: bool,
    pub reason: String,
    /// No verdict could be obtained from the service.
    #[serde(default)]
    pub unavailable: bool,
}

impl BiometricDecision {
    fn unavailable() -> Self {
        Self {
            face_detected: false,
            match_score: 0,
            pass: false,
            reason: REASON_UNAVAILABLE.to_string(),
            unavailable: true,
        }
    }
}

fn clamp_score(score: f64) -> u8 {
    if score.is_nan() {
        return 0;
    }
    score.round().clamp(0.0, 100.0) as u8
}

/// The pass rule: a face must be present, and either the score reaches
/// `threshold` or the service asserts an explicit match.
pub fn passes(report: &VerificationReport, threshold: u8) -> bool {
    report.face_detected && (clamp_score(report.match_score) >= threshold || report.matched)
}

// ---------------------------------------------------------------------------
// BiometricGate
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct BiometricGate {
    service: Arc<dyn VerificationService>,
    policy: BiometricPolicy,
}

impl BiometricGate {
    pub fn new(service: Arc<dyn VerificationService>, policy: BiometricPolicy) -> Self {
        Self { service, policy }
    }

    pub fn policy(&self) -> &BiometricPolicy {
        &self.policy
    }

    /// Default bound for a single verification call.
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.policy.timeout_ms)
    }

    /// Run one verification and reduce it to a decision. Bounded by `timeout`;
    /// expiry is treated the same as an explicit failure.
    pub async fn check(
        &self,
        image: &ImageRef,
        reference: Option<&ImageRef>,
        timeout: Duration,
    ) -> BiometricDecision {
        if reference.is_none() && self.policy.missing_reference == MissingReferencePolicy::Reject {
            return BiometricDecision {
                face_detected: false,
                match_score: 0,
                pass: false,
                reason: REASON_NO_REFERENCE.to_string(),
                unavailable: false,
            };
        }

        let outcome = tokio::time::timeout(timeout, self.service.verify(image, reference)).await;
        let report = match outcome {
            Err(_) => {
                tracing::warn!(timeout_ms = timeout.as_millis() as u64, "verification timed out");
                return BiometricDecision::unavailable();
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "verification call failed");
                return BiometricDecision::unavailable();
            }
            Ok(Ok(report)) => report,
        };

        let pass = match reference {
            Some(_) => passes(&report, self.policy.pass_threshold),
            // Liveness-only: no enrolled face to compare against.
            None => report.face_detected,
        };

        BiometricDecision {
            face_detected: report.face_detected,
            match_score: clamp_score(report.match_score),
            pass,
            reason: report.reason,
            unavailable: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted verification service used across the crate's tests.
    pub(crate) struct ScriptedService {
        pub report: Option<VerificationReport>,
        pub delay: Duration,
        pub calls: AtomicUsize,
    }

    impl ScriptedService {
        pub(crate) fn verdict(face_detected: bool, score: f64, matched: bool) -> Self {
            Self {
                report: Some(VerificationReport {
                    face_detected,
                    match_score: score,
                    matched,
                    reason: "scripted".into(),
                }),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                report: None,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn slow(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::verdict(true, 99.0, true)
            }
        }
    }

    #[async_trait]
    impl VerificationService for ScriptedService {
        async fn verify(
            &self,
            _image: &ImageRef,
            _reference: Option<&ImageRef>,
        ) -> Result<VerificationReport, VerificationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.report
                .clone()
                .ok_or_else(|| VerificationError::Network("connection refused".into()))
        }
    }

    fn gate(service: ScriptedService, missing: MissingReferencePolicy) -> BiometricGate {
        BiometricGate::new(
            Arc::new(service),
            BiometricPolicy {
                missing_reference: missing,
                ..BiometricPolicy::default()
            },
        )
    }

    fn selfie() -> ImageRef {
        ImageRef::new("data:image/jpeg;base64,AAAA")
    }

    fn enrolled() -> ImageRef {
        ImageRef::new("https://photos.example/alice.jpg")
    }

    #[test]
    fn pass_rule_requires_face() {
        let report = VerificationReport {
            face_detected: false,
            match_score: 99.0,
            matched: true,
            reason: String::new(),
        };
        assert!(!passes(&report, 70));
    }

    #[test]
    fn pass_rule_accepts_score_or_explicit_match() {
        let mut report = VerificationReport {
            face_detected: true,
            match_score: 70.0,
            matched: false,
            reason: String::new(),
        };
        assert!(passes(&report, 70));
        report.match_score = 69.0;
        assert!(!passes(&report, 70));
        report.matched = true;
        assert!(passes(&report, 70));
    }

    #[test]
    fn scores_are_clamped() {
        assert_eq!(clamp_score(140.0), 100);
        assert_eq!(clamp_score(-3.0), 0);
        assert_eq!(clamp_score(f64::NAN), 0);
        assert_eq!(clamp_score(69.6), 70);
    }

    #[tokio::test]
    async fn high_score_passes() {
        let g = gate(
            ScriptedService::verdict(true, 88.0, false),
            MissingReferencePolicy::Reject,
        );
        let d = g.check(&selfie(), Some(&enrolled()), g.default_timeout()).await;
        assert!(d.pass);
        assert_eq!(d.match_score, 88);
        assert!(!d.unavailable);
    }

    #[tokio::test]
    async fn custom_threshold_is_honored() {
        let g = BiometricGate::new(
            Arc::new(ScriptedService::verdict(true, 88.0, false)),
            BiometricPolicy {
                pass_threshold: 90,
                ..BiometricPolicy::default()
            },
        );
        let d = g.check(&selfie(), Some(&enrolled()), g.default_timeout()).await;
        assert!(!d.pass);
    }

    #[tokio::test]
    async fn network_failure_is_unavailable_fail() {
        let g = gate(ScriptedService::failing(), MissingReferencePolicy::Reject);
        let d = g.check(&selfie(), Some(&enrolled()), g.default_timeout()).await;
        assert!(!d.pass);
        assert!(d.unavailable);
        assert_eq!(d.reason, REASON_UNAVAILABLE);
    }

    #[tokio::test]
    async fn timeout_is_unavailable_fail() {
        let g = gate(
            ScriptedService::slow(Duration::from_millis(500)),
            MissingReferencePolicy::Reject,
        );
        let d = g
            .check(&selfie(), Some(&enrolled()), Duration::from_millis(20))
            .await;
        assert!(!d.pass);
        assert!(d.unavailable);
    }

    #[tokio::test]
    async fn missing_reference_rejects_without_calling_service() {
        let service = Arc::new(ScriptedService::verdict(true, 99.0, true));
        let g = BiometricGate::new(service.clone(), BiometricPolicy::default());
        let d = g.check(&selfie(), None, g.default_timeout()).await;
        assert!(!d.pass);
        assert_eq!(d.reason, REASON_NO_REFERENCE);
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn liveness_only_passes_on_detected_face() {
        let g = gate(
            ScriptedService::verdict(true, 0.0, false),
            MissingReferencePolicy::LivenessOnly,
        );
        let d = g.check(&selfie(), None, g.default_timeout()).await;
        assert!(d.pass);

        let g = gate(
            ScriptedService::verdict(false, 0.0, false),
            MissingReferencePolicy::LivenessOnly,
        );
        let d = g.check(&selfie(), None, g.default_timeout()).await;
        assert!(!d.pass);
    }

    #[tokio::test]
    async fn repeated_calls_are_independent() {
        let service = Arc::new(ScriptedService::verdict(true, 90.0, false));
        let g = BiometricGate::new(service.clone(), BiometricPolicy::default());
        g.check(&selfie(), Some(&enrolled()), g.default_timeout()).await;
        g.check(&selfie(), Some(&enrolled()), g.default_timeout()).await;
        assert_eq!(service.calls.load(Ordering::SeqCst), 2);
    }
}
