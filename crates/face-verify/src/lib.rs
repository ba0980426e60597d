//! HTTP client for the face verification service.
//!
//! [`VerifyClient`] implements [`presence_core::biometric::VerificationService`]
//! so it can be handed straight to a `BiometricGate`.

mod client;
mod error;

pub use client::VerifyClient;
pub use error::{FaceVerifyError, Result};
