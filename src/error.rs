//! Error types for the sign-up and guest-conversion pipeline
//!
//! Errors are classified by where they stop the flow:
//! - `AuthError`: identity-provider failures during account creation; surfaced
//!   to the user with tailored guidance. Only `Network` is retryable in place.
//! - `StoreError`: document-store failures. Before the auth record exists these
//!   abort the attempt; afterwards they downgrade (profile retry, migration
//!   report) and never roll the created account back.
//! - `ProvisionError`: splits "account creation failed" from "account created,
//!   profile write failed" so the caller can retry the profile write alone.
//!
//! Validation violations never reach this module; they are tagged values that
//! resolve locally (see `validation`).

use thiserror::Error;

use crate::models::Identity;

/// Failures from the authentication collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Email is already registered")]
    EmailInUse,

    #[error("Password rejected by the identity provider: {0}")]
    WeakPassword(String),

    #[error("Email address rejected by the identity provider")]
    InvalidEmail,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Too many attempts")]
    TooManyRequests,

    #[error("Identity provider error: {0}")]
    Unknown(String),
}

impl AuthError {
    /// Returns true if retrying the same input can succeed.
    ///
    /// Everything except `Network` needs changed input (or patience), not a
    /// blind retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::Network(_))
    }

    /// Stable discriminant for the shell bridge.
    pub fn kind(&self) -> AuthErrorKind {
        match self {
            AuthError::EmailInUse => AuthErrorKind::EmailInUse,
            AuthError::WeakPassword(_) => AuthErrorKind::WeakPassword,
            AuthError::InvalidEmail => AuthErrorKind::InvalidEmail,
            AuthError::Network(_) => AuthErrorKind::Network,
            AuthError::TooManyRequests => AuthErrorKind::TooManyRequests,
            AuthError::Unknown(_) => AuthErrorKind::Unknown,
        }
    }

    /// Get a user-friendly recovery suggestion.
    ///
    /// Every kind maps to exactly one next step so the shell never has to
    /// invent copy for an unanticipated failure.
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            AuthError::EmailInUse => {
                "This email already has an account. Sign in instead, or use a different email."
            }
            AuthError::WeakPassword(_) => "Choose a stronger password and try again.",
            AuthError::InvalidEmail => "Check the email address for typos.",
            AuthError::Network(_) => "Check your internet connection and try again.",
            AuthError::TooManyRequests => "Wait a few minutes and try again.",
            AuthError::Unknown(_) => "Something went wrong. Try again in a moment.",
        }
    }
}

/// Serializable discriminant of `AuthError` for the shell bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthErrorKind {
    EmailInUse,
    WeakPassword,
    InvalidEmail,
    Network,
    TooManyRequests,
    Unknown,
}

/// Failures from the document-store collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Malformed document: {0}")]
    Malformed(String),

    #[error("Store error: {0}")]
    Unknown(String),
}

impl StoreError {
    /// Returns true if retrying the same write can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Network(_))
    }
}

/// Outcome of `provision`: either account creation itself failed, or the
/// account exists but its profile document does not.
///
/// The two must stay distinguishable — a conflated error would force the
/// caller to re-run account creation, which then fails with `EmailInUse`
/// even though the first attempt half-succeeded.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Account creation failed; nothing was persisted.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The auth record exists but the profile write failed. Carries the
    /// created identity so the caller can retry the write alone.
    #[error("account created but profile write failed: {source}")]
    ProfileWrite {
        identity: Box<Identity>,
        source: StoreError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_network_auth_errors_are_retryable() {
        assert!(AuthError::Network("timeout".into()).is_retryable());
        assert!(!AuthError::EmailInUse.is_retryable());
        assert!(!AuthError::WeakPassword("too short".into()).is_retryable());
        assert!(!AuthError::TooManyRequests.is_retryable());
        assert!(!AuthError::Unknown("?".into()).is_retryable());
    }

    #[test]
    fn test_every_auth_error_has_a_suggestion() {
        let all = [
            AuthError::EmailInUse,
            AuthError::WeakPassword("x".into()),
            AuthError::InvalidEmail,
            AuthError::Network("x".into()),
            AuthError::TooManyRequests,
            AuthError::Unknown("x".into()),
        ];
        for err in all {
            assert!(!err.recovery_suggestion().is_empty());
        }
    }

    #[test]
    fn test_auth_error_kind_serializes_camel_case() {
        let json = serde_json::to_string(&AuthErrorKind::EmailInUse).unwrap();
        assert_eq!(json, "\"emailInUse\"");
        let json = serde_json::to_string(&AuthErrorKind::TooManyRequests).unwrap();
        assert_eq!(json, "\"tooManyRequests\"");
    }

    #[test]
    fn test_store_error_retryability() {
        assert!(StoreError::Network("reset".into()).is_retryable());
        assert!(!StoreError::PermissionDenied("rules".into()).is_retryable());
        assert!(!StoreError::NotFound("users/x".into()).is_retryable());
    }
}
