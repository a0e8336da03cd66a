//! Authentication collaborator seam.
//!
//! `AuthProvider` covers the four primitives sign-up needs plus an explicit
//! auth-state subscription. The subscription is an owned object handed to
//! the screen that wants it (dropping the receiver unsubscribes) instead
//! of a module-global listener, so mount/unmount lifecycles stay visible
//! in the code that owns them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::AuthError;

/// The authenticated user as the auth provider reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub uid: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Owned handle on the auth-state stream.
///
/// Wraps a `watch` receiver: the provider publishes `Some(user)` on sign-in
/// and `None` on sign-out, and each subscriber observes the latest value.
/// Dropping the subscription detaches it; no explicit unsubscribe call.
#[derive(Debug, Clone)]
pub struct AuthStateSubscription {
    rx: watch::Receiver<Option<AuthUser>>,
}

impl AuthStateSubscription {
    pub fn new(rx: watch::Receiver<Option<AuthUser>>) -> Self {
        Self { rx }
    }

    /// The most recently published auth state.
    pub fn current(&self) -> Option<AuthUser> {
        self.rx.borrow().clone()
    }

    /// Wait for the next auth-state change and return it.
    ///
    /// Returns `Err` once the provider side is gone and no further changes
    /// can arrive.
    pub async fn changed(&mut self) -> Result<Option<AuthUser>, watch::error::RecvError> {
        self.rx.changed().await?;
        Ok(self.rx.borrow_and_update().clone())
    }
}

/// Async auth primitives consumed by the pipeline.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Create the authenticated identity. On success the provider signs the
    /// new user in and publishes the auth-state change.
    async fn create_account(&self, email: &str, password: &str) -> Result<AuthUser, AuthError>;

    /// Set the display name on an existing identity.
    async fn update_display_name(&self, uid: &str, display_name: &str) -> Result<(), AuthError>;

    /// Sign-in methods registered for an email. Empty means unregistered.
    async fn sign_in_methods(&self, email: &str) -> Result<Vec<String>, AuthError>;

    /// The currently signed-in user, if any.
    fn current_user(&self) -> Option<AuthUser>;

    /// New subscription to auth-state changes.
    fn subscribe(&self) -> AuthStateSubscription;
}

/// Canonical email form used everywhere past the raw form: trimmed and
/// lower-cased. Uniqueness and "already registered" checks key on this.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Whether an email already has an account.
///
/// Fail-open: a lookup failure logs a warning and reads as "not registered"
/// so a transient error cannot block a legitimate sign-up. The create call
/// that follows still rejects a genuine duplicate with `EmailInUse`, which
/// is what bounds the cost of guessing wrong here. Deliberate posture,
/// under product review; see DESIGN.md.
pub async fn email_is_registered(auth: &dyn AuthProvider, email: &str) -> bool {
    match auth.sign_in_methods(email).await {
        Ok(methods) => !methods.is_empty(),
        Err(e) => {
            log::warn!("sign-in-methods lookup failed for {email}: {e}; assuming not registered");
            false
        }
    }
}
