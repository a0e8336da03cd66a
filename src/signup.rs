//! Sign-up / guest-conversion orchestrator.
//!
//! One state machine per attempt:
//!
//!   Idle -> Validating -> CheckingEmail -> Creating -> ProfileWriting
//!        -> [guest origin] Migrating -> Done
//!
//! Validation is local and free; everything after it is an async
//! collaborator call. There is no mid-flight cancellation — abandoning the
//! future is the only "cancel", and the idempotent migration plus the
//! retained profile carry-over make a repeated attempt safe. A failed
//! profile write keeps the created identity on the flow so the next submit
//! re-enters ProfileWriting instead of re-creating the account.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::auth::{email_is_registered, normalize_email, AuthProvider};
use crate::error::{AuthError, AuthErrorKind, StoreError};
use crate::migration::{migrate, MigrationReport};
use crate::models::{GuestContext, Identity, SignupForm};
use crate::provision::{create_identity, write_profile};
use crate::store::DocumentStore;
use crate::validation::{validate, FieldId, RuleId};

/// Where an attempt currently stands. Observational only: the shell polls
/// this for progress copy, it never drives control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SignupPhase {
    Idle,
    Validating,
    CheckingEmail,
    /// Auth record plus display name.
    Creating,
    /// Profile document write; also the entry point when resuming a
    /// half-created account.
    ProfileWriting,
    Migrating,
    Done,
}

/// Terminal outcome of one submit, serialized for the shell bridge.
///
/// Every failure variant maps to exactly one next step: fix the field,
/// sign in instead, follow the recovery suggestion, retry the profile
/// write, or wait for the in-flight attempt.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ConversionOutcome {
    ValidationError {
        field: FieldId,
        rule: RuleId,
        message: String,
    },
    EmailExists,
    AuthError {
        kind: AuthErrorKind,
        message: String,
        #[serde(rename = "canRetry")]
        can_retry: bool,
        #[serde(rename = "recoverySuggestion")]
        recovery_suggestion: String,
    },
    /// The account exists but its profile document does not. Re-submitting
    /// the same email re-runs only the profile write.
    ProfileIncomplete {
        identity: Identity,
        message: String,
        #[serde(rename = "canRetry")]
        can_retry: bool,
    },
    AlreadyInFlight,
    Success {
        identity: Identity,
        #[serde(skip_serializing_if = "Option::is_none")]
        migration: Option<MigrationReport>,
    },
}

impl ConversionOutcome {
    fn auth_error(err: &AuthError) -> Self {
        ConversionOutcome::AuthError {
            kind: err.kind(),
            message: err.to_string(),
            can_retry: err.is_retryable(),
            recovery_suggestion: err.recovery_suggestion().to_string(),
        }
    }
}

/// Carry-over from an attempt that created the account but failed to
/// persist its profile. Keyed on the identity's email: a resubmission for
/// the same address resumes, any other address starts over.
struct PendingProfile {
    identity: Identity,
    password: String,
    guest: Option<GuestContext>,
}

/// One sign-up flow, owned by the sign-up screen for its lifetime.
pub struct SignupFlow {
    auth: Arc<dyn AuthProvider>,
    store: Arc<dyn DocumentStore>,
    in_flight: AtomicBool,
    phase: Mutex<SignupPhase>,
    pending: Mutex<Option<PendingProfile>>,
}

impl SignupFlow {
    pub fn new(auth: Arc<dyn AuthProvider>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            auth,
            store,
            in_flight: AtomicBool::new(false),
            phase: Mutex::new(SignupPhase::Idle),
            pending: Mutex::new(None),
        }
    }

    /// Current phase of the in-flight (or most recent) attempt.
    pub fn phase(&self) -> SignupPhase {
        *self.phase.lock()
    }

    /// Run one sign-up attempt to a terminal outcome.
    ///
    /// At most one attempt runs at a time; a second submit while one is
    /// pending returns `AlreadyInFlight` without touching any collaborator
    /// (a double-tap must not create two accounts).
    pub async fn submit(
        &self,
        form: &SignupForm,
        guest: Option<GuestContext>,
    ) -> ConversionOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return ConversionOutcome::AlreadyInFlight;
        }
        let _guard = InFlightGuard(&self.in_flight);
        self.run_attempt(form, guest).await
    }

    async fn run_attempt(
        &self,
        form: &SignupForm,
        guest: Option<GuestContext>,
    ) -> ConversionOutcome {
        self.set_phase(SignupPhase::Validating);
        if let Err(violation) = validate(form) {
            self.set_phase(SignupPhase::Idle);
            return ConversionOutcome::ValidationError {
                field: violation.field,
                rule: violation.rule,
                message: violation.message(),
            };
        }

        // Re-entry after a failed profile write: the account already exists,
        // so skip the lookup and the create and finish the write.
        if let Some(pending) = self.take_pending_for(&form.email) {
            return self.resume_profile_write(pending).await;
        }

        self.set_phase(SignupPhase::CheckingEmail);
        if email_is_registered(self.auth.as_ref(), &normalize_email(&form.email)).await {
            self.set_phase(SignupPhase::Idle);
            return ConversionOutcome::EmailExists;
        }

        self.set_phase(SignupPhase::Creating);
        let identity = match create_identity(self.auth.as_ref(), form, guest.as_ref()).await {
            Ok(identity) => identity,
            Err(err) => {
                log::warn!("account creation failed: {err}");
                self.set_phase(SignupPhase::Idle);
                return ConversionOutcome::auth_error(&err);
            }
        };

        self.set_phase(SignupPhase::ProfileWriting);
        match write_profile(self.store.as_ref(), &identity, &form.password).await {
            Ok(()) => self.finish(identity, guest).await,
            Err(source) => {
                self.profile_write_failed(identity, form.password.clone(), guest, source)
            }
        }
    }

    async fn resume_profile_write(&self, pending: PendingProfile) -> ConversionOutcome {
        self.set_phase(SignupPhase::ProfileWriting);
        log::info!("retrying profile write for {}", pending.identity.uid);
        match write_profile(self.store.as_ref(), &pending.identity, &pending.password).await {
            Ok(()) => self.finish(pending.identity, pending.guest).await,
            Err(source) => {
                self.profile_write_failed(pending.identity, pending.password, pending.guest, source)
            }
        }
    }

    /// Record the half-created account and report it as such. The identity
    /// is never rolled back; only the profile write is outstanding.
    fn profile_write_failed(
        &self,
        identity: Identity,
        password: String,
        guest: Option<GuestContext>,
        source: StoreError,
    ) -> ConversionOutcome {
        log::warn!(
            "profile write failed for {}: {source}; retaining account for retry",
            identity.uid
        );
        let outcome = ConversionOutcome::ProfileIncomplete {
            identity: identity.clone(),
            message: format!("Your account was created but saving your profile failed: {source}"),
            can_retry: source.is_retryable(),
        };
        *self.pending.lock() = Some(PendingProfile {
            identity,
            password,
            guest,
        });
        self.set_phase(SignupPhase::Idle);
        outcome
    }

    async fn finish(&self, identity: Identity, guest: Option<GuestContext>) -> ConversionOutcome {
        let migration = match &guest {
            Some(g) => {
                self.set_phase(SignupPhase::Migrating);
                Some(migrate(self.store.as_ref(), &identity.uid, &g.username, &g.event_id).await)
            }
            None => None,
        };
        self.set_phase(SignupPhase::Done);
        ConversionOutcome::Success {
            identity,
            migration,
        }
    }

    fn take_pending_for(&self, email: &str) -> Option<PendingProfile> {
        let mut slot = self.pending.lock();
        match slot.take() {
            Some(p) if p.identity.email == normalize_email(email) => Some(p),
            Some(p) => {
                // Different address: that half-created account is abandoned
                // and this attempt starts from scratch.
                log::warn!(
                    "discarding retained profile for {}; sign-up email changed",
                    p.identity.email
                );
                None
            }
            None => None,
        }
    }

    fn set_phase(&self, phase: SignupPhase) {
        *self.phase.lock() = phase;
    }
}

/// Clears the in-flight flag when the attempt ends, however it ends.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
