//! Firebase Identity Toolkit v1 adapter.
//!
//! REST equivalents of the SDK calls the sign-up flow needs: sign-up,
//! display-name update, registered-methods lookup. Holds the session
//! minted by sign-up and refreshes its ID token through the secure-token
//! endpoint when it nears expiry; the Firestore adapter borrows that
//! token for its Authorization header.
//!
//! Identity Toolkit reports failures as an `error.message` code string
//! (`EMAIL_EXISTS`, `WEAK_PASSWORD : ...`); `map_api_message` folds those
//! onto `AuthError` so callers never see wire codes.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::watch;
use url::Url;

use super::{api_error, send_with_retry, FirebaseError, RetryPolicy};
use crate::auth::{AuthProvider, AuthStateSubscription, AuthUser};
use crate::config::FirebaseConfig;
use crate::error::AuthError;

const IDENTITY_BASE: &str = "https://identitytoolkit.googleapis.com/v1";
const TOKEN_BASE: &str = "https://securetoken.googleapis.com/v1";

/// Seconds before actual expiry at which a token counts as expired.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Tokens minted by sign-up, kept for follow-up calls.
#[derive(Debug, Clone)]
struct Session {
    uid: String,
    id_token: String,
    refresh_token: String,
    expires_at: DateTime<Utc>,
}

impl Session {
    fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now() + chrono::Duration::seconds(EXPIRY_MARGIN_SECS)
    }
}

/// Identity Toolkit client implementing `AuthProvider`.
pub struct FirebaseAuth {
    client: reqwest::Client,
    identity_base: Url,
    token_base: Url,
    api_key: String,
    retry: RetryPolicy,
    session: RwLock<Option<Session>>,
    state_tx: watch::Sender<Option<AuthUser>>,
}

impl FirebaseAuth {
    pub fn new(config: &FirebaseConfig) -> Result<Self, FirebaseError> {
        let (identity_base, token_base) = match &config.auth_emulator_host {
            Some(host) => (
                Url::parse(&format!("http://{host}/identitytoolkit.googleapis.com/v1"))?,
                Url::parse(&format!("http://{host}/securetoken.googleapis.com/v1"))?,
            ),
            None => (Url::parse(IDENTITY_BASE)?, Url::parse(TOKEN_BASE)?),
        };
        let (state_tx, _) = watch::channel(None);
        Ok(Self {
            client: reqwest::Client::new(),
            identity_base,
            token_base,
            api_key: config.api_key.clone(),
            retry: RetryPolicy::default(),
            session: RwLock::new(None),
            state_tx,
        })
    }

    fn identity_endpoint(&self, action: &str) -> Result<Url, FirebaseError> {
        let mut url = Url::parse(&format!("{}/accounts:{action}", self.identity_base))?;
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }

    fn token_endpoint(&self) -> Result<Url, FirebaseError> {
        let mut url = Url::parse(&format!("{}/token", self.token_base))?;
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }

    async fn post<T: DeserializeOwned>(
        &self,
        url: Url,
        body: serde_json::Value,
    ) -> Result<T, FirebaseError> {
        let response = send_with_retry(self.client.post(url).json(&body), &self.retry).await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        response
            .json::<T>()
            .await
            .map_err(|e| FirebaseError::UnexpectedResponse(e.to_string()))
    }

    /// A valid ID token for the signed-in user, refreshing if needed.
    async fn session_token(&self) -> Result<String, AuthError> {
        let session = self.session.read().clone();
        let Some(session) = session else {
            return Err(AuthError::Unknown("no active session".to_string()));
        };
        if !session.is_expired() {
            return Ok(session.id_token);
        }
        self.refresh_session(session).await
    }

    async fn refresh_session(&self, stale: Session) -> Result<String, AuthError> {
        let url = self.token_endpoint().map_err(map_auth_error)?;
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", stale.refresh_token.as_str()),
        ];
        let response = send_with_retry(self.client.post(url).form(&form), &self.retry)
            .await
            .map_err(map_auth_error)?;
        if !response.status().is_success() {
            return Err(map_auth_error(api_error(response).await));
        }
        let refreshed: RefreshResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Unknown(format!("unexpected refresh response: {e}")))?;

        let expires_in = refreshed.expires_in.parse::<i64>().unwrap_or(3600);
        let session = Session {
            uid: refreshed.user_id,
            id_token: refreshed.id_token,
            refresh_token: refreshed.refresh_token,
            expires_at: Utc::now() + chrono::Duration::seconds(expires_in),
        };
        let token = session.id_token.clone();
        log::info!("refreshed session for {}", session.uid);
        *self.session.write() = Some(session);
        Ok(token)
    }

    /// Bearer token for Firestore requests, `None` when nobody is signed in
    /// or the refresh failed (the request then fails visibly downstream).
    pub(crate) async fn bearer_token(&self) -> Option<String> {
        match self.session_token().await {
            Ok(token) => Some(token),
            Err(e) => {
                log::warn!("no bearer token available: {e}");
                None
            }
        }
    }
}

#[async_trait::async_trait]
impl AuthProvider for FirebaseAuth {
    async fn create_account(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        let url = self.identity_endpoint("signUp").map_err(map_auth_error)?;
        let body = json!({
            "email": email,
            "password": password,
            "returnSecureToken": true,
        });
        let created: SignUpResponse = self.post(url, body).await.map_err(map_auth_error)?;

        let expires_in = created.expires_in.parse::<i64>().unwrap_or(3600);
        let user = AuthUser {
            uid: created.local_id.clone(),
            email: created.email,
            display_name: None,
        };
        *self.session.write() = Some(Session {
            uid: created.local_id,
            id_token: created.id_token,
            refresh_token: created.refresh_token,
            expires_at: Utc::now() + chrono::Duration::seconds(expires_in),
        });
        self.state_tx.send_replace(Some(user.clone()));
        log::info!("created account {} ({})", user.uid, user.email);
        Ok(user)
    }

    async fn update_display_name(&self, uid: &str, display_name: &str) -> Result<(), AuthError> {
        {
            let session = self.session.read();
            match session.as_ref() {
                Some(s) if s.uid == uid => {}
                _ => {
                    return Err(AuthError::Unknown(format!(
                        "no active session for uid {uid}"
                    )))
                }
            }
        }
        let id_token = self.session_token().await?;

        let url = self.identity_endpoint("update").map_err(map_auth_error)?;
        let body = json!({
            "idToken": id_token,
            "displayName": display_name,
            "returnSecureToken": false,
        });
        let _: serde_json::Value = self.post(url, body).await.map_err(map_auth_error)?;

        // Reflect the change in the published auth state.
        let current = self.state_tx.borrow().clone();
        if let Some(mut user) = current.filter(|u| u.uid == uid) {
            user.display_name = Some(display_name.to_string());
            self.state_tx.send_replace(Some(user));
        }
        Ok(())
    }

    async fn sign_in_methods(&self, email: &str) -> Result<Vec<String>, AuthError> {
        let url = self.identity_endpoint("createAuthUri").map_err(map_auth_error)?;
        let body = json!({
            "identifier": email,
            "continueUri": "http://localhost",
        });
        let response: CreateAuthUriResponse = self.post(url, body).await.map_err(map_auth_error)?;

        if !response.registered {
            return Ok(Vec::new());
        }
        Ok(if response.signin_methods.is_empty() {
            response.all_providers
        } else {
            response.signin_methods
        })
    }

    fn current_user(&self) -> Option<AuthUser> {
        self.state_tx.borrow().clone()
    }

    fn subscribe(&self) -> AuthStateSubscription {
        AuthStateSubscription::new(self.state_tx.subscribe())
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignUpResponse {
    local_id: String,
    id_token: String,
    refresh_token: String,
    email: String,
    /// Lifetime in seconds; the API serializes this as a string.
    expires_in: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CreateAuthUriResponse {
    registered: bool,
    signin_methods: Vec<String>,
    all_providers: Vec<String>,
}

/// Secure-token response. This endpoint uses snake_case keys, unlike the
/// rest of Identity Toolkit.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    user_id: String,
    expires_in: String,
}

// ============================================================================
// Error mapping
// ============================================================================

fn map_auth_error(err: FirebaseError) -> AuthError {
    match err {
        FirebaseError::Api { status, message } => map_api_message(status, &message),
        FirebaseError::Http(e) => AuthError::Network(e.to_string()),
        other => AuthError::Unknown(other.to_string()),
    }
}

/// Fold an Identity Toolkit error message onto `AuthError`.
///
/// The message is a reason code, optionally followed by detail:
/// `"WEAK_PASSWORD : Password should be at least 6 characters"`.
fn map_api_message(status: u16, message: &str) -> AuthError {
    let code = message.split(':').next().unwrap_or_default().trim();
    let detail = message.split_once(':').map(|(_, rest)| rest.trim());
    match code {
        "EMAIL_EXISTS" => AuthError::EmailInUse,
        "WEAK_PASSWORD" | "MISSING_PASSWORD" => {
            AuthError::WeakPassword(detail.unwrap_or("Password rejected").to_string())
        }
        "INVALID_EMAIL" | "MISSING_EMAIL" => AuthError::InvalidEmail,
        "TOO_MANY_ATTEMPTS_TRY_LATER" => AuthError::TooManyRequests,
        _ if status >= 500 => AuthError::Network(format!("HTTP {status}: {message}")),
        _ => AuthError::Unknown(format!("HTTP {status}: {message}")),
    }
}
