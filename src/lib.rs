//! CrowdPix core: guest-to-member conversion pipeline.
//!
//! Event guests shoot photos under an ephemeral username; when one signs
//! up, this crate validates the form, provisions the account, and re-homes
//! the guest's event membership and photos onto the new identity. The
//! mobile shells link this as a library and drive `SignupFlow`.

pub mod auth;
pub mod config;
pub mod error;
pub mod firebase;
pub mod memory;
pub mod migration;
pub mod models;
pub mod provision;
pub mod signup;
pub mod store;
pub mod validation;

use std::sync::Arc;

pub use signup::{ConversionOutcome, SignupFlow, SignupPhase};

/// Wire a production `SignupFlow` from on-disk configuration.
///
/// Loads ~/.crowdpix/config.json, initializes logging, and connects the
/// Firebase adapters (Firestore reuses the auth session's ID token).
pub fn bootstrap() -> Result<SignupFlow, String> {
    let config = config::load_config()?;
    config::init_logging(Some(&config));

    let auth = Arc::new(
        firebase::FirebaseAuth::new(&config.firebase)
            .map_err(|e| format!("Failed to build auth client: {e}"))?,
    );
    let store = Arc::new(
        firebase::Firestore::new(&config.firebase, Some(auth.clone()))
            .map_err(|e| format!("Failed to build firestore client: {e}"))?,
    );
    log::info!("crowdpix core online (project {})", config.firebase.project_id);
    Ok(SignupFlow::new(auth, store))
}

/// Wire an offline `SignupFlow` over the in-memory collaborators, with a
/// demo guest ("demo-guest" at "demo-event") already seeded. Used by the
/// dev shell and UI previews; no network, no config file.
pub fn bootstrap_offline() -> SignupFlow {
    config::init_logging(None);

    let auth = Arc::new(memory::MemoryAuth::new());
    let store = Arc::new(memory::MemoryStore::new());

    store.seed(
        models::GUESTS_COLLECTION,
        "demo-event_demo-guest",
        &models::GuestParticipation {
            event_id: "demo-event".to_string(),
            username: "demo-guest".to_string(),
            owner_uid: None,
            converted: false,
            converted_at: None,
        },
    );
    for id in ["demo-photo-1", "demo-photo-2"] {
        store.seed(
            models::PHOTOS_COLLECTION,
            id,
            &models::PhotoRecord {
                event_id: "demo-event".to_string(),
                owner_uid: None,
                guest_username: Some("demo-guest".to_string()),
                is_guest: true,
                storage_path: Some(format!("events/demo-event/{id}.jpg")),
                created_at: Some(chrono::Utc::now()),
                converted: false,
                converted_at: None,
            },
        );
    }

    SignupFlow::new(auth, store)
}
