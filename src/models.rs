//! Persisted record shapes for the sign-up / guest-conversion pipeline.
//!
//! Three collections are touched by this subsystem:
//!   users/{uid}          — profile document, written once per account
//!   eventGuests/{id}     — guest membership, one per (event, username)
//!   photos/{id}          — uploaded photos, guest-pending or claimed
//!
//! All shapes serialize camelCase so the document store and the app shell
//! see identical field names. Events are referenced by id only; their
//! lifecycle belongs to the event service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Collection holding one profile document per registered account.
pub const USERS_COLLECTION: &str = "users";
/// Collection holding guest membership records, keyed by (eventId, username).
pub const GUESTS_COLLECTION: &str = "eventGuests";
/// Collection holding photo records for all events.
pub const PHOTOS_COLLECTION: &str = "photos";

/// A permanent registered account.
///
/// Created exactly once by the provisioner and never deleted by this
/// subsystem. When the sign-up originated from a guest context the
/// conversion fields record which guest username it absorbed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Auth-provider user id; doubles as the profile document id.
    pub uid: String,
    /// Lower-cased, trimmed email. Unique across accounts.
    pub email: String,
    /// "<first> <last>" as entered, trimmed.
    pub display_name: String,
    pub address: String,
    pub created_at: DateTime<Utc>,
    pub profile_completed: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub converted_from_guest: bool,
    /// Guest username this account was converted from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guest_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converted_at: Option<DateTime<Utc>>,
}

/// Guest membership in a single event.
///
/// The username is unique only within its event. `owner_uid` stays empty
/// while the participant is a guest; conversion attaches it exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestParticipation {
    pub event_id: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_uid: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub converted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converted_at: Option<DateTime<Utc>>,
}

impl GuestParticipation {
    /// True while no permanent account has claimed this membership.
    ///
    /// The migration engine only writes when this holds; a present owner
    /// means a prior conversion already ran and must not be overwritten.
    pub fn is_unclaimed(&self) -> bool {
        self.owner_uid.is_none()
    }
}

/// One uploaded photo.
///
/// Ownership is either "claimed" (owner_uid set, `is_guest` false) or
/// "guest-pending" (`is_guest` true, guest_username set), never both
/// active at once. After conversion the guest username is kept as
/// provenance, but `is_guest=false` marks it inert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoRecord {
    pub event_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guest_username: Option<String>,
    pub is_guest: bool,
    /// Path of the stored image within the photo storage backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub converted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converted_at: Option<DateTime<Utc>>,
}

impl PhotoRecord {
    /// A permanent account owns this photo.
    pub fn is_claimed(&self) -> bool {
        !self.is_guest && self.owner_uid.is_some()
    }

    /// Ownership is attributed to a guest username, awaiting conversion.
    pub fn is_guest_pending(&self) -> bool {
        self.is_guest && self.guest_username.is_some()
    }

    /// Exactly one ownership mode is active: an owner reference, or a
    /// pending guest attribution. A record showing both (or neither) is
    /// corrupt.
    pub fn ownership_consistent(&self) -> bool {
        self.owner_uid.is_some() != self.is_guest_pending()
    }
}

/// Raw sign-up form fields as entered in the shell.
///
/// Untrimmed and unvalidated; `validation::validate` gates every submit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupForm {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub address: String,
    pub password: String,
    pub confirm_password: String,
}

impl SignupForm {
    /// Display name persisted on the identity: "<first> <last>", trimmed.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
    }
}

/// The guest the sign-up is converting, when the flow started from an
/// event the user had joined without an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestContext {
    pub event_id: String,
    pub username: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guest_photo() -> PhotoRecord {
        PhotoRecord {
            event_id: "evt1".into(),
            owner_uid: None,
            guest_username: Some("bob123".into()),
            is_guest: true,
            storage_path: Some("events/evt1/photos/p1.jpg".into()),
            created_at: Some(Utc::now()),
            converted: false,
            converted_at: None,
        }
    }

    #[test]
    fn test_photo_ownership_modes_are_exclusive() {
        let pending = guest_photo();
        assert!(pending.is_guest_pending());
        assert!(!pending.is_claimed());
        assert!(pending.ownership_consistent());

        let mut claimed = guest_photo();
        claimed.owner_uid = Some("uid-1".into());
        claimed.is_guest = false;
        claimed.converted = true;
        assert!(claimed.is_claimed());
        assert!(!claimed.is_guest_pending());
        assert!(claimed.ownership_consistent());
    }

    #[test]
    fn test_photo_both_modes_active_is_inconsistent() {
        let mut photo = guest_photo();
        // owner attached without clearing the guest flag
        photo.owner_uid = Some("uid-1".into());
        assert!(!photo.ownership_consistent());
    }

    #[test]
    fn test_photo_with_neither_mode_is_inconsistent() {
        let mut photo = guest_photo();
        photo.owner_uid = None;
        photo.guest_username = None;
        photo.is_guest = false;
        assert!(!photo.ownership_consistent());
    }

    #[test]
    fn test_identity_serializes_camel_case() {
        let identity = Identity {
            uid: "uid-1".into(),
            email: "a@b.com".into(),
            display_name: "Ada Lovelace".into(),
            address: "12 Analytical Row".into(),
            created_at: Utc::now(),
            profile_completed: true,
            converted_from_guest: true,
            guest_username: Some("bob123".into()),
            converted_at: Some(Utc::now()),
        };

        let value = serde_json::to_value(&identity).unwrap();
        assert_eq!(value["displayName"], "Ada Lovelace");
        assert_eq!(value["profileCompleted"], true);
        assert_eq!(value["convertedFromGuest"], true);
        assert_eq!(value["guestUsername"], "bob123");
        // No password on the identity shape itself
        assert!(value.get("password").is_none());
    }

    #[test]
    fn test_identity_conversion_fields_omitted_for_direct_signups() {
        let identity = Identity {
            uid: "uid-2".into(),
            email: "c@d.com".into(),
            display_name: "Direct User".into(),
            address: "1 Main St".into(),
            created_at: Utc::now(),
            profile_completed: true,
            converted_from_guest: false,
            guest_username: None,
            converted_at: None,
        };

        let value = serde_json::to_value(&identity).unwrap();
        assert!(value.get("convertedFromGuest").is_none());
        assert!(value.get("guestUsername").is_none());
        assert!(value.get("convertedAt").is_none());
    }

    #[test]
    fn test_guest_participation_unclaimed_until_owner_attached() {
        let mut membership = GuestParticipation {
            event_id: "evt1".into(),
            username: "bob123".into(),
            owner_uid: None,
            converted: false,
            converted_at: None,
        };
        assert!(membership.is_unclaimed());

        membership.owner_uid = Some("uid-1".into());
        assert!(!membership.is_unclaimed());
    }

    #[test]
    fn test_display_name_trims_fields() {
        let form = SignupForm {
            first_name: "  Ada ".into(),
            last_name: " Lovelace  ".into(),
            email: "a@b.com".into(),
            address: "12 Analytical Row".into(),
            password: "Passw0rd!".into(),
            confirm_password: "Passw0rd!".into(),
        };
        assert_eq!(form.display_name(), "Ada Lovelace");
    }
}
