//! Guest-to-account record migration.
//!
//! Runs only after the account exists, and must neither undo nor block it:
//! every failure is downgraded into the report. Two independent legs:
//!
//!   1. the (event, username) membership record — one conditional update,
//!      skipped when an owner is already attached (a retried migration must
//!      not overwrite a different identity)
//!   2. the guest's photos — one all-or-nothing batch flipping each from
//!      guest-pending to claimed
//!
//! The report is telemetry, not control flow; sign-up succeeds regardless.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::models::{GuestParticipation, GUESTS_COLLECTION, PHOTOS_COLLECTION};
use crate::store::{self, BatchUpdate, DocRef, DocumentStore, FieldMap, Filter};

/// What the migration did, for logging and telemetry.
///
/// `photos_updated` means a batch actually committed; with zero matches
/// there is nothing to commit and it stays false. `errors` keeps store
/// failures visible; without it a failed photo query is indistinguishable
/// from "guest had no photos".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub membership_updated: bool,
    pub photos_matched: usize,
    pub photos_updated: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl MigrationReport {
    /// True when every leg either succeeded or had nothing to do.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Re-point the guest's records at a newly created identity.
///
/// Never returns an error; partial outcomes land in the report.
pub async fn migrate(
    store: &dyn DocumentStore,
    new_uid: &str,
    guest_username: &str,
    event_id: &str,
) -> MigrationReport {
    let mut report = MigrationReport::default();
    let now = Utc::now();

    migrate_membership(store, new_uid, guest_username, event_id, &now, &mut report).await;
    migrate_photos(store, new_uid, guest_username, event_id, &now, &mut report).await;

    log::info!(
        "guest migration for {guest_username}@{event_id} -> {new_uid}: \
         membership_updated={}, photos_matched={}, photos_updated={}, errors={}",
        report.membership_updated,
        report.photos_matched,
        report.photos_updated,
        report.errors.len()
    );
    report
}

async fn migrate_membership(
    store: &dyn DocumentStore,
    new_uid: &str,
    guest_username: &str,
    event_id: &str,
    now: &chrono::DateTime<Utc>,
    report: &mut MigrationReport,
) {
    let filters = [
        Filter::eq("eventId", event_id),
        Filter::eq("username", guest_username),
    ];
    let docs = match store.query(GUESTS_COLLECTION, &filters).await {
        Ok(docs) => docs,
        Err(e) => {
            report.errors.push(format!("membership query failed: {e}"));
            return;
        }
    };

    // (event, username) keys at most one record; tolerate stray duplicates
    // by only ever touching the first.
    if docs.len() > 1 {
        log::warn!(
            "{} membership records for {guest_username}@{event_id}; updating the first",
            docs.len()
        );
    }
    let Some(doc) = docs.into_iter().next() else {
        log::info!("no membership record for {guest_username}@{event_id}");
        return;
    };

    let membership: GuestParticipation = match store::parse_doc(&doc) {
        Ok(m) => m,
        Err(e) => {
            report.errors.push(format!("membership record malformed: {e}"));
            return;
        }
    };

    if !membership.is_unclaimed() {
        // Already converted — a retry must not re-point it.
        log::info!(
            "membership {guest_username}@{event_id} already owned by {:?}; skipping",
            membership.owner_uid
        );
        return;
    }

    let mut fields = FieldMap::new();
    fields.insert("ownerUid".into(), json!(new_uid));
    fields.insert("converted".into(), json!(true));
    fields.insert("convertedAt".into(), json!(now));

    match store.update(&DocRef::new(GUESTS_COLLECTION, doc.id), fields).await {
        Ok(()) => report.membership_updated = true,
        Err(e) => report.errors.push(format!("membership update failed: {e}")),
    }
}

async fn migrate_photos(
    store: &dyn DocumentStore,
    new_uid: &str,
    guest_username: &str,
    event_id: &str,
    now: &chrono::DateTime<Utc>,
    report: &mut MigrationReport,
) {
    let filters = [
        Filter::eq("eventId", event_id),
        Filter::eq("guestUsername", guest_username),
        Filter::eq("isGuest", true),
    ];
    let docs = match store.query(PHOTOS_COLLECTION, &filters).await {
        Ok(docs) => docs,
        Err(e) => {
            report.errors.push(format!("photo query failed: {e}"));
            return;
        }
    };

    report.photos_matched = docs.len();
    if docs.is_empty() {
        return;
    }

    let writes: Vec<BatchUpdate> = docs
        .into_iter()
        .map(|doc| {
            let mut fields = FieldMap::new();
            fields.insert("ownerUid".into(), json!(new_uid));
            fields.insert("isGuest".into(), json!(false));
            fields.insert("converted".into(), json!(true));
            fields.insert("convertedAt".into(), json!(now));
            BatchUpdate::new(DocRef::new(PHOTOS_COLLECTION, doc.id), fields)
        })
        .collect();

    let intended = writes.len();
    match store.batch_update(writes).await {
        Ok(()) => report.photos_updated = true,
        Err(e) => {
            // The batch is atomic: on failure zero of the intended writes
            // were committed.
            report.errors.push(format!(
                "photo batch failed ({intended} intended, 0 confirmed): {e}"
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::memory::MemoryStore;
    use crate::models::PhotoRecord;
    use crate::store::parse_doc;
    use crate::store::Document;

    fn membership(owner: Option<&str>) -> GuestParticipation {
        GuestParticipation {
            event_id: "evt1".into(),
            username: "bob123".into(),
            owner_uid: owner.map(String::from),
            converted: owner.is_some(),
            converted_at: None,
        }
    }

    fn guest_photo(event_id: &str, username: &str) -> PhotoRecord {
        PhotoRecord {
            event_id: event_id.into(),
            owner_uid: None,
            guest_username: Some(username.into()),
            is_guest: true,
            storage_path: None,
            created_at: None,
            converted: false,
            converted_at: None,
        }
    }

    fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        store.seed(GUESTS_COLLECTION, "evt1_bob123", &membership(None));
        store.seed(PHOTOS_COLLECTION, "p1", &guest_photo("evt1", "bob123"));
        store.seed(PHOTOS_COLLECTION, "p2", &guest_photo("evt1", "bob123"));
        // Noise: another guest, another event, and an already-claimed photo
        store.seed(PHOTOS_COLLECTION, "p3", &guest_photo("evt1", "carol7"));
        store.seed(PHOTOS_COLLECTION, "p4", &guest_photo("evt2", "bob123"));
        let claimed = PhotoRecord {
            owner_uid: Some("uid-other".into()),
            guest_username: None,
            is_guest: false,
            ..guest_photo("evt1", "bob123")
        };
        store.seed(PHOTOS_COLLECTION, "p5", &claimed);
        store
    }

    fn photo(store: &MemoryStore, id: &str) -> PhotoRecord {
        let fields = store.document(PHOTOS_COLLECTION, id).unwrap();
        parse_doc(&Document::new(id, fields)).unwrap()
    }

    #[tokio::test]
    async fn test_migrate_repoints_membership_and_photos() {
        let store = seeded_store();

        let report = migrate(&store, "uid-new", "bob123", "evt1").await;

        assert!(report.membership_updated);
        assert_eq!(report.photos_matched, 2);
        assert!(report.photos_updated);
        assert!(report.is_clean());

        let fields = store.document(GUESTS_COLLECTION, "evt1_bob123").unwrap();
        let m: GuestParticipation = parse_doc(&Document::new("evt1_bob123", fields)).unwrap();
        assert_eq!(m.owner_uid.as_deref(), Some("uid-new"));
        assert!(m.converted);
        assert!(m.converted_at.is_some());

        for id in ["p1", "p2"] {
            let p = photo(&store, id);
            assert_eq!(p.owner_uid.as_deref(), Some("uid-new"));
            assert!(!p.is_guest);
            assert!(p.converted);
            assert!(p.is_claimed());
            assert!(p.ownership_consistent());
        }

        // Untouched: other guest, other event, already-claimed
        assert!(photo(&store, "p3").is_guest_pending());
        assert!(photo(&store, "p4").is_guest_pending());
        assert_eq!(photo(&store, "p5").owner_uid.as_deref(), Some("uid-other"));
    }

    #[tokio::test]
    async fn test_migrate_twice_is_idempotent() {
        let store = seeded_store();

        let first = migrate(&store, "uid-new", "bob123", "evt1").await;
        let snapshot = store.snapshot();

        let second = migrate(&store, "uid-new", "bob123", "evt1").await;

        assert!(first.membership_updated);
        // Second run finds everything already converted
        assert!(!second.membership_updated);
        assert_eq!(second.photos_matched, 0);
        assert!(!second.photos_updated);
        assert!(second.is_clean());
        // Store state is byte-identical to after the first run
        assert_eq!(store.snapshot(), snapshot);
    }

    #[tokio::test]
    async fn test_membership_with_existing_owner_is_never_overwritten() {
        let store = MemoryStore::new();
        store.seed(GUESTS_COLLECTION, "evt1_bob123", &membership(Some("uid-first")));

        let report = migrate(&store, "uid-second", "bob123", "evt1").await;

        assert!(!report.membership_updated);
        assert!(report.is_clean());
        let fields = store.document(GUESTS_COLLECTION, "evt1_bob123").unwrap();
        let m: GuestParticipation = parse_doc(&Document::new("evt1_bob123", fields)).unwrap();
        assert_eq!(m.owner_uid.as_deref(), Some("uid-first"));
    }

    #[tokio::test]
    async fn test_replay_under_different_uid_never_repoints_claimed_rows() {
        let store = seeded_store();
        let first = migrate(&store, "uid-first", "bob123", "evt1").await;
        assert!(first.is_clean());

        let second = migrate(&store, "uid-second", "bob123", "evt1").await;

        // Everything already belongs to uid-first; the replay finds nothing
        assert!(!second.membership_updated);
        assert_eq!(second.photos_matched, 0);
        assert!(second.is_clean());

        let fields = store.document(GUESTS_COLLECTION, "evt1_bob123").unwrap();
        let m: GuestParticipation = parse_doc(&Document::new("evt1_bob123", fields)).unwrap();
        assert_eq!(m.owner_uid.as_deref(), Some("uid-first"));
        for id in ["p1", "p2"] {
            let p = photo(&store, id);
            assert_eq!(p.owner_uid.as_deref(), Some("uid-first"));
            assert!(p.ownership_consistent());
        }
    }

    #[tokio::test]
    async fn test_missing_membership_is_not_an_error() {
        let store = MemoryStore::new();
        store.seed(PHOTOS_COLLECTION, "p1", &guest_photo("evt1", "bob123"));

        let report = migrate(&store, "uid-new", "bob123", "evt1").await;

        assert!(!report.membership_updated);
        assert_eq!(report.photos_matched, 1);
        assert!(report.photos_updated);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_batch_failure_commits_nothing_and_is_reported() {
        let store = seeded_store();
        store.fail_next_batch(StoreError::Network("offline".into()));

        let report = migrate(&store, "uid-new", "bob123", "evt1").await;

        // Membership leg is independent and still lands
        assert!(report.membership_updated);
        assert_eq!(report.photos_matched, 2);
        assert!(!report.photos_updated);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("2 intended, 0 confirmed"));

        // Atomic: neither photo changed
        assert!(photo(&store, "p1").is_guest_pending());
        assert!(photo(&store, "p2").is_guest_pending());
    }

    #[tokio::test]
    async fn test_query_failure_is_visible_in_report() {
        let store = seeded_store();
        store.fail_next_query(StoreError::Network("reset".into()));

        let report = migrate(&store, "uid-new", "bob123", "evt1").await;

        // First query (membership) failed; the photo leg still ran
        assert!(!report.membership_updated);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("membership query failed"));
        assert_eq!(report.photos_matched, 2);
        assert!(report.photos_updated);
    }
}
