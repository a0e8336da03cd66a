//! In-memory collaborators for development seeding and tests.
//!
//! Behavioral stand-ins for the Firebase adapters: same trait contracts,
//! plus seeding, call counters, and one-shot failure injection so tests can
//! exercise the partial-failure paths the real backend only produces under
//! outage. Not gated to test builds: the dev shell uses these to run the
//! full sign-up flow offline.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;

use crate::auth::{normalize_email, AuthProvider, AuthStateSubscription, AuthUser};
use crate::error::{AuthError, StoreError};
use crate::store::{BatchUpdate, DocRef, Document, DocumentStore, FieldMap, Filter};

// ============================================================================
// Auth
// ============================================================================

/// In-memory `AuthProvider`.
pub struct MemoryAuth {
    accounts: Mutex<Vec<AuthUser>>,
    state_tx: watch::Sender<Option<AuthUser>>,
    fail_create: Mutex<Option<AuthError>>,
    fail_display_name: Mutex<Option<AuthError>>,
    fail_lookup: Mutex<Option<AuthError>>,
    create_calls: AtomicUsize,
    lookup_calls: AtomicUsize,
    calls: AtomicUsize,
}

impl MemoryAuth {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(None);
        Self {
            accounts: Mutex::new(Vec::new()),
            state_tx,
            fail_create: Mutex::new(None),
            fail_display_name: Mutex::new(None),
            fail_lookup: Mutex::new(None),
            create_calls: AtomicUsize::new(0),
            lookup_calls: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    /// Seed an already-registered account, as if it signed up earlier.
    pub fn register_existing(&self, email: &str) {
        self.accounts.lock().push(AuthUser {
            uid: uuid::Uuid::new_v4().to_string(),
            email: normalize_email(email),
            display_name: None,
        });
    }

    /// Make the next `create_account` call fail with `err`.
    pub fn fail_next_create(&self, err: AuthError) {
        *self.fail_create.lock() = Some(err);
    }

    /// Make the next `update_display_name` call fail with `err`.
    pub fn fail_next_display_name(&self, err: AuthError) {
        *self.fail_display_name.lock() = Some(err);
    }

    /// Make the next `sign_in_methods` call fail with `err`.
    pub fn fail_next_lookup(&self, err: AuthError) {
        *self.fail_lookup.lock() = Some(err);
    }

    /// How many times `create_account` was invoked.
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// How many times `sign_in_methods` was invoked.
    pub fn lookup_calls(&self) -> usize {
        self.lookup_calls.load(Ordering::SeqCst)
    }

    /// Total network-shaped calls (create, display name, lookup).
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MemoryAuth {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthProvider for MemoryAuth {
    async fn create_account(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.fail_create.lock().take() {
            return Err(err);
        }
        if password.len() < 6 {
            return Err(AuthError::WeakPassword(
                "Password should be at least 6 characters".into(),
            ));
        }

        let email = normalize_email(email);
        let mut accounts = self.accounts.lock();
        if accounts.iter().any(|a| a.email == email) {
            return Err(AuthError::EmailInUse);
        }
        let user = AuthUser {
            uid: uuid::Uuid::new_v4().to_string(),
            email,
            display_name: None,
        };
        accounts.push(user.clone());
        drop(accounts);

        self.state_tx.send_replace(Some(user.clone()));
        Ok(user)
    }

    async fn update_display_name(&self, uid: &str, display_name: &str) -> Result<(), AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.fail_display_name.lock().take() {
            return Err(err);
        }
        let mut accounts = self.accounts.lock();
        let Some(user) = accounts.iter_mut().find(|a| a.uid == uid) else {
            return Err(AuthError::Unknown(format!("no account with uid {uid}")));
        };
        user.display_name = Some(display_name.to_string());
        let updated = user.clone();
        drop(accounts);

        // Keep the published state in step when it names the same user.
        if self
            .state_tx
            .borrow()
            .as_ref()
            .is_some_and(|current| current.uid == uid)
        {
            self.state_tx.send_replace(Some(updated));
        }
        Ok(())
    }

    async fn sign_in_methods(&self, email: &str) -> Result<Vec<String>, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.fail_lookup.lock().take() {
            return Err(err);
        }
        let email = normalize_email(email);
        let registered = self.accounts.lock().iter().any(|a| a.email == email);
        Ok(if registered {
            vec!["password".to_string()]
        } else {
            Vec::new()
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
// Store
// ============================================================================

type Collections = HashMap<String, BTreeMap<String, FieldMap>>;

/// In-memory `DocumentStore`.
pub struct MemoryStore {
    collections: Mutex<Collections>,
    fail_set: Mutex<Option<StoreError>>,
    fail_query: Mutex<Option<StoreError>>,
    fail_update: Mutex<Option<StoreError>>,
    fail_batch: Mutex<Option<StoreError>>,
    calls: AtomicUsize,
    write_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            collections: Mutex::new(HashMap::new()),
            fail_set: Mutex::new(None),
            fail_query: Mutex::new(None),
            fail_update: Mutex::new(None),
            fail_batch: Mutex::new(None),
            calls: AtomicUsize::new(0),
            write_calls: AtomicUsize::new(0),
        }
    }

    /// Insert a document directly, bypassing the trait and the counters.
    pub fn seed<T: Serialize>(&self, collection: &str, id: &str, value: &T) {
        match crate::store::fields_of(value) {
            Ok(fields) => {
                self.collections
                    .lock()
                    .entry(collection.to_string())
                    .or_default()
                    .insert(id.to_string(), fields);
            }
            Err(e) => log::error!("seed {collection}/{id} skipped: {e}"),
        }
    }

    /// Read a document's fields directly, bypassing the trait.
    pub fn document(&self, collection: &str, id: &str) -> Option<FieldMap> {
        self.collections
            .lock()
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned()
    }

    /// Full copy of every collection, for state-identity assertions.
    pub fn snapshot(&self) -> Collections {
        self.collections.lock().clone()
    }

    /// Make the next `set` call fail with `err`.
    pub fn fail_next_set(&self, err: StoreError) {
        *self.fail_set.lock() = Some(err);
    }

    /// Make the next `query` call fail with `err`.
    pub fn fail_next_query(&self, err: StoreError) {
        *self.fail_query.lock() = Some(err);
    }

    /// Make the next `update` call fail with `err`.
    pub fn fail_next_update(&self, err: StoreError) {
        *self.fail_update.lock() = Some(err);
    }

    /// Make the next `batch_update` call fail with `err`.
    pub fn fail_next_batch(&self, err: StoreError) {
        *self.fail_batch.lock() = Some(err);
    }

    /// Total trait calls of any kind.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Mutating trait calls (set, update, batch).
    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .document(collection, id)
            .map(|fields| Document::new(id, fields)))
    }

    async fn set(
        &self,
        collection: &str,
        id: &str,
        fields: FieldMap,
        merge: bool,
    ) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.fail_set.lock().take() {
            return Err(err);
        }
        let mut collections = self.collections.lock();
        let docs = collections.entry(collection.to_string()).or_default();
        match docs.get_mut(id) {
            Some(existing) if merge => existing.extend(fields),
            _ => {
                docs.insert(id.to_string(), fields);
            }
        }
        Ok(())
    }

    async fn query(&self, collection: &str, filters: &[Filter]) -> Result<Vec<Document>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.fail_query.lock().take() {
            return Err(err);
        }
        let collections = self.collections.lock();
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(docs
            .iter()
            .filter(|(_, fields)| filters.iter().all(|f| f.matches(fields)))
            .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
            .collect())
    }

    async fn update(&self, doc: &DocRef, fields: FieldMap) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.fail_update.lock().take() {
            return Err(err);
        }
        let mut collections = self.collections.lock();
        let existing = collections
            .get_mut(&doc.collection)
            .and_then(|docs| docs.get_mut(&doc.id))
            .ok_or_else(|| StoreError::NotFound(doc.to_string()))?;
        existing.extend(fields);
        Ok(())
    }

    async fn batch_update(&self, writes: Vec<BatchUpdate>) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.fail_batch.lock().take() {
            return Err(err);
        }
        let mut collections = self.collections.lock();
        // All-or-nothing: verify every target before touching any of them.
        for write in &writes {
            let exists = collections
                .get(&write.doc.collection)
                .is_some_and(|docs| docs.contains_key(&write.doc.id));
            if !exists {
                return Err(StoreError::NotFound(write.doc.to_string()));
            }
        }
        for write in writes {
            if let Some(existing) = collections
                .get_mut(&write.doc.collection)
                .and_then(|docs| docs.get_mut(&write.doc.id))
            {
                existing.extend(write.fields);
            }
        }
        Ok(())
    }
}
