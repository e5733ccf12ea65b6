//! Visitor and session identifiers.
//!
//! Ids look like `visitor_1718000000000_k3j9x0a2b`: a prefix, the creation
//! time in unix millis and 9 random base36 characters. They are not
//! cryptographically strong; collisions are acceptable for analytics.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use rand::Rng;

/// Storage key for the visitor id.
pub const VISITOR_KEY: &str = "analytics_visitor";

/// Storage key for the session id.
pub const SESSION_KEY: &str = "analytics_session";

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const RANDOM_LEN: usize = 9;

/// Lifetime of a stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageScope {
    /// Survives restarts (browser local storage).
    Persistent,
    /// Cleared when the session ends (browser tab storage).
    Session,
}

/// Scoped key/value storage supplied by the host.
pub trait KeyValueStorage: Send + Sync {
    fn get(&self, scope: StorageScope, key: &str) -> Option<String>;
    fn set(&self, scope: StorageScope, key: &str, value: &str);
    fn remove(&self, scope: StorageScope, key: &str);
}

/// In-process storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: RwLock<HashMap<(StorageScope, String), String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything in one scope.
    pub fn clear_scope(&self, scope: StorageScope) {
        self.values.write().retain(|(s, _), _| *s != scope);
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, scope: StorageScope, key: &str) -> Option<String> {
        self.values.read().get(&(scope, key.to_string())).cloned()
    }

    fn set(&self, scope: StorageScope, key: &str, value: &str) {
        self.values
            .write()
            .insert((scope, key.to_string()), value.to_string());
    }

    fn remove(&self, scope: StorageScope, key: &str) {
        self.values.write().remove(&(scope, key.to_string()));
    }
}

/// `{prefix}_{unix_millis}_{9 base36 chars}`
pub fn generate_id(prefix: &str) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..RANDOM_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("{}_{}_{}", prefix, Utc::now().timestamp_millis(), suffix)
}

/// Resolves ids from storage, creating them on first use.
///
/// Values are cached per resolver. The visitor id never changes for the
/// lifetime of the resolver; the session id is dropped by
/// [`end_session_scope`](Self::end_session_scope).
pub struct IdentityResolver {
    storage: Arc<dyn KeyValueStorage>,
    visitor_id: OnceLock<String>,
    session_id: Mutex<Option<String>>,
}

impl IdentityResolver {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self {
            storage,
            visitor_id: OnceLock::new(),
            session_id: Mutex::new(None),
        }
    }

    pub fn get_or_create_visitor_id(&self) -> String {
        self.visitor_id
            .get_or_init(|| self.load_or_create(StorageScope::Persistent, VISITOR_KEY, "visitor"))
            .clone()
    }

    pub fn get_or_create_session_id(&self) -> String {
        let mut cached = self.session_id.lock();
        cached
            .get_or_insert_with(|| self.load_or_create(StorageScope::Session, SESSION_KEY, "session"))
            .clone()
    }

    /// End the session scope. The visitor id is kept.
    pub fn end_session_scope(&self) {
        self.storage.remove(StorageScope::Session, SESSION_KEY);
        *self.session_id.lock() = None;
    }

    fn load_or_create(&self, scope: StorageScope, key: &str, prefix: &str) -> String {
        if let Some(existing) = self.storage.get(scope, key).filter(|v| !v.is_empty()) {
            return existing;
        }
        let id = generate_id(prefix);
        self.storage.set(scope, key, &id);
        id
    }
}
