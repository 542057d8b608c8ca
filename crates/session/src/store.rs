//! Credential persistence — one durable record per identity class, plus the
//! arbitration rule that decides which class is active when both exist.

use console_core::types::{Credential, IdentityClass};
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// Raw synchronous key/value medium beneath the credential store. All
/// operations are total: a fault reads as "absent" and writes are best-effort.
pub trait CredentialMedium: Send + Sync {
    fn read(&self, key: &str) -> Option<String>;
    fn write(&self, key: &str, value: &str);
    fn delete(&self, key: &str);
}

/// File-backed medium: one JSON document per key under a data directory.
pub struct FileMedium {
    dir: PathBuf,
}

impl FileMedium {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        if let Err(e) = std::fs::create_dir_all(&dir) {
            warn!(dir = %dir.display(), error = %e, "Could not create credential directory");
        }
        Self { dir }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl CredentialMedium for FileMedium {
    fn read(&self, key: &str) -> Option<String> {
        std::fs::read_to_string(self.path(key)).ok()
    }

    fn write(&self, key: &str, value: &str) {
        if let Err(e) = std::fs::write(self.path(key), value) {
            warn!(key = %key, error = %e, "Credential write failed");
        }
    }

    fn delete(&self, key: &str) {
        if let Err(e) = std::fs::remove_file(self.path(key)) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(key = %key, error = %e, "Credential delete failed");
            }
        }
    }
}

/// In-memory medium for tests and ephemeral dev runs.
#[derive(Default)]
pub struct MemoryMedium {
    entries: DashMap<String, String>,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialMedium for MemoryMedium {
    fn read(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    fn write(&self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
    }

    fn delete(&self, key: &str) {
        self.entries.remove(key);
    }
}

/// Durable credential persistence, namespaced per identity class. Pure
/// storage plus the tie-break rule; no network or validation logic.
#[derive(Clone)]
pub struct CredentialStore {
    medium: Arc<dyn CredentialMedium>,
}

impl CredentialStore {
    pub fn new(medium: Arc<dyn CredentialMedium>) -> Self {
        Self { medium }
    }

    /// Store backed by JSON files under `dir`.
    pub fn file(dir: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(FileMedium::new(dir)))
    }

    /// Store backed by process memory only.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryMedium::new()))
    }

    fn storage_key(class: IdentityClass) -> &'static str {
        match class {
            IdentityClass::Tenant => "credential.tenant",
            IdentityClass::Platform => "credential.platform",
        }
    }

    /// Overwrite the stored credential for the credential's class.
    pub fn save(&self, credential: &Credential) {
        let json = match serde_json::to_string(credential) {
            Ok(json) => json,
            Err(e) => {
                warn!(class = %credential.class, error = %e, "Credential serialization failed");
                return;
            }
        };
        self.medium.write(Self::storage_key(credential.class), &json);
        debug!(class = %credential.class, subject_id = %credential.subject_id, "Credential saved");
    }

    /// Load the stored credential for `class`, or `None`. A corrupt or
    /// misfiled record reads as absent.
    pub fn load(&self, class: IdentityClass) -> Option<Credential> {
        let raw = self.medium.read(Self::storage_key(class))?;
        let credential: Credential = match serde_json::from_str(&raw) {
            Ok(credential) => credential,
            Err(e) => {
                warn!(class = %class, error = %e, "Stored credential unparseable; treating as absent");
                return None;
            }
        };
        if credential.class != class {
            warn!(expected = %class, found = %credential.class, "Stored credential class mismatch; treating as absent");
            return None;
        }
        Some(credential)
    }

    /// Delete the stored credential for `class`. No-op when absent.
    pub fn clear(&self, class: IdentityClass) {
        self.medium.delete(Self::storage_key(class));
        debug!(class = %class, "Credential cleared");
    }

    /// Delete both classes' credentials.
    pub fn clear_all(&self) {
        for class in IdentityClass::ALL {
            self.clear(class);
        }
    }

    /// The class whose credential governs the console: the one with the
    /// greater `issued_at` when both exist, the sole present class when only
    /// one exists, `None` otherwise. An equal `issued_at` resolves to
    /// Platform, the broader authority.
    pub fn active_class(&self) -> Option<IdentityClass> {
        let tenant = self.load(IdentityClass::Tenant);
        let platform = self.load(IdentityClass::Platform);
        match (tenant, platform) {
            (Some(t), Some(p)) => {
                if p.issued_at >= t.issued_at {
                    Some(IdentityClass::Platform)
                } else {
                    Some(IdentityClass::Tenant)
                }
            }
            (Some(_), None) => Some(IdentityClass::Tenant),
            (None, Some(_)) => Some(IdentityClass::Platform),
            (None, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn credential(class: IdentityClass, issued_at_secs: i64) -> Credential {
        Credential {
            class,
            token: format!("token-{class}-{issued_at_secs}"),
            subject_id: Uuid::new_v4(),
            display_name: "Operator".into(),
            issued_at: Utc.timestamp_opt(issued_at_secs, 0).unwrap(),
        }
    }

    #[test]
    fn test_save_load_round_trip() {
        let store = CredentialStore::in_memory();
        let original = credential(IdentityClass::Tenant, 100);
        store.save(&original);

        let loaded = store.load(IdentityClass::Tenant).unwrap();
        assert_eq!(loaded.token, original.token);
        assert_eq!(loaded.subject_id, original.subject_id);
        assert_eq!(loaded.issued_at, original.issued_at);
        assert!(store.load(IdentityClass::Platform).is_none());
    }

    #[test]
    fn test_save_overwrites_same_class() {
        let store = CredentialStore::in_memory();
        store.save(&credential(IdentityClass::Tenant, 100));
        store.save(&credential(IdentityClass::Tenant, 200));

        let loaded = store.load(IdentityClass::Tenant).unwrap();
        assert_eq!(loaded.issued_at.timestamp(), 200);
    }

    #[test]
    fn test_active_class_prefers_newer() {
        let store = CredentialStore::in_memory();
        store.save(&credential(IdentityClass::Tenant, 50));
        store.save(&credential(IdentityClass::Platform, 200));
        assert_eq!(store.active_class(), Some(IdentityClass::Platform));

        store.save(&credential(IdentityClass::Tenant, 300));
        assert_eq!(store.active_class(), Some(IdentityClass::Tenant));
    }

    #[test]
    fn test_active_class_tie_prefers_platform() {
        let store = CredentialStore::in_memory();
        store.save(&credential(IdentityClass::Tenant, 100));
        store.save(&credential(IdentityClass::Platform, 100));
        assert_eq!(store.active_class(), Some(IdentityClass::Platform));
    }

    #[test]
    fn test_active_class_single_or_none() {
        let store = CredentialStore::in_memory();
        assert_eq!(store.active_class(), None);

        store.save(&credential(IdentityClass::Tenant, 100));
        assert_eq!(store.active_class(), Some(IdentityClass::Tenant));

        store.clear(IdentityClass::Tenant);
        store.save(&credential(IdentityClass::Platform, 1));
        assert_eq!(store.active_class(), Some(IdentityClass::Platform));
    }

    #[test]
    fn test_clear_is_scoped_to_class() {
        let store = CredentialStore::in_memory();
        store.save(&credential(IdentityClass::Tenant, 100));
        store.save(&credential(IdentityClass::Platform, 200));

        store.clear(IdentityClass::Tenant);
        assert!(store.load(IdentityClass::Tenant).is_none());
        assert!(store.load(IdentityClass::Platform).is_some());
    }

    #[test]
    fn test_clear_all() {
        let store = CredentialStore::in_memory();
        store.save(&credential(IdentityClass::Tenant, 100));
        store.save(&credential(IdentityClass::Platform, 200));

        store.clear_all();
        assert_eq!(store.active_class(), None);
    }

    #[test]
    fn test_corrupt_record_reads_as_absent() {
        let medium = Arc::new(MemoryMedium::new());
        medium.write("credential.tenant", "{not json");
        let store = CredentialStore::new(medium);

        assert!(store.load(IdentityClass::Tenant).is_none());
        assert_eq!(store.active_class(), None);
    }

    #[test]
    fn test_misfiled_record_reads_as_absent() {
        let medium = Arc::new(MemoryMedium::new());
        let platform = credential(IdentityClass::Platform, 100);
        medium.write(
            "credential.tenant",
            &serde_json::to_string(&platform).unwrap(),
        );
        let store = CredentialStore::new(medium);

        assert!(store.load(IdentityClass::Tenant).is_none());
    }

    #[test]
    fn test_file_medium_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::file(dir.path());
        store.save(&credential(IdentityClass::Platform, 42));

        // A fresh store over the same directory sees the same record.
        let reopened = CredentialStore::file(dir.path());
        let loaded = reopened.load(IdentityClass::Platform).unwrap();
        assert_eq!(loaded.issued_at.timestamp(), 42);

        reopened.clear(IdentityClass::Platform);
        assert!(store.load(IdentityClass::Platform).is_none());
    }

    #[test]
    fn test_file_medium_delete_absent_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::file(dir.path());
        store.clear(IdentityClass::Tenant);
        assert!(store.load(IdentityClass::Tenant).is_none());
    }
}
