//! Shared handle to the identity bank file with lazy load and atomic reload.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ctr_types::ConfigError;
use parking_lot::RwLock;

use crate::bank::IdentityBank;

/// Lazily loaded, reloadable handle to the bank file.
///
/// Readers get an `Arc` snapshot, so a reload never disturbs requests that
/// already hold the previous bank.
#[derive(Debug)]
pub struct IdentityBankStore {
    path: PathBuf,
    current: RwLock<Option<Arc<IdentityBank>>>,
}

impl IdentityBankStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            current: RwLock::new(None),
        }
    }

    /// Store already holding `bank`; `reload` still reads from `path`.
    pub fn with_bank(path: impl Into<PathBuf>, bank: IdentityBank) -> Self {
        Self {
            path: path.into(),
            current: RwLock::new(Some(Arc::new(bank))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_loaded(&self) -> bool {
        self.current.read().is_some()
    }

    /// Current bank, loading it on first use.
    pub fn get(&self) -> Result<Arc<IdentityBank>, ConfigError> {
        if let Some(bank) = self.current.read().as_ref() {
            return Ok(Arc::clone(bank));
        }

        let mut slot = self.current.write();
        // Another caller may have loaded it while we waited for the lock.
        if let Some(bank) = slot.as_ref() {
            return Ok(Arc::clone(bank));
        }
        let bank = Arc::new(IdentityBank::from_path(&self.path)?);
        tracing::info!(path = %self.path.display(), categories = bank.len(), "identity bank loaded");
        *slot = Some(Arc::clone(&bank));
        Ok(bank)
    }

    /// Re-read the file. On failure the previous bank stays active.
    pub fn reload(&self) -> Result<Arc<IdentityBank>, ConfigError> {
        let bank = match IdentityBank::from_path(&self.path) {
            Ok(bank) => Arc::new(bank),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "identity bank reload failed");
                return Err(e);
            }
        };
        *self.current.write() = Some(Arc::clone(&bank));
        tracing::info!(path = %self.path.display(), categories = bank.len(), "identity bank reloaded");
        Ok(bank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const ONE: &str = r#"{"categories": {"age": {"values": ["young", "old"]}}}"#;
    const TWO: &str = r#"{"categories": {"age": {"values": ["young"]}, "region": {"values": ["West"]}}}"#;

    fn write_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_lazy_load() {
        let file = write_file(ONE);
        let store = IdentityBankStore::new(file.path());
        assert!(!store.is_loaded());
        let bank = store.get().unwrap();
        assert_eq!(bank.len(), 1);
        assert!(store.is_loaded());
        assert!(Arc::ptr_eq(&bank, &store.get().unwrap()));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let store = IdentityBankStore::new("/definitely/not/here.json");
        assert!(matches!(store.get(), Err(ConfigError::BankIo { .. })));
    }

    #[test]
    fn test_reload_picks_up_changes() {
        let file = write_file(ONE);
        let store = IdentityBankStore::new(file.path());
        let before = store.get().unwrap();

        std::fs::write(file.path(), TWO).unwrap();
        let after = store.reload().unwrap();

        assert_eq!(before.len(), 1);
        assert_eq!(after.len(), 2);
        assert_eq!(store.get().unwrap().len(), 2);
    }

    #[test]
    fn test_failed_reload_keeps_previous_bank() {
        let file = write_file(ONE);
        let store = IdentityBankStore::new(file.path());
        store.get().unwrap();

        std::fs::write(file.path(), "{ broken").unwrap();
        assert!(matches!(store.reload(), Err(ConfigError::BankParse(_))));
        assert_eq!(store.get().unwrap().len(), 1);
    }
}
