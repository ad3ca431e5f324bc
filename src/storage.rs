//! Pending-login redirect state
//!
//! A login redirect takes the user away from the application. The path they
//! were heading to is written here before leaving and picked up once on the
//! next start, so navigation resumes where it stopped.

use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::{Error, Result};

/// A login that has been started but not yet come back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingLogin {
    /// Application path to return to
    pub return_path: String,

    /// When the redirect was issued (Unix timestamp)
    #[serde(default)]
    pub started_at: u64,
}

impl PendingLogin {
    /// Pending login for `return_path`, stamped now
    #[must_use]
    pub fn new(return_path: impl Into<String>) -> Self {
        Self {
            return_path: return_path.into(),
            started_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }
}

/// File-backed store for [`PendingLogin`] records, one per realm + client
pub struct RedirectStore {
    base_dir: PathBuf,
}

impl RedirectStore {
    /// Store rooted at `base_dir`, created if missing
    pub fn new(base_dir: PathBuf) -> Result<Self> {
        if !base_dir.exists() {
            fs::create_dir_all(&base_dir)?;
        }

        Ok(Self { base_dir })
    }

    /// Store in the default location (`~/.storefront-auth/redirect`)
    pub fn default_location() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Internal("Cannot determine home directory".to_string()))?;

        Self::new(home.join(".storefront-auth").join("redirect"))
    }

    fn record_path(&self, realm: &str, client_id: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(realm.as_bytes());
        hasher.update(b":");
        hasher.update(client_id.as_bytes());
        let hash = hasher.finalize();
        let key: String = hash[..8].iter().map(|b| format!("{b:02x}")).collect();
        self.base_dir.join(format!("{key}_pending.json"))
    }

    /// Remember `pending` for the realm/client pair
    pub fn save(&self, realm: &str, client_id: &str, pending: &PendingLogin) -> Result<()> {
        let path = self.record_path(realm, client_id);
        let content = serde_json::to_string_pretty(pending)?;

        fs::write(&path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&path, fs::Permissions::from_mode(0o600));
        }

        debug!(realm = %realm, return_path = %pending.return_path, "Saved pending login");
        Ok(())
    }

    /// Load and remove the pending login, if any.
    ///
    /// Unreadable records are logged, removed, and reported as absent.
    pub fn take(&self, realm: &str, client_id: &str) -> Option<PendingLogin> {
        let path = self.record_path(realm, client_id);
        if !path.exists() {
            return None;
        }

        let pending = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<PendingLogin>(&content) {
                Ok(pending) => Some(pending),
                Err(e) => {
                    warn!(realm = %realm, error = %e, "Failed to parse pending login");
                    None
                }
            },
            Err(e) => {
                warn!(realm = %realm, error = %e, "Failed to read pending login");
                None
            }
        };

        if let Err(e) = fs::remove_file(&path) {
            warn!(realm = %realm, error = %e, "Failed to remove pending login");
        }
        if let Some(ref p) = pending {
            info!(realm = %realm, return_path = %p.return_path, "Resuming after login");
        }
        pending
    }
}
