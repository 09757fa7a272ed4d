//! Saved rendezvous identity.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use stream_types::PeerId;

const IDENTITY_FILE: &str = "identity.json";

/// Saved identities longer than this predate the short-id scheme.
const LEGACY_ID_LEN: usize = 8;

/// Identity stored locally so a peer keeps the same id across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    /// Rendezvous identity.
    pub peer_id: String,
    /// When the identity was first claimed.
    pub created_at: u64,
}

impl Identity {
    /// Create a record for `id`.
    pub fn new(id: &PeerId) -> Self {
        Self {
            peer_id: id.as_str().to_string(),
            created_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        }
    }

    /// Load the saved identity, if there is a usable one.
    ///
    /// Legacy ids and unparseable ids are ignored.
    pub async fn load(data_dir: &Path) -> Result<Option<PeerId>> {
        let path = data_dir.join(IDENTITY_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let contents = tokio::fs::read_to_string(&path)
            .await
            .context("Failed to read identity")?;
        let saved: Identity =
            serde_json::from_str(&contents).context("Invalid identity file")?;

        if saved.peer_id.len() > LEGACY_ID_LEN {
            tracing::info!(id = %saved.peer_id, "ignoring legacy identity");
            return Ok(None);
        }
        Ok(PeerId::parse(&saved.peer_id).ok())
    }

    /// Save the identity to a directory.
    pub async fn save(&self, data_dir: &Path) -> Result<()> {
        let path = data_dir.join(IDENTITY_FILE);
        let contents = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&path, contents)
            .await
            .context("Failed to save identity")?;
        set_file_permissions_0600(&path).await?;
        Ok(())
    }
}

/// Set file permissions to 0600 (owner read/write only) on Unix.
/// No-op on non-Unix platforms.
async fn set_file_permissions_0600(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .context("Failed to set file permissions")?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn missing_identity_is_none() {
        let dir = tempdir().unwrap();
        assert!(Identity::load(dir.path()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn identity_roundtrip() {
        let dir = tempdir().unwrap();
        let id = PeerId::parse("ABC123").unwrap();
        Identity::new(&id).save(dir.path()).await.unwrap();

        assert_eq!(Identity::load(dir.path()).await.unwrap(), Some(id));
    }

    #[tokio::test]
    async fn legacy_identity_is_ignored() {
        let dir = tempdir().unwrap();
        let id = PeerId::parse("0123456789ABCDEF").unwrap();
        Identity::new(&id).save(dir.path()).await.unwrap();

        assert!(Identity::load(dir.path()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_identity_is_an_error() {
        let dir = tempdir().unwrap();
        tokio::fs::write(dir.path().join(IDENTITY_FILE), "not json")
            .await
            .unwrap();
        assert!(Identity::load(dir.path()).await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn identity_file_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        Identity::new(&PeerId::generate())
            .save(dir.path())
            .await
            .unwrap();

        let path = dir.path().join(IDENTITY_FILE);
        let perms = tokio::fs::metadata(&path).await.unwrap().permissions();
        assert_eq!(perms.mode() & 0o777, 0o600, "file should be 0600");
    }
}
