//! Most recent connect target, reused for a while so it need not be retyped.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const RECENT_FILE: &str = "last_peer.json";

/// How long a remembered target stays usable.
pub const RECENT_TTL: Duration = Duration::from_secs(30 * 60);

/// Peer identity and optional address from the last successful connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentPeer {
    /// Identity that was dialed.
    pub peer_id: String,
    /// Address given alongside it, if any.
    pub addr: Option<String>,
    /// Unix seconds when it was saved.
    pub saved_at: u64,
}

impl RecentPeer {
    /// Record `peer_id` as of now.
    pub fn new(peer_id: &str, addr: Option<&str>) -> Self {
        Self {
            peer_id: peer_id.to_string(),
            addr: addr.map(str::to_string),
            saved_at: unix_now(),
        }
    }

    /// Load the remembered target if it is younger than [`RECENT_TTL`].
    pub async fn load(data_dir: &Path) -> Result<Option<Self>> {
        Self::load_at(data_dir, unix_now()).await
    }

    /// Same as [`load`](Self::load) with an explicit clock.
    ///
    /// An unreadable record is ignored rather than failing the command.
    pub async fn load_at(data_dir: &Path, now: u64) -> Result<Option<Self>> {
        let path = data_dir.join(RECENT_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let contents = tokio::fs::read_to_string(&path)
            .await
            .context("Failed to read last peer")?;
        let recent: RecentPeer = match serde_json::from_str(&contents) {
            Ok(recent) => recent,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring unreadable last peer record");
                return Ok(None);
            }
        };

        if now.saturating_sub(recent.saved_at) >= RECENT_TTL.as_secs() {
            tracing::debug!(peer = %recent.peer_id, "last peer expired");
            return Ok(None);
        }
        Ok(Some(recent))
    }

    /// Save the target to a directory.
    pub async fn save(&self, data_dir: &Path) -> Result<()> {
        let path = data_dir.join(RECENT_FILE);
        let contents = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&path, contents)
            .await
            .context("Failed to save last peer")?;
        Ok(())
    }

    /// Remember a target, logging instead of failing.
    pub async fn remember(data_dir: &Path, peer_id: &str, addr: Option<&str>) {
        if let Err(e) = Self::new(peer_id, addr).save(data_dir).await {
            tracing::warn!(error = %e, "failed to remember last peer");
        }
    }
}

/// Peer to dial: the one given, else the remembered one.
///
/// A given peer that matches the remembered one reuses its address when no
/// address was given.
pub fn pick_target(
    given: Option<&str>,
    addr: Option<&str>,
    recent: Option<RecentPeer>,
) -> Option<(String, Option<String>)> {
    match (given, recent) {
        (Some(peer), recent) => {
            let addr = addr.map(str::to_string).or_else(|| {
                recent
                    .filter(|r| r.peer_id.eq_ignore_ascii_case(peer.trim()))
                    .and_then(|r| r.addr)
            });
            Some((peer.to_string(), addr))
        }
        (None, Some(recent)) => Some((recent.peer_id, recent.addr)),
        (None, None) => None,
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn recent(peer: &str, addr: Option<&str>) -> RecentPeer {
        RecentPeer {
            peer_id: peer.into(),
            addr: addr.map(str::to_string),
            saved_at: 1_000,
        }
    }

    // ===========================================
    // Storage
    // ===========================================

    #[tokio::test]
    async fn nothing_remembered_is_none() {
        let dir = tempdir().unwrap();
        assert!(RecentPeer::load(dir.path()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn remembered_target_is_loaded_back() {
        let dir = tempdir().unwrap();
        RecentPeer::remember(dir.path(), "K7Q2ZD", Some("10.0.0.2:7878")).await;

        let loaded = RecentPeer::load(dir.path()).await.unwrap().unwrap();
        assert_eq!(loaded.peer_id, "K7Q2ZD");
        assert_eq!(loaded.addr.as_deref(), Some("10.0.0.2:7878"));
    }

    #[tokio::test]
    async fn target_expires_after_thirty_minutes() {
        let dir = tempdir().unwrap();
        let saved = recent("K7Q2ZD", None);
        saved.save(dir.path()).await.unwrap();

        let just_before = saved.saved_at + RECENT_TTL.as_secs() - 1;
        assert_eq!(
            RecentPeer::load_at(dir.path(), just_before).await.unwrap(),
            Some(saved.clone())
        );

        let at_expiry = saved.saved_at + RECENT_TTL.as_secs();
        assert!(RecentPeer::load_at(dir.path(), at_expiry)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn unreadable_record_is_ignored() {
        let dir = tempdir().unwrap();
        tokio::fs::write(dir.path().join(RECENT_FILE), "{ nope")
            .await
            .unwrap();
        assert!(RecentPeer::load(dir.path()).await.unwrap().is_none());
    }

    // ===========================================
    // Target selection
    // ===========================================

    #[test]
    fn given_peer_wins() {
        let target = pick_target(
            Some("ABC123"),
            Some("10.0.0.9:1"),
            Some(recent("K7Q2ZD", Some("10.0.0.2:7878"))),
        );
        assert_eq!(
            target,
            Some(("ABC123".to_string(), Some("10.0.0.9:1".to_string())))
        );
    }

    #[test]
    fn remembered_peer_fills_in() {
        let target = pick_target(None, None, Some(recent("K7Q2ZD", Some("10.0.0.2:7878"))));
        assert_eq!(
            target,
            Some(("K7Q2ZD".to_string(), Some("10.0.0.2:7878".to_string())))
        );
        assert_eq!(pick_target(None, None, None), None);
    }

    #[test]
    fn same_peer_reuses_remembered_address() {
        let remembered = Some(recent("K7Q2ZD", Some("10.0.0.2:7878")));
        assert_eq!(
            pick_target(Some("k7q2zd"), None, remembered.clone()),
            Some(("k7q2zd".to_string(), Some("10.0.0.2:7878".to_string())))
        );
        assert_eq!(
            pick_target(Some("OTHER1"), None, remembered),
            Some(("OTHER1".to_string(), None))
        );
    }
}
