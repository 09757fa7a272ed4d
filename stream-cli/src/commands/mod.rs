//! CLI command implementations.

pub mod clip;
pub mod evict;
pub mod id;
pub mod receive;
pub mod send;

use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stream_peer::{Config, ConnectionManager, Event, TcpRendezvous};
use stream_store::SqliteChunkStore;
use stream_types::PeerId;

use crate::identity::Identity;

/// Settings shared by every command.
#[derive(Debug, Clone)]
pub struct Context {
    /// Data directory holding the identity and the chunk database.
    pub data_dir: PathBuf,
    /// Loaded configuration.
    pub config: Config,
}

impl Context {
    /// Load configuration from `config_path`, or `config.toml` in the data
    /// directory if present, or defaults.
    pub fn load(data_dir: PathBuf, config_path: Option<&Path>) -> Result<Self> {
        let default_path = data_dir.join("config.toml");
        let config = match config_path {
            Some(path) => Config::from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None if default_path.exists() => Config::from_file(&default_path)
                .with_context(|| format!("Failed to load config from {}", default_path.display()))?,
            None => Config::default(),
        };
        Ok(Self { data_dir, config })
    }

    /// Chunk database path; relative paths live under the data directory.
    pub fn database_path(&self) -> PathBuf {
        let database = &self.config.store.database;
        if database.is_absolute() {
            database.clone()
        } else {
            self.data_dir.join(database)
        }
    }

    /// Open the chunk store.
    pub async fn open_store(&self) -> Result<Arc<SqliteChunkStore>> {
        let store = SqliteChunkStore::new(&self.database_path())
            .await
            .context("Failed to open chunk store")?
            .with_max_bytes(self.config.store.max_bytes);
        Ok(Arc::new(store))
    }

    /// Build the TCP rendezvous, adding `extra` to the configured directory.
    pub fn rendezvous(&self, extra: Option<(&str, &str)>) -> Result<Arc<TcpRendezvous>> {
        let rendezvous = TcpRendezvous::from_config(&self.config.rendezvous)
            .context("Invalid rendezvous configuration")?;
        if let Some((id, addr)) = extra {
            let id = PeerId::parse(id).context("Invalid peer id")?;
            rendezvous.add_peer(id, addr);
        }
        Ok(Arc::new(rendezvous))
    }

    /// Register with the saved identity, claiming and saving a new one if
    /// none is usable.
    pub async fn register(&self, manager: &ConnectionManager) -> Result<PeerId> {
        let saved = Identity::load(&self.data_dir).await?;
        let preferred = saved.as_ref().map(|id| id.as_str());
        let id = manager
            .register(preferred)
            .await
            .context("Failed to register with rendezvous")?;

        if saved.as_ref() != Some(&id) {
            Identity::new(&id).save(&self.data_dir).await?;
        }
        Ok(id)
    }
}

/// One status line for an event, if it should be shown.
pub fn render(event: &Event) -> Option<String> {
    match event {
        Event::Status { message, .. } => Some(message.clone()),
        Event::Progress {
            percent,
            throughput_mbps,
        } => Some(format!("{percent:>3}%  {throughput_mbps} MB/s")),
        Event::FileReceived(file) => Some(format!(
            "Received {} ({} bytes, {}) from {}",
            file.name,
            file.blob.len(),
            file.blob.mime,
            file.from
        )),
        Event::TextChanged(text) => Some(format!("clipboard: {text}")),
        Event::PeerJoined(id) => Some(format!("+ {id}")),
        Event::PeerLeft(id) => Some(format!("- {id}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stream_peer::{ReceivedFile, StatusKind};
    use stream_store::Blob;
    use tempfile::tempdir;

    #[test]
    fn defaults_without_config_file() {
        let dir = tempdir().unwrap();
        let ctx = Context::load(dir.path().to_path_buf(), None).unwrap();
        assert_eq!(ctx.config.connection.max_peers, 1);
        assert_eq!(ctx.database_path(), dir.path().join("flashstream.db"));
    }

    #[test]
    fn config_file_in_data_dir_is_picked_up() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "[connection]\nmax_peers = 4\n\n[store]\ndatabase = \"/tmp/elsewhere.db\"\n",
        )
        .unwrap();

        let ctx = Context::load(dir.path().to_path_buf(), None).unwrap();
        assert_eq!(ctx.config.connection.max_peers, 4);
        assert_eq!(ctx.database_path(), PathBuf::from("/tmp/elsewhere.db"));
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(Context::load(dir.path().to_path_buf(), Some(&missing)).is_err());
    }

    #[test]
    fn rendezvous_rejects_bad_extra_id() {
        let dir = tempdir().unwrap();
        let ctx = Context::load(dir.path().to_path_buf(), None).unwrap();
        assert!(ctx.rendezvous(Some(("not an id!", "127.0.0.1:1"))).is_err());
        assert!(ctx.rendezvous(Some(("ABC123", "127.0.0.1:1"))).is_ok());
    }

    #[test]
    fn render_events() {
        let status = Event::Status {
            kind: StatusKind::Connected,
            message: "Connected".into(),
        };
        assert_eq!(render(&status).unwrap(), "Connected");

        let progress = Event::Progress {
            percent: 44,
            throughput_mbps: "1.50".into(),
        };
        assert_eq!(render(&progress).unwrap(), " 44%  1.50 MB/s");

        let file = Event::FileReceived(ReceivedFile {
            from: PeerId::parse("ABC123").unwrap(),
            name: "a.txt".into(),
            blob: Blob {
                mime: "text/plain".into(),
                data: b"hi".to_vec(),
            },
        });
        assert_eq!(
            render(&file).unwrap(),
            "Received a.txt (2 bytes, text/plain) from ABC123"
        );
    }
}
