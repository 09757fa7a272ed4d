//! Show (or claim) this peer's identity.

use anyhow::Result;
use std::path::Path;
use stream_types::PeerId;

use crate::identity::Identity;

/// Print the saved identity, generating and saving one if needed.
pub async fn run(data_dir: &Path) -> Result<()> {
    let id = ensure(data_dir).await?;
    println!("{id}");
    Ok(())
}

async fn ensure(data_dir: &Path) -> Result<PeerId> {
    if let Some(id) = Identity::load(data_dir).await? {
        return Ok(id);
    }
    let id = PeerId::generate();
    Identity::new(&id).save(data_dir).await?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn identity_is_stable_across_runs() {
        let dir = tempdir().unwrap();
        let first = ensure(dir.path()).await.unwrap();
        let second = ensure(dir.path()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.as_str().len(), 6);
    }

    #[tokio::test]
    async fn run_succeeds_on_empty_dir() {
        let dir = tempdir().unwrap();
        assert!(run(dir.path()).await.is_ok());
    }
}
