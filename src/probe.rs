//! Presence checks for external binaries.

use async_trait::async_trait;

/// Reports whether a command is resolvable on the host.
#[async_trait]
pub trait BinaryProbe: Send + Sync {
    /// Never errors: anything other than a positive match means absent.
    async fn exists(&self, name: &str) -> bool;

    /// True if any of the interchangeable aliases resolves
    async fn any_exists(&self, names: &[String]) -> bool {
        for name in names {
            if self.exists(name).await {
                return true;
            }
        }
        false
    }
}

/// Resolves commands against `PATH` using the `which` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathProbe;

#[async_trait]
impl BinaryProbe for PathProbe {
    async fn exists(&self, name: &str) -> bool {
        let name = name.to_string();
        let lookup = name.clone();
        match tokio::task::spawn_blocking(move || which::which(&lookup)).await {
            Ok(Ok(path)) => {
                tracing::debug!("Found {} at {}", name, path.display());
                true
            }
            Ok(Err(_)) => false,
            Err(e) => {
                tracing::debug!("Probe for {} did not complete: {}", name, e);
                false
            }
        }
    }
}
