//! Per-instance data directories
//!
//! Two provisioners: [`LocalProvisioner`] works on the filesystem mbox runs
//! on, [`ContainerProvisioner`] runs `mkdir`/`rm` in a throwaway helper
//! container for deployments where mbox itself is containerised and only
//! the runtime can see the host paths.

use crate::{CoreError, Result};
use async_trait::async_trait;
use mbox_provider::{
    ContainerId, ContainerProvider, CreateContainerConfig, MountConfig, MountType, ProviderError,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Creates and deletes instance data directories
#[async_trait]
pub trait DataDirProvisioner: Send + Sync {
    /// Create `path` and its parents; succeeds if it already exists
    async fn ensure(&self, path: &Path) -> Result<()>;

    /// Recursively delete `path`; succeeds if it is already gone
    async fn purge(&self, path: &Path) -> Result<()>;
}

/// Provisioner operating directly on the local filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalProvisioner;

#[async_trait]
impl DataDirProvisioner for LocalProvisioner {
    async fn ensure(&self, path: &Path) -> Result<()> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| CoreError::provision("create", path, e))?;
        tracing::debug!("Data directory ready at {}", path.display());
        Ok(())
    }

    async fn purge(&self, path: &Path) -> Result<()> {
        match tokio::fs::remove_dir_all(path).await {
            Ok(()) => {
                tracing::info!("Removed data directory {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CoreError::provision("delete", path, e)),
        }
    }
}

/// Provisioner that runs shell commands in a short-lived helper container
///
/// The helper bind-mounts `mount_root` at the same path, so `ensure`/`purge`
/// only accept paths below it.
pub struct ContainerProvisioner {
    provider: Arc<dyn ContainerProvider>,
    helper_image: String,
    mount_root: PathBuf,
    call_timeout: Duration,
}

impl ContainerProvisioner {
    pub fn new(
        provider: Arc<dyn ContainerProvider>,
        helper_image: impl Into<String>,
        mount_root: impl Into<PathBuf>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            helper_image: helper_image.into(),
            mount_root: mount_root.into(),
            call_timeout,
        }
    }

    async fn timed<T, F>(&self, fut: F) -> std::result::Result<T, ProviderError>
    where
        F: std::future::Future<Output = std::result::Result<T, ProviderError>>,
    {
        tokio::time::timeout(self.call_timeout, fut)
            .await
            .unwrap_or(Err(ProviderError::Timeout))
    }

    async fn run_helper(&self, action: &'static str, path: &Path, script: String) -> Result<()> {
        if !path.starts_with(&self.mount_root) {
            return Err(CoreError::provision(
                action,
                path,
                format!("outside helper mount {}", self.mount_root.display()),
            ));
        }

        let fail = |e: ProviderError| CoreError::provision(action, path, e);

        self.timed(self.provider.pull(&self.helper_image))
            .await
            .map_err(fail)?;

        let root = self.mount_root.to_string_lossy().into_owned();
        let config = CreateContainerConfig {
            image: self.helper_image.clone(),
            cmd: Some(vec!["sh".to_string(), "-c".to_string(), script]),
            mounts: vec![MountConfig {
                mount_type: MountType::Bind,
                source: root.clone(),
                target: root,
                read_only: false,
            }],
            labels: HashMap::from([("mbox.helper".to_string(), action.to_string())]),
            ..Default::default()
        };

        let helper = self.timed(self.provider.create(&config)).await.map_err(fail)?;
        let outcome = self.wait_for(&helper).await;

        if let Err(e) = self.timed(self.provider.remove(&helper, true)).await {
            tracing::warn!("Failed to remove helper container {}: {}", helper.short(), e);
        }

        match outcome.map_err(fail)? {
            0 => Ok(()),
            code => Err(CoreError::provision(
                action,
                path,
                format!("helper container exited with code {}", code),
            )),
        }
    }

    async fn wait_for(&self, helper: &ContainerId) -> std::result::Result<i64, ProviderError> {
        self.timed(self.provider.start(helper)).await?;
        self.timed(self.provider.wait(helper)).await
    }
}

#[async_trait]
impl DataDirProvisioner for ContainerProvisioner {
    async fn ensure(&self, path: &Path) -> Result<()> {
        let quoted = shell_words::quote(&path.to_string_lossy()).into_owned();
        self.run_helper("create", path, format!("mkdir -p {}", quoted))
            .await?;
        tracing::debug!("Data directory ready at {} (via helper)", path.display());
        Ok(())
    }

    async fn purge(&self, path: &Path) -> Result<()> {
        // Never let the helper wipe the whole mount
        if path == self.mount_root {
            return Err(CoreError::provision("delete", path, "refusing to delete mount root"));
        }
        let quoted = shell_words::quote(&path.to_string_lossy()).into_owned();
        self.run_helper("delete", path, format!("rm -rf {}", quoted))
            .await?;
        tracing::info!("Removed data directory {} (via helper)", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockCall, MockProvider};
    use mbox_provider::ProviderType;

    #[tokio::test]
    async fn test_local_ensure_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("servers").join("mboxmini-alpha");

        LocalProvisioner.ensure(&path).await.unwrap();
        std::fs::write(path.join("server.properties"), "pvp=true\n").unwrap();
        LocalProvisioner.ensure(&path).await.unwrap();

        assert!(path.join("server.properties").exists());
    }

    #[tokio::test]
    async fn test_local_purge_removes_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("mboxmini-alpha");
        std::fs::create_dir_all(path.join("world/region")).unwrap();
        std::fs::write(path.join("world/level.dat"), b"x").unwrap();

        LocalProvisioner.purge(&path).await.unwrap();
        assert!(!path.exists());
        // Already gone
        LocalProvisioner.purge(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_local_ensure_reports_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();

        let err = LocalProvisioner.ensure(&file.join("child")).await.unwrap_err();
        assert!(matches!(err, CoreError::Provision { action: "create", .. }));
    }

    fn helper(mock: &Arc<MockProvider>) -> ContainerProvisioner {
        ContainerProvisioner::new(
            mock.clone(),
            "alpine:latest",
            "/srv/mbox",
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_container_ensure_runs_mkdir_helper() {
        let mock = Arc::new(MockProvider::new(ProviderType::Docker));
        helper(&mock)
            .ensure(Path::new("/srv/mbox/servers/mboxmini-alpha"))
            .await
            .unwrap();

        let calls = mock.get_calls();
        assert!(calls.contains(&MockCall::Pull {
            image: "alpine:latest".into()
        }));
        let cmd = calls.iter().find_map(|c| match c {
            MockCall::Create { cmd, .. } => cmd.clone(),
            _ => None,
        });
        assert_eq!(
            cmd,
            Some(vec![
                "sh".to_string(),
                "-c".to_string(),
                "mkdir -p /srv/mbox/servers/mboxmini-alpha".to_string()
            ])
        );
        assert!(calls.iter().any(|c| matches!(c, MockCall::Wait { .. })));
        assert!(calls
            .iter()
            .any(|c| matches!(c, MockCall::Remove { force: true, .. })));
        // Helper does not linger
        assert!(mock.container_names().is_empty());
    }

    #[tokio::test]
    async fn test_container_ensure_nonzero_exit_fails() {
        let mock = Arc::new(MockProvider::new(ProviderType::Docker));
        *mock.wait_exit_code.lock().unwrap() = 1;

        let err = helper(&mock)
            .ensure(Path::new("/srv/mbox/servers/a"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exited with code 1"));
        // Cleanup still happened
        assert!(mock.container_names().is_empty());
    }

    #[tokio::test]
    async fn test_container_rejects_paths_outside_mount() {
        let mock = Arc::new(MockProvider::new(ProviderType::Docker));
        let provisioner = helper(&mock);

        assert!(provisioner.ensure(Path::new("/etc/passwd")).await.is_err());
        assert!(provisioner.purge(Path::new("/srv/mbox")).await.is_err());
        assert!(mock.get_calls().is_empty());
    }

    #[tokio::test]
    async fn test_container_purge_quotes_path() {
        let mock = Arc::new(MockProvider::new(ProviderType::Docker));
        helper(&mock)
            .purge(Path::new("/srv/mbox/my servers/a"))
            .await
            .unwrap();

        let cmd = mock.get_calls().into_iter().find_map(|c| match c {
            MockCall::Create { cmd, .. } => cmd,
            _ => None,
        });
        assert_eq!(
            cmd.unwrap()[2],
            "rm -rf '/srv/mbox/my servers/a'".to_string()
        );
    }
}
