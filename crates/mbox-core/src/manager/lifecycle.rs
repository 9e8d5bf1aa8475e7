//! Start, stop and delete for InstanceManager

use crate::Result;
use mbox_provider::{ContainerId, ContainerStatus};

use super::InstanceManager;

impl InstanceManager {
    pub async fn start_instance(&self, id: &str) -> Result<()> {
        let id = self.resolve(id);
        self.target_call("start", &id, self.provider.start(&ContainerId::new(&id)))
            .await?;
        tracing::info!("Started instance {}", id);
        Ok(())
    }

    /// Stop with the configured grace period before the runtime kills the server
    pub async fn stop_instance(&self, id: &str) -> Result<()> {
        let id = self.resolve(id);
        self.stop_container(&id, &ContainerId::new(&id)).await?;
        tracing::info!("Stopped instance {}", id);
        Ok(())
    }

    async fn stop_container(&self, id: &str, container: &ContainerId) -> Result<()> {
        let deadline = self.config.stop_timeout() + self.config.call_timeout();
        self.call_within(
            deadline,
            "stop",
            id,
            self.provider
                .stop(container, Some(self.config.stop_timeout_secs)),
        )
        .await
        .map_err(super::not_found_for(id))
    }

    /// Stop, force-remove and optionally purge an instance, then release its port
    ///
    /// The port stays claimed while the container may still exist, i.e. if
    /// stop or remove fails. A purge failure is returned after the port has
    /// been released.
    pub async fn delete_instance(&self, id: &str, purge_files: bool) -> Result<()> {
        let id = self.resolve(id);
        let details = self.inspect_instance(&id).await?;

        if matches!(
            details.status,
            ContainerStatus::Running | ContainerStatus::Restarting | ContainerStatus::Paused
        ) {
            self.stop_container(&id, &details.id).await?;
        }

        self.target_call("remove", &id, self.provider.remove(&details.id, true))
            .await?;
        tracing::info!("Removed container {} for {}", details.id.short(), id);

        let purged = if purge_files {
            self.provisioner.purge(&self.data_dir(&id)).await
        } else {
            Ok(())
        };

        let mut released = self.ports.release_owner(&id);
        if let Some(port) = details.host_port_for(self.config.service_port) {
            if self.ports.release(port) {
                released.push(port);
            }
        }
        tracing::debug!("Released ports {:?} for {}", released, id);

        if let Err(e) = &purged {
            tracing::warn!("Instance {} removed but its data was not: {}", id, e);
        }
        purged
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{test_config, test_manager, AlwaysFree};
    use super::*;
    use crate::ports::PortAllocator;
    use crate::provision::{DataDirProvisioner, LocalProvisioner};
    use crate::test_support::*;
    use crate::CoreError;
    use mbox_provider::{ProviderError, ProviderType};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_stop_passes_grace_period() {
        let tmp = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockProvider::new(ProviderType::Docker));
        let manager = test_manager(&mock, test_config(tmp.path())).await;
        let id = manager.create_instance("alpha", "1.20.1", None).await.unwrap();

        manager.stop_instance("alpha").await.unwrap();

        assert!(mock.was_called(&MockCall::Stop {
            id: id.clone(),
            timeout: Some(1)
        }));
        assert_eq!(mock.container(&id).unwrap().status, ContainerStatus::Exited);

        manager.start_instance(&id).await.unwrap();
        assert_eq!(mock.container(&id).unwrap().status, ContainerStatus::Running);
    }

    #[tokio::test]
    async fn test_start_unknown_instance_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockProvider::new(ProviderType::Docker));
        let manager = test_manager(&mock, test_config(tmp.path())).await;

        assert!(matches!(
            manager.start_instance("ghost").await,
            Err(CoreError::NotFound(_))
        ));
        assert!(matches!(
            manager.stop_instance("ghost").await,
            Err(CoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_releases_port_and_keeps_data() {
        let tmp = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockProvider::new(ProviderType::Docker));
        let manager = test_manager(&mock, test_config(tmp.path())).await;
        let id = manager.create_instance("alpha", "1.20.1", None).await.unwrap();

        manager.delete_instance(&id, false).await.unwrap();

        assert!(mock.container(&id).is_none());
        assert!(manager.ports().is_empty());
        assert!(tmp.path().join(&id).is_dir());
        assert!(mock
            .get_calls()
            .iter()
            .any(|c| matches!(c, MockCall::Stop { .. })));
        assert!(mock
            .get_calls()
            .iter()
            .any(|c| matches!(c, MockCall::Remove { force: true, .. })));
    }

    #[tokio::test]
    async fn test_delete_with_purge_removes_data() {
        let tmp = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockProvider::new(ProviderType::Docker));
        let manager = test_manager(&mock, test_config(tmp.path())).await;
        let id = manager.create_instance("alpha", "1.20.1", None).await.unwrap();
        std::fs::write(tmp.path().join(&id).join("server.properties"), "pvp=true\n").unwrap();

        manager.delete_instance("alpha", true).await.unwrap();

        assert!(!tmp.path().join(&id).exists());
        assert!(manager.ports().is_empty());
    }

    #[tokio::test]
    async fn test_delete_stopped_instance_skips_stop() {
        let tmp = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockProvider::new(ProviderType::Docker));
        mock.insert_container(server_container(
            "c1",
            "mboxmini-old",
            ContainerStatus::Exited,
            25566,
            "1.19",
        ));
        let manager = test_manager(&mock, test_config(tmp.path())).await;
        assert_eq!(manager.ports().port_of("mboxmini-old"), Some(25566));

        manager.delete_instance("old", false).await.unwrap();

        assert!(!mock
            .get_calls()
            .iter()
            .any(|c| matches!(c, MockCall::Stop { .. })));
        assert!(manager.ports().is_empty());
    }

    #[tokio::test]
    async fn test_delete_nonexistent_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockProvider::new(ProviderType::Docker));
        let manager = test_manager(&mock, test_config(tmp.path())).await;

        let err = manager.delete_instance("ghost", true).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
        assert_eq!(err.http_status(), 404);
    }

    #[tokio::test]
    async fn test_delete_remove_failure_keeps_port() {
        let tmp = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockProvider::new(ProviderType::Docker));
        let manager = test_manager(&mock, test_config(tmp.path())).await;
        let id = manager.create_instance("alpha", "1.20.1", None).await.unwrap();
        *mock.remove_error.lock().unwrap() = Some(ProviderError::RuntimeError("busy".into()));

        let err = manager.delete_instance(&id, true).await.unwrap_err();

        assert!(matches!(err, CoreError::Runtime { step: "remove", .. }));
        assert_eq!(manager.ports().port_of(&id), Some(25565));
        // Nothing purged while the container survives
        assert!(tmp.path().join(&id).is_dir());
    }

    #[tokio::test]
    async fn test_delete_stop_failure_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockProvider::new(ProviderType::Docker));
        let manager = test_manager(&mock, test_config(tmp.path())).await;
        let id = manager.create_instance("alpha", "1.20.1", None).await.unwrap();
        *mock.stop_error.lock().unwrap() = Some(ProviderError::Timeout);

        let err = manager.delete_instance(&id, false).await.unwrap_err();

        assert!(matches!(err, CoreError::Runtime { step: "stop", .. }));
        assert!(mock.container(&id).is_some());
        assert_eq!(manager.ports().port_of(&id), Some(25565));
    }

    struct FailingPurge;

    #[async_trait::async_trait]
    impl DataDirProvisioner for FailingPurge {
        async fn ensure(&self, path: &std::path::Path) -> Result<()> {
            LocalProvisioner.ensure(path).await
        }

        async fn purge(&self, path: &std::path::Path) -> Result<()> {
            Err(CoreError::provision("delete", path, "permission denied"))
        }
    }

    #[tokio::test]
    async fn test_delete_purge_failure_still_releases_port() {
        let tmp = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockProvider::new(ProviderType::Docker));
        let config = test_config(tmp.path());
        let ports = Arc::new(PortAllocator::with_probe(
            config.port_start,
            config.port_end,
            Box::new(AlwaysFree),
        ));
        let manager =
            InstanceManager::with_parts(mock.clone(), config, ports, Box::new(FailingPurge))
                .await
                .unwrap();
        let id = manager.create_instance("alpha", "1.20.1", None).await.unwrap();

        let err = manager.delete_instance(&id, true).await.unwrap_err();

        assert!(matches!(err, CoreError::Provision { action: "delete", .. }));
        assert!(mock.container(&id).is_none());
        assert!(manager.ports().is_empty());
        assert_eq!(manager.ports().allocate().unwrap(), 25565);
    }
}
