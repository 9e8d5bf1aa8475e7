//! Listing and status queries

use crate::instance::{display_name, InstanceStatus, ServerInfo};
use crate::Result;
use futures::future::join_all;
use mbox_provider::ContainerInfo;

use super::InstanceManager;

impl InstanceManager {
    /// All instances of this deployment, sorted by id
    ///
    /// A broken instance degrades to what the container list reported about
    /// it; it never fails the whole listing.
    pub async fn list_instances(&self) -> Result<Vec<ServerInfo>> {
        let containers = self
            .call("list", "containers", self.provider.list(true))
            .await?;

        let managed = containers
            .iter()
            .filter(|c| self.is_managed(&c.name, &c.image));
        let mut servers = join_all(managed.map(|c| self.describe(c))).await;

        servers.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(servers)
    }

    /// Current view of one instance
    pub async fn get_instance_status(&self, id: &str) -> Result<ServerInfo> {
        let id = self.resolve(id);
        let details = self.inspect_instance(&id).await?;
        let mut info = self.server_info(&details);
        info.players = self.players_if_running(&info).await;
        Ok(info)
    }

    async fn describe(&self, container: &ContainerInfo) -> ServerInfo {
        let mut info = match self.inspect_instance(&container.name).await {
            Ok(details) => self.server_info(&details),
            Err(e) => {
                tracing::warn!("Failed to inspect {}: {}", container.name, e);
                self.summary_info(container)
            }
        };
        info.players = self.players_if_running(&info).await;
        info
    }

    /// What the container list alone says about an instance
    fn summary_info(&self, container: &ContainerInfo) -> ServerInfo {
        ServerInfo {
            id: container.name.clone(),
            name: display_name(&self.config.name_prefix, &container.name).to_string(),
            container_id: container.id.0.clone(),
            status: InstanceStatus::from(container.status),
            version: String::new(),
            memory: None,
            image: container.image.clone(),
            port: container.host_port_for(self.config.service_port),
            players: None,
        }
    }

    async fn players_if_running(&self, info: &ServerInfo) -> Option<Vec<String>> {
        if info.status != InstanceStatus::Running {
            return None;
        }
        match self.list_players(&info.id).await {
            Ok(players) => Some(players),
            Err(e) => {
                tracing::warn!("Failed to list players on {}: {}", info.id, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{test_config, test_manager};
    use super::*;
    use crate::test_support::*;
    use crate::CoreError;
    use mbox_provider::{ContainerStatus, ProviderError, ProviderType};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_status_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockProvider::new(ProviderType::Docker));
        let manager = test_manager(&mock, test_config(tmp.path())).await;

        let id = manager
            .create_instance("alpha", "1.20.1", Some("2G"))
            .await
            .unwrap();
        let port = manager.ports().port_of(&id).unwrap();

        let info = manager.get_instance_status(&id).await.unwrap();
        assert_eq!(info.id, "mboxmini-alpha");
        assert_eq!(info.name, "alpha");
        assert_eq!(info.status, InstanceStatus::Running);
        assert_eq!(info.version, "1.20.1");
        assert_eq!(info.memory.as_deref(), Some("2G"));
        assert_eq!(info.port, Some(port));
        assert_eq!(info.players, Some(Vec::new()));

        manager.delete_instance(&id, true).await.unwrap();
        assert!(matches!(
            manager.get_instance_status(&id).await,
            Err(CoreError::NotFound(_))
        ));
        assert_eq!(manager.ports().allocate().unwrap(), port);
    }

    #[tokio::test]
    async fn test_status_of_stopped_instance_has_no_players() {
        let tmp = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockProvider::new(ProviderType::Docker));
        let manager = test_manager(&mock, test_config(tmp.path())).await;
        let id = manager.create_instance("alpha", "1.20.1", None).await.unwrap();
        manager.stop_instance(&id).await.unwrap();

        let info = manager.get_instance_status("alpha").await.unwrap();
        assert_eq!(info.status, InstanceStatus::Stopped);
        assert_eq!(info.players, None);
        // Bindings survive a stop
        assert_eq!(info.port, Some(25565));
        assert!(!mock
            .get_calls()
            .iter()
            .any(|c| matches!(c, MockCall::Exec { .. })));
    }

    #[tokio::test]
    async fn test_list_filters_and_fills_players() {
        let tmp = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockProvider::new(ProviderType::Docker));
        mock.insert_container(server_container(
            "c1",
            "mboxmini-b",
            ContainerStatus::Running,
            25566,
            "1.20.1",
        ));
        mock.insert_container(server_container(
            "c2",
            "mboxmini-a",
            ContainerStatus::Exited,
            25565,
            "1.19.4",
        ));
        let mut foreign = server_container("c3", "mboxmini-db", ContainerStatus::Running, 5432, "x");
        foreign.image = "postgres:16".to_string();
        mock.insert_container(foreign);
        mock.insert_container(server_container(
            "c4",
            "minecraft",
            ContainerStatus::Running,
            25570,
            "1.20.1",
        ));
        mock.exec_outputs.lock().unwrap().insert(
            "mboxmini-b".to_string(),
            "There are 2 of a max of 20 players online: Alice, Bob".to_string(),
        );
        let manager = test_manager(&mock, test_config(tmp.path())).await;

        let servers = manager.list_instances().await.unwrap();

        let ids: Vec<&str> = servers.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["mboxmini-a", "mboxmini-b"]);
        assert_eq!(servers[0].status, InstanceStatus::Stopped);
        assert_eq!(servers[0].version, "1.19.4");
        assert_eq!(servers[0].port, Some(25565));
        assert_eq!(servers[0].players, None);
        assert_eq!(
            servers[1].players,
            Some(vec!["Alice".to_string(), "Bob".to_string()])
        );
    }

    #[tokio::test]
    async fn test_list_swallows_player_lookup_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockProvider::new(ProviderType::Docker));
        for (id, name, port) in [("c1", "mboxmini-a", 25565), ("c2", "mboxmini-b", 25566)] {
            mock.insert_container(server_container(
                id,
                name,
                ContainerStatus::Running,
                port,
                "1.20.1",
            ));
        }
        mock.exec_errors.lock().unwrap().insert(
            "mboxmini-a".to_string(),
            ProviderError::ExecError("attach failed".into()),
        );
        *mock.exec_output.lock().unwrap() =
            "There are 1 of a max of 20 players online: Steve".to_string();
        let manager = test_manager(&mock, test_config(tmp.path())).await;

        let servers = manager.list_instances().await.unwrap();

        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0].status, InstanceStatus::Running);
        assert_eq!(servers[0].players, None);
        assert_eq!(servers[1].players, Some(vec!["Steve".to_string()]));
    }

    #[tokio::test]
    async fn test_list_falls_back_when_inspect_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockProvider::new(ProviderType::Docker));
        mock.insert_container(server_container(
            "c1",
            "mboxmini-a",
            ContainerStatus::Running,
            25565,
            "1.20.1",
        ));
        let manager = test_manager(&mock, test_config(tmp.path())).await;
        *mock.inspect_error.lock().unwrap() = Some(ProviderError::RuntimeError("flaky".into()));

        let servers = manager.list_instances().await.unwrap();

        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].version, "");
        assert_eq!(servers[0].port, Some(25565));
        assert_eq!(servers[0].status, InstanceStatus::Running);
    }

    #[tokio::test]
    async fn test_list_fails_when_runtime_list_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockProvider::new(ProviderType::Docker));
        let manager = test_manager(&mock, test_config(tmp.path())).await;
        *mock.list_error.lock().unwrap() = Some(ProviderError::ConnectionError("gone".into()));

        assert!(matches!(
            manager.list_instances().await,
            Err(CoreError::Runtime { step: "list", .. })
        ));
    }

    #[test]
    fn test_server_info_serializes() {
        let info = ServerInfo {
            id: "mboxmini-a".into(),
            name: "a".into(),
            container_id: "abc".into(),
            status: InstanceStatus::NotFound,
            version: "1.20.1".into(),
            memory: Some("2G".into()),
            image: "itzg/minecraft-server:latest".into(),
            port: Some(25565),
            players: None,
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["status"], "not-found");
        assert_eq!(json["port"], 25565);
        assert!(json["players"].is_null());
    }
}
