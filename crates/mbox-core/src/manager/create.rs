//! Instance creation

use crate::instance::{validate_name, MANAGED_LABEL, NAME_LABEL};
use crate::{CoreError, Result};
use mbox_provider::{
    ContainerId, CreateContainerConfig, MountConfig, MountType, PortConfig, ProviderError,
};
use std::collections::HashMap;

use super::InstanceManager;

/// Mount point of the data directory inside the server container
const DATA_MOUNT: &str = "/data";

impl InstanceManager {
    /// Create and start a new instance, returning its canonical id
    ///
    /// Any failure after the port is allocated releases it again; a container
    /// that was created but failed to start is removed on a best-effort basis.
    pub async fn create_instance(
        &self,
        name: &str,
        version: &str,
        memory: Option<&str>,
    ) -> Result<String> {
        validate_name(name)?;
        // A prefixed name would resolve to a different instance
        if name.starts_with(&self.config.name_prefix) {
            return Err(CoreError::InvalidArgument(format!(
                "instance name '{}' must not start with '{}'",
                name, self.config.name_prefix
            )));
        }
        if version.trim().is_empty() {
            return Err(CoreError::InvalidArgument("version must not be empty".into()));
        }
        let memory = memory
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(self.config.default_memory.as_str());

        let id = self.instance_id(name);
        self.ensure_absent(&id).await?;

        let port = self.ports.allocate()?;
        match self.launch(name, &id, port, version, memory).await {
            Ok(container_id) => {
                self.ports.assign(port, &id);
                tracing::info!(
                    "Created instance {} ({}) on port {}",
                    id,
                    container_id.short(),
                    port
                );
                Ok(id)
            }
            Err(e) => {
                self.ports.release(port);
                Err(e)
            }
        }
    }

    /// Fail with `AlreadyExists` if a container already carries this id
    async fn ensure_absent(&self, id: &str) -> Result<()> {
        match self.inspect_instance(id).await {
            Ok(_) => Err(CoreError::AlreadyExists(id.to_string())),
            Err(CoreError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn launch(
        &self,
        name: &str,
        id: &str,
        port: u16,
        version: &str,
        memory: &str,
    ) -> Result<ContainerId> {
        let data_dir = self.data_dir(id);
        self.provisioner.ensure(&data_dir).await?;

        if self.config.pull_image {
            self.call("pull", id, self.provider.pull(&self.config.image))
                .await?;
        }

        let config = CreateContainerConfig {
            image: self.config.image.clone(),
            name: Some(id.to_string()),
            env: HashMap::from([
                ("EULA".to_string(), "TRUE".to_string()),
                ("VERSION".to_string(), version.to_string()),
                ("MEMORY".to_string(), memory.to_string()),
                ("TYPE".to_string(), self.config.server_type.clone()),
            ]),
            mounts: vec![MountConfig {
                mount_type: MountType::Bind,
                source: data_dir.to_string_lossy().into_owned(),
                target: DATA_MOUNT.to_string(),
                read_only: false,
            }],
            ports: vec![PortConfig {
                host_port: Some(port),
                container_port: self.config.service_port,
                protocol: "tcp".to_string(),
                host_ip: Some("0.0.0.0".to_string()),
            }],
            labels: HashMap::from([
                (MANAGED_LABEL.to_string(), "true".to_string()),
                (NAME_LABEL.to_string(), name.to_string()),
            ]),
            ..Default::default()
        };

        let container_id = match self.call("create", id, self.provider.create(&config)).await {
            Ok(cid) => cid,
            // Lost a race with a concurrent create under the same name
            Err(CoreError::Runtime {
                source: ProviderError::Conflict(_),
                ..
            }) => return Err(CoreError::AlreadyExists(id.to_string())),
            Err(e) => return Err(e),
        };

        if let Err(e) = self.call("start", id, self.provider.start(&container_id)).await {
            if let Err(cleanup) = self
                .call("remove", id, self.provider.remove(&container_id, true))
                .await
            {
                tracing::warn!(
                    "Failed to remove {} after failed start: {}",
                    container_id.short(),
                    cleanup
                );
            }
            return Err(e);
        }

        Ok(container_id)
    }
}
