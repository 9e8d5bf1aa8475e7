//! Instance manager - coordinates all game-server instance operations

mod create;
mod exec;
mod lifecycle;
mod query;

use crate::console::{ConsoleDialect, RconCli};
use crate::instance::{canonical_id, display_name, image_repository, InstanceStatus, ServerInfo};
use crate::ports::PortAllocator;
use crate::provision::{ContainerProvisioner, DataDirProvisioner, LocalProvisioner};
use crate::{CoreError, Result};
use futures::future::join_all;
use mbox_config::{InstancesConfig, ProvisionerKind};
use mbox_provider::{
    ContainerDetails, ContainerId, ContainerInfo, ContainerProvider, ProviderError,
};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Main instance manager
///
/// Instance state is never cached: every read goes to the runtime. The only
/// in-process state is the port pool, rebuilt from the runtime on construction.
pub struct InstanceManager {
    provider: Arc<dyn ContainerProvider>,
    ports: Arc<PortAllocator>,
    provisioner: Box<dyn DataDirProvisioner>,
    console: Box<dyn ConsoleDialect>,
    config: InstancesConfig,
}

impl InstanceManager {
    /// Create a manager with the provisioner named in `config`
    ///
    /// Fails if the runtime cannot be listed: no manager exists without a
    /// consistent view of port usage.
    pub async fn new(provider: Arc<dyn ContainerProvider>, config: InstancesConfig) -> Result<Self> {
        let ports = Arc::new(PortAllocator::new(config.port_start, config.port_end));
        let provisioner: Box<dyn DataDirProvisioner> = match config.provisioner {
            ProvisionerKind::Local => Box::new(LocalProvisioner),
            ProvisionerKind::Container => {
                let mount_root = config
                    .data_path
                    .parent()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| config.data_path.clone());
                Box::new(ContainerProvisioner::new(
                    Arc::clone(&provider),
                    config.helper_image.clone(),
                    mount_root,
                    config.call_timeout(),
                ))
            }
        };
        Self::with_parts(provider, config, ports, provisioner).await
    }

    /// Create a manager with an explicit port pool and provisioner
    pub async fn with_parts(
        provider: Arc<dyn ContainerProvider>,
        config: InstancesConfig,
        ports: Arc<PortAllocator>,
        provisioner: Box<dyn DataDirProvisioner>,
    ) -> Result<Self> {
        let manager = Self {
            provider,
            ports,
            provisioner,
            console: Box::new(RconCli),
            config,
        };
        manager.reconcile().await?;
        Ok(manager)
    }

    /// Replace the console dialect
    pub fn with_console(mut self, console: Box<dyn ConsoleDialect>) -> Self {
        self.console = console;
        self
    }

    pub fn config(&self) -> &InstancesConfig {
        &self.config
    }

    pub fn ports(&self) -> &Arc<PortAllocator> {
        &self.ports
    }

    pub fn provider(&self) -> &dyn ContainerProvider {
        self.provider.as_ref()
    }

    /// Canonical id for a user-facing name
    pub fn instance_id(&self, name: &str) -> String {
        canonical_id(&self.config.name_prefix, name)
    }

    /// Accept either a canonical id or a bare name
    pub(crate) fn resolve(&self, id_or_name: &str) -> String {
        if id_or_name.starts_with(&self.config.name_prefix) {
            id_or_name.to_string()
        } else {
            self.instance_id(id_or_name)
        }
    }

    /// Host directory holding the instance's data
    pub fn data_dir(&self, id: &str) -> PathBuf {
        self.config.data_path.join(id)
    }

    /// Whether a listed container belongs to this deployment
    fn is_managed(&self, name: &str, image: &str) -> bool {
        name.starts_with(&self.config.name_prefix)
            && image_repository(image) == image_repository(&self.config.image)
    }

    /// Rebuild the port pool from the runtime's live bindings
    async fn reconcile(&self) -> Result<()> {
        let containers = self
            .call("list", "containers", self.provider.list(true))
            .await?;
        let managed: Vec<&ContainerInfo> = containers
            .iter()
            .filter(|c| self.is_managed(&c.name, &c.image))
            .collect();

        // Stopped containers only report their bindings through inspect
        let inspected = join_all(managed.iter().map(|c| async move {
            match c.host_port_for(self.config.service_port) {
                Some(port) => Ok(Some(port)),
                None => self
                    .call("inspect", &c.name, self.provider.inspect(&c.id))
                    .await
                    .map(|d| d.host_port_for(self.config.service_port)),
            }
        }))
        .await;

        let mut bindings = Vec::new();
        for (container, port) in managed.iter().zip(inspected) {
            if let Some(port) = port? {
                bindings.push((port, container.name.clone()));
            }
        }
        self.ports.reconcile(bindings);
        Ok(())
    }

    /// Run a runtime call under the per-call deadline
    pub(crate) async fn call<T, F>(&self, step: &'static str, instance: &str, fut: F) -> Result<T>
    where
        F: Future<Output = mbox_provider::Result<T>>,
    {
        self.call_within(self.config.call_timeout(), step, instance, fut)
            .await
    }

    pub(crate) async fn call_within<T, F>(
        &self,
        deadline: Duration,
        step: &'static str,
        instance: &str,
        fut: F,
    ) -> Result<T>
    where
        F: Future<Output = mbox_provider::Result<T>>,
    {
        match tokio::time::timeout(deadline, fut).await {
            Ok(result) => result.map_err(|e| CoreError::runtime(step, instance, e)),
            Err(_) => {
                tracing::warn!("{} of {} timed out after {:?}", step, instance, deadline);
                Err(CoreError::runtime(step, instance, ProviderError::Timeout))
            }
        }
    }

    /// Like [`call`](Self::call), for calls aimed at one instance: a missing
    /// container is `NotFound` rather than a runtime failure
    pub(crate) async fn target_call<T, F>(
        &self,
        step: &'static str,
        instance: &str,
        fut: F,
    ) -> Result<T>
    where
        F: Future<Output = mbox_provider::Result<T>>,
    {
        self.call(step, instance, fut).await.map_err(not_found_for(instance))
    }

    /// Inspect an instance by canonical id
    pub(crate) async fn inspect_instance(&self, id: &str) -> Result<ContainerDetails> {
        self.target_call("inspect", id, self.provider.inspect(&ContainerId::new(id)))
            .await
    }

    /// Uniform view of an inspected container, without players
    pub(crate) fn server_info(&self, details: &ContainerDetails) -> ServerInfo {
        ServerInfo {
            id: details.name.clone(),
            name: display_name(&self.config.name_prefix, &details.name).to_string(),
            container_id: details.id.0.clone(),
            status: InstanceStatus::from(details.status),
            version: details.env_value("VERSION").unwrap_or_default().to_string(),
            memory: details.env_value("MEMORY").map(str::to_string),
            image: details.image.clone(),
            port: details.host_port_for(self.config.service_port),
            players: None,
        }
    }
}

pub(crate) fn not_found_for(instance: &str) -> impl Fn(CoreError) -> CoreError + '_ {
    move |e| match e {
        CoreError::Runtime {
            source: ProviderError::ContainerNotFound(_),
            ..
        } => CoreError::NotFound(instance.to_string()),
        other => other,
    }
}
