//! Docker provider implementation using bollard

use crate::{
    ContainerDetails, ContainerId, ContainerInfo, ContainerProvider, ContainerStatus,
    CreateContainerConfig, ExecConfig, ExecResult, ImageId, MountInfo, MountType, PortInfo,
    ProviderError, ProviderType, Result,
};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, LogOutput, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions, WaitContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::service::{HostConfig, Mount, PortBinding};
use bollard::Docker;
use futures::StreamExt;
use std::collections::HashMap;

type PortMap = HashMap<String, Option<Vec<PortBinding>>>;

/// Docker provider using bollard crate
pub struct DockerProvider {
    client: Docker,
}

impl DockerProvider {
    /// Create a new Docker provider
    pub async fn new(socket_path: &str) -> Result<Self> {
        let client = if socket_path.starts_with("http://") || socket_path.starts_with("https://") {
            Docker::connect_with_http(socket_path, 120, bollard::API_DEFAULT_VERSION)
                .map_err(|e| ProviderError::ConnectionError(e.to_string()))?
        } else {
            let path = socket_path.trim_start_matches("unix://");
            Docker::connect_with_socket(path, 120, bollard::API_DEFAULT_VERSION)
                .map_err(|e| ProviderError::ConnectionError(e.to_string()))?
        };

        // Test connection
        client
            .ping()
            .await
            .map_err(|e| ProviderError::ConnectionError(e.to_string()))?;

        tracing::debug!("Connected to docker at {}", socket_path);
        Ok(Self { client })
    }

    /// Create a new provider for Podman (uses Docker-compatible API)
    pub async fn new_podman(socket_path: &str) -> Result<Self> {
        let provider = Self::new(socket_path).await?;
        tracing::debug!("Using {} through its Docker-compatible API", ProviderType::Podman);
        Ok(provider)
    }
}

#[async_trait]
impl ContainerProvider for DockerProvider {
    async fn pull(&self, image: &str) -> Result<ImageId> {
        use bollard::image::CreateImageOptions;

        let options = CreateImageOptions {
            from_image: image,
            ..Default::default()
        };

        let mut stream = self.client.create_image(Some(options), None, None);

        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(error) = info.error {
                        return Err(ProviderError::ImageNotFound(error));
                    }
                    if let Some(status) = info.status {
                        tracing::debug!("{}", status);
                    }
                }
                Err(e) => return Err(ProviderError::RuntimeError(e.to_string())),
            }
        }

        let inspect = self
            .client
            .inspect_image(image)
            .await
            .map_err(|e| ProviderError::ImageNotFound(e.to_string()))?;

        Ok(ImageId::new(inspect.id.unwrap_or_else(|| image.to_string())))
    }

    async fn create(&self, config: &CreateContainerConfig) -> Result<ContainerId> {
        let options = config.name.as_ref().map(|name| CreateContainerOptions {
            name: name.as_str(),
            platform: None,
        });

        let mut port_bindings: PortMap = HashMap::new();
        let mut exposed_ports: HashMap<String, HashMap<(), ()>> = HashMap::new();

        for port in &config.ports {
            let container_port = format!("{}/{}", port.container_port, port.protocol);
            exposed_ports.insert(container_port.clone(), HashMap::new());

            let binding = PortBinding {
                host_ip: port.host_ip.clone(),
                host_port: port.host_port.map(|p| p.to_string()),
            };
            port_bindings.insert(container_port, Some(vec![binding]));
        }

        let mounts: Vec<Mount> = config
            .mounts
            .iter()
            .map(|m| Mount {
                target: Some(m.target.clone()),
                source: Some(m.source.clone()),
                typ: Some(match m.mount_type {
                    MountType::Bind => bollard::service::MountTypeEnum::BIND,
                    MountType::Volume => bollard::service::MountTypeEnum::VOLUME,
                    MountType::Tmpfs => bollard::service::MountTypeEnum::TMPFS,
                }),
                read_only: Some(m.read_only),
                ..Default::default()
            })
            .collect();

        let host_config = HostConfig {
            mounts: if mounts.is_empty() {
                None
            } else {
                Some(mounts)
            },
            port_bindings: if port_bindings.is_empty() {
                None
            } else {
                Some(port_bindings)
            },
            ..Default::default()
        };

        let env: Vec<String> = config
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();

        let container_config = Config {
            image: Some(config.image.clone()),
            cmd: config.cmd.clone(),
            env: if env.is_empty() { None } else { Some(env) },
            tty: Some(config.tty),
            open_stdin: Some(config.stdin_open),
            labels: if config.labels.is_empty() {
                None
            } else {
                Some(config.labels.clone())
            },
            exposed_ports: if exposed_ports.is_empty() {
                None
            } else {
                Some(exposed_ports)
            },
            host_config: Some(host_config),
            ..Default::default()
        };

        // A 404 on create means the image is missing, not the container
        let response = self
            .client
            .create_container(options, container_config)
            .await
            .map_err(|e| match ProviderError::from(e) {
                ProviderError::ContainerNotFound(msg) => ProviderError::ImageNotFound(msg),
                other => other,
            })?;

        for warning in &response.warnings {
            tracing::warn!("create {}: {}", config.image, warning);
        }

        Ok(ContainerId::new(response.id))
    }

    async fn start(&self, id: &ContainerId) -> Result<()> {
        match self
            .client
            .start_container(&id.0, None::<StartContainerOptions<String>>)
            .await
            .map_err(ProviderError::from)
        {
            Ok(()) | Err(ProviderError::NotModified(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn stop(&self, id: &ContainerId, timeout: Option<u32>) -> Result<()> {
        let options = StopContainerOptions {
            t: timeout.unwrap_or(10) as i64,
        };
        match self
            .client
            .stop_container(&id.0, Some(options))
            .await
            .map_err(ProviderError::from)
        {
            Ok(()) | Err(ProviderError::NotModified(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn remove(&self, id: &ContainerId, force: bool) -> Result<()> {
        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };
        self.client.remove_container(&id.0, Some(options)).await?;
        Ok(())
    }

    async fn wait(&self, id: &ContainerId) -> Result<i64> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };
        let mut stream = self.client.wait_container(&id.0, Some(options));

        let mut exit_code = 0;
        while let Some(result) = stream.next().await {
            match result {
                Ok(response) => exit_code = response.status_code,
                // bollard reports a non-zero exit as an error carrying the code
                Err(bollard::errors::Error::DockerContainerWaitError { code, .. }) => {
                    exit_code = code
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(exit_code)
    }

    async fn exec(&self, id: &ContainerId, config: &ExecConfig) -> Result<ExecResult> {
        let options = CreateExecOptions {
            cmd: Some(config.cmd.clone()),
            env: if config.env.is_empty() {
                None
            } else {
                Some(
                    config
                        .env
                        .iter()
                        .map(|(k, v)| format!("{}={}", k, v))
                        .collect(),
                )
            },
            working_dir: config.working_dir.clone(),
            user: config.user.clone(),
            tty: Some(config.tty),
            attach_stdin: Some(false),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let exec = self.client.create_exec(&id.0, options).await?;

        let start_options = StartExecOptions {
            detach: false,
            tty: config.tty,
            ..Default::default()
        };

        let result = self
            .client
            .start_exec(&exec.id, Some(start_options))
            .await
            .map_err(|e| ProviderError::ExecError(format!("failed to attach: {}", e)))?;

        let mut output_str = String::new();

        match result {
            StartExecResults::Attached { mut output, .. } => {
                while let Some(chunk) = output.next().await {
                    match chunk {
                        Ok(LogOutput::StdOut { message })
                        | Ok(LogOutput::StdErr { message })
                        | Ok(LogOutput::Console { message }) => {
                            output_str.push_str(&String::from_utf8_lossy(&message));
                        }
                        Ok(LogOutput::StdIn { .. }) => {}
                        Err(e) => {
                            return Err(ProviderError::ExecError(format!(
                                "failed to read output: {}",
                                e
                            )))
                        }
                    }
                }
            }
            StartExecResults::Detached => {}
        }

        let inspect = self.client.inspect_exec(&exec.id).await?;
        let exit_code = inspect.exit_code.unwrap_or(0);

        Ok(ExecResult {
            exit_code,
            output: output_str,
        })
    }

    async fn list(&self, all: bool) -> Result<Vec<ContainerInfo>> {
        let options = ListContainersOptions::<String> {
            all,
            ..Default::default()
        };

        let containers = self.client.list_containers(Some(options)).await?;

        Ok(containers
            .into_iter()
            .map(|c| ContainerInfo {
                id: ContainerId::new(c.id.unwrap_or_default()),
                name: c
                    .names
                    .and_then(|n| n.first().cloned())
                    .unwrap_or_default()
                    .trim_start_matches('/')
                    .to_string(),
                image: c.image.unwrap_or_default(),
                status: c
                    .state
                    .as_deref()
                    .map(ContainerStatus::from)
                    .unwrap_or(ContainerStatus::Unknown),
                created: c.created.unwrap_or(0),
                labels: c.labels.unwrap_or_default(),
                ports: c
                    .ports
                    .unwrap_or_default()
                    .into_iter()
                    .map(|p| PortInfo {
                        container_port: p.private_port,
                        host_port: p.public_port,
                        protocol: p
                            .typ
                            .map(|t| format!("{:?}", t).to_lowercase())
                            .unwrap_or_else(|| "tcp".to_string()),
                        host_ip: p.ip,
                    })
                    .collect(),
            })
            .collect())
    }

    async fn inspect(&self, id: &ContainerId) -> Result<ContainerDetails> {
        let info = self.client.inspect_container(&id.0, None).await?;

        let state = info.state.as_ref();
        let status = state
            .and_then(|s| s.status)
            .map(|s| ContainerStatus::from(format!("{:?}", s).to_lowercase().as_str()))
            .unwrap_or(ContainerStatus::Unknown);

        let config = info.config.as_ref();

        let mounts = info
            .mounts
            .clone()
            .unwrap_or_default()
            .into_iter()
            .map(|m| MountInfo {
                mount_type: m
                    .typ
                    .map(|t| format!("{:?}", t).to_lowercase())
                    .unwrap_or_else(|| "unknown".to_string()),
                source: m.source.unwrap_or_default(),
                destination: m.destination.unwrap_or_default(),
                read_only: m.rw.map(|rw| !rw).unwrap_or(false),
            })
            .collect();

        // Live mappings only exist while running; stopped containers still
        // carry their configured bindings in the host config
        let mut ports = info
            .network_settings
            .as_ref()
            .and_then(|ns| ns.ports.as_ref())
            .map(ports_from_map)
            .unwrap_or_default();
        if ports.iter().all(|p| p.host_port.is_none()) {
            if let Some(configured) = info
                .host_config
                .as_ref()
                .and_then(|hc| hc.port_bindings.as_ref())
            {
                ports = ports_from_map(configured);
            }
        }

        let started_at = state
            .and_then(|s| s.started_at.as_ref())
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.timestamp());

        let finished_at = state
            .and_then(|s| s.finished_at.as_ref())
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.timestamp());

        Ok(ContainerDetails {
            id: ContainerId::new(info.id.clone().unwrap_or_else(|| id.0.clone())),
            name: info
                .name
                .clone()
                .unwrap_or_default()
                .trim_start_matches('/')
                .to_string(),
            image: config.and_then(|c| c.image.clone()).unwrap_or_default(),
            image_id: info.image.clone().unwrap_or_default(),
            status,
            created: info
                .created
                .as_ref()
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.timestamp())
                .unwrap_or(0),
            started_at,
            finished_at,
            exit_code: state.and_then(|s| s.exit_code),
            labels: config.and_then(|c| c.labels.clone()).unwrap_or_default(),
            env: config.and_then(|c| c.env.clone()).unwrap_or_default(),
            mounts,
            ports,
        })
    }
}

/// Flatten a `"25565/tcp" -> [bindings]` map into port entries
fn ports_from_map(port_map: &PortMap) -> Vec<PortInfo> {
    let mut ports = Vec::new();
    for (container_port, bindings) in port_map {
        let (port, protocol) = container_port
            .split_once('/')
            .unwrap_or((container_port.as_str(), "tcp"));
        let port_num: u16 = port.parse().unwrap_or(0);

        match bindings {
            Some(bindings) if !bindings.is_empty() => {
                for binding in bindings {
                    ports.push(PortInfo {
                        container_port: port_num,
                        host_port: binding.host_port.as_ref().and_then(|p| p.parse().ok()),
                        protocol: protocol.to_string(),
                        host_ip: binding.host_ip.clone(),
                    });
                }
            }
            _ => ports.push(PortInfo {
                container_port: port_num,
                host_port: None,
                protocol: protocol.to_string(),
                host_ip: None,
            }),
        }
    }
    ports
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ports_from_map() {
        let mut map: PortMap = HashMap::new();
        map.insert(
            "25565/tcp".to_string(),
            Some(vec![PortBinding {
                host_ip: Some("0.0.0.0".to_string()),
                host_port: Some("25570".to_string()),
            }]),
        );
        map.insert("25575/tcp".to_string(), None);

        let mut ports = ports_from_map(&map);
        ports.sort_by_key(|p| p.container_port);

        assert_eq!(ports.len(), 2);
        assert_eq!(ports[0].container_port, 25565);
        assert_eq!(ports[0].host_port, Some(25570));
        assert_eq!(ports[0].protocol, "tcp");
        assert_eq!(ports[1].container_port, 25575);
        assert_eq!(ports[1].host_port, None);
    }
}
