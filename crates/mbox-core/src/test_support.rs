//! Test support utilities for mbox-core
//!
//! Provides a MockProvider backed by an in-memory container table so the
//! InstanceManager can be exercised without a real Docker/Podman runtime.
//! Individual operations can be forced to fail through the `*_error` slots.

use async_trait::async_trait;
use mbox_provider::*;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Records which methods were called on the mock
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Pull {
        image: String,
    },
    Create {
        image: String,
        name: Option<String>,
        cmd: Option<Vec<String>>,
    },
    Start {
        id: String,
    },
    Stop {
        id: String,
        timeout: Option<u32>,
    },
    Remove {
        id: String,
        force: bool,
    },
    Wait {
        id: String,
    },
    Exec {
        id: String,
        cmd: Vec<String>,
    },
    Inspect {
        id: String,
    },
    List {
        all: bool,
    },
}

type ErrorSlot = Arc<Mutex<Option<ProviderError>>>;

/// Configurable mock container provider for testing
pub struct MockProvider {
    pub provider_type: ProviderType,
    pub calls: Arc<Mutex<Vec<MockCall>>>,
    /// Containers keyed by runtime id
    pub containers: Arc<Mutex<BTreeMap<String, ContainerDetails>>>,
    next_id: AtomicU64,
    /// Result for pull calls
    pub pull_result: Arc<Mutex<Result<ImageId>>>,
    /// Forced failures; `None` means the container table decides
    pub create_error: ErrorSlot,
    pub start_error: ErrorSlot,
    pub stop_error: ErrorSlot,
    pub remove_error: ErrorSlot,
    pub inspect_error: ErrorSlot,
    pub list_error: ErrorSlot,
    /// Exit code and output for exec calls
    pub exec_exit_code: Arc<Mutex<i64>>,
    pub exec_output: Arc<Mutex<String>>,
    /// Per-container exec output, keyed by container name
    pub exec_outputs: Arc<Mutex<HashMap<String, String>>>,
    /// Error for every exec call
    pub exec_error: ErrorSlot,
    /// Exec errors for specific containers, keyed by container name
    pub exec_errors: Arc<Mutex<HashMap<String, ProviderError>>>,
    /// Exit code reported by wait
    pub wait_exit_code: Arc<Mutex<i64>>,
}

impl MockProvider {
    /// Create a new mock provider with an empty container table
    pub fn new(provider_type: ProviderType) -> Self {
        Self {
            provider_type,
            calls: Arc::new(Mutex::new(Vec::new())),
            containers: Arc::new(Mutex::new(BTreeMap::new())),
            next_id: AtomicU64::new(1),
            pull_result: Arc::new(Mutex::new(Ok(ImageId::new("sha256:mock_pulled_id")))),
            create_error: Arc::new(Mutex::new(None)),
            start_error: Arc::new(Mutex::new(None)),
            stop_error: Arc::new(Mutex::new(None)),
            remove_error: Arc::new(Mutex::new(None)),
            inspect_error: Arc::new(Mutex::new(None)),
            list_error: Arc::new(Mutex::new(None)),
            exec_exit_code: Arc::new(Mutex::new(0)),
            exec_output: Arc::new(Mutex::new(String::new())),
            exec_outputs: Arc::new(Mutex::new(HashMap::new())),
            exec_error: Arc::new(Mutex::new(None)),
            exec_errors: Arc::new(Mutex::new(HashMap::new())),
            wait_exit_code: Arc::new(Mutex::new(0)),
        }
    }

    /// Record a call
    fn record(&self, call: MockCall) {
        self.calls.lock().unwrap().push(call);
    }

    /// Get all recorded calls
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Check if a specific call was made
    pub fn was_called(&self, call: &MockCall) -> bool {
        self.calls.lock().unwrap().contains(call)
    }

    /// Seed the container table
    pub fn insert_container(&self, details: ContainerDetails) {
        self.containers
            .lock()
            .unwrap()
            .insert(details.id.0.clone(), details);
    }

    /// Container by name or id
    pub fn container(&self, id_or_name: &str) -> Option<ContainerDetails> {
        let containers = self.containers.lock().unwrap();
        find_key(&containers, id_or_name).and_then(|key| containers.get(&key).cloned())
    }

    /// Names of all containers in the table
    pub fn container_names(&self) -> Vec<String> {
        self.containers
            .lock()
            .unwrap()
            .values()
            .map(|c| c.name.clone())
            .collect()
    }

    /// Change a container's status behind the manager's back
    pub fn set_status(&self, id_or_name: &str, status: ContainerStatus) {
        let mut containers = self.containers.lock().unwrap();
        if let Some(key) = find_key(&containers, id_or_name) {
            if let Some(c) = containers.get_mut(&key) {
                c.status = status;
            }
        }
    }

    fn take_error(slot: &ErrorSlot) -> Option<ProviderError> {
        slot.lock().unwrap().as_ref().map(clone_provider_error)
    }

    fn update<T>(
        &self,
        id: &ContainerId,
        f: impl FnOnce(&mut ContainerDetails) -> Result<T>,
    ) -> Result<T> {
        let mut containers = self.containers.lock().unwrap();
        let key = find_key(&containers, &id.0)
            .ok_or_else(|| ProviderError::ContainerNotFound(id.0.clone()))?;
        match containers.get_mut(&key) {
            Some(c) => f(c),
            None => Err(ProviderError::ContainerNotFound(id.0.clone())),
        }
    }
}

fn find_key(containers: &BTreeMap<String, ContainerDetails>, id_or_name: &str) -> Option<String> {
    if containers.contains_key(id_or_name) {
        return Some(id_or_name.to_string());
    }
    containers
        .values()
        .find(|c| c.name == id_or_name)
        .map(|c| c.id.0.clone())
}

/// Clone a ProviderError (thiserror types don't implement Clone)
pub fn clone_provider_error(e: &ProviderError) -> ProviderError {
    match e {
        ProviderError::ConnectionError(s) => ProviderError::ConnectionError(s.clone()),
        ProviderError::ContainerNotFound(s) => ProviderError::ContainerNotFound(s.clone()),
        ProviderError::ImageNotFound(s) => ProviderError::ImageNotFound(s.clone()),
        ProviderError::Conflict(s) => ProviderError::Conflict(s.clone()),
        ProviderError::NotModified(s) => ProviderError::NotModified(s.clone()),
        ProviderError::ExecError(s) => ProviderError::ExecError(s.clone()),
        ProviderError::RuntimeError(s) => ProviderError::RuntimeError(s.clone()),
        ProviderError::Timeout => ProviderError::Timeout,
    }
}

/// Create a mock ContainerDetails
pub fn mock_container_details(id: &str, name: &str, status: ContainerStatus) -> ContainerDetails {
    ContainerDetails {
        id: ContainerId::new(id),
        name: name.to_string(),
        image: "mock_image:latest".to_string(),
        image_id: "sha256:mock_image_id".to_string(),
        status,
        created: 0,
        started_at: None,
        finished_at: None,
        exit_code: None,
        labels: HashMap::new(),
        env: Vec::new(),
        mounts: Vec::new(),
        ports: Vec::new(),
    }
}

/// A game-server container as mbox would have created it
pub fn server_container(
    id: &str,
    name: &str,
    status: ContainerStatus,
    port: u16,
    version: &str,
) -> ContainerDetails {
    let mut details = mock_container_details(id, name, status);
    details.image = "itzg/minecraft-server:latest".to_string();
    details.env = vec![
        "EULA=TRUE".to_string(),
        format!("VERSION={}", version),
        "MEMORY=2G".to_string(),
        "TYPE=VANILLA".to_string(),
    ];
    details.ports = vec![PortInfo {
        container_port: 25565,
        host_port: Some(port),
        protocol: "tcp".to_string(),
        host_ip: Some("0.0.0.0".to_string()),
    }];
    details
}

#[async_trait]
impl ContainerProvider for MockProvider {
    async fn pull(&self, image: &str) -> Result<ImageId> {
        self.record(MockCall::Pull {
            image: image.to_string(),
        });
        let guard = self.pull_result.lock().unwrap();
        match &*guard {
            Ok(v) => Ok(v.clone()),
            Err(e) => Err(clone_provider_error(e)),
        }
    }

    async fn create(&self, config: &CreateContainerConfig) -> Result<ContainerId> {
        self.record(MockCall::Create {
            image: config.image.clone(),
            name: config.name.clone(),
            cmd: config.cmd.clone(),
        });
        if let Some(e) = Self::take_error(&self.create_error) {
            return Err(e);
        }

        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = format!("{:064x}", n);
        let name = config.name.clone().unwrap_or_else(|| format!("mock_{}", n));

        let mut containers = self.containers.lock().unwrap();
        if containers.values().any(|c| c.name == name) {
            return Err(ProviderError::Conflict(format!(
                "container name \"/{}\" is already in use",
                name
            )));
        }

        let mut env: Vec<String> = config
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        env.sort();

        let mut details = mock_container_details(&id, &name, ContainerStatus::Created);
        details.image = config.image.clone();
        details.env = env;
        details.labels = config.labels.clone();
        details.mounts = config
            .mounts
            .iter()
            .map(|m| MountInfo {
                mount_type: m.mount_type.to_string(),
                source: m.source.clone(),
                destination: m.target.clone(),
                read_only: m.read_only,
            })
            .collect();
        details.ports = config
            .ports
            .iter()
            .map(|p| PortInfo {
                container_port: p.container_port,
                host_port: p.host_port,
                protocol: p.protocol.clone(),
                host_ip: p.host_ip.clone(),
            })
            .collect();
        containers.insert(id.clone(), details);

        Ok(ContainerId::new(id))
    }

    async fn start(&self, id: &ContainerId) -> Result<()> {
        self.record(MockCall::Start { id: id.0.clone() });
        if let Some(e) = Self::take_error(&self.start_error) {
            return Err(e);
        }
        self.update(id, |c| {
            c.status = ContainerStatus::Running;
            Ok(())
        })
    }

    async fn stop(&self, id: &ContainerId, timeout: Option<u32>) -> Result<()> {
        self.record(MockCall::Stop {
            id: id.0.clone(),
            timeout,
        });
        if let Some(e) = Self::take_error(&self.stop_error) {
            return Err(e);
        }
        self.update(id, |c| {
            c.status = ContainerStatus::Exited;
            Ok(())
        })
    }

    async fn remove(&self, id: &ContainerId, force: bool) -> Result<()> {
        self.record(MockCall::Remove {
            id: id.0.clone(),
            force,
        });
        if let Some(e) = Self::take_error(&self.remove_error) {
            return Err(e);
        }
        let mut containers = self.containers.lock().unwrap();
        let key = find_key(&containers, &id.0)
            .ok_or_else(|| ProviderError::ContainerNotFound(id.0.clone()))?;
        let running = containers
            .get(&key)
            .map(|c| c.status == ContainerStatus::Running)
            .unwrap_or(false);
        if running && !force {
            return Err(ProviderError::Conflict(format!(
                "cannot remove running container {}",
                id
            )));
        }
        containers.remove(&key);
        Ok(())
    }

    async fn wait(&self, id: &ContainerId) -> Result<i64> {
        self.record(MockCall::Wait { id: id.0.clone() });
        self.update(id, |c| {
            c.status = ContainerStatus::Exited;
            Ok(())
        })?;
        Ok(*self.wait_exit_code.lock().unwrap())
    }

    async fn exec(&self, id: &ContainerId, config: &ExecConfig) -> Result<ExecResult> {
        self.record(MockCall::Exec {
            id: id.0.clone(),
            cmd: config.cmd.clone(),
        });
        if let Some(e) = Self::take_error(&self.exec_error) {
            return Err(e);
        }
        let details = self
            .container(&id.0)
            .ok_or_else(|| ProviderError::ContainerNotFound(id.0.clone()))?;
        if let Some(e) = self.exec_errors.lock().unwrap().get(&details.name) {
            return Err(clone_provider_error(e));
        }
        if details.status != ContainerStatus::Running {
            return Err(ProviderError::Conflict(format!(
                "container {} is not running",
                details.id
            )));
        }
        let output = self
            .exec_outputs
            .lock()
            .unwrap()
            .get(&details.name)
            .cloned()
            .unwrap_or_else(|| self.exec_output.lock().unwrap().clone());
        Ok(ExecResult {
            exit_code: *self.exec_exit_code.lock().unwrap(),
            output,
        })
    }

    async fn list(&self, all: bool) -> Result<Vec<ContainerInfo>> {
        self.record(MockCall::List { all });
        if let Some(e) = Self::take_error(&self.list_error) {
            return Err(e);
        }
        Ok(self
            .containers
            .lock()
            .unwrap()
            .values()
            .filter(|c| all || c.status == ContainerStatus::Running)
            .map(|c| ContainerInfo {
                id: c.id.clone(),
                name: c.name.clone(),
                image: c.image.clone(),
                status: c.status,
                created: c.created,
                labels: c.labels.clone(),
                // Like Docker, only running containers report published ports
                ports: if c.status == ContainerStatus::Running {
                    c.ports.clone()
                } else {
                    Vec::new()
                },
            })
            .collect())
    }

    async fn inspect(&self, id: &ContainerId) -> Result<ContainerDetails> {
        self.record(MockCall::Inspect { id: id.0.clone() });
        if let Some(e) = Self::take_error(&self.inspect_error) {
            return Err(e);
        }
        self.container(&id.0)
            .ok_or_else(|| ProviderError::ContainerNotFound(id.0.clone()))
    }
}
