//! Core logic for mbox game-server instances
//!
//! This crate provides:
//! - Instance lifecycle management (create, start, stop, delete)
//! - Host port pool with startup reconciliation
//! - Console commands and player-list parsing
//! - Data directory provisioning and `server.properties` editing

pub mod console;
mod error;
pub mod instance;
mod manager;
pub mod ports;
pub mod properties;
pub mod provision;

pub use console::{ConsoleDialect, RconCli};
pub use error::*;
pub use instance::{InstanceStatus, ServerInfo};
pub use manager::InstanceManager;
pub use ports::{PortAllocator, PortClaim, PortProbe, TcpProbe};
pub use properties::Properties;
pub use provision::{ContainerProvisioner, DataDirProvisioner, LocalProvisioner};

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
