//! CLI command implementations

mod lifecycle;
mod manage;

use anyhow::{anyhow, Result};
use mbox_core::Properties;

pub use lifecycle::*;
pub use manage::*;

/// Parse a `key=value` argument
pub fn parse_assignment(arg: &str) -> Result<(String, String)> {
    let (key, value) = arg
        .split_once('=')
        .ok_or_else(|| anyhow!("Expected key=value, got '{}'", arg))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(anyhow!("Empty property name in '{}'", arg));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

/// Collect `key=value` arguments into a property map
pub fn parse_assignments(args: &[String]) -> Result<Properties> {
    args.iter().map(|a| parse_assignment(a)).collect()
}
