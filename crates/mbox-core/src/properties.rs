//! `server.properties` reading and rewriting

use crate::{CoreError, Result};
use std::collections::BTreeMap;
use std::path::Path;

/// File name inside an instance's data directory
pub const PROPERTIES_FILE: &str = "server.properties";

/// Keys that may be changed through `update_properties`
pub const EDITABLE_KEYS: &[&str] = &[
    "max-players",
    "difficulty",
    "pvp",
    "allow-flight",
    "spawn-protection",
    "max-world-size",
    "view-distance",
    "motd",
];

pub type Properties = BTreeMap<String, String>;

pub fn is_editable(key: &str) -> bool {
    EDITABLE_KEYS.contains(&key)
}

/// Parse `key=value` lines, skipping blanks, `#` comments and lines without `=`
pub fn parse(contents: &str) -> Properties {
    contents
        .lines()
        .map(str::trim_start)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

/// Render in ascending key order, one `key=value` per line
pub fn render(properties: &Properties) -> String {
    properties
        .iter()
        .map(|(k, v)| format!("{}={}\n", k, v))
        .collect()
}

/// Read the properties file; a missing file is an empty map
pub async fn read(path: &Path) -> Result<Properties> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(parse(&contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Properties::new()),
        Err(e) => Err(CoreError::provision("read", path, e)),
    }
}

/// Merge `changes` into the file at `path`
///
/// Every key and value is checked before anything is written.
pub async fn update(path: &Path, changes: &Properties) -> Result<Properties> {
    if let Some(key) = changes.keys().find(|k| !is_editable(k)) {
        return Err(CoreError::InvalidArgument(format!(
            "property '{}' is not allowed to be modified",
            key
        )));
    }
    if let Some(key) = changes
        .iter()
        .find(|(_, v)| v.contains(['\n', '\r']))
        .map(|(k, _)| k)
    {
        return Err(CoreError::InvalidArgument(format!(
            "value of property '{}' must be a single line",
            key
        )));
    }

    let mut merged = read(path).await?;
    merged.extend(changes.iter().map(|(k, v)| (k.clone(), v.clone())));

    tokio::fs::write(path, render(&merged))
        .await
        .map_err(|e| CoreError::provision("write", path, e))?;
    tracing::debug!("Wrote {} properties to {}", merged.len(), path.display());
    Ok(merged)
}
