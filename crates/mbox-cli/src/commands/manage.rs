//! Management commands: list, status, properties, config

use anyhow::{Context, Result};
use mbox_config::{GlobalConfig, InstancesConfig};
use mbox_core::{InstanceManager, Properties, ServerInfo};

use super::parse_assignments;
use crate::selector::status_symbol;

/// List all instances
pub async fn list(manager: &InstanceManager, json: bool) -> Result<()> {
    let servers = manager.list_instances().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&servers)?);
        return Ok(());
    }

    if servers.is_empty() {
        println!("No instances found.");
        println!("\nUse 'mbox create <name> --version <version>' to create one.");
        return Ok(());
    }

    print!("{}", format_table(&servers));
    println!(
        "\n{}",
        format_port_usage(manager.config(), manager.ports().len())
    );
    Ok(())
}

/// One-line summary of the configured port pool
pub fn format_port_usage(config: &InstancesConfig, used: usize) -> String {
    format!(
        "Ports {}-{}: {} of {} in use",
        config.port_start,
        config.port_end,
        used,
        config.port_count()
    )
}

/// Render instances as a fixed-width table
pub fn format_table(servers: &[ServerInfo]) -> String {
    const NAME_WIDTH: usize = 20;
    const STATUS_WIDTH: usize = 10;
    const VERSION_WIDTH: usize = 10;
    const PORT_WIDTH: usize = 7;

    let mut out = format!(
        "  {:<NAME_WIDTH$} {:<STATUS_WIDTH$} {:<VERSION_WIDTH$} {:<PORT_WIDTH$} PLAYERS\n",
        "NAME", "STATUS", "VERSION", "PORT"
    );
    out.push_str(&"-".repeat(70));
    out.push('\n');

    for server in servers {
        let port = server.port.map(|p| p.to_string()).unwrap_or_else(|| "-".into());
        let players = match &server.players {
            Some(p) if p.is_empty() => "0".to_string(),
            Some(p) => format!("{} ({})", p.len(), p.join(", ")),
            None => "-".to_string(),
        };
        out.push_str(&format!(
            "{} {:<NAME_WIDTH$} {:<STATUS_WIDTH$} {:<VERSION_WIDTH$} {:<PORT_WIDTH$} {}\n",
            status_symbol(server.status),
            server.name,
            server.status.to_string(),
            server.version,
            port,
            players
        ));
    }
    out
}

/// Show one instance in detail
pub async fn status(manager: &InstanceManager, name: &str, json: bool) -> Result<()> {
    let info = manager.get_instance_status(name).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("Name:      {}", info.name);
    println!("ID:        {}", info.id);
    println!("Container: {}", short_id(&info.container_id));
    println!("Status:    {}", info.status);
    println!("Version:   {}", info.version);
    println!("Memory:    {}", info.memory.as_deref().unwrap_or("-"));
    println!("Image:     {}", info.image);
    match info.port {
        Some(port) => println!("Port:      {}", port),
        None => println!("Port:      -"),
    }
    match &info.players {
        Some(players) if !players.is_empty() => println!("Players:   {}", players.join(", ")),
        Some(_) => println!("Players:   none online"),
        None => {}
    }
    Ok(())
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

/// Show `server.properties`, or change keys when `set` is non-empty
pub async fn properties(manager: &InstanceManager, name: &str, set: &[String]) -> Result<()> {
    let props = if set.is_empty() {
        manager.get_properties(name).await?
    } else {
        let changes = parse_assignments(set)?;
        let merged = manager.update_properties(name, &changes).await?;
        println!(
            "Updated {} propert{} (applies on next start)",
            changes.len(),
            if changes.len() == 1 { "y" } else { "ies" }
        );
        merged
    };

    print_properties(&props);
    Ok(())
}

fn print_properties(props: &Properties) {
    if props.is_empty() {
        println!("No server.properties yet (created on first server start).");
        return;
    }
    for (key, value) in props {
        println!("{}={}", key, value);
    }
}

/// Show or edit the global configuration
pub async fn config(edit: bool) -> Result<()> {
    let config_path = GlobalConfig::active_path()?;

    if edit {
        let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

        // Create config file with defaults if it doesn't exist
        if !config_path.exists() {
            GlobalConfig::default().save_to(&config_path)?;
            println!("Created default config at {:?}", config_path);
        }

        std::process::Command::new(&editor)
            .arg(&config_path)
            .status()
            .context(format!("Failed to open editor: {}", editor))?;
    } else if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)?;
        println!("# Config file: {:?}\n", config_path);
        println!("{}", content);
    } else {
        println!("# Config file: {:?} (not created yet)\n", config_path);
        println!("# Default configuration:");
        let content = toml::to_string_pretty(&GlobalConfig::default())?;
        println!("{}", content);
        println!("\n# Run 'mbox config --edit' to create and edit the config file.");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mbox_core::InstanceStatus;

    #[test]
    fn test_format_table() {
        let servers = vec![ServerInfo {
            id: "mboxmini-alpha".into(),
            name: "alpha".into(),
            container_id: "0123456789abcdef".into(),
            status: InstanceStatus::Running,
            version: "1.20.1".into(),
            memory: Some("2G".into()),
            image: "itzg/minecraft-server:latest".into(),
            port: Some(25565),
            players: Some(vec!["Alice".into(), "Bob".into()]),
        }];

        let table = format_table(&servers);
        let row = table.lines().nth(2).unwrap();
        assert!(row.starts_with("● alpha"));
        assert!(row.contains("running"));
        assert!(row.contains("25565"));
        assert!(row.ends_with("2 (Alice, Bob)"));
    }

    #[test]
    fn test_format_port_usage() {
        let config = InstancesConfig {
            port_start: 25565,
            port_end: 25574,
            ..Default::default()
        };
        assert_eq!(
            format_port_usage(&config, 3),
            "Ports 25565-25574: 3 of 10 in use"
        );
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("0123456789abcdef"), "0123456789ab");
        assert_eq!(short_id("abc"), "abc");
    }
}
