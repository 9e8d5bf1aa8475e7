//! Lifecycle commands: create, start, stop, rm, exec, players

use anyhow::{bail, Result};
use dialoguer::{theme::ColorfulTheme, Confirm};
use mbox_core::InstanceManager;
use std::io::IsTerminal;

/// Create and start a new instance
pub async fn create(
    manager: &InstanceManager,
    name: &str,
    version: &str,
    memory: Option<&str>,
) -> Result<()> {
    println!("Creating instance '{}' (version {})...", name, version);
    let id = manager.create_instance(name, version, memory).await?;

    match manager.ports().port_of(&id) {
        Some(port) => println!("Instance '{}' is running on port {}", name, port),
        None => println!("Instance '{}' created", name),
    }
    Ok(())
}

pub async fn start(manager: &InstanceManager, name: &str) -> Result<()> {
    manager.start_instance(name).await?;
    println!("Instance '{}' started", name);
    Ok(())
}

pub async fn stop(manager: &InstanceManager, name: &str) -> Result<()> {
    println!(
        "Stopping instance '{}' (up to {}s)...",
        name,
        manager.config().stop_timeout_secs
    );
    manager.stop_instance(name).await?;
    println!("Instance '{}' stopped", name);
    Ok(())
}

/// Delete an instance, optionally with its world data
///
/// Purging asks for confirmation on a terminal unless `yes` is set.
pub async fn remove(manager: &InstanceManager, name: &str, purge: bool, yes: bool) -> Result<()> {
    if purge && !yes && std::io::stdin().is_terminal() {
        let confirmed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!(
                "Delete instance '{}' and all of its world data?",
                name
            ))
            .default(false)
            .interact()?;
        if !confirmed {
            bail!("Aborted");
        }
    }

    manager.delete_instance(name, purge).await?;
    if purge {
        println!("Instance '{}' and its data removed", name);
    } else {
        println!("Instance '{}' removed (data kept)", name);
    }
    Ok(())
}

/// Run a console command and print its reply
pub async fn exec(manager: &InstanceManager, name: &str, cmd: Vec<String>) -> Result<()> {
    if cmd.is_empty() {
        bail!("No command specified");
    }
    let output = manager.execute_command(name, &cmd.join(" ")).await?;
    let output = output.trim_end();
    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(())
}

/// Print the players currently online
pub async fn players(manager: &InstanceManager, name: &str) -> Result<()> {
    let players = manager.list_players(name).await?;
    if players.is_empty() {
        println!("No players online.");
    } else {
        for player in players {
            println!("{}", player);
        }
    }
    Ok(())
}
