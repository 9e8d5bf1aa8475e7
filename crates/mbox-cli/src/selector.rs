//! Interactive instance selector for CLI commands

use anyhow::{bail, Result};
use dialoguer::{theme::ColorfulTheme, Select};
use mbox_core::{InstanceStatus, ServerInfo};
use std::io::IsTerminal;

/// Context for filtering instances in the selector
#[derive(Debug, Clone, Copy)]
pub enum SelectionContext {
    /// Only running instances (for stop, exec, players)
    Running,
    /// Instances that can be started
    Startable,
    /// All instances (for rm, status, properties)
    Any,
}

impl SelectionContext {
    /// Filter instances based on selection context
    pub fn filter<'a>(&self, servers: &'a [ServerInfo]) -> Vec<&'a ServerInfo> {
        servers.iter().filter(|s| self.matches(s)).collect()
    }

    fn matches(&self, server: &ServerInfo) -> bool {
        match self {
            SelectionContext::Running => server.status == InstanceStatus::Running,
            SelectionContext::Startable => {
                matches!(server.status, InstanceStatus::Stopped | InstanceStatus::Creating)
            }
            SelectionContext::Any => true,
        }
    }

    fn description(&self) -> &'static str {
        match self {
            SelectionContext::Running => "running",
            SelectionContext::Startable => "stopped",
            SelectionContext::Any => "",
        }
    }
}

/// Get status symbol for an instance
pub fn status_symbol(status: InstanceStatus) -> &'static str {
    match status {
        InstanceStatus::Running => "●",
        InstanceStatus::Stopped => "○",
        InstanceStatus::Creating => "◔",
        InstanceStatus::Removed => "✗",
        InstanceStatus::NotFound => "?",
    }
}

/// One selector row
pub fn item_label(server: &ServerInfo) -> String {
    let port = server
        .port
        .map(|p| format!(":{}", p))
        .unwrap_or_default();
    format!(
        "{} {} ({}{})",
        status_symbol(server.status),
        server.name,
        server.version,
        port
    )
}

/// Interactively select an instance from the list
///
/// Returns the selected instance's name, or an error if cancelled or none match.
pub fn select_instance(
    servers: &[ServerInfo],
    context: SelectionContext,
    prompt: &str,
) -> Result<String> {
    if !std::io::stdin().is_terminal() {
        bail!("Cannot show interactive selector: not a TTY. Specify the instance name as argument.");
    }

    let filtered = context.filter(servers);
    if filtered.is_empty() {
        let kind = context.description();
        let kind = if kind.is_empty() {
            String::new()
        } else {
            format!("{} ", kind)
        };
        bail!("No {}instances found. Use 'mbox list' to see all instances.", kind);
    }

    let items: Vec<String> = filtered.iter().map(|s| item_label(s)).collect();
    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .items(&items)
        .default(0)
        .interact_opt()?;

    match selection {
        Some(index) => Ok(filtered[index].name.clone()),
        None => bail!("Selection cancelled"),
    }
}
