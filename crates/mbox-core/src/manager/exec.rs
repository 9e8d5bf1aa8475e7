//! Console commands and server properties

use crate::properties::{self, Properties, PROPERTIES_FILE};
use crate::{CoreError, Result};
use mbox_provider::{ContainerId, ExecConfig, ProviderError};

use super::InstanceManager;

impl InstanceManager {
    /// Run a console command line in a running instance and return its output
    pub async fn execute_command(&self, id: &str, command_line: &str) -> Result<String> {
        let command_line = command_line.trim();
        let Some(verb) = command_line.split_whitespace().next() else {
            return Err(CoreError::InvalidArgument("command must not be empty".into()));
        };
        let allowed = &self.config.allowed_commands;
        if !allowed.is_empty() && !allowed.iter().any(|c| c == verb) {
            return Err(CoreError::InvalidArgument(format!(
                "command '{}' is not allowed",
                verb
            )));
        }

        let id = self.resolve(id);
        self.run_console(&id, command_line).await
    }

    /// Names of the players currently online
    pub async fn list_players(&self, id: &str) -> Result<Vec<String>> {
        let id = self.resolve(id);
        let output = self
            .run_console(&id, self.console.list_players_command())
            .await?;
        Ok(self.console.parse_player_list(&output))
    }

    async fn run_console(&self, id: &str, command_line: &str) -> Result<String> {
        let config = ExecConfig {
            cmd: self.console.command_argv(command_line),
            ..Default::default()
        };
        tracing::debug!("Running console command on {}: {}", id, command_line);

        let container = ContainerId::new(id);
        let exec = self.provider.exec(&container, &config);
        let result = match tokio::time::timeout(self.config.call_timeout(), exec).await {
            Ok(Ok(result)) => result,
            Ok(Err(ProviderError::ContainerNotFound(_))) => {
                return Err(CoreError::NotFound(id.to_string()))
            }
            Ok(Err(ProviderError::Conflict(_))) => {
                return Err(CoreError::exec(id, None, "instance is not running"))
            }
            Ok(Err(e)) => return Err(CoreError::exec(id, None, e.to_string())),
            Err(_) => {
                return Err(CoreError::exec(
                    id,
                    None,
                    ProviderError::Timeout.to_string(),
                ))
            }
        };

        if result.exit_code != 0 {
            let output = result.output.trim();
            let message = if output.is_empty() {
                "command produced no output".to_string()
            } else {
                output.to_string()
            };
            return Err(CoreError::exec(id, Some(result.exit_code), message));
        }
        Ok(result.output)
    }

    /// Contents of the instance's `server.properties`
    pub async fn get_properties(&self, id: &str) -> Result<Properties> {
        let id = self.resolve(id);
        self.inspect_instance(&id).await?;
        properties::read(&self.data_dir(&id).join(PROPERTIES_FILE)).await
    }

    /// Change editable keys in `server.properties`, returning the merged file
    ///
    /// Takes effect on the next server start.
    pub async fn update_properties(&self, id: &str, changes: &Properties) -> Result<Properties> {
        let id = self.resolve(id);
        self.inspect_instance(&id).await?;
        let merged = properties::update(&self.data_dir(&id).join(PROPERTIES_FILE), changes).await?;
        tracing::info!("Updated {} properties on {}", changes.len(), id);
        Ok(merged)
    }
}
