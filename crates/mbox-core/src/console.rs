//! Server console dialect
//!
//! How a console command line becomes an exec argv, and how the reply to the
//! player-list command is read back.

/// Console protocol spoken by the game-server image
pub trait ConsoleDialect: Send + Sync {
    /// Argv that runs `command_line` against the server console
    fn command_argv(&self, command_line: &str) -> Vec<String>;

    /// Console command that reports online players
    fn list_players_command(&self) -> &str;

    /// Player names from the reply to [`list_players_command`](Self::list_players_command)
    fn parse_player_list(&self, output: &str) -> Vec<String>;
}

/// `rcon-cli`, bundled with the itzg/minecraft-server image
#[derive(Debug, Default, Clone, Copy)]
pub struct RconCli;

impl ConsoleDialect for RconCli {
    fn command_argv(&self, command_line: &str) -> Vec<String> {
        vec!["rcon-cli".to_string(), command_line.to_string()]
    }

    fn list_players_command(&self) -> &str {
        "list"
    }

    fn parse_player_list(&self, output: &str) -> Vec<String> {
        parse_player_list(output)
    }
}

/// Parse `There are N of a max of M players online: a, b`
///
/// Everything after the first colon is a comma-separated name list. No
/// colon, or nothing after it, means nobody is online.
pub fn parse_player_list(output: &str) -> Vec<String> {
    let Some((_, names)) = output.split_once(':') else {
        return Vec::new();
    };
    names
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_two_players() {
        assert_eq!(
            parse_player_list("There are 2 of a max of 20 players online: Alice, Bob"),
            vec!["Alice", "Bob"]
        );
    }

    #[test]
    fn test_parse_nobody_online() {
        assert!(parse_player_list("There are 0 of a max of 20 players online:").is_empty());
        assert!(parse_player_list("There are 0 of a max of 20 players online: ").is_empty());
        assert!(parse_player_list("").is_empty());
    }

    #[test]
    fn test_parse_without_colon() {
        assert!(parse_player_list("Unknown command").is_empty());
    }

    #[test]
    fn test_parse_trims_and_drops_empty_entries() {
        assert_eq!(
            parse_player_list("players online:  Steve ,, Alex\n"),
            vec!["Steve", "Alex"]
        );
    }

    #[test]
    fn test_parse_splits_at_first_colon_only() {
        assert_eq!(parse_player_list("online: a:b, c"), vec!["a:b", "c"]);
    }

    #[test]
    fn test_rcon_argv_keeps_command_line_whole() {
        assert_eq!(
            RconCli.command_argv("say hello world"),
            vec!["rcon-cli".to_string(), "say hello world".to_string()]
        );
        assert_eq!(RconCli.list_players_command(), "list");
    }
}
