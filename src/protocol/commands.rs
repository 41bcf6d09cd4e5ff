//! Typed wrappers around common console commands.

use super::rcon::RconClient;
use std::time::Duration;

pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Parsed reply of the `list` command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerList {
    pub online: Option<u32>,
    pub max: Option<u32>,
    pub names: Vec<String>,
}

/// Parse "There are 2 of a max of 20 players online: Alice, Bob".
///
/// Counts are best-effort; names are everything after the first colon.
pub fn parse_player_list(response: &str) -> PlayerList {
    let (head, tail) = match response.split_once(':') {
        Some((h, t)) => (h, Some(t)),
        None => (response, None),
    };

    let numbers: Vec<u32> = head
        .split(|c: char| !c.is_ascii_digit())
        .filter_map(|s| s.parse().ok())
        .collect();

    let names = tail
        .map(|t| {
            t.split(',')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    PlayerList {
        online: numbers.first().copied(),
        max: numbers.get(1).copied(),
        names,
    }
}

impl RconClient {
    pub async fn list_players(&self) -> Option<PlayerList> {
        let response = self.command("list", DEFAULT_COMMAND_TIMEOUT).await?;
        Some(parse_player_list(&response))
    }

    pub async fn say(&self, message: &str) -> bool {
        self.command(&format!("say {}", message), DEFAULT_COMMAND_TIMEOUT)
            .await
            .is_some()
    }

    pub async fn kick(&self, player: &str, reason: Option<&str>) -> bool {
        let cmd = match reason {
            Some(r) if !r.is_empty() => format!("kick {} {}", player, r),
            _ => format!("kick {}", player),
        };
        self.command(&cmd, DEFAULT_COMMAND_TIMEOUT).await.is_some()
    }

    pub async fn whitelist_add(&self, player: &str) -> Option<String> {
        self.command(&format!("whitelist add {}", player), DEFAULT_COMMAND_TIMEOUT)
            .await
    }

    pub async fn whitelist_remove(&self, player: &str) -> Option<String> {
        self.command(&format!("whitelist remove {}", player), DEFAULT_COMMAND_TIMEOUT)
            .await
    }

    pub async fn op(&self, player: &str) -> Option<String> {
        self.command(&format!("op {}", player), DEFAULT_COMMAND_TIMEOUT).await
    }

    pub async fn deop(&self, player: &str) -> Option<String> {
        self.command(&format!("deop {}", player), DEFAULT_COMMAND_TIMEOUT).await
    }

    pub async fn save_all(&self) -> bool {
        self.command("save-all", DEFAULT_COMMAND_TIMEOUT).await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_two_players() {
        let list = parse_player_list("There are 2 of a max of 20 players online: Alice, Bob");
        assert_eq!(list.online, Some(2));
        assert_eq!(list.max, Some(20));
        assert_eq!(list.names, vec!["Alice", "Bob"]);
    }

    #[test]
    fn test_parse_empty_server() {
        let list = parse_player_list("There are 0 of a max of 20 players online: ");
        assert_eq!(list.online, Some(0));
        assert!(list.names.is_empty());
    }

    #[test]
    fn test_parse_unexpected_reply() {
        let list = parse_player_list("Unknown command");
        assert_eq!(list, PlayerList::default());
    }
}
