//! `server.properties` reader and writer.
//!
//! Keys keep their file order so a rewrite only touches what changed.

use std::path::Path;

/// Vanilla default for `max-players`.
pub const DEFAULT_MAX_PLAYERS: u32 = 20;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerProperties {
    entries: Vec<(String, String)>,
}

impl ServerProperties {
    pub fn parse(content: &str) -> Self {
        let entries = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#') && !l.starts_with('!'))
            .filter_map(|l| {
                let (k, v) = l.split_once('=')?;
                Some((k.trim().to_string(), v.trim().to_string()))
            })
            .collect();
        Self { entries }
    }

    /// Missing file reads as empty properties.
    pub async fn load(path: &Path) -> std::io::Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(Self::parse(&content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    pub async fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, self.render()).await
    }

    pub fn render(&self) -> String {
        let mut out = String::from("#Minecraft server properties\n");
        for (k, v) in &self.entries {
            out.push_str(k);
            out.push('=');
            out.push_str(v);
            out.push('\n');
        }
        out
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    pub fn max_players(&self) -> u32 {
        self.get("max-players")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_PLAYERS)
    }

    pub fn rcon_enabled(&self) -> bool {
        self.get("enable-rcon") == Some("true")
    }

    pub fn rcon_port(&self) -> Option<u16> {
        self.get("rcon.port").and_then(|v| v.parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "#Minecraft server properties\n\
        #Mon Jan 01 00:00:00 UTC 2024\n\
        enable-rcon=true\n\
        max-players=42\n\
        rcon.port=25575\n\
        motd=A Minecraft Server = fun\n";

    #[test]
    fn test_parse_sample() {
        let props = ServerProperties::parse(SAMPLE);
        assert_eq!(props.max_players(), 42);
        assert!(props.rcon_enabled());
        assert_eq!(props.rcon_port(), Some(25575));
        assert_eq!(props.get("motd"), Some("A Minecraft Server = fun"));
    }

    #[test]
    fn test_max_players_falls_back() {
        assert_eq!(ServerProperties::parse("max-players=lots").max_players(), 20);
        assert_eq!(ServerProperties::default().max_players(), 20);
    }

    #[test]
    fn test_set_keeps_order() {
        let mut props = ServerProperties::parse(SAMPLE);
        props.set("max-players", "10");
        props.set("rcon.password", "pw");
        let text = props.render();
        let keys: Vec<&str> = text
            .lines()
            .skip(1)
            .filter_map(|l| l.split_once('=').map(|(k, _)| k))
            .collect();
        assert_eq!(keys, vec!["enable-rcon", "max-players", "rcon.port", "motd", "rcon.password"]);
        assert_eq!(ServerProperties::parse(&text).max_players(), 10);
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let props = ServerProperties::load(&dir.path().join("server.properties")).await.unwrap();
        assert!(!props.rcon_enabled());
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/server.properties");
        let mut props = ServerProperties::default();
        props.set("enable-rcon", "true");
        props.save(&path).await.unwrap();
        assert!(ServerProperties::load(&path).await.unwrap().rcon_enabled());
    }
}
