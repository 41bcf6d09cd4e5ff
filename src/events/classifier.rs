//! Turns raw server output into [`ServerEvent`]s.
//!
//! Lines are tested against an ordered rule table and the first match wins.
//! Lines in the standard `[HH:MM:SS] [thread/LEVEL]: message` layout are
//! matched on the message part; anything else is matched as a whole.

use super::bus::{EventBus, SubscriberId};
use super::{EventKind, ServerEvent};
use chrono::{DateTime, Local, NaiveTime};
use regex::{Captures, Regex};
use std::collections::BTreeSet;
use std::sync::RwLock;

const LOG_LINE_PATTERN: &str = r"^\[(\d{2}:\d{2}:\d{2})\]\s*\[([^\]]+)/(\w+)\]:\s*(.*)$";

/// Match order matters: achievement text must win over the looser death rule.
const RULES: &[(EventKind, &str)] = &[
    (EventKind::ServerStarting, r"Starting minecraft server version (\S+)"),
    (EventKind::ServerStarted, r#"Done \([^)]+\)! For help, type "help""#),
    (EventKind::ServerStopping, r"Stopping the server"),
    (EventKind::ServerStopped, r"Closing Server"),
    (EventKind::PlayerJoined, r"(\w+)\[/[\d.:]+\] logged in with entity id"),
    (EventKind::PlayerLeft, r"(\w+) left the game"),
    (EventKind::PlayerChat, r"<(\w+)>\s+(.+)"),
    (
        EventKind::PlayerAchievement,
        r"(\w+) has (made the advancement|completed the challenge|reached the goal) \[(.+)\]",
    ),
    (
        EventKind::PlayerDied,
        r"(\w+) (was |died|fell|drowned|burned|blew up|hit the ground|suffocated|starved|withered|experienced kinetic energy)",
    ),
    (EventKind::RconReady, r"RCON running on [\d.:]+"),
    (EventKind::WorldSaved, r"Saved the (game|world)"),
];

struct Rule {
    kind: EventKind,
    pattern: Regex,
}

struct LogLine<'a> {
    timestamp: DateTime<Local>,
    level: Option<&'a str>,
    message: &'a str,
}

pub struct LogClassifier {
    log_line: Option<Regex>,
    rules: Vec<Rule>,
    players: RwLock<BTreeSet<String>>,
    bus: EventBus<ServerEvent>,
}

impl Default for LogClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl LogClassifier {
    pub fn new() -> Self {
        let log_line = compile(LOG_LINE_PATTERN);
        let rules = RULES
            .iter()
            .filter_map(|(kind, pat)| compile(pat).map(|pattern| Rule { kind: *kind, pattern }))
            .collect();

        Self {
            log_line,
            rules,
            players: RwLock::new(BTreeSet::new()),
            bus: EventBus::new("log-events"),
        }
    }

    /// Subscribe to one event kind, or to all of them with `None`.
    pub fn on_event<F>(&self, kind: Option<EventKind>, callback: F) -> SubscriberId
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        self.bus.subscribe(kind, callback)
    }

    pub fn events(&self) -> &EventBus<ServerEvent> {
        &self.bus
    }

    /// Pure classification; does not touch player state or subscribers.
    pub fn classify(&self, line: &str) -> Option<ServerEvent> {
        if line.trim().is_empty() {
            return None;
        }
        let parsed = self.split_line(line);

        for rule in &self.rules {
            if let Some(caps) = rule.pattern.captures(parsed.message) {
                let (player, message) = extract(rule.kind, &caps, parsed.message);
                return Some(ServerEvent {
                    kind: rule.kind,
                    timestamp: parsed.timestamp,
                    player,
                    message,
                    raw_line: line.to_string(),
                });
            }
        }

        let kind = match parsed.level {
            Some("WARN") => EventKind::Warning,
            Some("ERROR") | Some("FATAL") => EventKind::Error,
            _ => return None,
        };
        Some(ServerEvent {
            kind,
            timestamp: parsed.timestamp,
            player: None,
            message: Some(parsed.message.to_string()),
            raw_line: line.to_string(),
        })
    }

    /// Classify, update the online set, then notify subscribers.
    pub fn process_line(&self, line: &str) -> Option<ServerEvent> {
        let event = self.classify(line)?;
        self.apply(&event);

        match event.kind {
            EventKind::Warning | EventKind::Error => tracing::debug!(
                "[EVENT] {} | message={}",
                event.kind,
                event.message.as_deref().unwrap_or("-")
            ),
            _ => tracing::info!(
                "[EVENT] {} | player={} | message={}",
                event.kind,
                event.player.as_deref().unwrap_or("-"),
                event.message.as_deref().unwrap_or("-")
            ),
        }

        self.bus.publish(&event);
        Some(event)
    }

    /// Sorted names of players currently online.
    pub fn online_players(&self) -> Vec<String> {
        self.players
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn player_count(&self) -> usize {
        self.players.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn reset(&self) {
        self.players.write().unwrap_or_else(|e| e.into_inner()).clear();
    }

    fn apply(&self, event: &ServerEvent) {
        let mut players = self.players.write().unwrap_or_else(|e| e.into_inner());
        match (event.kind, event.player.as_ref()) {
            (EventKind::PlayerJoined, Some(name)) => {
                players.insert(name.clone());
            }
            (EventKind::PlayerLeft, Some(name)) => {
                players.remove(name);
            }
            // leave lines are not guaranteed for everyone on shutdown
            (EventKind::ServerStopping, _) => players.clear(),
            _ => {}
        }
    }

    fn split_line<'a>(&self, line: &'a str) -> LogLine<'a> {
        let caps = self.log_line.as_ref().and_then(|re| re.captures(line));
        match caps {
            Some(caps) => {
                let timestamp = caps
                    .get(1)
                    .and_then(|m| stamp_today(m.as_str()))
                    .unwrap_or_else(Local::now);
                LogLine {
                    timestamp,
                    level: caps.get(3).map(|m| m.as_str()),
                    message: caps.get(4).map_or(line, |m| m.as_str()),
                }
            }
            None => LogLine {
                timestamp: Local::now(),
                level: None,
                message: line,
            },
        }
    }
}

fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!("Invalid log pattern '{}': {}", pattern, e);
            None
        }
    }
}

fn group(caps: &Captures<'_>, i: usize) -> Option<String> {
    caps.get(i).map(|m| m.as_str().to_string())
}

/// `body` is the message part of the line; death events keep all of it so
/// the cause survives.
fn extract(kind: EventKind, caps: &Captures<'_>, body: &str) -> (Option<String>, Option<String>) {
    match kind {
        EventKind::ServerStarting => (None, group(caps, 1)),
        EventKind::PlayerJoined | EventKind::PlayerLeft => (group(caps, 1), None),
        EventKind::PlayerChat => (group(caps, 1), group(caps, 2)),
        EventKind::PlayerAchievement => (group(caps, 1), group(caps, 3)),
        EventKind::PlayerDied => (group(caps, 1), Some(body.trim().to_string())),
        _ => (None, None),
    }
}

/// `HH:MM:SS` on today's local date.
fn stamp_today(time: &str) -> Option<DateTime<Local>> {
    let time = NaiveTime::parse_from_str(time, "%H:%M:%S").ok()?;
    Local::now()
        .date_naive()
        .and_time(time)
        .and_local_timezone(Local)
        .earliest()
}
