//! Outward notifications for front ends and chat notifiers.

use crate::events::{EventBus, Keyed, SubscriberId};
use serde::Serialize;
use std::future::Future;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    ServerStarted { server: String },
    ServerStopped { server: String, exit_code: i32 },
    ServerCrashed { server: String, exit_code: i32 },
    PlayerJoined { server: String, player: String },
    PlayerLeft { server: String, player: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    ServerStarted,
    ServerStopped,
    ServerCrashed,
    PlayerJoined,
    PlayerLeft,
}

impl Notification {
    /// Name of the server the notification is about.
    pub fn server(&self) -> &str {
        match self {
            Self::ServerStarted { server }
            | Self::ServerStopped { server, .. }
            | Self::ServerCrashed { server, .. }
            | Self::PlayerJoined { server, .. }
            | Self::PlayerLeft { server, .. } => server,
        }
    }
}

impl Keyed for Notification {
    type Kind = NotificationKind;

    fn kind(&self) -> NotificationKind {
        match self {
            Self::ServerStarted { .. } => NotificationKind::ServerStarted,
            Self::ServerStopped { .. } => NotificationKind::ServerStopped,
            Self::ServerCrashed { .. } => NotificationKind::ServerCrashed,
            Self::PlayerJoined { .. } => NotificationKind::PlayerJoined,
            Self::PlayerLeft { .. } => NotificationKind::PlayerLeft,
        }
    }
}

/// One registry per notification kind, backed by a single keyed bus.
pub struct NotifyHub {
    bus: EventBus<Notification>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            bus: EventBus::new("notifications"),
        }
    }

    /// Fires once the server logged its ready line, not when the process spawns.
    pub fn on_server_start<F>(&self, callback: F) -> SubscriberId
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.bus.subscribe(Some(NotificationKind::ServerStarted), move |n| {
            callback(n.server())
        })
    }

    pub fn on_server_stop<F>(&self, callback: F) -> SubscriberId
    where
        F: Fn(&str, i32) + Send + Sync + 'static,
    {
        self.bus.subscribe(Some(NotificationKind::ServerStopped), move |n| {
            if let Notification::ServerStopped { server, exit_code } = n {
                callback(server, *exit_code)
            }
        })
    }

    pub fn on_server_crash<F>(&self, callback: F) -> SubscriberId
    where
        F: Fn(&str, i32) + Send + Sync + 'static,
    {
        self.bus.subscribe(Some(NotificationKind::ServerCrashed), move |n| {
            if let Notification::ServerCrashed { server, exit_code } = n {
                callback(server, *exit_code)
            }
        })
    }

    pub fn on_player_join<F>(&self, callback: F) -> SubscriberId
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.bus.subscribe(Some(NotificationKind::PlayerJoined), move |n| {
            if let Notification::PlayerJoined { server, player } = n {
                callback(server, player)
            }
        })
    }

    pub fn on_player_leave<F>(&self, callback: F) -> SubscriberId
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.bus.subscribe(Some(NotificationKind::PlayerLeft), move |n| {
            if let Notification::PlayerLeft { server, player } = n {
                callback(server, player)
            }
        })
    }

    /// Async subscriber for notifiers that do network I/O. `None` receives
    /// every kind.
    pub fn subscribe_async<F, Fut>(&self, kind: Option<NotificationKind>, callback: F) -> SubscriberId
    where
        F: Fn(Notification) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.bus.subscribe_async(kind, callback)
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.bus.unsubscribe(id)
    }

    pub fn publish(&self, notification: Notification) {
        self.bus.publish(&notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_registries_are_independent() {
        let hub = NotifyHub::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = seen.clone();
        hub.on_server_crash(move |server, code| s.lock().unwrap().push(format!("crash {} {}", server, code)));
        let s = seen.clone();
        hub.on_server_stop(move |server, code| s.lock().unwrap().push(format!("stop {} {}", server, code)));
        let s = seen.clone();
        hub.on_player_join(move |server, player| s.lock().unwrap().push(format!("join {} {}", server, player)));

        hub.publish(Notification::PlayerJoined { server: "lobby".into(), player: "Alice".into() });
        hub.publish(Notification::ServerCrashed { server: "lobby".into(), exit_code: 1 });
        hub.publish(Notification::PlayerLeft { server: "lobby".into(), player: "Alice".into() });

        assert_eq!(*seen.lock().unwrap(), vec!["join lobby Alice", "crash lobby 1"]);
    }

    #[test]
    fn test_unsubscribe() {
        let hub = NotifyHub::new();
        let hits = Arc::new(Mutex::new(0));
        let h = hits.clone();
        let id = hub.on_server_start(move |_| *h.lock().unwrap() += 1);

        hub.publish(Notification::ServerStarted { server: "a".into() });
        assert!(hub.unsubscribe(id));
        hub.publish(Notification::ServerStarted { server: "a".into() });
        assert_eq!(*hits.lock().unwrap(), 1);
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(Notification::ServerStopped { server: "a".into(), exit_code: 0 }).unwrap();
        assert_eq!(json["type"], "server_stopped");
        assert_eq!(json["exit_code"], 0);
    }

    #[tokio::test]
    async fn test_async_subscriber() {
        let hub = NotifyHub::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        hub.subscribe_async(None, move |n| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(n);
            }
        });
        hub.publish(Notification::ServerStarted { server: "a".into() });
        let got = rx.recv().await.unwrap();
        assert_eq!(got.server(), "a");
    }
}
