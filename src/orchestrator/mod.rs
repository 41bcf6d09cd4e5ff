//! Lifecycle of the one active server.
//!
//! [`ServerManager`] owns the per-server components (process supervisor,
//! RCON client, log classifier, idle shutdown, backup engine) and wires them
//! together:
//!
//! - stdout lines go to the classifier in emission order
//! - the classifier's `server_started` event marks the server ready, starts
//!   the RCON connection and arms the idle countdown
//! - join/leave events feed the idle countdown and the notification hub
//! - process exit resets per-session state and reports stop or crash
//!
//! Start, stop, kill and restore are serialized by one lifecycle lock, so
//! the supervisor never sees concurrent start/stop calls.

pub mod notify;

use crate::backup::{BackupEngine, BackupKind, BackupRecord};
use crate::config::ManagerConfig;
use crate::error::{KeeperError, Result};
use crate::events::{EventKind, LogClassifier, ServerEvent};
use crate::protocol::RconClient;
use crate::server::properties::ServerProperties;
use crate::server::{PhaseMachine, ServerConfig, ServerPhase, ServerStatus};
use crate::shutdown::{CountdownState, IdleShutdown};
use crate::store::ServerStore;
use crate::supervisor::{monitor, LaunchSpec, ProcessSupervisor};
use chrono::Local;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

pub use notify::{Notification, NotificationKind, NotifyHub};

const SAVE_FLUSH_COMMAND: &str = "save-all flush";

/// Delays the manager waits on. Tests shorten them.
#[derive(Debug, Clone)]
pub struct ManagerTimings {
    /// After `save-all flush`, before archiving the world
    pub save_settle: Duration,
    /// Between stop and start on restart
    pub restart_settle: Duration,
    /// Per escalation step once the console `stop` timed out
    pub terminate_grace: Duration,
    /// One idle-countdown step
    pub idle_tick: Duration,
    /// Period of scheduled auto backups; `None` follows `backups.interval_hours`
    pub auto_backup_interval: Option<Duration>,
}

impl Default for ManagerTimings {
    fn default() -> Self {
        Self {
            save_settle: Duration::from_secs(3),
            restart_settle: Duration::from_secs(2),
            terminate_grace: Duration::from_secs(5),
            idle_tick: Duration::from_secs(60),
            auto_backup_interval: None,
        }
    }
}

/// Components bound to one server record.
struct ActiveServer {
    server: RwLock<ServerConfig>,
    process: ProcessSupervisor,
    rcon: Arc<RconClient>,
    classifier: LogClassifier,
    shutdown: IdleShutdown,
    backups: BackupEngine,
    /// Cancelled when the current process exits
    session: Mutex<CancellationToken>,
}

impl ActiveServer {
    fn snapshot(&self) -> ServerConfig {
        self.server.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn name(&self) -> String {
        self.server.read().unwrap_or_else(|e| e.into_inner()).name.clone()
    }

    fn session(&self) -> CancellationToken {
        self.session.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn new_session(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.session.lock().unwrap_or_else(|e| e.into_inner()) = token.clone();
        token
    }

    fn end_session(&self) {
        self.session.lock().unwrap_or_else(|e| e.into_inner()).cancel();
    }
}

pub struct ServerManager {
    me: Weak<ServerManager>,
    config: Arc<ManagerConfig>,
    store: Arc<dyn ServerStore>,
    timings: ManagerTimings,
    notify: NotifyHub,
    machine: Mutex<PhaseMachine>,
    phase_tx: watch::Sender<ServerPhase>,
    active: RwLock<Option<Arc<ActiveServer>>>,
    lifecycle: tokio::sync::Mutex<()>,
}

impl ServerManager {
    pub fn new(config: Arc<ManagerConfig>, store: Arc<dyn ServerStore>) -> Arc<Self> {
        Self::with_timings(config, store, ManagerTimings::default())
    }

    pub fn with_timings(
        config: Arc<ManagerConfig>,
        store: Arc<dyn ServerStore>,
        timings: ManagerTimings,
    ) -> Arc<Self> {
        let (phase_tx, _) = watch::channel(ServerPhase::NoActiveServer);
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            config,
            store,
            timings,
            notify: NotifyHub::new(),
            machine: Mutex::new(PhaseMachine::new()),
            phase_tx,
            active: RwLock::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
        })
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Registries for start/stop/crash and join/leave notifications.
    pub fn notifications(&self) -> &NotifyHub {
        &self.notify
    }

    pub fn phase(&self) -> ServerPhase {
        *self.phase_tx.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<ServerPhase> {
        self.phase_tx.subscribe()
    }

    pub fn active_server(&self) -> Option<ServerConfig> {
        self.current().map(|a| a.snapshot())
    }

    pub fn is_running(&self) -> bool {
        self.current().is_some_and(|a| a.process.is_running())
    }

    /// Make `server` the active server. Fails with `Busy` while a process runs.
    pub async fn set_active(&self, server: ServerConfig) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        if let Some(current) = self.current() {
            if current.process.is_running() {
                return Err(KeeperError::Busy(format!(
                    "server '{}' is running, stop it first",
                    current.name()
                )));
            }
            current.process.wait().await;
        }

        tracing::info!("Active server set to '{}' ({})", server.name, server.path.display());
        let active = self.build_active(server);
        *self.active.write().unwrap_or_else(|e| e.into_inner()) = Some(active);
        self.set_phase(ServerPhase::Stopped);
        Ok(())
    }

    /// Load a server record from the store and make it active.
    pub async fn activate(&self, server_id: &str) -> Result<()> {
        let server = self
            .store
            .get_server(server_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Unknown server '{}'", server_id))?;
        self.set_active(server).await
    }

    /// Launch the active server. `Ok(false)` when it is already running.
    ///
    /// Returns once the process spawned; use [`wait_until_ready`](Self::wait_until_ready)
    /// to wait for the ready line.
    pub async fn start(&self) -> Result<bool> {
        let _guard = self.lifecycle.lock().await;
        let active = self.require_active()?;
        if active.process.is_running() {
            tracing::warn!("Server '{}' is already running", active.name());
            return Ok(false);
        }
        // the previous run may have exited without being reported yet
        active.process.wait().await;

        let server = active.snapshot();
        server.engine.prepare(&server).await?;

        active.classifier.reset();
        active.shutdown.reset();
        let session = active.new_session();
        self.set_phase(ServerPhase::Starting);

        if let Err(e) = active.process.start().await {
            session.cancel();
            self.set_phase(ServerPhase::Stopped);
            return Err(e);
        }

        let updated = {
            let mut record = active.server.write().unwrap_or_else(|e| e.into_inner());
            record.last_started_at = Some(Local::now());
            record.clone()
        };
        if let Err(e) = self.store.update_server(&updated).await {
            tracing::warn!("Failed to persist start time of '{}': {}", updated.name, e);
        }

        self.spawn_auto_backups(&active, session);
        tracing::info!("Server '{}' starting", updated.name);
        Ok(true)
    }

    /// Wait for the ready line. False on timeout or when the process exits
    /// first; a timeout does not stop the server.
    pub async fn wait_until_ready(&self, timeout: Duration) -> bool {
        let mut rx = self.phase_tx.subscribe();
        let settled = tokio::time::timeout(
            timeout,
            rx.wait_for(|p| *p != ServerPhase::Starting),
        )
        .await;
        match settled {
            Ok(Ok(phase)) => *phase == ServerPhase::Running,
            _ => false,
        }
    }

    /// Graceful stop with an optional pre-shutdown backup.
    ///
    /// `Ok(false)` when nothing was running. `None` uses the configured timeout.
    pub async fn stop(&self, timeout: Option<Duration>) -> Result<bool> {
        let _guard = self.lifecycle.lock().await;
        let active = self.require_active()?;
        if !active.process.is_running() {
            return Ok(false);
        }

        self.set_phase(ServerPhase::Stopping);
        active.shutdown.cancel();

        if self.config.backups.backup_on_stop {
            match self.backup_active(&active, BackupKind::PreShutdown).await {
                Ok(record) => tracing::info!("Pre-shutdown backup {} created", record.filename),
                Err(e) => tracing::warn!("Pre-shutdown backup failed, stopping anyway: {}", e),
            }
        }

        let timeout = timeout.unwrap_or_else(|| self.config.timeouts.stop());
        let stopped = active.process.stop(timeout).await?;

        active.rcon.disconnect().await;
        active.classifier.reset();
        active.shutdown.reset();
        Ok(stopped)
    }

    /// Stop, let the OS release ports and files, start again.
    pub async fn restart(&self) -> Result<bool> {
        self.stop(None).await?;
        tokio::time::sleep(self.timings.restart_settle).await;
        self.start().await
    }

    /// Forced termination without backup.
    pub async fn kill(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        let active = self.require_active()?;
        if !active.process.is_running() {
            return Err(KeeperError::NotRunning);
        }
        self.set_phase(ServerPhase::Stopping);
        active.process.kill().await?;
        active.rcon.disconnect().await;
        Ok(())
    }

    /// Run a console command.
    ///
    /// Goes through RCON when connected and returns its response. Otherwise
    /// the line is written to the process stdin and there is no response.
    pub async fn send_command(&self, command: &str) -> Result<Option<String>> {
        let active = self.require_active()?;
        if !active.process.is_running() {
            return Err(KeeperError::NotRunning);
        }

        if active.rcon.is_connected() {
            return Ok(active
                .rcon
                .command(command, self.config.timeouts.rcon_command())
                .await);
        }

        tracing::debug!("RCON not connected, writing '{}' to console", command);
        if active.process.send_line(command).await {
            Ok(None)
        } else {
            Err(KeeperError::NotRunning)
        }
    }

    /// Back up the world of the active server and record it in the store.
    pub async fn create_backup(&self, kind: BackupKind) -> Result<BackupRecord> {
        let active = self.require_active()?;
        self.backup_active(&active, kind).await
    }

    /// Roll the world back to a stored backup. The server must be stopped.
    pub async fn restore_backup(&self, backup_id: &str) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        let active = self.require_active()?;
        if active.process.is_running() {
            return Err(KeeperError::Busy("stop the server before restoring".to_string()));
        }

        let server = active.snapshot();
        let record = self.find_backup(&server, backup_id).await?;
        active.backups.restore_backup(&server, &record).await?;
        tracing::info!("Restored '{}' from {}", server.name, record.filename);
        Ok(())
    }

    /// Backups of the active server, newest first.
    pub async fn list_backups(&self) -> Result<Vec<BackupRecord>> {
        let active = self.require_active()?;
        let server_id = active.snapshot().id;
        Ok(self.store.list_backups(&server_id).await?)
    }

    pub async fn delete_backup(&self, backup_id: &str) -> Result<()> {
        let active = self.require_active()?;
        let server = active.snapshot();
        let record = self.find_backup(&server, backup_id).await?;
        active.backups.delete_backup_file(&server, &record).await?;
        self.store.delete_backup(&record.id).await?;
        Ok(())
    }

    /// Change the idle period. Zero disables auto-shutdown.
    pub fn set_auto_shutdown(&self, empty_minutes: u32) -> Result<()> {
        let active = self.require_active()?;
        if empty_minutes == 0 {
            active.shutdown.disable();
        } else {
            active.shutdown.enable(Some(empty_minutes));
            if active.process.is_running() && self.phase() == ServerPhase::Running {
                active.shutdown.on_player_count_changed(active.classifier.player_count());
            }
        }
        Ok(())
    }

    pub fn auto_shutdown_state(&self) -> CountdownState {
        match self.current() {
            Some(active) => active.shutdown.state(),
            None => CountdownState::Disabled,
        }
    }

    pub fn online_players(&self) -> Vec<String> {
        self.current()
            .map(|a| a.classifier.online_players())
            .unwrap_or_default()
    }

    pub async fn status(&self) -> ServerStatus {
        let Some(active) = self.current() else {
            return ServerStatus::inactive();
        };
        let server = active.snapshot();

        let props = match ServerProperties::load(&server.properties_path()).await {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!("Cannot read {}: {}", server.properties_path().display(), e);
                ServerProperties::default()
            }
        };

        let pid = active.process.pid();
        let memory_used_mb = match pid {
            Some(pid) => monitor::usage_async(pid).await.map(|u| u.memory_mb()),
            None => None,
        };
        let players = active.classifier.online_players();

        ServerStatus {
            phase: self.phase(),
            is_running: active.process.is_running(),
            pid,
            players_online: players.len(),
            players_max: props.max_players(),
            players,
            uptime_secs: active.process.uptime().map(|d| d.as_secs()),
            memory_used_mb,
            mc_version: Some(server.mc_version),
        }
    }

    fn current(&self) -> Option<Arc<ActiveServer>> {
        self.active.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn require_active(&self) -> Result<Arc<ActiveServer>> {
        self.current().ok_or(KeeperError::NoActiveServer)
    }

    /// Apply a phase change. False when the machine rejected it.
    fn set_phase(&self, to: ServerPhase) -> bool {
        let mut machine = self.machine.lock().unwrap_or_else(|e| e.into_inner());
        match machine.transition(to) {
            Ok(()) => {
                self.phase_tx.send_replace(machine.phase);
                true
            }
            Err(e) => {
                tracing::debug!("Ignoring phase change: {}", e);
                false
            }
        }
    }

    fn build_active(&self, server: ServerConfig) -> Arc<ActiveServer> {
        let spec = LaunchSpec::for_server(&server, &self.config.defaults);
        let rcon = RconClient::new(server.rcon_host.clone(), server.rcon_port, server.rcon_password.clone())
            .with_connect_timeout(self.config.timeouts.rcon_connect());

        let active = Arc::new_cyclic(|weak: &Weak<ActiveServer>| {
            let on_warning = self.me.clone();
            let on_shutdown = self.me.clone();
            let shutdown = IdleShutdown::from_config(&self.config.auto_shutdown)
                .with_tick(self.timings.idle_tick)
                .on_warning(move |minutes| {
                    if let Some(manager) = on_warning.upgrade() {
                        tokio::spawn(async move { manager.broadcast_shutdown_warning(minutes).await });
                    }
                })
                .on_shutdown(move || {
                    if let Some(manager) = on_shutdown.upgrade() {
                        tokio::spawn(async move { manager.idle_stop().await });
                    }
                });

            let classifier = LogClassifier::new();
            self.subscribe_classifier(&classifier, weak.clone());

            let process = ProcessSupervisor::new(spec)
                .with_terminate_grace(self.timings.terminate_grace)
                .with_restart_settle(self.timings.restart_settle);

            ActiveServer {
                backups: BackupEngine::new(self.config.paths.backups_dir.clone()),
                server: RwLock::new(server),
                process,
                rcon: Arc::new(rcon),
                classifier,
                shutdown,
                session: Mutex::new(CancellationToken::new()),
            }
        });

        let weak = Arc::downgrade(&active);
        active.process.on_stdout(move |line| {
            if let Some(active) = weak.upgrade() {
                active.classifier.process_line(line);
            }
        });

        let me = self.me.clone();
        let weak = Arc::downgrade(&active);
        active.process.on_exit(move |code| {
            if let (Some(manager), Some(active)) = (me.upgrade(), weak.upgrade()) {
                manager.handle_exit(&active, code);
            }
        });

        active
    }

    fn subscribe_classifier(&self, classifier: &LogClassifier, active: Weak<ActiveServer>) {
        let me = self.me.clone();
        let weak = active.clone();
        classifier.on_event(Some(EventKind::ServerStarted), move |_| {
            if let (Some(manager), Some(active)) = (me.upgrade(), weak.upgrade()) {
                manager.handle_ready(&active);
            }
        });

        let me = self.me.clone();
        let weak = active.clone();
        classifier.on_event(Some(EventKind::PlayerJoined), move |event| {
            if let (Some(manager), Some(active)) = (me.upgrade(), weak.upgrade()) {
                manager.handle_player_event(&active, event);
            }
        });

        let me = self.me.clone();
        classifier.on_event(Some(EventKind::PlayerLeft), move |event| {
            if let (Some(manager), Some(active)) = (me.upgrade(), active.upgrade()) {
                manager.handle_player_event(&active, event);
            }
        });
    }

    fn handle_ready(&self, active: &Arc<ActiveServer>) {
        let name = active.name();
        // only Starting -> Running is accepted; a late ready line during stop is ignored
        if !self.set_phase(ServerPhase::Running) {
            tracing::debug!("Ready line from '{}' outside of startup, ignored", name);
            return;
        }
        tracing::info!("Server '{}' is ready", name);
        self.notify.publish(Notification::ServerStarted { server: name });

        let rcon = active.rcon.clone();
        let session = active.session();
        let delay = self.config.timeouts.rcon_connect_delay();
        let timeout = self.config.timeouts.rcon_connect();
        tokio::spawn(async move {
            tokio::select! {
                _ = session.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            if rcon.connect(timeout).await {
                tracing::info!("RCON connected to {}", rcon.address());
            } else {
                tracing::warn!("RCON unavailable at {}, commands go to the console", rcon.address());
            }
        });

        if active.classifier.player_count() == 0 {
            active.shutdown.on_player_count_changed(0);
        }
    }

    fn handle_player_event(&self, active: &Arc<ActiveServer>, event: &ServerEvent) {
        active
            .shutdown
            .on_player_count_changed(active.classifier.player_count());

        let Some(player) = event.player.clone() else {
            return;
        };
        let server = active.name();
        let notification = match event.kind {
            EventKind::PlayerJoined => Notification::PlayerJoined { server, player },
            _ => Notification::PlayerLeft { server, player },
        };
        self.notify.publish(notification);
    }

    fn handle_exit(&self, active: &Arc<ActiveServer>, code: i32) {
        active.end_session();
        active.shutdown.reset();
        active.classifier.reset();
        {
            let mut machine = self.machine.lock().unwrap_or_else(|e| e.into_inner());
            machine.exited();
            self.phase_tx.send_replace(machine.phase);
        }

        let rcon = active.rcon.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move { rcon.disconnect().await });
        }

        let server = active.name();
        if code != 0 {
            tracing::error!("Server '{}' crashed with exit code {}", server, code);
            self.notify.publish(Notification::ServerCrashed { server, exit_code: code });
        } else {
            tracing::info!("Server '{}' stopped", server);
            self.notify.publish(Notification::ServerStopped { server, exit_code: code });
        }
    }

    async fn broadcast_shutdown_warning(&self, minutes: u32) {
        let message = format!(
            "say Server will auto-shutdown in {} minute(s) due to inactivity",
            minutes
        );
        if let Err(e) = self.send_command(&message).await {
            tracing::warn!("Failed to broadcast auto-shutdown warning: {}", e);
        }
    }

    async fn idle_stop(&self) {
        tracing::info!("Server idle, shutting down");
        match self.stop(None).await {
            Ok(_) => {}
            Err(e) => tracing::error!("Auto-shutdown stop failed: {}", e),
        }
    }

    /// Flush the world when running, archive it, persist the record.
    async fn backup_active(&self, active: &Arc<ActiveServer>, kind: BackupKind) -> Result<BackupRecord> {
        if active.process.is_running() {
            self.flush_world(active).await;
        }
        let server = active.snapshot();
        let record = active.backups.create_backup(&server, kind).await?;
        self.store.save_backup(&record).await?;
        Ok(record)
    }

    async fn flush_world(&self, active: &Arc<ActiveServer>) {
        let sent = if active.rcon.is_connected() {
            active
                .rcon
                .command(SAVE_FLUSH_COMMAND, self.config.timeouts.rcon_command())
                .await
                .is_some()
        } else {
            active.process.send_line(SAVE_FLUSH_COMMAND).await
        };
        if sent {
            tokio::time::sleep(self.timings.save_settle).await;
        } else {
            tracing::warn!("Could not request a world save, backing up as-is");
        }
    }

    async fn run_auto_backup(&self, active: &Arc<ActiveServer>) -> Result<()> {
        let record = self.backup_active(active, BackupKind::Auto).await?;
        tracing::info!("Auto backup {} created", record.filename);

        let server = active.snapshot();
        let records = self.store.list_backups(&server.id).await?;
        let deleted = active
            .backups
            .rotate_auto_backups(&server, &records, self.config.backups.keep_count)
            .await;
        for stale in deleted {
            if let Err(e) = self.store.delete_backup(&stale.id).await {
                tracing::warn!("Failed to drop backup record {}: {}", stale.id, e);
            }
        }
        Ok(())
    }

    fn spawn_auto_backups(&self, active: &Arc<ActiveServer>, session: CancellationToken) {
        if !self.config.backups.auto_enabled {
            return;
        }
        let interval = self
            .timings
            .auto_backup_interval
            .unwrap_or_else(|| self.config.backups.interval());
        let me = self.me.clone();
        let weak = Arc::downgrade(active);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = session.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                let (Some(manager), Some(active)) = (me.upgrade(), weak.upgrade()) else {
                    break;
                };
                if let Err(e) = manager.run_auto_backup(&active).await {
                    tracing::warn!("Auto backup failed: {}", e);
                }
            }
            tracing::debug!("Auto backup schedule ended");
        });
    }

    async fn find_backup(&self, server: &ServerConfig, backup_id: &str) -> Result<BackupRecord> {
        self.store
            .list_backups(&server.id)
            .await?
            .into_iter()
            .find(|r| r.id == backup_id)
            .ok_or_else(|| KeeperError::NotFound(PathBuf::from(backup_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::EngineKind;
    use crate::store::MemoryStore;
    use tempfile::TempDir;

    fn manager(dir: &TempDir) -> (Arc<ServerManager>, Arc<MemoryStore>) {
        let mut config = ManagerConfig::default();
        config.paths.servers_dir = dir.path().join("servers");
        config.paths.backups_dir = dir.path().join("backups");
        let store = Arc::new(MemoryStore::new());
        let manager = ServerManager::new(Arc::new(config), store.clone());
        (manager, store)
    }

    fn server(dir: &TempDir) -> ServerConfig {
        ServerConfig::new("survival", "1.20.4", EngineKind::Vanilla, &dir.path().join("servers"))
    }

    #[tokio::test]
    async fn test_requires_active_server() {
        let dir = TempDir::new().unwrap();
        let (manager, _) = manager(&dir);

        assert_eq!(manager.phase(), ServerPhase::NoActiveServer);
        assert!(matches!(manager.start().await, Err(KeeperError::NoActiveServer)));
        assert!(matches!(manager.stop(None).await, Err(KeeperError::NoActiveServer)));
        assert!(matches!(manager.send_command("list").await, Err(KeeperError::NoActiveServer)));
        assert_eq!(manager.status().await.phase, ServerPhase::NoActiveServer);
    }

    #[tokio::test]
    async fn test_set_active_and_idle_operations() {
        let dir = TempDir::new().unwrap();
        let (manager, _) = manager(&dir);
        let server = server(&dir);

        manager.set_active(server.clone()).await.unwrap();
        assert_eq!(manager.phase(), ServerPhase::Stopped);
        assert_eq!(manager.active_server().unwrap().id, server.id);

        assert!(!manager.stop(None).await.unwrap());
        assert!(matches!(manager.kill().await, Err(KeeperError::NotRunning)));
        assert!(matches!(manager.send_command("list").await, Err(KeeperError::NotRunning)));
        assert!(!manager.wait_until_ready(Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn test_activate_from_store() {
        let dir = TempDir::new().unwrap();
        let (manager, store) = manager(&dir);
        let server = server(&dir);
        store.insert_server(server.clone()).await;

        manager.activate(&server.id).await.unwrap();
        assert_eq!(manager.active_server().unwrap().name, "survival");
        assert!(manager.activate("missing").await.is_err());
    }

    #[tokio::test]
    async fn test_status_reads_max_players() {
        let dir = TempDir::new().unwrap();
        let (manager, _) = manager(&dir);
        let server = server(&dir);
        std::fs::create_dir_all(&server.path).unwrap();
        std::fs::write(server.properties_path(), "max-players=8\n").unwrap();

        manager.set_active(server).await.unwrap();
        let status = manager.status().await;
        assert_eq!(status.phase, ServerPhase::Stopped);
        assert!(!status.is_running);
        assert_eq!(status.players_max, 8);
        assert_eq!(status.mc_version.as_deref(), Some("1.20.4"));
        assert!(status.uptime_secs.is_none());
    }

    #[tokio::test]
    async fn test_backup_restore_while_stopped() {
        let dir = TempDir::new().unwrap();
        let (manager, store) = manager(&dir);
        let server = server(&dir);
        let world = server.world_path();
        std::fs::create_dir_all(&world).unwrap();
        std::fs::write(world.join("level.dat"), b"v1").unwrap();
        manager.set_active(server.clone()).await.unwrap();

        let record = manager.create_backup(BackupKind::Manual).await.unwrap();
        assert_eq!(store.list_backups(&server.id).await.unwrap().len(), 1);

        std::fs::write(world.join("level.dat"), b"v2").unwrap();
        manager.restore_backup(&record.id).await.unwrap();
        assert_eq!(std::fs::read(world.join("level.dat")).unwrap(), b"v1");

        manager.delete_backup(&record.id).await.unwrap();
        assert!(manager.list_backups().await.unwrap().is_empty());
        assert!(matches!(
            manager.restore_backup(&record.id).await,
            Err(KeeperError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_auto_shutdown_toggle() {
        let dir = TempDir::new().unwrap();
        let (manager, _) = manager(&dir);
        assert_eq!(manager.auto_shutdown_state(), CountdownState::Disabled);

        manager.set_active(server(&dir)).await.unwrap();
        assert_eq!(manager.auto_shutdown_state(), CountdownState::Armed);
        manager.set_auto_shutdown(0).unwrap();
        assert_eq!(manager.auto_shutdown_state(), CountdownState::Disabled);
        manager.set_auto_shutdown(15).unwrap();
        assert_eq!(manager.auto_shutdown_state(), CountdownState::Armed);
    }
}
