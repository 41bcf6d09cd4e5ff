//! Persistent records the manager reads and writes through.
//!
//! The real store lives outside this crate (a database behind the chat
//! front end). [`MemoryStore`] backs the daemon binary and the tests.

use crate::backup::BackupRecord;
use crate::server::ServerConfig;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[async_trait]
pub trait ServerStore: Send + Sync {
    async fn get_server(&self, server_id: &str) -> anyhow::Result<Option<ServerConfig>>;

    /// Persist an updated server record, e.g. a new `last_started_at`.
    async fn update_server(&self, server: &ServerConfig) -> anyhow::Result<()>;

    async fn save_backup(&self, record: &BackupRecord) -> anyhow::Result<()>;

    /// Backups of one server, newest first.
    async fn list_backups(&self, server_id: &str) -> anyhow::Result<Vec<BackupRecord>>;

    async fn delete_backup(&self, backup_id: &str) -> anyhow::Result<()>;
}

#[derive(Default)]
pub struct MemoryStore {
    servers: RwLock<HashMap<String, ServerConfig>>,
    backups: RwLock<Vec<BackupRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_server(&self, server: ServerConfig) {
        self.servers.write().await.insert(server.id.clone(), server);
    }

    pub async fn list_servers(&self) -> Vec<ServerConfig> {
        let mut servers: Vec<_> = self.servers.read().await.values().cloned().collect();
        servers.sort_by(|a, b| a.name.cmp(&b.name));
        servers
    }

    pub async fn find_by_name(&self, name: &str) -> Option<ServerConfig> {
        self.servers
            .read()
            .await
            .values()
            .find(|s| s.name == name)
            .cloned()
    }
}

#[async_trait]
impl ServerStore for MemoryStore {
    async fn get_server(&self, server_id: &str) -> anyhow::Result<Option<ServerConfig>> {
        Ok(self.servers.read().await.get(server_id).cloned())
    }

    async fn update_server(&self, server: &ServerConfig) -> anyhow::Result<()> {
        let mut servers = self.servers.write().await;
        match servers.get_mut(&server.id) {
            Some(existing) => {
                *existing = server.clone();
                Ok(())
            }
            None => anyhow::bail!("Unknown server '{}'", server.id),
        }
    }

    async fn save_backup(&self, record: &BackupRecord) -> anyhow::Result<()> {
        self.backups.write().await.push(record.clone());
        Ok(())
    }

    async fn list_backups(&self, server_id: &str) -> anyhow::Result<Vec<BackupRecord>> {
        let mut list: Vec<_> = self
            .backups
            .read()
            .await
            .iter()
            .filter(|b| b.server_id == server_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(list)
    }

    async fn delete_backup(&self, backup_id: &str) -> anyhow::Result<()> {
        self.backups.write().await.retain(|b| b.id != backup_id);
        Ok(())
    }
}
