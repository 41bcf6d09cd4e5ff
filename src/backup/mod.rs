//! World snapshots as `.tar.gz` archives.
//!
//! Archives live in `<backups_dir>/<server name>/world_<timestamp>.tar.gz`
//! and always contain a single top-level `world/` directory. Create,
//! restore and rotate are serialized per engine; the heavy lifting runs on
//! the blocking pool.

use crate::error::{KeeperError, Result};
use crate::server::ServerConfig;
use chrono::{DateTime, Local};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Root entry name inside every archive.
pub const ARCHIVE_ROOT: &str = "world";

const ARCHIVE_EXT: &str = ".tar.gz";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupKind {
    Auto,
    Manual,
    PreShutdown,
}

impl BackupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
            Self::PreShutdown => "pre_shutdown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub id: String,
    pub server_id: String,
    pub filename: String,
    pub size_bytes: u64,
    pub kind: BackupKind,
    pub created_at: DateTime<Local>,
}

pub struct BackupEngine {
    root: PathBuf,
    lock: Mutex<()>,
}

impl BackupEngine {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn server_dir(&self, server: &ServerConfig) -> PathBuf {
        self.root.join(&server.name)
    }

    pub fn backup_path(&self, server: &ServerConfig, record: &BackupRecord) -> PathBuf {
        self.server_dir(server).join(&record.filename)
    }

    /// Archive the server's world directory.
    pub async fn create_backup(&self, server: &ServerConfig, kind: BackupKind) -> Result<BackupRecord> {
        let world = server.world_path();
        if !tokio::fs::try_exists(&world).await.unwrap_or(false) {
            return Err(KeeperError::NotFound(world));
        }

        let _guard = self.lock.lock().await;
        let dir = self.server_dir(server);
        tokio::fs::create_dir_all(&dir).await?;

        let created_at = Local::now();
        let filename = unique_filename(&dir, &created_at).await;
        let dest = dir.join(&filename);
        let partial = dir.join(format!("{}.partial", filename));

        tracing::info!("Creating {} backup of '{}' -> {}", kind.as_str(), server.name, dest.display());
        let src = world.clone();
        let tmp = partial.clone();
        let written = tokio::task::spawn_blocking(move || write_archive(&src, &tmp))
            .await
            .map_err(|e| anyhow::anyhow!("backup task failed: {}", e))?;
        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e.into());
        }
        tokio::fs::rename(&partial, &dest).await?;

        let size_bytes = tokio::fs::metadata(&dest).await?.len();
        tracing::info!("Backup {} done ({})", filename, format_size(size_bytes));

        Ok(BackupRecord {
            id: uuid::Uuid::new_v4().to_string(),
            server_id: server.id.clone(),
            filename,
            size_bytes,
            kind,
            created_at,
        })
    }

    /// Replace the world directory with the archive contents.
    ///
    /// The server process must be stopped; the manager enforces that.
    pub async fn restore_backup(&self, server: &ServerConfig, record: &BackupRecord) -> Result<()> {
        let archive = self.backup_path(server, record);
        if !tokio::fs::try_exists(&archive).await.unwrap_or(false) {
            return Err(KeeperError::NotFound(archive));
        }

        let _guard = self.lock.lock().await;
        let world = server.world_path();
        tracing::info!("Restoring '{}' from {}", server.name, record.filename);

        tokio::task::spawn_blocking(move || restore_archive(&archive, &world))
            .await
            .map_err(|e| anyhow::anyhow!("restore task failed: {}", e))??;
        Ok(())
    }

    /// Delete auto backups beyond the newest `keep_count`.
    ///
    /// `records` must be newest first. Returns the records whose files were
    /// removed; failures are logged and skipped.
    pub async fn rotate_auto_backups(
        &self,
        server: &ServerConfig,
        records: &[BackupRecord],
        keep_count: usize,
    ) -> Vec<BackupRecord> {
        let _guard = self.lock.lock().await;
        let mut deleted = Vec::new();

        let stale = records
            .iter()
            .filter(|r| r.kind == BackupKind::Auto)
            .skip(keep_count);
        for record in stale {
            match self.remove_file(server, record).await {
                Ok(()) => deleted.push(record.clone()),
                Err(e) => tracing::warn!("Failed to rotate backup {}: {}", record.filename, e),
            }
        }

        if !deleted.is_empty() {
            tracing::info!("Rotated {} old auto backup(s) of '{}'", deleted.len(), server.name);
        }
        deleted
    }

    /// Remove one archive. A file that is already gone is not an error.
    pub async fn delete_backup_file(&self, server: &ServerConfig, record: &BackupRecord) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.remove_file(server, record).await
    }

    /// Archive files for `server`, newest first.
    pub async fn list_backup_files(&self, server: &ServerConfig) -> Result<Vec<PathBuf>> {
        let dir = self.server_dir(server);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_archive = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(ARCHIVE_EXT));
            if is_archive {
                files.push(path);
            }
        }
        // timestamped names sort chronologically
        files.sort_by(|a, b| b.cmp(a));
        Ok(files)
    }

    async fn remove_file(&self, server: &ServerConfig, record: &BackupRecord) -> Result<()> {
        match tokio::fs::remove_file(self.backup_path(server, record)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

async fn unique_filename(dir: &Path, at: &DateTime<Local>) -> String {
    let stem = format!("world_{}", at.format("%Y-%m-%d_%H-%M-%S"));
    let mut name = format!("{}{}", stem, ARCHIVE_EXT);
    let mut n = 1;
    while tokio::fs::try_exists(dir.join(&name)).await.unwrap_or(false) {
        name = format!("{}_{}{}", stem, n, ARCHIVE_EXT);
        n += 1;
    }
    name
}

fn write_archive(src: &Path, dest: &Path) -> std::io::Result<()> {
    let file = File::create(dest)?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    builder.append_dir_all(ARCHIVE_ROOT, src)?;
    builder.into_inner()?.finish()?.sync_all()
}

fn restore_archive(archive: &Path, world: &Path) -> Result<()> {
    let parent = world
        .parent()
        .ok_or_else(|| anyhow::anyhow!("world path {} has no parent", world.display()))?;
    std::fs::create_dir_all(parent)?;

    // unpack next to the world first so a corrupt archive leaves it intact
    let staging = parent.join(format!(".restore-{}", uuid::Uuid::new_v4().simple()));
    let unpacked = unpack_into(archive, &staging);
    let extracted = staging.join(ARCHIVE_ROOT);
    let result = unpacked.and_then(|()| {
        if !extracted.is_dir() {
            return Err(anyhow::anyhow!("archive has no '{}' directory", ARCHIVE_ROOT).into());
        }
        if world.exists() {
            std::fs::remove_dir_all(world)?;
        }
        std::fs::rename(&extracted, world)?;
        Ok(())
    });

    if let Err(e) = std::fs::remove_dir_all(&staging) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Failed to clean up {}: {}", staging.display(), e);
        }
    }
    result
}

fn unpack_into(archive: &Path, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let file = File::open(archive)?;
    tar::Archive::new(GzDecoder::new(file)).unpack(dir)?;
    Ok(())
}

/// Human readable size, e.g. `1.5 MB`.
pub fn format_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return format!("{:.1} {}", size, unit);
        }
        size /= 1024.0;
    }
    format!("{:.1} TB", size)
}
