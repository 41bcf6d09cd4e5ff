//! OS-level view of a process via sysinfo.
//!
//! sysinfo scans the process table synchronously, so the async wrappers run
//! it on the blocking pool.

use sysinfo::{Pid, System};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessUsage {
    pub memory_bytes: u64,
}

impl ProcessUsage {
    pub fn memory_mb(&self) -> u64 {
        self.memory_bytes / (1024 * 1024)
    }
}

pub fn is_alive(pid: u32) -> bool {
    let mut sys = System::new();
    sys.refresh_process(Pid::from_u32(pid))
}

pub fn usage(pid: u32) -> Option<ProcessUsage> {
    let mut sys = System::new();
    let pid = Pid::from_u32(pid);
    if !sys.refresh_process(pid) {
        return None;
    }
    sys.process(pid).map(|p| ProcessUsage {
        memory_bytes: p.memory(),
    })
}

/// Async wrapper for [`is_alive`].
pub async fn is_alive_async(pid: u32) -> bool {
    tokio::task::spawn_blocking(move || is_alive(pid))
        .await
        .unwrap_or(false)
}

/// Async wrapper for [`usage`].
pub async fn usage_async(pid: u32) -> Option<ProcessUsage> {
    tokio::task::spawn_blocking(move || usage(pid))
        .await
        .ok()
        .flatten()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_is_alive() {
        let me = std::process::id();
        assert!(is_alive(me));
        assert!(usage(me).is_some_and(|u| u.memory_bytes > 0));
    }

    #[tokio::test]
    async fn test_unknown_pid() {
        // pid_max on Linux never reaches this
        assert!(!is_alive_async(u32::MAX - 1).await);
        assert!(usage_async(u32::MAX - 1).await.is_none());
    }

    #[test]
    fn test_memory_mb() {
        let usage = ProcessUsage {
            memory_bytes: 3 * 1024 * 1024 + 5,
        };
        assert_eq!(usage.memory_mb(), 3);
    }
}
