//! Owns the lifetime of the server's JVM process.
//!
//! - stdout and stderr are drained by two independent reader tasks
//! - stdin writes go through a channel to a writer task
//! - a waiter task records the exit code and fires exit callbacks once
//!
//! The process counts as not running as soon as the OS reports the exit.
//! Exit callbacks follow once the readers drained, and a new `start` waits
//! for them.
//!
//! `start`/`stop`/`restart`/`kill` expect a single caller at a time; the
//! only guard is against starting twice.

use super::launch::LaunchSpec;
use crate::error::{KeeperError, Result};
use crate::events::bus::panic_message;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Child;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Grace period between the terminate signal and the hard kill.
pub const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// Pause between stop and start on restart.
pub const RESTART_SETTLE: Duration = Duration::from_secs(1);

/// stderr lines kept for the crash report.
const STDERR_TAIL: usize = 5;

/// How long the waiter lets readers drain after exit.
const READER_DRAIN: Duration = Duration::from_secs(2);

pub type LineCallback = Arc<dyn Fn(&str) + Send + Sync>;
pub type ExitCallback = Arc<dyn Fn(i32) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessPhase {
    NotRunning,
    Starting,
    Running,
    Stopping,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessState {
    pub phase: ProcessPhase,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Local>>,
    pub exit_code: Option<i32>,
}

impl Default for ProcessState {
    fn default() -> Self {
        Self {
            phase: ProcessPhase::NotRunning,
            pid: None,
            started_at: None,
            exit_code: None,
        }
    }
}

/// Handles to a live child. Dropped by the waiter on exit.
struct Live {
    pid: u32,
    stdin_tx: mpsc::Sender<String>,
    exited: watch::Receiver<bool>,
}

#[derive(Default)]
struct Shared {
    state: ProcessState,
    live: Option<Live>,
}

impl Shared {
    /// Handles of a process that has not exited yet.
    fn running(&self) -> Option<&Live> {
        self.live
            .as_ref()
            .filter(|_| self.state.phase != ProcessPhase::NotRunning)
    }

    /// Exited, but callbacks and readers are not done yet.
    fn exit_pending(&self) -> Option<watch::Receiver<bool>> {
        match (&self.live, self.state.phase) {
            (Some(live), ProcessPhase::NotRunning) => Some(live.exited.clone()),
            _ => None,
        }
    }
}

#[derive(Default)]
struct Callbacks {
    stdout: Vec<LineCallback>,
    stderr: Vec<LineCallback>,
    exit: Vec<ExitCallback>,
}

pub struct ProcessSupervisor {
    spec: LaunchSpec,
    shared: Arc<Mutex<Shared>>,
    callbacks: Arc<RwLock<Callbacks>>,
    terminate_grace: Duration,
    restart_settle: Duration,
}

impl ProcessSupervisor {
    pub fn new(spec: LaunchSpec) -> Self {
        Self {
            spec,
            shared: Arc::new(Mutex::new(Shared::default())),
            callbacks: Arc::new(RwLock::new(Callbacks::default())),
            terminate_grace: TERMINATE_GRACE,
            restart_settle: RESTART_SETTLE,
        }
    }

    pub fn with_terminate_grace(mut self, grace: Duration) -> Self {
        self.terminate_grace = grace;
        self
    }

    pub fn with_restart_settle(mut self, settle: Duration) -> Self {
        self.restart_settle = settle;
        self
    }

    pub fn spec(&self) -> &LaunchSpec {
        &self.spec
    }

    pub fn on_stdout<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks_mut().stdout.push(Arc::new(callback));
    }

    pub fn on_stderr<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks_mut().stderr.push(Arc::new(callback));
    }

    pub fn on_exit<F>(&self, callback: F)
    where
        F: Fn(i32) + Send + Sync + 'static,
    {
        self.callbacks_mut().exit.push(Arc::new(callback));
    }

    pub fn state(&self) -> ProcessState {
        self.lock().state.clone()
    }

    pub fn is_running(&self) -> bool {
        self.lock().running().is_some()
    }

    pub fn pid(&self) -> Option<u32> {
        self.lock().running().map(|l| l.pid)
    }

    pub fn uptime(&self) -> Option<Duration> {
        let shared = self.lock();
        shared.running()?;
        let started = shared.state.started_at?;
        (Local::now() - started).to_std().ok()
    }

    /// Spawn the process. Returns its pid.
    pub async fn start(&self) -> Result<u32> {
        self.settle_exit().await;

        let mut shared = self.lock();
        if shared.live.is_some() || shared.state.phase != ProcessPhase::NotRunning {
            return Err(KeeperError::AlreadyRunning);
        }
        shared.state.phase = ProcessPhase::Starting;

        if let Err(e) = std::fs::create_dir_all(&self.spec.working_dir) {
            shared.state.phase = ProcessPhase::NotRunning;
            return Err(e.into());
        }

        tracing::info!(
            "Starting process: {} {} ...",
            self.spec.java_path,
            self.spec.args().iter().take(2).cloned().collect::<Vec<_>>().join(" ")
        );
        tracing::info!("Working directory: {}", self.spec.working_dir.display());

        let mut child = match self.spec.command().spawn() {
            Ok(c) => c,
            Err(source) => {
                shared.state.phase = ProcessPhase::NotRunning;
                tracing::error!("Failed to start process: {}", source);
                return Err(KeeperError::Spawn {
                    program: self.spec.java_path.clone(),
                    source,
                });
            }
        };

        let Some(pid) = child.id() else {
            shared.state.phase = ProcessPhase::NotRunning;
            return Err(anyhow::anyhow!("Spawned process has no PID").into());
        };

        let (stdin_tx, stdin_rx) = mpsc::channel::<String>(256);
        let (exited_tx, exited_rx) = watch::channel(false);
        let tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL)));

        let stdout_task = child.stdout.take().map(|out| {
            let cbs = self.callbacks.clone();
            tokio::spawn(read_lines(out, move |line| {
                let snapshot = read_callbacks(&cbs).stdout.clone();
                dispatch_line(&snapshot, line, "stdout");
            }))
        });

        let stderr_task = child.stderr.take().map(|err| {
            let cbs = self.callbacks.clone();
            let tail = tail.clone();
            tokio::spawn(read_lines(err, move |line| {
                if !line.is_empty() {
                    tracing::warn!("[STDERR] {}", line);
                    let mut tail = tail.lock().unwrap_or_else(|e| e.into_inner());
                    if tail.len() == STDERR_TAIL {
                        tail.pop_front();
                    }
                    tail.push_back(line.to_string());
                }
                let snapshot = read_callbacks(&cbs).stderr.clone();
                dispatch_line(&snapshot, line, "stderr");
            }))
        });

        if let Some(stdin) = child.stdin.take() {
            tokio::spawn(write_stdin(stdin, stdin_rx));
        }

        shared.state = ProcessState {
            phase: ProcessPhase::Running,
            pid: Some(pid),
            started_at: Some(Local::now()),
            exit_code: None,
        };
        shared.live = Some(Live {
            pid,
            stdin_tx,
            exited: exited_rx,
        });
        drop(shared);

        tokio::spawn(wait_for_exit(
            child,
            [stdout_task, stderr_task],
            tail,
            self.shared.clone(),
            self.callbacks.clone(),
            exited_tx,
        ));

        tracing::info!("Process started with PID: {}", pid);
        Ok(pid)
    }

    /// Graceful stop: console `stop`, then terminate, then kill.
    ///
    /// `Ok(false)` when nothing was running. A second caller while a stop is
    /// in progress just waits for that stop to finish.
    pub async fn stop(&self, timeout: Duration) -> Result<bool> {
        if self.settle_exit().await {
            return Ok(false);
        }
        let (pid, stdin_tx, mut exited, already_stopping) = {
            let mut shared = self.lock();
            let Some(live) = shared.running() else {
                return Ok(false);
            };
            let handles = (live.pid, live.stdin_tx.clone(), live.exited.clone());
            let already = shared.state.phase == ProcessPhase::Stopping;
            shared.state.phase = ProcessPhase::Stopping;
            (handles.0, handles.1, handles.2, already)
        };

        if already_stopping {
            let _ = exited.wait_for(|done| *done).await;
            return Ok(true);
        }

        tracing::info!("Stopping process {} (timeout {:?})", pid, timeout);
        if stdin_tx.send("stop".to_string()).await.is_ok()
            && wait_exit(&mut exited, timeout).await
        {
            return Ok(true);
        }

        tracing::warn!("Process {} ignored 'stop', sending terminate signal", pid);
        signal_terminate(pid);
        if wait_exit(&mut exited, self.terminate_grace).await {
            return Ok(true);
        }

        tracing::warn!("Process {} still alive after {:?}, killing", pid, self.terminate_grace);
        signal_kill(pid);
        Ok(wait_exit(&mut exited, self.terminate_grace).await)
    }

    /// Immediate forced termination. No-op when not running.
    pub async fn kill(&self) -> Result<()> {
        if self.settle_exit().await {
            return Ok(());
        }
        let (pid, mut exited) = {
            let mut shared = self.lock();
            let Some(live) = shared.running() else {
                return Ok(());
            };
            let handles = (live.pid, live.exited.clone());
            shared.state.phase = ProcessPhase::Stopping;
            handles
        };

        tracing::warn!("Killing process {}", pid);
        signal_kill(pid);
        if !wait_exit(&mut exited, self.terminate_grace).await {
            return Err(KeeperError::Timeout(format!("process {} did not die after kill", pid)));
        }
        Ok(())
    }

    pub async fn restart(&self, timeout: Duration) -> Result<u32> {
        self.stop(timeout).await?;
        tokio::time::sleep(self.restart_settle).await;
        self.start().await
    }

    /// Write one line to stdin. False when not running or stdin is closed.
    pub async fn send_line(&self, text: &str) -> bool {
        let tx = match self.lock().running() {
            Some(live) => live.stdin_tx.clone(),
            None => return false,
        };
        tx.send(text.to_string()).await.is_ok()
    }

    /// Resolves once the current process (if any) has exited.
    pub async fn wait(&self) {
        let exited = self.lock().live.as_ref().map(|l| l.exited.clone());
        if let Some(mut rx) = exited {
            let _ = rx.wait_for(|done| *done).await;
        }
    }

    /// Wait out an exit that is still being reported. True if there was one.
    async fn settle_exit(&self) -> bool {
        let pending = self.lock().exit_pending();
        match pending {
            Some(mut exited) => {
                let _ = exited.wait_for(|done| *done).await;
                true
            }
            None => false,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn callbacks_mut(&self) -> std::sync::RwLockWriteGuard<'_, Callbacks> {
        self.callbacks.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn read_callbacks(cbs: &RwLock<Callbacks>) -> std::sync::RwLockReadGuard<'_, Callbacks> {
    cbs.read().unwrap_or_else(|e| e.into_inner())
}

fn dispatch_line(callbacks: &[LineCallback], line: &str, stream: &str) {
    for cb in callbacks {
        if let Err(p) = catch_unwind(AssertUnwindSafe(|| cb(line))) {
            tracing::warn!("{} callback panicked: {}", stream, panic_message(p));
        }
    }
}

async fn read_lines<R, F>(stream: R, mut on_line: F)
where
    R: AsyncRead + Unpin,
    F: FnMut(&str),
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::with_capacity(256);
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                on_line(text.trim_end_matches(['\r', '\n']));
            }
            Err(e) => {
                tracing::debug!("Output reader stopped: {}", e);
                break;
            }
        }
    }
}

async fn write_stdin(mut stdin: tokio::process::ChildStdin, mut rx: mpsc::Receiver<String>) {
    while let Some(cmd) = rx.recv().await {
        let data = if cmd.ends_with('\n') { cmd } else { format!("{}\n", cmd) };
        if stdin.write_all(data.as_bytes()).await.is_err() {
            break;
        }
        if stdin.flush().await.is_err() {
            break;
        }
    }
}

async fn wait_for_exit(
    mut child: Child,
    readers: [Option<JoinHandle<()>>; 2],
    tail: Arc<Mutex<VecDeque<String>>>,
    shared: Arc<Mutex<Shared>>,
    callbacks: Arc<RwLock<Callbacks>>,
    exited_tx: watch::Sender<bool>,
) {
    let code = match child.wait().await {
        Ok(status) => exit_code(status),
        Err(e) => {
            tracing::error!("Failed to wait for process: {}", e);
            -1
        }
    };

    {
        let mut shared = shared.lock().unwrap_or_else(|e| e.into_inner());
        shared.state.phase = ProcessPhase::NotRunning;
        shared.state.pid = None;
        shared.state.exit_code = Some(code);
    }

    // let the readers hand over the last lines before reporting exit
    let drain = async {
        for handle in readers.into_iter().flatten() {
            let _ = handle.await;
        }
    };
    if tokio::time::timeout(READER_DRAIN, drain).await.is_err() {
        tracing::debug!("Output readers still open after exit, detaching");
    }

    tracing::info!("Process exited with code: {}", code);
    if code != 0 {
        let tail = tail.lock().unwrap_or_else(|e| e.into_inner());
        if !tail.is_empty() {
            tracing::error!("Last stderr lines: {:?}", tail);
        }
    }

    let snapshot = read_callbacks(&callbacks).exit.clone();
    for cb in snapshot {
        if let Err(p) = catch_unwind(AssertUnwindSafe(|| cb(code))) {
            tracing::warn!("exit callback panicked: {}", panic_message(p));
        }
    }
    shared.lock().unwrap_or_else(|e| e.into_inner()).live = None;
    // stop() and wait() return only after exit callbacks ran
    exited_tx.send_replace(true);
}

async fn wait_exit(exited: &mut watch::Receiver<bool>, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, exited.wait_for(|done| *done)).await,
        Ok(Ok(_))
    )
}

#[cfg(unix)]
fn exit_code(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|s| -s))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: nix::sys::signal::Signal) {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;
    if let Err(e) = killpg(Pid::from_raw(pid as i32), signal) {
        tracing::debug!("{:?} to process group {} failed: {}", signal, pid, e);
    }
}

#[cfg(unix)]
fn signal_terminate(pid: u32) {
    signal_group(pid, nix::sys::signal::Signal::SIGTERM);
}

#[cfg(unix)]
fn signal_kill(pid: u32) {
    signal_group(pid, nix::sys::signal::Signal::SIGKILL);
}

#[cfg(windows)]
fn taskkill(pid: u32, force: bool) {
    let mut cmd = std::process::Command::new("taskkill");
    cmd.args(["/PID", &pid.to_string(), "/T"]);
    if force {
        cmd.arg("/F");
    }
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NO_WINDOW: u32 = 0x08000000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    if let Err(e) = cmd.output() {
        tracing::debug!("taskkill for {} failed: {}", pid, e);
    }
}

#[cfg(windows)]
fn signal_terminate(pid: u32) {
    taskkill(pid, false);
}

#[cfg(windows)]
fn signal_kill(pid: u32) {
    taskkill(pid, true);
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Executable shell script standing in for java; JVM flags land in `$@`.
    fn fake_java(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("fake-java.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn supervisor(dir: &TempDir, body: &str) -> ProcessSupervisor {
        let java = fake_java(dir.path(), body);
        ProcessSupervisor::new(LaunchSpec {
            java_path: java.to_string_lossy().into_owned(),
            working_dir: dir.path().join("server"),
            jar: PathBuf::from("server.jar"),
            ram_min: "1M".into(),
            ram_max: "1M".into(),
            extra_args: Vec::new(),
        })
        .with_terminate_grace(Duration::from_millis(500))
        .with_restart_settle(Duration::from_millis(50))
    }

    const ECHO_UNTIL_STOP: &str = r#"echo "booting $#"
while read line; do
  echo "got $line"
  if [ "$line" = "stop" ]; then exit 0; fi
done"#;

    #[test]
    fn test_initial_state() {
        let dir = TempDir::new().unwrap();
        let sup = supervisor(&dir, "true");
        assert!(!sup.is_running());
        assert_eq!(sup.state(), ProcessState::default());
        assert!(sup.uptime().is_none());
    }

    #[tokio::test]
    async fn test_spawn_error() {
        let dir = TempDir::new().unwrap();
        let mut spec = supervisor(&dir, "true").spec().clone();
        spec.java_path = "/nonexistent/java".into();
        let sup = ProcessSupervisor::new(spec);
        let err = sup.start().await.unwrap_err();
        assert!(matches!(err, KeeperError::Spawn { .. }));
        assert_eq!(sup.state().phase, ProcessPhase::NotRunning);
        assert!(!sup.is_running());
    }

    #[tokio::test]
    async fn test_stop_when_not_running() {
        let dir = TempDir::new().unwrap();
        let sup = supervisor(&dir, "true");
        assert!(!sup.stop(Duration::from_secs(1)).await.unwrap());
        sup.kill().await.unwrap();
        assert!(!sup.send_line("hello").await);
    }

    #[tokio::test]
    async fn test_graceful_stop_via_stdin() {
        let dir = TempDir::new().unwrap();
        let sup = supervisor(&dir, ECHO_UNTIL_STOP);
        let lines = Arc::new(Mutex::new(Vec::new()));
        let codes = Arc::new(Mutex::new(Vec::new()));

        let l = lines.clone();
        sup.on_stdout(move |line| l.lock().unwrap().push(line.to_string()));
        let c = codes.clone();
        sup.on_exit(move |code| c.lock().unwrap().push(code));

        let pid = sup.start().await.unwrap();
        assert!(pid > 0);
        assert!(sup.is_running());
        assert_eq!(sup.pid(), Some(pid));
        assert!(matches!(sup.start().await, Err(KeeperError::AlreadyRunning)));

        assert!(sup.send_line("say hi").await);
        assert!(sup.stop(Duration::from_secs(5)).await.unwrap());
        assert!(!sup.is_running());

        let state = sup.state();
        assert_eq!(state.phase, ProcessPhase::NotRunning);
        assert_eq!(state.exit_code, Some(0));
        assert_eq!(*codes.lock().unwrap(), vec![0]);

        let lines = lines.lock().unwrap();
        // every JVM flag reached the script
        let expected_args = 2 + super::super::launch::GC_FLAGS.len() + 3;
        assert_eq!(lines[0], format!("booting {}", expected_args));
        assert!(lines.contains(&"got say hi".to_string()));
        assert!(lines.contains(&"got stop".to_string()));
    }

    #[tokio::test]
    async fn test_escalates_to_terminate() {
        let dir = TempDir::new().unwrap();
        // ignores stdin entirely
        let sup = supervisor(&dir, "exec sleep 30");
        let codes = Arc::new(Mutex::new(Vec::new()));
        let c = codes.clone();
        sup.on_exit(move |code| c.lock().unwrap().push(code));

        sup.start().await.unwrap();
        assert!(sup.stop(Duration::from_millis(300)).await.unwrap());
        assert!(!sup.is_running());
        // SIGTERM reported as a negative signal number
        assert_eq!(*codes.lock().unwrap(), vec![-15]);
    }

    #[tokio::test]
    async fn test_escalates_to_kill() {
        let dir = TempDir::new().unwrap();
        let sup = supervisor(&dir, "trap '' TERM\nwhile true; do sleep 0.1; done");
        sup.start().await.unwrap();
        assert!(sup.stop(Duration::from_millis(200)).await.unwrap());
        assert!(!sup.is_running());
        assert_eq!(sup.state().exit_code, Some(-9));
    }

    #[tokio::test]
    async fn test_kill_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let sup = supervisor(&dir, "exec sleep 30");
        sup.start().await.unwrap();
        sup.kill().await.unwrap();
        assert!(!sup.is_running());
        sup.kill().await.unwrap();
        assert_eq!(sup.state().exit_code, Some(-9));
    }

    #[tokio::test]
    async fn test_concurrent_stops() {
        let dir = TempDir::new().unwrap();
        let sup = Arc::new(supervisor(&dir, ECHO_UNTIL_STOP));
        let exits = Arc::new(AtomicUsize::new(0));
        let e = exits.clone();
        sup.on_exit(move |_| {
            e.fetch_add(1, Ordering::SeqCst);
        });
        sup.start().await.unwrap();

        let (a, b) = tokio::join!(
            sup.stop(Duration::from_secs(5)),
            sup.stop(Duration::from_secs(5))
        );
        assert!(a.unwrap());
        assert!(b.unwrap());
        assert_eq!(exits.load(Ordering::SeqCst), 1);
        assert_eq!(sup.state().exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_crash_exit_code_and_stderr() {
        let dir = TempDir::new().unwrap();
        let sup = supervisor(&dir, "echo 'Exception in thread main' >&2\nexit 3");
        let errs = Arc::new(Mutex::new(Vec::new()));
        let e = errs.clone();
        sup.on_stderr(move |line| e.lock().unwrap().push(line.to_string()));

        sup.start().await.unwrap();
        sup.wait().await;
        assert_eq!(sup.state().exit_code, Some(3));
        assert_eq!(*errs.lock().unwrap(), vec!["Exception in thread main".to_string()]);
    }

    #[tokio::test]
    async fn test_faulty_callback_does_not_stall_reader() {
        let dir = TempDir::new().unwrap();
        let sup = supervisor(&dir, "echo one\necho two\necho three");
        let seen = Arc::new(AtomicUsize::new(0));

        sup.on_stdout(|line| {
            if line == "two" {
                panic!("bad subscriber");
            }
        });
        let s = seen.clone();
        sup.on_stdout(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });

        sup.start().await.unwrap();
        sup.wait().await;
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exit_visible_while_output_still_open() {
        let dir = TempDir::new().unwrap();
        // the background sleep inherits stdout and keeps the pipe open
        let sup = supervisor(&dir, "sleep 3 &\necho up\nexit 4");
        let codes = Arc::new(Mutex::new(Vec::new()));
        let c = codes.clone();
        sup.on_exit(move |code| c.lock().unwrap().push(code));

        sup.start().await.unwrap();
        let begun = std::time::Instant::now();
        while sup.is_running() {
            assert!(begun.elapsed() < Duration::from_secs(1), "exit not visible");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(sup.pid().is_none());
        assert!(sup.uptime().is_none());
        assert_eq!(sup.state().exit_code, Some(4));
        assert!(!sup.send_line("list").await);
        assert!(!sup.stop(Duration::from_secs(1)).await.unwrap());

        // the exit was reported before stop returned
        assert_eq!(*codes.lock().unwrap(), vec![4]);
    }

    #[tokio::test]
    async fn test_start_waits_for_previous_exit_report() {
        let dir = TempDir::new().unwrap();
        let sup = supervisor(&dir, "sleep 3 &\nexit 0");
        let exits = Arc::new(AtomicUsize::new(0));
        let e = exits.clone();
        sup.on_exit(move |_| {
            e.fetch_add(1, Ordering::SeqCst);
        });

        sup.start().await.unwrap();
        while sup.is_running() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        sup.start().await.unwrap();
        assert_eq!(exits.load(Ordering::SeqCst), 1);
        sup.kill().await.unwrap();
    }

    #[tokio::test]
    async fn test_restart() {
        let dir = TempDir::new().unwrap();
        let sup = supervisor(&dir, ECHO_UNTIL_STOP);
        let first = sup.start().await.unwrap();
        let second = sup.restart(Duration::from_secs(5)).await.unwrap();
        assert_ne!(first, second);
        assert!(sup.is_running());
        assert!(sup.uptime().is_some());
        assert!(sup.stop(Duration::from_secs(5)).await.unwrap());
    }
}
