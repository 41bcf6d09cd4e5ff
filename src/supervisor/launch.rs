//! JVM launch command.

use crate::config::DefaultsConfig;
use crate::server::ServerConfig;
use std::path::PathBuf;
use tokio::process::Command;

/// Aikar's G1 flags. Fixed on purpose: per-server tuning goes in `extra_args`.
pub const GC_FLAGS: &[&str] = &[
    "-XX:+UseG1GC",
    "-XX:+ParallelRefProcEnabled",
    "-XX:MaxGCPauseMillis=200",
    "-XX:+UnlockExperimentalVMOptions",
    "-XX:+DisableExplicitGC",
    "-XX:+AlwaysPreTouch",
    "-XX:G1HeapWastePercent=5",
    "-XX:G1MixedGCCountTarget=4",
    "-XX:G1MixedGCLiveThresholdPercent=90",
    "-XX:G1RSetUpdatingPauseTimePercent=5",
    "-XX:SurvivorRatio=32",
    "-XX:+PerfDisableSharedMem",
    "-XX:MaxTenuringThreshold=1",
    "-Dusing.aikars.flags=https://mcflags.emc.gs",
    "-Daikars.new.flags=true",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub java_path: String,
    pub working_dir: PathBuf,
    pub jar: PathBuf,
    pub ram_min: String,
    pub ram_max: String,
    pub extra_args: Vec<String>,
}

impl LaunchSpec {
    /// Per-server memory, manager-wide Java path and extra flags.
    pub fn for_server(server: &ServerConfig, defaults: &DefaultsConfig) -> Self {
        Self {
            java_path: defaults.java_path.clone(),
            working_dir: server.path.clone(),
            jar: server.jar_path(),
            ram_min: server.ram_min.clone(),
            ram_max: server.ram_max.clone(),
            extra_args: defaults.extra_jvm_args.clone(),
        }
    }

    /// Arguments after the program name.
    ///
    /// The jar is passed by file name since the process runs in its directory.
    pub fn args(&self) -> Vec<String> {
        let jar_name = self
            .jar
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.jar.to_string_lossy().into_owned());

        let mut args = Vec::with_capacity(GC_FLAGS.len() + self.extra_args.len() + 5);
        args.push(format!("-Xms{}", self.ram_min));
        args.push(format!("-Xmx{}", self.ram_max));
        args.extend(GC_FLAGS.iter().map(|f| f.to_string()));
        args.extend(self.extra_args.iter().cloned());
        args.push("-jar".to_string());
        args.push(jar_name);
        args.push("nogui".to_string());
        args
    }

    /// Piped stdio, own process group, no console window on Windows.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.java_path);
        cmd.args(self.args())
            .current_dir(&self.working_dir)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(false);
        apply_platform_flags(&mut cmd);
        cmd
    }
}

#[cfg(unix)]
fn apply_platform_flags(cmd: &mut Command) -> &mut Command {
    // new group so signals reach the JVM and anything it forks
    cmd.process_group(0)
}

#[cfg(windows)]
fn apply_platform_flags(cmd: &mut Command) -> &mut Command {
    const CREATE_NO_WINDOW: u32 = 0x08000000;
    const CREATE_NEW_PROCESS_GROUP: u32 = 0x00000200;
    cmd.creation_flags(CREATE_NO_WINDOW | CREATE_NEW_PROCESS_GROUP)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> LaunchSpec {
        LaunchSpec {
            java_path: "/usr/bin/java".into(),
            working_dir: PathBuf::from("/srv/mc/survival"),
            jar: PathBuf::from("/srv/mc/survival/server.jar"),
            ram_min: "2G".into(),
            ram_max: "6G".into(),
            extra_args: vec!["-Dfile.encoding=UTF-8".into()],
        }
    }

    #[test]
    fn test_argument_order() {
        let args = spec().args();
        assert_eq!(args[0], "-Xms2G");
        assert_eq!(args[1], "-Xmx6G");
        assert_eq!(&args[2..2 + GC_FLAGS.len()], GC_FLAGS);
        let tail = &args[2 + GC_FLAGS.len()..];
        assert_eq!(tail, ["-Dfile.encoding=UTF-8", "-jar", "server.jar", "nogui"]);
    }

    #[test]
    fn test_for_server() {
        use crate::server::{EngineKind, ServerConfig};
        let mut server = ServerConfig::new("s", "1.20.4", EngineKind::Vanilla, std::path::Path::new("/srv"));
        server.ram_max = "8G".into();
        let defaults = DefaultsConfig::default();
        let spec = LaunchSpec::for_server(&server, &defaults);
        assert_eq!(spec.java_path, "java");
        assert_eq!(spec.working_dir, PathBuf::from("/srv/s"));
        assert!(spec.args().contains(&"-Xmx8G".to_string()));
    }
}
