//! Java runtime detection.

use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::process::Command;

/// Minimum Java major version for Minecraft 1.18+.
pub const RECOMMENDED_JAVA_MAJOR: u32 = 17;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JavaInfo {
    pub path: String,
    pub version: String,
    pub major: u32,
}

fn version_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"version "([^"]+)""#).ok()).as_ref()
}

/// Extract `(version, major)` from `java -version` output.
///
/// Handles both `openjdk version "17.0.1"` and legacy `java version "1.8.0_301"`.
pub fn parse_version_output(output: &str) -> Option<(String, u32)> {
    let version = version_regex()?.captures(output)?.get(1)?.as_str().to_string();
    let major_part = match version.strip_prefix("1.") {
        Some(rest) => rest,
        None => version.as_str(),
    };
    let digits: String = major_part.chars().take_while(|c| c.is_ascii_digit()).collect();
    let major = digits.parse().ok()?;
    Some((version, major))
}

/// Run `<java_path> -version` and parse the result.
pub async fn detect(java_path: &str) -> anyhow::Result<JavaInfo> {
    let mut cmd = Command::new(java_path);
    cmd.arg("-version").kill_on_drop(true);
    let output = tokio::time::timeout(Duration::from_secs(10), cmd.output())
        .await
        .map_err(|_| anyhow::anyhow!("'{} -version' timed out", java_path))?
        .map_err(|e| anyhow::anyhow!("Java not found at '{}': {}", java_path, e))?;

    // the version banner goes to stderr
    let text = String::from_utf8_lossy(&output.stderr);
    let (version, major) = parse_version_output(&text).ok_or_else(|| {
        let head: String = text.chars().take(100).collect();
        anyhow::anyhow!("Could not parse Java version from output: {}", head)
    })?;

    Ok(JavaInfo {
        path: java_path.to_string(),
        version,
        major,
    })
}
