//! External commands feeding the monitor: the per-host speed statistics and
//! the optional connection dataset.

use std::future::Future;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tokio::process::Command;

use crate::dataset::TrafficDataset;
use crate::error::{MonitorError, Result};
use crate::models::domain::IpFamily;

/// Something that produces the raw JSON speed report of one IP family.
pub trait StatsSource: Send + Sync {
    fn fetch(&self, family: IpFamily) -> impl Future<Output = Result<Value>> + Send;
}

/// Runs `<program> <ipv4|ipv6> json`.
#[derive(Debug, Clone)]
pub struct CommandSource {
    program: PathBuf,
}

impl CommandSource {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl StatsSource for CommandSource {
    async fn fetch(&self, family: IpFamily) -> Result<Value> {
        let stdout = run(&self.program, &[family.as_arg(), "json"]).await?;
        parse_output(&stdout)
    }
}

/// Loads the connection dataset from nlbwmon-style JSON output.
#[derive(Debug, Clone)]
pub struct DatasetCommand {
    program: PathBuf,
    args: Vec<String>,
}

impl DatasetCommand {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub async fn load(&self) -> Result<TrafficDataset> {
        let args: Vec<&str> = self.args.iter().map(String::as_str).collect();
        let stdout = run(&self.program, &args).await?;
        TrafficDataset::from_json(&String::from_utf8_lossy(&stdout))
    }
}

async fn run(program: &Path, args: &[&str]) -> Result<Vec<u8>> {
    let name = program.display().to_string();
    tracing::trace!(program = %name, ?args, "running command");

    let output = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| MonitorError::Spawn {
            program: name.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(MonitorError::CommandFailed {
            program: name,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(output.stdout)
}

/// Empty output reads as JSON `null`.
fn parse_output(stdout: &[u8]) -> Result<Value> {
    if stdout.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_slice(stdout)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_output_is_null() {
        assert_eq!(parse_output(b"").unwrap(), Value::Null);
        assert_eq!(parse_output(b" \n").unwrap(), Value::Null);
        assert!(parse_output(b"{oops").is_err());
        assert_eq!(parse_output(br#"{"status":"success","data":[]}"#).unwrap()["status"], "success");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_source_passes_family_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("stats.sh");
        std::fs::write(
            &script,
            "#!/bin/sh\nprintf '{\"status\":\"success\",\"data\":[],\"args\":\"%s %s\"}' \"$1\" \"$2\"\n",
        )
        .unwrap();
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let source = CommandSource::new(&script);
        let value = source.fetch(IpFamily::Ipv6).await.unwrap();
        assert_eq!(value["args"], "ipv6 json");
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let source = CommandSource::new("/nonexistent/speedmon-stats");
        let err = source.fetch(IpFamily::Ipv4).await.unwrap_err();
        assert!(matches!(err, MonitorError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_program_reports_status() {
        let source = DatasetCommand::new("/bin/false", Vec::new());
        let err = source.load().await.unwrap_err();
        assert!(matches!(err, MonitorError::CommandFailed { .. }));
    }
}
