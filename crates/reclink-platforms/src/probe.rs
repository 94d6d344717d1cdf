use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::error::{PlatformError, Result};

/// Liveness check by asking the capture binary to resolve a stream without
/// downloading it (`<binary> --json <url>`).
#[derive(Debug, Clone)]
pub struct StreamProbe {
    binary: String,
    timeout: Duration,
}

impl StreamProbe {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    /// `true` if the binary resolved at least one playable stream.
    ///
    /// # Errors
    ///
    /// `Spawn` if the binary cannot be started, `Timeout` if it does not
    /// finish within the configured bound (the child is killed).
    pub async fn is_live(&self, url: &str) -> Result<bool> {
        let child = Command::new(&self.binary)
            .arg("--json")
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| PlatformError::Timeout {
                secs: self.timeout.as_secs(),
            })??;

        let live = parse_probe_output(output.status.success(), &output.stdout);
        if !live {
            debug!(
                %url,
                code = ?output.status.code(),
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "probe found no stream"
            );
        }
        Ok(live)
    }
}

/// A successful run with non-JSON output still counts as live; an explicit
/// JSON `error` or an empty `streams` map does not.
pub(crate) fn parse_probe_output(success: bool, stdout: &[u8]) -> bool {
    if !success {
        return false;
    }
    match serde_json::from_slice::<serde_json::Value>(stdout) {
        Ok(json) => {
            if json.get("error").is_some() {
                return false;
            }
            json.get("streams")
                .and_then(|s| s.as_object())
                .is_some_and(|streams| !streams.is_empty())
        }
        Err(_) => true,
    }
}
