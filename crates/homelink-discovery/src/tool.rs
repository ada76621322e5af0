//! External probe utilities

use homelink_core::{BackendError, BackendResult};
use std::io::ErrorKind;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, trace};

/// Run `program` and return its stdout.
///
/// `Ok(None)` means the utility is not installed; callers treat that as an
/// empty result rather than a failure.
pub(crate) async fn run(program: &str, args: &[&str], timeout: Duration) -> BackendResult<Option<String>> {
    trace!(program, ?args, "Running probe utility");

    let child = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(timeout, child).await {
        Err(_) => return Err(BackendError::timeout(timeout)),
        Ok(Err(e)) if e.kind() == ErrorKind::NotFound => {
            debug!(program, "Probe utility not installed");
            return Ok(None);
        }
        Ok(Err(e)) => return Err(BackendError::Unavailable(format!("{program}: {e}"))),
        Ok(Ok(output)) => output,
    };

    if !output.status.success() {
        return Err(BackendError::Transient(format!(
            "{program} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
}
