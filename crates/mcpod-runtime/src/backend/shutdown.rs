//! SIGTERM → SIGKILL teardown of workload client processes.

use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Child;

#[cfg(unix)]
use nix::sys::signal::{self, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

/// Grace period between SIGTERM and SIGKILL.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Stop `child` and reap it.
///
/// On unix the process gets SIGTERM and [`SHUTDOWN_GRACE`] to exit before
/// SIGKILL. Elsewhere it is killed immediately. An already exited child is
/// simply reaped.
pub async fn shutdown_child(mut child: Child) -> io::Result<ExitStatus> {
    if let Some(status) = child.try_wait()? {
        return Ok(status);
    }

    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            let pid = i32::try_from(pid)
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
            match signal::kill(Pid::from_raw(pid), Signal::SIGTERM) {
                Ok(()) => {
                    if let Ok(result) = tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
                        return result;
                    }
                }
                // Exited between try_wait and kill
                Err(nix::errno::Errno::ESRCH) => return child.wait().await,
                Err(e) => return Err(io::Error::other(e)),
            }
        }
    }

    child.kill().await?;
    child.wait().await
}
