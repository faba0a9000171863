//! Process-group spawn and process-tree termination.
//!
//! Killing only the immediate child is unsound when the child forks:
//! the orphaned grandchildren keep running past the timeout. On POSIX
//! hosts every spawn therefore enters a fresh process group (via
//! `setsid` in `pre_exec`), and termination signals the whole group
//! with a negative PID.

use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Grace period between SIGTERM and SIGKILL.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(1);

/// Window after SIGKILL in which the child must actually exit before the
/// call is resolved as killed anyway.
const SETTLE_WINDOW: Duration = Duration::from_millis(500);

/// Configures `cmd` so the spawned child leads its own process group.
pub fn new_process_group(cmd: &mut Command) {
    #[cfg(unix)]
    unsafe {
        cmd.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: libc::c_int) {
    // Negative PID addresses the whole process group.
    unsafe {
        libc::kill(-(pid as libc::pid_t), signal);
    }
}

/// Terminates the process tree rooted at `pid`: SIGTERM to the group,
/// a grace period, then SIGKILL. On non-POSIX hosts only the immediate
/// child can be addressed.
pub async fn kill_tree(child: &mut Child, grace: Duration) {
    let Some(pid) = child.id() else {
        // Already reaped.
        return;
    };

    #[cfg(unix)]
    {
        debug!(pid, "terminating process tree");
        signal_group(pid, libc::SIGTERM);
        if tokio::time::timeout(grace, child.wait()).await.is_ok() {
            // The group leader exited inside the grace period; sweep any
            // stragglers in the group.
            signal_group(pid, libc::SIGKILL);
            return;
        }
        warn!(pid, "process tree survived SIGTERM, escalating");
        signal_group(pid, libc::SIGKILL);
        if tokio::time::timeout(SETTLE_WINDOW, child.wait()).await.is_err() {
            warn!(pid, "process did not settle after SIGKILL");
        }
    }

    #[cfg(not(unix))]
    {
        let _ = grace;
        let _ = child.kill().await;
    }
}
