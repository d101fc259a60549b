//! External process spawning for build and sync operations
//!
//! The command string runs under the system shell. Build operations get a
//! status-format override so the external build tool emits machine-parseable
//! percentage lines; caller-supplied environment variables are merged on top
//! of the inherited environment and are never dropped.

use std::path::Path;
use std::process::Stdio;
use tokio::process::{Child, ChildStdout, Command};

use crate::error::OperationError;
use crate::operation::{OperationKind, OperationSpec};

/// Status format forcing ninja to emit `"<percent>% <done>/<total>"` lines.
pub const NINJA_STATUS_FORMAT: &str = "%p %f/%t ";

/// A spawned operation and, depending on the transport variant, either the
/// captured stdout (direct pipe) or the forwarding helper child (socket relay).
#[derive(Debug)]
pub struct SpawnedOperation {
    pub child: Child,
    pub stdout: Option<ChildStdout>,
    pub tee: Option<Child>,
}

/// Start the external command.
///
/// With a relay endpoint, the command's stdout is piped into a freshly spawned
/// tee helper that duplicates every byte to the terminal and to the endpoint.
/// Without one, stdout is captured for the direct pipe transport.
///
/// A spawn failure here is an immediate terminal failure; neither the parser
/// nor the transport gets involved.
pub fn spawn(
    spec: &OperationSpec,
    relay_endpoint: Option<&Path>,
) -> Result<SpawnedOperation, OperationError> {
    let forwarder_exe = match relay_endpoint {
        Some(_) => Some(
            std::env::current_exe().map_err(|e| OperationError::Runtime {
                operation: spec.name.clone(),
                source: e,
            })?,
        ),
        None => None,
    };
    spawn_with(spec, relay_endpoint.zip(forwarder_exe.as_deref()))
}

fn spawn_with(
    spec: &OperationSpec,
    forwarder: Option<(&Path, &Path)>,
) -> Result<SpawnedOperation, OperationError> {
    let mut cmd = shell_command(&spec.command);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::inherit());
    // A dropped handle must not leave the external tool running.
    cmd.kill_on_drop(true);

    // The child gets its own process group so cancellation can terminate the
    // whole tree, not just the immediate shell.
    #[cfg(unix)]
    cmd.process_group(0);

    for (key, value) in &spec.env {
        cmd.env(key, value);
    }
    if spec.kind == OperationKind::Build {
        cmd.env("NINJA_STATUS", NINJA_STATUS_FORMAT);
    }
    if let Some(dir) = &spec.working_dir {
        cmd.current_dir(dir);
    }

    tracing::debug!(
        operation = %spec.name,
        kind = spec.kind.as_str(),
        command = %spec.command,
        relay = forwarder.is_some(),
        "spawning operation"
    );

    let mut child = cmd.spawn().map_err(|e| OperationError::Spawn {
        operation: spec.name.clone(),
        source: e,
    })?;

    match forwarder {
        Some((endpoint, exe)) => match spawn_tee(spec, &mut child, exe, endpoint) {
            Ok(tee) => Ok(SpawnedOperation {
                child,
                stdout: None,
                tee: Some(tee),
            }),
            Err(err) => {
                // The operation is already running and the caller never sees
                // its handle on this path. Kill the whole group; the shell may
                // have forked the tool rather than exec'd it.
                #[cfg(unix)]
                if let Some(pid) = child.id() {
                    use nix::sys::signal::{self, Signal};
                    use nix::unistd::Pid;
                    let _ = signal::kill(Pid::from_raw(-(pid as i32)), Signal::SIGKILL);
                }
                let _ = child.start_kill();
                Err(err)
            }
        },
        None => {
            let stdout = child.stdout.take();
            Ok(SpawnedOperation {
                child,
                stdout,
                tee: None,
            })
        }
    }
}

/// Spawn the forwarding helper with the operation's stdout as its stdin.
fn spawn_tee(
    spec: &OperationSpec,
    child: &mut Child,
    exe: &Path,
    endpoint: &Path,
) -> Result<Child, OperationError> {
    let runtime_error = |source: std::io::Error| OperationError::Runtime {
        operation: spec.name.clone(),
        source,
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| runtime_error(std::io::Error::other("operation stdout was not captured")))?;
    let stdin: Stdio = stdout.try_into().map_err(runtime_error)?;

    Command::new(exe)
        .arg("tee")
        .arg(endpoint)
        .stdin(stdin)
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| OperationError::Spawn {
            operation: format!("{} output forwarder", spec.name),
            source: e,
        })
}

#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}
