//! Child-process binding for client sessions.
//!
//! The server runs as a subprocess: its stdin and stdout carry the frames,
//! its stderr passes straight through to ours so server logs stay visible.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};

use crate::mcp::error::TransportError;
use crate::mcp::transport::Transport;

/// A spawned server process.
#[derive(Debug)]
pub struct ServerProcess {
    child: Child,
    program: String,
}

impl ServerProcess {
    /// Spawns `command` and returns the process plus a transport over its
    /// pipes.
    ///
    /// The child is killed if the returned handle is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Spawn`] if the command is empty or cannot
    /// be started.
    pub fn spawn(
        command: &[String],
        max_frame_bytes: usize,
    ) -> Result<(Self, Transport), TransportError> {
        let Some((program, args)) = command.split_first() else {
            return Err(TransportError::Spawn {
                program: String::new(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "empty server command"),
            });
        };

        let spawn_error = |source| TransportError::Spawn {
            program: program.clone(),
            source,
        };

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| spawn_error(io::Error::other("stdin was not captured")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_error(io::Error::other("stdout was not captured")))?;

        tracing::info!(program = %program, pid = ?child.id(), "Spawned server process");

        let process = Self {
            child,
            program: program.clone(),
        };
        Ok((process, Transport::new(stdout, stdin, max_frame_bytes)))
    }

    /// OS process id, if still running.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Waits up to `grace` for the process to exit, then kills it.
    ///
    /// Call after the session has closed the child's stdin.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting on or killing the process fails.
    pub async fn stop(mut self, grace: Duration) -> Result<ExitStatus, TransportError> {
        if let Ok(status) = tokio::time::timeout(grace, self.child.wait()).await {
            let status = status?;
            tracing::debug!(program = %self.program, %status, "Server process exited");
            return Ok(status);
        }

        tracing::warn!(
            program = %self.program,
            ?grace,
            "Server process did not exit in time, killing it"
        );
        self.child.kill().await?;
        Ok(self.child.wait().await?)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::mcp::transport::DEFAULT_MAX_FRAME_BYTES;

    fn command(argv: &[&str]) -> Vec<String> {
        argv.iter().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn frames_round_trip_through_child() {
        let (process, mut transport) =
            ServerProcess::spawn(&command(&["cat"]), DEFAULT_MAX_FRAME_BYTES).unwrap();
        assert!(process.id().is_some());

        transport.send(b"{\"hello\":1}").await.unwrap();
        assert_eq!(transport.receive().await.unwrap().unwrap(), b"{\"hello\":1}");

        transport.close().await.unwrap();
        let status = process.stop(Duration::from_secs(5)).await.unwrap();
        assert!(status.success());
    }

    #[tokio::test]
    async fn stop_kills_after_grace() {
        let (process, _transport) =
            ServerProcess::spawn(&command(&["sleep", "30"]), DEFAULT_MAX_FRAME_BYTES).unwrap();

        let status = process.stop(Duration::from_millis(50)).await.unwrap();
        assert!(!status.success());
    }

    #[test]
    fn empty_command_is_rejected() {
        let err = ServerProcess::spawn(&[], DEFAULT_MAX_FRAME_BYTES).unwrap_err();
        assert!(matches!(err, TransportError::Spawn { .. }));
    }

    #[tokio::test]
    async fn missing_program_is_rejected() {
        let err = ServerProcess::spawn(
            &command(&["/nonexistent/toolwire-test-binary"]),
            DEFAULT_MAX_FRAME_BYTES,
        )
        .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/toolwire-test-binary"));
    }
}
