//! Child process execution with a deadline and bounded output capture.

use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Captured output of a finished (or killed) child process.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Bytes discarded beyond the output limit.
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Last few lines of stderr, for error messages.
    pub fn stderr_tail(&self, max_lines: usize) -> String {
        let text = String::from_utf8_lossy(&self.stderr);
        let lines: Vec<&str> = text.lines().collect();
        let start = lines.len().saturating_sub(max_lines);
        lines[start..].join("\n")
    }
}

type ReaderHandle = JoinHandle<Result<(Vec<u8>, usize)>>;

/// Run `cmd`, feed it `stdin`, and wait at most `timeout`.
///
/// Stdin is written and stdout/stderr are drained on separate threads so a
/// chatty child can never deadlock against a large prompt. At most
/// `output_limit_bytes` of each stream is kept; the rest is drained and
/// counted. A child still running at the deadline is killed.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    stdin: Option<Vec<u8>>,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = cmd.spawn().map_err(|e| {
        error!(err = %e, "failed to spawn command");
        anyhow!(e).context("spawn command")
    })?;

    let writer = match stdin {
        Some(input) => Some(spawn_stdin_writer(&mut child, input)?),
        None => None,
    };
    let (stdout_handle, stderr_handle) = spawn_output_readers(&mut child, output_limit_bytes)?;

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(timeout_secs = timeout.as_secs(), "command timed out, killing");
            timed_out = true;
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    if let Some(writer) = writer {
        match writer.join() {
            // A child that exits without reading all of stdin closes the pipe.
            Ok(Err(err)) => debug!(err = %err, "stdin not fully consumed"),
            Ok(Ok(())) => {}
            Err(_) => return Err(anyhow!("stdin writer thread panicked")),
        }
    }
    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

fn spawn_stdin_writer(child: &mut Child, input: Vec<u8>) -> Result<JoinHandle<Result<()>>> {
    let mut pipe = child
        .stdin
        .take()
        .ok_or_else(|| anyhow!("stdin was not piped"))?;
    Ok(thread::spawn(move || {
        pipe.write_all(&input).context("write stdin")?;
        // Dropping the pipe closes stdin so the child sees EOF.
        drop(pipe);
        Ok(())
    }))
}

fn spawn_output_readers(child: &mut Child, limit: usize) -> Result<(ReaderHandle, ReaderHandle)> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;
    Ok((
        thread::spawn(move || read_stream_limited(stdout, limit)),
        thread::spawn(move || read_stream_limited(stderr, limit)),
    ))
}

fn join_output(handle: ReaderHandle) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let keep = n.min(limit.saturating_sub(buf.len()));
        buf.extend_from_slice(&chunk[..keep]);
        truncated += n - keep;
    }

    Ok((buf, truncated))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn echoes_stdin_back() {
        let output = run_command_with_timeout(
            Command::new("cat"),
            Some(b"hello prompt".to_vec()),
            Duration::from_secs(10),
            1024,
        )
        .expect("run cat");
        assert!(output.status.success());
        assert!(!output.timed_out);
        assert_eq!(output.stdout_lossy(), "hello prompt");
    }

    #[test]
    fn large_input_does_not_deadlock() {
        let input = vec![b'x'; 512 * 1024];
        let output = run_command_with_timeout(
            Command::new("cat"),
            Some(input),
            Duration::from_secs(30),
            1024,
        )
        .expect("run cat");
        assert_eq!(output.stdout.len(), 1024);
        assert_eq!(output.stdout_truncated, 512 * 1024 - 1024);
    }

    #[test]
    fn kills_on_timeout() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let output =
            run_command_with_timeout(cmd, None, Duration::from_millis(100), 1024).expect("run");
        assert!(output.timed_out);
        assert!(!output.status.success());
    }

    #[test]
    fn stderr_tail_keeps_last_lines() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "printf 'a\\nb\\nc\\n' >&2; exit 3"]);
        let output = run_command_with_timeout(cmd, None, Duration::from_secs(10), 1024).expect("run");
        assert_eq!(output.status.code(), Some(3));
        assert_eq!(output.stderr_tail(2), "b\nc");
    }

    #[test]
    fn missing_binary_is_a_spawn_error() {
        let err = run_command_with_timeout(
            Command::new("definitely-not-a-real-binary-agentflow"),
            None,
            Duration::from_secs(1),
            1024,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("spawn command"));
    }
}
