use std::fmt;
use std::io::Read;
use std::process::{Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

/// Low-level command failure. Callers decide what each variant means:
/// a spawn failure of the broker binary itself reads as "broker
/// unavailable", anything later as a process failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    SpawnFailed(String),
    TimedOut(Duration),
    WaitFailed(String),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::SpawnFailed(detail) => write!(f, "failed to spawn command: {detail}"),
            RunError::TimedOut(timeout) => {
                write!(f, "command timed out after {}s", timeout.as_secs())
            }
            RunError::WaitFailed(detail) => write!(f, "failed to poll command: {detail}"),
        }
    }
}

impl std::error::Error for RunError {}

/// Seam between device-facing logic and the host OS. Production code uses
/// [`SystemRunner`]; tests script the outputs.
pub trait CommandRunner: Send + Sync {
    fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
        trace_id: &str,
    ) -> Result<CommandOutput, RunError>;
}

pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
        trace_id: &str,
    ) -> Result<CommandOutput, RunError> {
        run_command_with_timeout(program, args, timeout, trace_id)
    }
}

fn drain(reader: impl Read + Send + 'static) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut reader = reader;
        let mut buffer = Vec::<u8>::new();
        let mut chunk = [0u8; 4096];
        loop {
            match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(count) => buffer.extend_from_slice(&chunk[..count]),
                Err(_) => break,
            }
        }
        buffer
    })
}

pub fn run_command_with_timeout(
    program: &str,
    args: &[String],
    timeout: Duration,
    _trace_id: &str,
) -> Result<CommandOutput, RunError> {
    let mut child = Command::new(program)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| RunError::SpawnFailed(err.to_string()))?;

    // Both pipes must be drained while waiting; a chatty child blocks once
    // the pipe buffer fills and would then falsely hit the timeout.
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| RunError::SpawnFailed("stdout not captured".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| RunError::SpawnFailed("stderr not captured".to_string()))?;
    let stdout_handle = drain(stdout);
    let stderr_handle = drain(stderr);

    let start = Instant::now();
    let exit_code = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status.code(),
            Ok(None) => {
                if start.elapsed() > timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = stdout_handle.join();
                    let _ = stderr_handle.join();
                    return Err(RunError::TimedOut(timeout));
                }
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(err) => {
                let _ = stdout_handle.join();
                let _ = stderr_handle.join();
                return Err(RunError::WaitFailed(err.to_string()));
            }
        }
    };

    let stdout_bytes = stdout_handle.join().unwrap_or_default();
    let stderr_bytes = stderr_handle.join().unwrap_or_default();

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&stdout_bytes).to_string(),
        stderr: String::from_utf8_lossy(&stderr_bytes).to_string(),
        exit_code,
    })
}
