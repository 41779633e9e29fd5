use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::app::adb::runner::{CommandOutput, CommandRunner, RunError};
use crate::app::error::LauncherError;

/// Oldest broker revision the gate will talk to (`adb 1.0.39` introduced the
/// per-user package commands relied on here).
pub const MIN_BROKER_VERSION: (u32, u32, u32) = (1, 0, 39);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Authorized and online.
    Ready,
    /// The device is showing the authorization prompt right now.
    Unauthorized,
    /// Authorization was rejected on the device side.
    Denied,
    Offline,
    Unknown,
}

/// `Android Debug Bridge version 1.0.41` -> `(1, 0, 41)`.
pub fn parse_broker_version(output: &str) -> Option<(u32, u32, u32)> {
    for line in output.lines() {
        let trimmed = line.trim();
        let Some((_, tail)) = trimmed.split_once("Bridge version ") else {
            continue;
        };
        let mut numbers = tail
            .split_whitespace()
            .next()
            .unwrap_or(tail)
            .split('.')
            .map(|part| part.parse::<u32>());
        let major = numbers.next()?.ok()?;
        let minor = numbers.next()?.ok()?;
        let patch = numbers.next()?.ok()?;
        return Some((major, minor, patch));
    }
    None
}

/// Parse `adb devices -l` down to serial + state. The "no permissions" state
/// spans several tokens and carries a parenthesized hint, so the whole
/// remainder of the line is classified, not just the second token.
pub fn parse_device_states(output: &str) -> Vec<(String, DeviceState)> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with('*'))
        .filter(|line| !line.to_lowercase().contains("list of devices"))
        .filter_map(|line| {
            let (serial, rest) = line.split_once(char::is_whitespace)?;
            Some((serial.to_string(), classify_state(rest.trim_start())))
        })
        .collect()
}

fn classify_state(rest: &str) -> DeviceState {
    if rest.starts_with("device") {
        DeviceState::Ready
    } else if rest.starts_with("unauthorized") {
        DeviceState::Unauthorized
    } else if rest.contains("no permissions") || rest.starts_with("denied") {
        DeviceState::Denied
    } else if rest.starts_with("offline") {
        DeviceState::Offline
    } else {
        DeviceState::Unknown
    }
}

/// Verifies, per attempt and without caching, that the privileged channel is
/// usable, then runs shell commands through it. Every check re-queries the
/// live broker: authorization can change between two user actions.
pub struct PrivilegeGate {
    program: String,
    serial: Option<String>,
    timeout: Duration,
    runner: Arc<dyn CommandRunner>,
}

impl PrivilegeGate {
    pub fn new(
        program: impl Into<String>,
        serial: Option<String>,
        timeout: Duration,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            program: program.into(),
            serial: serial.filter(|value| !value.trim().is_empty()),
            timeout,
            runner,
        }
    }

    fn run_broker(&self, args: &[String], trace_id: &str) -> Result<CommandOutput, LauncherError> {
        self.runner
            .run(&self.program, args, self.timeout, trace_id)
            .map_err(|err| match err {
                RunError::SpawnFailed(_) => LauncherError::BrokerUnavailable,
                other => LauncherError::ProcessFailure(other.to_string()),
            })
    }

    /// Re-checks broker version and device authorization. Returns the serial
    /// of the device privileged commands will target.
    pub fn check_broker(&self, trace_id: &str) -> Result<String, LauncherError> {
        let version_out = self.run_broker(&["version".to_string()], trace_id)?;
        if version_out.exit_code.unwrap_or_default() != 0 {
            return Err(LauncherError::BrokerUnavailable);
        }
        let version =
            parse_broker_version(&version_out.stdout).ok_or(LauncherError::BrokerUnavailable)?;
        if version < MIN_BROKER_VERSION {
            debug!(trace_id = %trace_id, ?version, "broker below minimum supported version");
            return Err(LauncherError::VersionNotSupported);
        }

        let devices_out =
            self.run_broker(&["devices".to_string(), "-l".to_string()], trace_id)?;
        if devices_out.exit_code.unwrap_or_default() != 0 {
            return Err(LauncherError::BrokerUnavailable);
        }
        let devices = parse_device_states(&devices_out.stdout);

        let (serial, state) = match &self.serial {
            Some(wanted) => devices
                .into_iter()
                .find(|(serial, _)| serial == wanted)
                .ok_or(LauncherError::BrokerUnavailable)?,
            None => {
                let mut iter = devices.into_iter();
                let first = iter.next().ok_or(LauncherError::BrokerUnavailable)?;
                if iter.next().is_some() {
                    return Err(LauncherError::InvalidArgument(
                        "Multiple devices attached; pass --serial or set adb.serial".to_string(),
                    ));
                }
                first
            }
        };

        match state {
            DeviceState::Ready => Ok(serial),
            DeviceState::Unauthorized => Err(LauncherError::PermissionPending),
            DeviceState::Denied => Err(LauncherError::PermissionDenied),
            DeviceState::Offline | DeviceState::Unknown => Err(LauncherError::BrokerUnavailable),
        }
    }

    /// Gate check followed by one privileged shell invocation. Exit code 0
    /// is success; anything else is a process failure carrying the command
    /// output. No retries.
    pub fn run_privileged(
        &self,
        shell: &[&str],
        trace_id: &str,
    ) -> Result<CommandOutput, LauncherError> {
        let serial = self.check_broker(trace_id)?;

        let mut args = vec!["-s".to_string(), serial, "shell".to_string()];
        args.extend(shell.iter().map(|part| part.to_string()));
        debug!(trace_id = %trace_id, command = ?shell, "running privileged command");

        let output = self
            .runner
            .run(&self.program, &args, self.timeout, trace_id)
            .map_err(|err| LauncherError::ProcessFailure(err.to_string()))?;
        if output.exit_code.unwrap_or(1) != 0 {
            let detail = if output.stderr.trim().is_empty() {
                output.stdout.trim().to_string()
            } else {
                output.stderr.trim().to_string()
            };
            return Err(LauncherError::ProcessFailure(detail));
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::adb::testing::ScriptedRunner;

    const VERSION_OK: &str = "Android Debug Bridge version 1.0.41\n\
        Version 34.0.4-android-tools\n\
        Installed as /usr/lib/android-sdk/platform-tools/adb\n";

    fn gate(runner: Arc<ScriptedRunner>, serial: Option<&str>) -> PrivilegeGate {
        PrivilegeGate::new(
            "adb",
            serial.map(|value| value.to_string()),
            Duration::from_secs(5),
            runner,
        )
    }

    #[test]
    fn parses_real_version_banner() {
        assert_eq!(parse_broker_version(VERSION_OK), Some((1, 0, 41)));
        assert_eq!(parse_broker_version("garbage"), None);
    }

    #[test]
    fn classifies_device_listing() {
        let listing = "List of devices attached\n\
            emulator-5554          device product:sdk_gphone64 model:Pixel_6\n\
            R58M123ABC             unauthorized usb:1-4 transport_id:2\n\
            0123456789ABCDEF       no permissions (missing udev rules); see [http://developer.android.com/tools/device.html]\n\
            192.168.0.12:5555      offline\n";
        let states = parse_device_states(listing);
        assert_eq!(states.len(), 4);
        assert_eq!(states[0], ("emulator-5554".to_string(), DeviceState::Ready));
        assert_eq!(states[1].1, DeviceState::Unauthorized);
        assert_eq!(states[2].1, DeviceState::Denied);
        assert_eq!(states[3].1, DeviceState::Offline);
    }

    #[test]
    fn unreachable_broker_fails_once_without_retry() {
        let runner = Arc::new(ScriptedRunner::new(vec![Err(RunError::SpawnFailed(
            "no such file".to_string(),
        ))]));
        let err = gate(Arc::clone(&runner), None)
            .check_broker("trace-unavailable")
            .expect_err("expected failure");
        assert_eq!(err, LauncherError::BrokerUnavailable);
        assert_eq!(runner.call_count(), 1);
    }

    #[test]
    fn old_broker_is_rejected() {
        let runner = Arc::new(ScriptedRunner::new(vec![ScriptedRunner::ok(
            "Android Debug Bridge version 1.0.32\n",
        )]));
        let err = gate(Arc::clone(&runner), None)
            .check_broker("trace-version")
            .expect_err("expected failure");
        assert_eq!(err, LauncherError::VersionNotSupported);
        assert_eq!(runner.call_count(), 1);
    }

    #[test]
    fn unauthorized_device_reads_as_pending() {
        let runner = Arc::new(ScriptedRunner::new(vec![
            ScriptedRunner::ok(VERSION_OK),
            ScriptedRunner::ok("R58M123ABC unauthorized usb:1-4\n"),
        ]));
        let err = gate(Arc::clone(&runner), None)
            .check_broker("trace-pending")
            .expect_err("expected failure");
        assert_eq!(err, LauncherError::PermissionPending);
        assert_eq!(runner.call_count(), 2);
    }

    #[test]
    fn rejected_authorization_reads_as_denied() {
        let runner = Arc::new(ScriptedRunner::new(vec![
            ScriptedRunner::ok(VERSION_OK),
            ScriptedRunner::ok("0123456789ABCDEF no permissions (user not in plugdev)\n"),
        ]));
        let err = gate(Arc::clone(&runner), None)
            .check_broker("trace-denied")
            .expect_err("expected failure");
        assert_eq!(err, LauncherError::PermissionDenied);
    }

    #[test]
    fn missing_device_reads_as_unavailable() {
        let runner = Arc::new(ScriptedRunner::new(vec![
            ScriptedRunner::ok(VERSION_OK),
            ScriptedRunner::ok("List of devices attached\n"),
        ]));
        let err = gate(Arc::clone(&runner), Some("emulator-5554"))
            .check_broker("trace-missing")
            .expect_err("expected failure");
        assert_eq!(err, LauncherError::BrokerUnavailable);
    }

    #[test]
    fn granted_gate_runs_the_shell_command() {
        let runner = Arc::new(ScriptedRunner::new(vec![
            ScriptedRunner::ok(VERSION_OK),
            ScriptedRunner::ok("emulator-5554 device\n"),
            ScriptedRunner::ok("Package com.example.app new state: enabled\n"),
        ]));
        let output = gate(Arc::clone(&runner), None)
            .run_privileged(&["pm", "enable", "com.example.app"], "trace-run")
            .expect("expected success");
        assert_eq!(output.exit_code, Some(0));
        assert_eq!(runner.call_count(), 3);

        let calls = runner.calls.lock().expect("calls");
        let last = calls.last().expect("pm call");
        assert_eq!(
            last.as_slice(),
            [
                "adb",
                "-s",
                "emulator-5554",
                "shell",
                "pm",
                "enable",
                "com.example.app"
            ]
        );
    }

    #[test]
    fn nonzero_exit_is_a_process_failure() {
        let runner = Arc::new(ScriptedRunner::new(vec![
            ScriptedRunner::ok(VERSION_OK),
            ScriptedRunner::ok("emulator-5554 device\n"),
            ScriptedRunner::failed("Error: java.lang.SecurityException"),
        ]));
        let err = gate(Arc::clone(&runner), None)
            .run_privileged(&["pm", "disable-user", "--user", "0", "com.example.app"], "trace-fail")
            .expect_err("expected failure");
        assert!(matches!(err, LauncherError::ProcessFailure(detail) if detail.contains("SecurityException")));
        assert_eq!(runner.call_count(), 3);
    }
}
