use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::app::adb::runner::CommandRunner;
use crate::app::models::AppEntry;

/// Join one tracked package name with its live device state. Reads are
/// unprivileged and soft: any failure to query the device yields a
/// not-installed entry rather than an error.
pub fn tracked_entry(
    runner: &Arc<dyn CommandRunner>,
    program: &str,
    serial: &str,
    package: &str,
    user_id: i32,
    timeout: Duration,
    trace_id: &str,
) -> AppEntry {
    let args = vec![
        "-s".to_string(),
        serial.to_string(),
        "shell".to_string(),
        "dumpsys".to_string(),
        "package".to_string(),
        package.to_string(),
    ];
    let output = match runner.run(program, &args, timeout, trace_id) {
        Ok(output) if output.exit_code.unwrap_or(1) == 0 => output,
        Ok(_) | Err(_) => {
            debug!(trace_id = %trace_id, package = %package, "package state query failed");
            return AppEntry::missing(package);
        }
    };

    if !parse_installed(&output.stdout) {
        return AppEntry::missing(package);
    }

    let enabled = parse_user_enabled_code(&output.stdout, user_id)
        .map(enabled_code_means_enabled)
        // No per-user state line means the package was never toggled.
        .unwrap_or(true);

    AppEntry {
        label: display_label(package),
        package_name: package.to_string(),
        is_enabled: enabled,
        is_installed: true,
    }
}

pub fn parse_installed(output: &str) -> bool {
    if output.contains("Unable to find package") {
        return false;
    }
    output
        .lines()
        .any(|line| line.trim_start().starts_with("Package ["))
}

/// Extract the `enabled=` code from the `User <id>:` line of
/// `dumpsys package` output.
pub fn parse_user_enabled_code(output: &str, user_id: i32) -> Option<u32> {
    let user_prefix = format!("User {user_id}:");
    for line in output.lines() {
        let trimmed = line.trim();
        if !trimmed.starts_with(&user_prefix) {
            continue;
        }
        let (_, tail) = trimmed.split_once("enabled=")?;
        return tail
            .split_whitespace()
            .next()
            .and_then(|token| token.parse::<u32>().ok());
    }
    None
}

/// `COMPONENT_ENABLED_STATE_*`: 0 default and 1 enabled count as enabled;
/// 2 disabled, 3 disabled-user and 4 disabled-until-used do not.
pub fn enabled_code_means_enabled(code: u32) -> bool {
    matches!(code, 0 | 1)
}

/// Host side has no access to the app's display label, so the last
/// reverse-domain segment stands in for it.
pub fn display_label(package: &str) -> String {
    package
        .rsplit('.')
        .next()
        .filter(|segment| !segment.is_empty())
        .unwrap_or(package)
        .to_string()
}
