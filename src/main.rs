use std::sync::Arc;
use std::sync::mpsc::Receiver;

use serde::Serialize;
use uuid::Uuid;

use parked::app::actions::Actions;
use parked::app::adb::runner::SystemRunner;
use parked::app::config::{config_path, load_config, save_config, AppConfig};
use parked::app::error::LauncherError;
use parked::app::events::{notice_channel, Notice, Severity};
use parked::app::logging::init_logging;
use parked::app::models::{AppEntry, ListType};

const USAGE: &str = "\
Usage: parked [FLAGS] COMMAND [ARGS]

Commands:
  list                  Show tracked apps with live device state
  add PKG [PKG...]      Track one or more packages
  remove PKG            Stop tracking a package
  raise PKG             Move a package towards the front of the list
  open PKG              Enable a package if needed, then launch it
  enable PKG            Enable a package
  disable PKG           Disable a package for the configured user
  disable-all           Disable every tracked app that is still enabled
  doctor                Check the adb broker and target device
  config                Show the effective configuration and its path
  config KEY VALUE      Persist a setting (fallback-to-play-store,
                        sort-apps-by-usage, launchable-apps-file, adb-path,
                        serial, user-id, timeout-secs, max-parallel)

Flags:
  --serial SERIAL       Target device (default: ANDROID_SERIAL, then config)
  --file PATH           App list file to operate on (default: config)
  --long-term           Operate on the long-term list instead of the main one
  --json                Emit a JSON report instead of plain text
  --trace-id ID         Correlate with an existing trace
  -h, --help            Show this help
";

#[derive(Debug, Clone)]
enum Command {
    List,
    Add(Vec<String>),
    Remove(String),
    Raise(String),
    Open(String),
    Enable(String),
    Disable(String),
    DisableAll,
    Doctor,
    ConfigShow,
    ConfigSet(String, String),
}

#[derive(Debug, Clone)]
struct Args {
    command: Command,
    serial: Option<String>,
    file: Option<String>,
    long_term: bool,
    json: bool,
    trace_id: Option<String>,
}

#[derive(Serialize)]
struct CommandReport {
    status: &'static str, // ok|redirected|error
    trace_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    apps: Option<Vec<AppEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<LauncherError>,
    notices: Vec<Notice>,
}

fn parse_args() -> Result<Args, String> {
    let mut serial = std::env::var("ANDROID_SERIAL")
        .ok()
        .filter(|s| !s.trim().is_empty());
    let mut file: Option<String> = None;
    let mut long_term = false;
    let mut json = false;
    let mut trace_id: Option<String> = None;
    let mut positionals: Vec<String> = Vec::new();

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--serial" => {
                serial = it
                    .next()
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty());
                if serial.is_none() {
                    return Err("--serial requires a value".to_string());
                }
            }
            "--file" => {
                let value = it
                    .next()
                    .ok_or_else(|| "--file requires a value".to_string())?;
                file = Some(value);
            }
            "--long-term" => {
                long_term = true;
            }
            "--json" => {
                json = true;
            }
            "--trace-id" => {
                let value = it
                    .next()
                    .ok_or_else(|| "--trace-id requires a value".to_string())?;
                trace_id = Some(value);
            }
            "-h" | "--help" => {
                return Err(USAGE.to_string());
            }
            other if other.starts_with('-') => {
                return Err(format!("Unknown flag: {other}\n\n{USAGE}"));
            }
            other => positionals.push(other.to_string()),
        }
    }

    let mut positionals = positionals.into_iter();
    let name = positionals
        .next()
        .ok_or_else(|| format!("A command is required.\n\n{USAGE}"))?;
    let mut rest: Vec<String> = positionals.collect();

    let single = |rest: &mut Vec<String>, name: &str| -> Result<String, String> {
        if rest.len() != 1 {
            return Err(format!("{name} takes exactly one package name.\n\n{USAGE}"));
        }
        Ok(rest.remove(0))
    };
    let none = |rest: &Vec<String>, name: &str| -> Result<(), String> {
        if rest.is_empty() {
            Ok(())
        } else {
            Err(format!("{name} takes no arguments.\n\n{USAGE}"))
        }
    };

    let command = match name.as_str() {
        "list" => {
            none(&rest, "list")?;
            Command::List
        }
        "add" => {
            if rest.is_empty() {
                return Err(format!("add requires at least one package name.\n\n{USAGE}"));
            }
            Command::Add(std::mem::take(&mut rest))
        }
        "remove" => Command::Remove(single(&mut rest, "remove")?),
        "raise" => Command::Raise(single(&mut rest, "raise")?),
        "open" => Command::Open(single(&mut rest, "open")?),
        "enable" => Command::Enable(single(&mut rest, "enable")?),
        "disable" => Command::Disable(single(&mut rest, "disable")?),
        "disable-all" => {
            none(&rest, "disable-all")?;
            Command::DisableAll
        }
        "doctor" => {
            none(&rest, "doctor")?;
            Command::Doctor
        }
        "config" => match rest.len() {
            0 => Command::ConfigShow,
            2 => {
                let value = rest.pop().unwrap_or_default();
                let key = rest.pop().unwrap_or_default();
                Command::ConfigSet(key, value)
            }
            _ => return Err(format!("config takes no arguments or KEY VALUE.\n\n{USAGE}")),
        },
        other => return Err(format!("Unknown command: {other}\n\n{USAGE}")),
    };

    Ok(Args {
        command,
        serial,
        file,
        long_term,
        json,
        trace_id,
    })
}

fn apply_config_setting(config: &mut AppConfig, key: &str, value: &str) -> Result<(), String> {
    let parse_bool = |value: &str| match value {
        "true" | "on" | "1" => Ok(true),
        "false" | "off" | "0" => Ok(false),
        other => Err(format!("{key} expects true or false, got {other:?}")),
    };
    match key {
        "fallback-to-play-store" => config.launcher.fallback_to_play_store = parse_bool(value)?,
        "sort-apps-by-usage" => config.launcher.sort_apps_by_usage = parse_bool(value)?,
        "launchable-apps-file" => config.launcher.launchable_apps_file = value.to_string(),
        "adb-path" => config.adb.command_path = value.to_string(),
        "serial" => config.adb.serial = value.to_string(),
        "user-id" => {
            config.launcher.user_id = value
                .parse()
                .map_err(|_| format!("user-id expects a number, got {value:?}"))?;
        }
        "timeout-secs" => {
            config.adb.command_timeout_secs = value
                .parse()
                .map_err(|_| format!("timeout-secs expects a number, got {value:?}"))?;
        }
        "max-parallel" => {
            config.adb.max_parallel_commands = value
                .parse()
                .map_err(|_| format!("max-parallel expects a number, got {value:?}"))?;
        }
        other => return Err(format!("Unknown setting: {other}\n\n{USAGE}")),
    }
    Ok(())
}

fn drain_notices(rx: &Receiver<Notice>) -> Vec<Notice> {
    rx.try_iter().collect()
}

fn print_notices(notices: &[Notice]) {
    for notice in notices {
        match notice.severity {
            Severity::Info => eprintln!("note: {}", notice.message),
            Severity::Error => eprintln!("error: {}", notice.message),
        }
    }
}

fn print_entries(entries: &[AppEntry]) {
    for entry in entries {
        let state = if !entry.is_installed {
            "missing "
        } else if entry.is_enabled {
            "enabled "
        } else {
            "disabled"
        };
        println!("{state}  {:<24}  {}", entry.label, entry.package_name);
    }
}

fn main() {
    init_logging();

    let args = match parse_args() {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
    };

    let trace_id = args
        .trace_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut config = match load_config() {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    };
    match &args.command {
        Command::ConfigShow => {
            println!("{}", config_path().display());
            println!(
                "{}",
                serde_json::to_string_pretty(&config).unwrap_or_else(|_| "{}".to_string())
            );
            return;
        }
        Command::ConfigSet(key, value) => {
            if let Err(msg) = apply_config_setting(&mut config, key, value) {
                eprintln!("{msg}");
                std::process::exit(2);
            }
            if let Err(err) = save_config(&config) {
                eprintln!("error: {err}");
                std::process::exit(1);
            }
            println!("Saved {key}");
            return;
        }
        _ => {}
    }

    if let Some(serial) = args.serial.clone() {
        config.adb.serial = serial;
    }
    if let Some(file) = args.file.clone() {
        config.launcher.launchable_apps_file = file;
    }

    let list_type = if args.long_term {
        ListType::LongTerm
    } else {
        ListType::Main
    };

    let (notices, rx) = notice_channel();
    let actions = Actions::new(config, Arc::new(SystemRunner), notices);

    let mut apps: Option<Vec<AppEntry>> = None;
    let outcome: Result<Option<String>, LauncherError> = match &args.command {
        Command::List => actions.list(list_type, &trace_id).map(|entries| {
            apps = Some(entries);
            None
        }),
        Command::Add(packages) => actions.add(list_type, packages, &trace_id).map(Some),
        Command::Remove(package) => actions.remove(list_type, package, &trace_id).map(Some),
        Command::Raise(package) => actions.raise(list_type, package, &trace_id).map(Some),
        Command::Open(package) => actions.open_app(package, &trace_id).map(Some),
        Command::Enable(package) => actions.enable(package, &trace_id).map(Some),
        Command::Disable(package) => actions.disable(package, &trace_id).map(Some),
        Command::DisableAll => actions.disable_all(&trace_id).map(Some),
        Command::Doctor => actions.doctor(&trace_id).map(Some),
        // Handled before any device setup.
        Command::ConfigShow | Command::ConfigSet(..) => return,
    };

    let notices = drain_notices(&rx);
    let (status, message, error) = match &outcome {
        Ok(message) => ("ok", message.clone(), None),
        // A store redirect is a handled outcome, not a failure.
        Err(err @ LauncherError::RedirectedToStore(_)) => {
            ("redirected", Some(err.message()), None)
        }
        Err(err) => ("error", None, Some(err.clone())),
    };

    if args.json {
        let report = CommandReport {
            status,
            trace_id,
            message,
            apps,
            error,
            notices,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&report).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        print_notices(&notices);
        if let Some(entries) = &apps {
            print_entries(entries);
        }
        if let Some(message) = &message {
            println!("{message}");
        }
        if let Some(err) = &error {
            eprintln!("error: {err}");
        }
    }

    if status == "error" {
        std::process::exit(1);
    }
}
