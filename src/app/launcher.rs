use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::app::adb::apps::tracked_entry;
use crate::app::adb::gate::PrivilegeGate;
use crate::app::adb::locator::{resolve_adb_program, validate_adb_program};
use crate::app::adb::runner::CommandRunner;
use crate::app::config::AppConfig;
use crate::app::error::LauncherError;
use crate::app::events::NoticeSender;
use crate::app::models::AppEntry;
use crate::app::worker::ActionScheduler;

pub const STORE_URL_PREFIX: &str = "https://play.google.com/store/apps/details?id=";

/// Side-effect seam for the store fallback; returns whether the browser
/// actually opened.
pub type StoreOpener = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Sequences enable-then-launch against one device, with the optional
/// Play Store fallback when the privileged channel refuses.
pub struct Launcher {
    program: String,
    serial: Option<String>,
    timeout: Duration,
    fallback_to_play_store: bool,
    user_id: i32,
    runner: Arc<dyn CommandRunner>,
    scheduler: Arc<ActionScheduler>,
    notices: NoticeSender,
    store_opener: StoreOpener,
}

impl Launcher {
    pub fn new(
        config: &AppConfig,
        runner: Arc<dyn CommandRunner>,
        scheduler: Arc<ActionScheduler>,
        notices: NoticeSender,
    ) -> Self {
        Self {
            program: resolve_adb_program(&config.adb.command_path),
            serial: Some(config.adb.serial.clone()).filter(|value| !value.trim().is_empty()),
            timeout: Duration::from_secs(config.adb.command_timeout_secs),
            fallback_to_play_store: config.launcher.fallback_to_play_store,
            user_id: config.launcher.user_id,
            runner,
            scheduler,
            notices,
            store_opener: Arc::new(|url: &str| webbrowser::open(url).is_ok()),
        }
    }

    pub fn with_store_opener(mut self, opener: StoreOpener) -> Self {
        self.store_opener = opener;
        self
    }

    fn gate(&self) -> PrivilegeGate {
        PrivilegeGate::new(
            self.program.clone(),
            self.serial.clone(),
            self.timeout,
            Arc::clone(&self.runner),
        )
    }

    /// End-to-end gate check; returns the serial privileged commands would
    /// target.
    pub fn check_device(&self, trace_id: &str) -> Result<String, LauncherError> {
        validate_adb_program(&self.program).map_err(LauncherError::ConfigFailure)?;
        self.gate().check_broker(trace_id)
    }

    /// Live state for one tracked package.
    pub fn entry(&self, package: &str, trace_id: &str) -> Result<AppEntry, LauncherError> {
        let serial = self.gate().check_broker(trace_id)?;
        Ok(tracked_entry(
            &self.runner,
            &self.program,
            &serial,
            package,
            self.user_id,
            self.timeout,
            trace_id,
        ))
    }

    /// Live state for a whole list, fetched through the bounded scheduler so
    /// a long list does not fan out into unbounded device commands.
    pub fn resolve_entries(
        &self,
        packages: &[String],
        trace_id: &str,
    ) -> Result<Vec<AppEntry>, LauncherError> {
        let serial = self.gate().check_broker(trace_id)?;

        let mut handles = Vec::with_capacity(packages.len());
        for package in packages.iter().cloned() {
            let runner = Arc::clone(&self.runner);
            let scheduler = Arc::clone(&self.scheduler);
            let program = self.program.clone();
            let serial = serial.clone();
            let trace = trace_id.to_string();
            let timeout = self.timeout;
            let user_id = self.user_id;
            handles.push(std::thread::spawn(move || {
                let _permit = scheduler.acquire();
                tracked_entry(&runner, &program, &serial, &package, user_id, timeout, &trace)
            }));
        }

        let mut entries = Vec::with_capacity(handles.len());
        for handle in handles {
            let entry = handle.join().map_err(|_| {
                LauncherError::ProcessFailure("package state worker panicked".to_string())
            })?;
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Enable if needed, then launch. Fallback interception applies only to
    /// the enable step; a launch that goes wrong is always `CantOpenApp`.
    pub fn open_app(&self, entry: &AppEntry, trace_id: &str) -> Result<(), LauncherError> {
        if !entry.is_enabled {
            self.enable_app(entry, false, trace_id)?;
        }
        self.start_app(&entry.package_name, trace_id)?;
        info!(trace_id = %trace_id, package = %entry.package_name, "opened app");
        Ok(())
    }

    pub fn enable_app(
        &self,
        entry: &AppEntry,
        announce: bool,
        trace_id: &str,
    ) -> Result<(), LauncherError> {
        match self
            .gate()
            .run_privileged(&["pm", "enable", &entry.package_name], trace_id)
        {
            Ok(_) => {
                if announce {
                    self.notices
                        .info(trace_id, format!("Enabled {}", entry.label));
                }
                Ok(())
            }
            Err(err) => Err(self.with_store_fallback(err, &entry.package_name, trace_id)),
        }
    }

    pub fn disable_app(
        &self,
        entry: &AppEntry,
        announce: bool,
        trace_id: &str,
    ) -> Result<(), LauncherError> {
        let user = self.user_id.to_string();
        self.gate().run_privileged(
            &["pm", "disable-user", "--user", &user, &entry.package_name],
            trace_id,
        )?;
        if announce {
            self.notices
                .info(trace_id, format!("Disabled {}", entry.label));
        }
        Ok(())
    }

    /// Disable every currently-enabled tracked package. Returns how many
    /// were disabled; the first failure aborts the sweep.
    pub fn disable_all(&self, packages: &[String], trace_id: &str) -> Result<usize, LauncherError> {
        let to_disable: Vec<AppEntry> = if packages.is_empty() {
            Vec::new()
        } else {
            self.resolve_entries(packages, trace_id)?
                .into_iter()
                .filter(|entry| entry.is_enabled)
                .collect()
        };

        if to_disable.is_empty() {
            self.notices.info(trace_id, "Nothing to disable");
            return Ok(0);
        }

        for entry in &to_disable {
            self.disable_app(entry, true, trace_id)?;
        }
        Ok(to_disable.len())
    }

    fn start_app(&self, package: &str, trace_id: &str) -> Result<(), LauncherError> {
        let serial = self
            .gate()
            .check_broker(trace_id)
            .map_err(|err| {
                debug!(trace_id = %trace_id, error = %err, "device unavailable for launch");
                LauncherError::CantOpenApp(package.to_string())
            })?;

        let args = vec![
            "-s".to_string(),
            serial,
            "shell".to_string(),
            "monkey".to_string(),
            "-p".to_string(),
            package.to_string(),
            "-c".to_string(),
            "android.intent.category.LAUNCHER".to_string(),
            "1".to_string(),
        ];
        let output = self
            .runner
            .run(&self.program, &args, self.timeout, trace_id)
            .map_err(|_| LauncherError::CantOpenApp(package.to_string()))?;

        // monkey reports a missing launchable activity on stdout, sometimes
        // with exit code 0.
        if output.exit_code.unwrap_or(1) != 0 || output.stdout.contains("No activities found") {
            return Err(LauncherError::CantOpenApp(package.to_string()));
        }
        Ok(())
    }

    /// Certain privilege failures convert into a store redirect when the
    /// user opted in. `PermissionPending` stays as-is: the device is already
    /// showing the prompt and a redirect would bury it.
    fn with_store_fallback(
        &self,
        err: LauncherError,
        package: &str,
        trace_id: &str,
    ) -> LauncherError {
        let eligible = matches!(
            err,
            LauncherError::PermissionDenied
                | LauncherError::BrokerUnavailable
                | LauncherError::VersionNotSupported
                | LauncherError::ProcessFailure(_)
        );
        if !self.fallback_to_play_store || !eligible {
            return err;
        }

        let url = format!("{STORE_URL_PREFIX}{package}");
        if (self.store_opener)(&url) {
            info!(trace_id = %trace_id, package = %package, "redirected to store listing");
            LauncherError::RedirectedToStore(package.to_string())
        } else {
            err
        }
    }
}
