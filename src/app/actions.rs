use std::sync::Arc;
use std::sync::OnceLock;

use regex::Regex;
use tracing::info;

use crate::app::adb::runner::CommandRunner;
use crate::app::config::AppConfig;
use crate::app::error::LauncherError;
use crate::app::events::NoticeSender;
use crate::app::launcher::Launcher;
use crate::app::models::{AppEntry, ListType};
use crate::app::store::Datasource;
use crate::app::worker::ActionScheduler;

/// Same package-name shape the original action receiver accepted.
const PACKAGE_NAME_PATTERN: &str = r"^\w+\.[\w.]*\w+$";

pub fn is_valid_package_name(value: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(PACKAGE_NAME_PATTERN).expect("package name pattern"))
        .is_match(value)
}

fn validated(package: &str) -> Result<&str, LauncherError> {
    let trimmed = package.trim();
    if is_valid_package_name(trimmed) {
        Ok(trimmed)
    } else {
        Err(LauncherError::InvalidArgument(format!(
            "{trimmed:?} is not a valid package name"
        )))
    }
}

/// The operation boundary every caller (CLI, shortcuts) goes through.
/// Everything device- or document-touching funnels into the launcher, the
/// store and the bounded scheduler owned here.
pub struct Actions {
    config: AppConfig,
    store: Datasource,
    launcher: Launcher,
    scheduler: Arc<ActionScheduler>,
    notices: NoticeSender,
}

impl Actions {
    pub fn new(config: AppConfig, runner: Arc<dyn CommandRunner>, notices: NoticeSender) -> Self {
        let scheduler = Arc::new(ActionScheduler::new(config.adb.max_parallel_commands));
        let store = Datasource::from_settings(&config.launcher, notices.clone());
        let launcher = Launcher::new(&config, runner, Arc::clone(&scheduler), notices.clone());
        Self {
            config,
            store,
            launcher,
            scheduler,
            notices,
        }
    }

    /// Tracked packages joined with live device state. Falls back to the
    /// stored order with placeholder state when no device is reachable; the
    /// curator view should not require a cable.
    pub fn list(&self, list_type: ListType, trace_id: &str) -> Result<Vec<AppEntry>, LauncherError> {
        let packages = self.store.load(list_type, trace_id);
        match self.launcher.resolve_entries(&packages, trace_id) {
            Ok(entries) => Ok(entries),
            Err(err) => {
                self.notices.info(
                    trace_id,
                    format!("{}; showing stored order", err.message()),
                );
                Ok(packages
                    .iter()
                    .map(|package| AppEntry::missing(package))
                    .collect())
            }
        }
    }

    pub fn add(
        &self,
        list_type: ListType,
        packages: &[String],
        trace_id: &str,
    ) -> Result<String, LauncherError> {
        if packages.is_empty() {
            return Err(LauncherError::InvalidArgument(
                "at least one package name is required".to_string(),
            ));
        }
        let mut cleaned = Vec::with_capacity(packages.len());
        for package in packages {
            cleaned.push(validated(package)?.to_string());
        }

        let lock = self.scheduler.document_lock(&self.store.path().to_string_lossy());
        let _guard = lock.lock().expect("document lock poisoned");
        if !self.store.add_packages(list_type, &cleaned, trace_id) {
            return Err(LauncherError::DocumentFailure(
                "Couldn't update the app list".to_string(),
            ));
        }
        info!(trace_id = %trace_id, count = cleaned.len(), "added packages");
        Ok(format!("Added {} package(s)", cleaned.len()))
    }

    pub fn remove(
        &self,
        list_type: ListType,
        package: &str,
        trace_id: &str,
    ) -> Result<String, LauncherError> {
        let package = validated(package)?;

        let lock = self.scheduler.document_lock(&self.store.path().to_string_lossy());
        let _guard = lock.lock().expect("document lock poisoned");
        if !self.store.load(list_type, trace_id).iter().any(|entry| entry == package) {
            return Err(LauncherError::InvalidArgument(format!(
                "{package} is not tracked"
            )));
        }
        if !self.store.remove_package(list_type, package, trace_id) {
            return Err(LauncherError::DocumentFailure(
                "Couldn't update the app list".to_string(),
            ));
        }
        Ok(format!("Removed {package}"))
    }

    pub fn raise(
        &self,
        list_type: ListType,
        package: &str,
        trace_id: &str,
    ) -> Result<String, LauncherError> {
        let package = validated(package)?;

        let lock = self.scheduler.document_lock(&self.store.path().to_string_lossy());
        let _guard = lock.lock().expect("document lock poisoned");
        if self.store.raise_package(list_type, package, trace_id) {
            Ok(format!("Raised {package}"))
        } else {
            // Absent or already first; a no-op, not a failure.
            Ok(format!("{package} was not raised"))
        }
    }

    /// The externally invokable "open app by package name" operation.
    pub fn open_app(&self, package: &str, trace_id: &str) -> Result<String, LauncherError> {
        let package = validated(package)?;
        let entry = self.launcher.entry(package, trace_id)?;
        self.launcher.open_app(&entry, trace_id)?;

        if self.config.launcher.sort_apps_by_usage {
            let lock = self.scheduler.document_lock(&self.store.path().to_string_lossy());
            let _guard = lock.lock().expect("document lock poisoned");
            self.store.raise_package(ListType::Main, package, trace_id);
        }
        Ok(format!("Opened {}", entry.label))
    }

    /// The externally invokable "disable all tracked apps" operation.
    pub fn disable_all(&self, trace_id: &str) -> Result<String, LauncherError> {
        let packages = self.store.load(ListType::Main, trace_id);
        let count = self.launcher.disable_all(&packages, trace_id)?;
        Ok(format!("Disabled {count} app(s)"))
    }

    pub fn enable(&self, package: &str, trace_id: &str) -> Result<String, LauncherError> {
        let package = validated(package)?;
        let entry = self.launcher.entry(package, trace_id)?;
        self.launcher.enable_app(&entry, true, trace_id)?;
        Ok(format!("Enabled {}", entry.label))
    }

    pub fn disable(&self, package: &str, trace_id: &str) -> Result<String, LauncherError> {
        let package = validated(package)?;
        let entry = self.launcher.entry(package, trace_id)?;
        self.launcher.disable_app(&entry, true, trace_id)?;
        Ok(format!("Disabled {}", entry.label))
    }

    /// Gate self-check: verifies the privileged channel end to end without
    /// touching any package.
    pub fn doctor(&self, trace_id: &str) -> Result<String, LauncherError> {
        let serial = self.launcher.check_device(trace_id)?;
        Ok(format!(
            "Broker reachable; privileged commands will target {serial}"
        ))
    }
}
