use serde::Serialize;
use std::fmt;

/// Failure kinds surfaced by the privilege gate, the enable/launch sequencer
/// and the inbound action boundary. `RedirectedToStore` is a soft outcome:
/// the operation did not complete, but the user was sent somewhere useful
/// and must not be shown a generic error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail")]
pub enum LauncherError {
    PermissionPending,
    PermissionDenied,
    BrokerUnavailable,
    VersionNotSupported,
    ProcessFailure(String),
    CantOpenApp(String),
    RedirectedToStore(String),
    InvalidArgument(String),
    DocumentFailure(String),
    ConfigFailure(String),
}

impl LauncherError {
    pub fn code(&self) -> &'static str {
        match self {
            LauncherError::PermissionPending => "ERR_PERMISSION_PENDING",
            LauncherError::PermissionDenied => "ERR_PERMISSION_DENIED",
            LauncherError::BrokerUnavailable => "ERR_BROKER_UNAVAILABLE",
            LauncherError::VersionNotSupported => "ERR_VERSION_NOT_SUPPORTED",
            LauncherError::ProcessFailure(_) => "ERR_PROCESS_FAILURE",
            LauncherError::CantOpenApp(_) => "ERR_CANT_OPEN_APP",
            LauncherError::RedirectedToStore(_) => "REDIRECTED_TO_STORE",
            LauncherError::InvalidArgument(_) => "ERR_VALIDATION",
            LauncherError::DocumentFailure(_) => "ERR_DOCUMENT",
            LauncherError::ConfigFailure(_) => "ERR_CONFIG",
        }
    }

    /// Soft outcomes end the operation without counting as a failure.
    pub fn is_soft(&self) -> bool {
        matches!(self, LauncherError::RedirectedToStore(_))
    }

    pub fn message(&self) -> String {
        match self {
            LauncherError::PermissionPending => {
                "Device authorization is pending; approve the prompt on the device and retry"
                    .to_string()
            }
            LauncherError::PermissionDenied => {
                "Access to the debug broker was denied on the device".to_string()
            }
            LauncherError::BrokerUnavailable => "The debug broker is not reachable".to_string(),
            LauncherError::VersionNotSupported => {
                "The installed debug broker version is not supported".to_string()
            }
            LauncherError::ProcessFailure(detail) => {
                format!("Privileged command failed: {detail}")
            }
            LauncherError::CantOpenApp(package) => format!("Can't open app {package}"),
            LauncherError::RedirectedToStore(package) => {
                format!("Redirected to the Play Store listing for {package}")
            }
            LauncherError::InvalidArgument(detail) => detail.clone(),
            LauncherError::DocumentFailure(detail) => detail.clone(),
            LauncherError::ConfigFailure(detail) => detail.clone(),
        }
    }
}

impl fmt::Display for LauncherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.code())
    }
}

impl std::error::Error for LauncherError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_is_the_only_soft_kind() {
        assert!(LauncherError::RedirectedToStore("com.example".to_string()).is_soft());
        assert!(!LauncherError::PermissionDenied.is_soft());
        assert!(!LauncherError::ProcessFailure("exit 1".to_string()).is_soft());
    }

    #[test]
    fn display_carries_code_and_message() {
        let err = LauncherError::CantOpenApp("com.example.app".to_string());
        let rendered = err.to_string();
        assert!(rendered.contains("com.example.app"));
        assert!(rendered.contains("ERR_CANT_OPEN_APP"));
    }
}
