use std::path::Path;

/// Resolve the adb program from the configured value: trim, strip one layer
/// of wrapping quotes (pasted paths often carry them), fall back to `adb`
/// on PATH when nothing is configured.
pub fn resolve_adb_program(configured: &str) -> String {
    let mut candidate = configured.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = candidate
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            candidate = inner.trim();
        }
    }
    if candidate.is_empty() {
        "adb".to_string()
    } else {
        candidate.to_string()
    }
}

pub fn validate_adb_program(program: &str) -> Result<(), String> {
    if program.trim().is_empty() {
        return Err("adb command is empty".to_string());
    }
    if program == "adb" {
        // Bare name resolves through PATH; existence is checked at spawn time.
        return Ok(());
    }
    let path = Path::new(program);
    if path.is_dir() {
        return Err("adb path must point to an executable file".to_string());
    }
    if !path.exists() {
        return Err("adb executable not found at the configured path".to_string());
    }
    Ok(())
}
