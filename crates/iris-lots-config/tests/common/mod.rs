// crates/iris-lots-config/tests/common/mod.rs
// =============================================================================
// Module: Config Test Helpers
// Description: Shared helpers for config validation tests.
// Purpose: Build valid baseline configs backed by real files on disk.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use iris_lots_config::IrisLotsConfig;
use tempfile::TempDir;

/// Parses a TOML string into an `IrisLotsConfig` for tests.
pub fn config_from_toml(toml_str: &str) -> Result<IrisLotsConfig, toml::de::Error> {
    toml::from_str(toml_str)
}

/// Writes an executable stand-in for the coding tool.
pub fn fake_tool(dir: &Path) -> Result<PathBuf, String> {
    let path = dir.join("iris-tool");
    fs::write(&path, "#!/bin/sh\nexit 0\n").map_err(|err| err.to_string())?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
            .map_err(|err| err.to_string())?;
    }
    Ok(path)
}

/// Renders a path for embedding in TOML.
pub fn toml_path(path: &Path) -> String {
    path.display().to_string().replace('\\', "/")
}

/// Returns a minimal valid config rooted in a fresh temp directory.
pub fn minimal_config() -> Result<(TempDir, IrisLotsConfig), String> {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let tool = fake_tool(dir.path())?;
    let database = dir.path().join("lots.db");
    let text = format!(
        "[database]\npath = \"{}\"\n\n[tool]\nexecutable = \"{}\"\n",
        toml_path(&database),
        toml_path(&tool)
    );
    let config = config_from_toml(&text).map_err(|err| err.to_string())?;
    Ok((dir, config))
}
