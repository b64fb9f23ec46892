//! Locating, loading and writing the client configuration file.

use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use onekey_core::ClientConfig;
use std::path::{Path, PathBuf};

/// Resolve the configuration path: explicit flag, `ONEKEY_CONFIG`, then the XDG default.
pub fn config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    if let Some(path) = std::env::var_os("ONEKEY_CONFIG") {
        return Ok(PathBuf::from(path));
    }

    let base = match std::env::var_os("XDG_CONFIG_HOME") {
        Some(path) => PathBuf::from(path),
        None => {
            let home = std::env::var_os("HOME")
                .ok_or_else(|| anyhow::anyhow!("HOME not set; set ONEKEY_CONFIG"))?;
            PathBuf::from(home).join(".config")
        }
    };

    Ok(base.join("onekey").join("config.toml"))
}

/// Load configuration from `path` merged with `ONEKEY_*` environment variables.
///
/// A missing file contributes nothing, so only defaults and the environment
/// apply. Malformed values from either source are errors.
pub fn load_config(path: &Path) -> Result<ClientConfig> {
    let mut figment = Figment::new();

    if path.exists() {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("ONEKEY_").split("__").ignore(&["config"]));

    figment.extract().map_err(|err| {
        anyhow::anyhow!(err).context(format!(
            "failed to load configuration from {} and ONEKEY_* variables",
            path.display()
        ))
    })
}

/// Write `config` to `path`, creating parent directories.
pub async fn save_config(path: &Path, config: &ClientConfig) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let contents = toml::to_string_pretty(config)?;

    tokio::fs::write(path, contents)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;

    // Repository tokens live in this file
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(path, perms).await?;
    }

    Ok(())
}
