//! CLI-side config resolution: layers built-in defaults, an optional global
//! `~/.config/weft/config.toml`, a repository-local `.weft/config.toml`,
//! `WEFT_*` environment variables, and finally the flags the user passed to
//! this invocation -- in that order, lowest precedence first (§4.7).

use std::path::{Path, PathBuf};

use weft_core::Config;

/// Flags a subcommand may override on top of the file/env-resolved config.
/// Every field is optional; `None` means "use whatever the lower layers
/// already settled on."
#[derive(Debug, Default)]
pub struct ConfigOverrides {
    pub repo_path: Option<PathBuf>,
    pub max_parallel: Option<u32>,
    pub harness_name: Option<String>,
    pub control_bind_addr: Option<String>,
}

/// Directory holding the user-wide config file, honoring `XDG_CONFIG_HOME`
/// before falling back to `dirs::home_dir()/.config/weft` (the same
/// resolution order `gator-cli`'s config directory uses).
pub fn global_config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("weft");
    }
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".config").join("weft")
}

pub fn resolve(overrides: ConfigOverrides) -> anyhow::Result<Config> {
    let repo_path = overrides.repo_path.unwrap_or_else(|| PathBuf::from("."));
    let config_path = repo_path.join(".weft").join("config.toml");
    let global_config_path = global_config_dir().join("config.toml");

    let mut config = Config { repo_path: repo_path.clone(), ..Config::default() };
    if let Some(file) = Config::load_file(&global_config_path)? {
        config = config.apply_file(file)?;
    }
    if let Some(file) = Config::load_file(&config_path)? {
        config = config.apply_file(file)?;
    }
    config = config.apply_env()?;

    if let Some(n) = overrides.max_parallel {
        config.max_parallel = n;
    }
    if let Some(name) = overrides.harness_name {
        config.harness_name = name;
    }
    if let Some(addr) = overrides.control_bind_addr {
        config.control_bind_addr = Some(addr);
    }
    config.repo_path = repo_path;

    if config.max_parallel == 0 {
        anyhow::bail!("max_parallel must be at least 1");
    }
    Ok(config)
}

pub fn weft_dir(repo_path: &Path) -> PathBuf {
    repo_path.join(".weft")
}
