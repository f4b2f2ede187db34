use serde::Deserialize;
use std::{fs, io, path::Path};
use thiserror::Error;

/// Default config file, relative to the working directory.
pub const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config json file: {0}")]
    Read(#[source] io::Error),
    #[error("failed to parse config json file: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("must specify at least one local to remote host link")]
    NoLinks,
    #[error("multiple local to remote host links are not supported")]
    MultipleLinks,
}

impl ConfigError {
    /// True for the link-count checks that run after a successful parse.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::NoLinks | Self::MultipleLinks)
    }
}

/// A validated configuration: exactly one link plus settings.
#[derive(Debug, Clone)]
pub struct Config {
    pub link: Link,
    pub settings: Settings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Link {
    pub local_address: String,
    pub remote_address: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct Settings {
    pub verbose: bool,
    pub very_verbose: bool,
    pub output_hex: bool,
    pub output_ansi_colors: bool,
    pub disable_nagles_algorithm: bool,
    pub unwrap_tls: bool,
    pub match_regex: String,
    pub replace_regex: String,
}

/// `null` and missing fields are treated alike: no hosts, default settings.
#[derive(Deserialize)]
struct RawConfig {
    hosts: Option<Vec<Link>>,
    settings: Option<Settings>,
}

pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let content = fs::read(path).map_err(ConfigError::Read)?;
    let raw: RawConfig = serde_json::from_slice(&content).map_err(ConfigError::Parse)?;

    let mut hosts = raw.hosts.unwrap_or_default().into_iter();
    let link = hosts.next().ok_or(ConfigError::NoLinks)?;
    if hosts.next().is_some() {
        return Err(ConfigError::MultipleLinks);
    }

    Ok(Config {
        link,
        settings: raw.settings.unwrap_or_default(),
    })
}
