use anyhow::{Context, Result, anyhow};
use regex::Regex;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use std::{env, fs, path::Path};
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_check_interval_seconds")]
    pub check_interval_seconds: u64,
    /// Restricts the walk to one namespace; `None` watches all namespaces.
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub webserver: Webserver,
    #[serde(default)]
    pub tls: Tls,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Webserver {
    pub port: u16,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tls {
    #[serde(default)]
    pub ca_certificate_paths: Vec<PathBuf>,
}

fn default_check_interval_seconds() -> u64 {
    6 * 60 * 60
}

impl Default for Webserver {
    fn default() -> Self {
        Webserver { port: 8080 }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            check_interval_seconds: default_check_interval_seconds(),
            namespace: None,
            webserver: Webserver::default(),
            tls: Tls::default(),
        }
    }
}

impl Config {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_seconds)
    }
}

/// Loads the YAML file named by `CONFIG_PATH` (defaults when unset), then applies the
/// `CHECK_INTERVAL` and `NAMESPACE` environment overrides.
pub fn load() -> Result<Config> {
    let mut config = match env::var("CONFIG_PATH") {
        Ok(path) => load_config(path)?,
        Err(_) => {
            info!("CONFIG_PATH not set, using default configuration");
            Config::default()
        }
    };
    apply_env_overrides(
        &mut config,
        env::var("CHECK_INTERVAL").ok(),
        env::var("NAMESPACE").ok(),
    )?;
    Ok(config)
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    info!("Loading config from file {}", path.as_ref().display());
    let yaml_str = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

    let expanded = expand_env_vars(&yaml_str)?;

    let mut config: Config = serde_yaml_ng::from_str(&expanded)
        .context("Failed to parse YAML config after environment variable expansion")?;
    config.namespace = config.namespace.filter(|ns| !ns.is_empty());

    Ok(config)
}

fn apply_env_overrides(
    config: &mut Config,
    check_interval: Option<String>,
    namespace: Option<String>,
) -> Result<()> {
    if let Some(interval) = check_interval {
        config.check_interval_seconds = interval
            .trim()
            .parse()
            .with_context(|| format!("Invalid CHECK_INTERVAL {:?}", interval))?;
    }
    if let Some(namespace) = namespace {
        // An empty NAMESPACE means all namespaces
        config.namespace = Some(namespace).filter(|ns| !ns.is_empty());
    }
    if config.check_interval_seconds == 0 {
        return Err(anyhow!("Check interval must be at least one second"));
    }
    Ok(())
}

/// Replaces `${VAR}` placeholders with environment variables values.
/// Returns an error naming the first variable that is not set.
fn expand_env_vars(input: &str) -> Result<String> {
    let re =
        Regex::new(r"\$\{([^}]+)}").context("Invalid regex pattern for env var substitution")?;

    if let Some(missing) = re
        .captures_iter(input)
        .map(|caps| caps[1].to_string())
        .find(|var_name| env::var(var_name).is_err())
    {
        return Err(anyhow!("Missing environment variable: {}", missing));
    }

    let result = re.replace_all(input, |caps: &regex::Captures| {
        env::var(&caps[1]).unwrap_or_default()
    });

    Ok(result.into_owned())
}
