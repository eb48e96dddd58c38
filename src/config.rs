use serde::Deserialize;

use std::{env, fs, time::Duration};

const CONFIG_PATH_VAR: &str = "AUTO_REPLY_CONFIG";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_SMTP_TIMEOUT_SECS: u64 = 30;
const IMPLICIT_TLS_PORT: u16 = 465;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    pub api_secret: String,
    pub smtp: SmtpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_name: String,
    pub from_email: String,
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,
}

impl SmtpConfig {
    /// Port 465 speaks TLS from the first byte, every other port negotiates STARTTLS.
    pub const fn implicit_tls(&self) -> bool {
        self.port == IMPLICIT_TLS_PORT
    }

    /// Display form of the fixed reply sender, `"Name" <address>`.
    pub fn sender(&self) -> String {
        format!("\"{}\" <{}>", self.from_name, self.from_email)
    }
}

/// Flat environment layout used by the existing deployment.
#[derive(Debug, Deserialize)]
struct EnvConfig {
    #[serde(default = "default_port")]
    port: u16,
    api_secret_key: String,
    smtp_host: String,
    smtp_port: u16,
    smtp_user1: String,
    smtp_password1: String,
    smtp_from_name: String,
    smtp_from_email: String,
    #[serde(default = "default_timeout_secs")]
    smtp_timeout_secs: u64,
}

impl From<EnvConfig> for Config {
    fn from(env: EnvConfig) -> Self {
        Self {
            port: env.port,
            api_secret: env.api_secret_key,
            smtp: SmtpConfig {
                host: env.smtp_host,
                port: env.smtp_port,
                username: env.smtp_user1,
                password: env.smtp_password1,
                from_name: env.smtp_from_name,
                from_email: env.smtp_from_email,
                timeout: Duration::from_secs(env.smtp_timeout_secs),
            },
        }
    }
}

const fn default_port() -> u16 {
    DEFAULT_PORT
}

const fn default_timeout_secs() -> u64 {
    DEFAULT_SMTP_TIMEOUT_SECS
}

const fn default_timeout() -> Duration {
    Duration::from_secs(DEFAULT_SMTP_TIMEOUT_SECS)
}

fn validate(config: Config) -> Result<Config, Box<dyn std::error::Error>> {
    // An empty secret would let requests without the header through
    if config.api_secret.is_empty() {
        return Err("API secret must not be empty".into());
    }
    if config.smtp.host.is_empty() {
        return Err("SMTP host must not be empty".into());
    }
    Ok(config)
}

fn from_yaml(contents: &str) -> Result<Config, Box<dyn std::error::Error>> {
    validate(serde_yaml::from_str(contents)?)
}

fn from_vars<I>(vars: I) -> Result<Config, Box<dyn std::error::Error>>
where
    I: IntoIterator<Item = (String, String)>,
{
    let env_config: EnvConfig = envy::from_iter(vars)?;
    validate(env_config.into())
}

/// Loads the process configuration. An explicit `AUTO_REPLY_CONFIG` file wins;
/// otherwise the deployment environment is the only source.
pub fn load_config() -> Result<Config, Box<dyn std::error::Error>> {
    load_from(env::vars())
}

fn load_from<I>(vars: I) -> Result<Config, Box<dyn std::error::Error>>
where
    I: IntoIterator<Item = (String, String)>,
{
    let vars: Vec<(String, String)> = vars.into_iter().collect();
    let config_path = vars
        .iter()
        .find(|(key, value)| key == CONFIG_PATH_VAR && !value.is_empty())
        .map(|(_, value)| value.clone());

    // Explicit file, never a silent fallback to the environment
    if let Some(path) = config_path {
        tracing::info!("Loading configuration from '{}'", path);
        let contents = fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read config file '{path}': {e}"))?;
        return from_yaml(&contents);
    }

    tracing::info!("Loading configuration from environment variables");
    match from_vars(vars) {
        Ok(config) => {
            tracing::info!("Successfully loaded configuration from environment variables");
            Ok(config)
        }
        Err(e) => Err(format!(
            "Environment variables are incomplete and {CONFIG_PATH_VAR} is not set. Error: {e}"
        )
        .into()),
    }
}
