use crate::util::DefaultExt;
use anyhow::Error;
use serde::{Deserialize, Serialize};
use std::{
    env,
    fs::File,
    io::{BufReader, BufWriter},
    net::{IpAddr, Ipv4Addr},
    path::{Path, PathBuf},
};

fn log_level_is_info(level: &str) -> bool {
    level.to_lowercase() == "info"
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    pub address: IpAddr,
    pub port: u16,

    #[serde(skip_serializing_if = "log_level_is_info")]
    pub log_level: String,

    pub database: DatabaseConfig,

    #[serde(skip_serializing_if = "DefaultExt::is_default")]
    pub password: PasswordConfig,

    pub session: SessionConfig,

    #[serde(skip_serializing_if = "DefaultExt::is_default")]
    pub limits: LimitsConfig,

    #[serde(skip_serializing_if = "DefaultExt::is_default")]
    pub threads: ThreadsConfig,

    #[cfg(feature = "tls")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8080,

            log_level: "info".to_owned(),

            database: Default::default(),
            password: Default::default(),
            session: Default::default(),
            limits: Default::default(),
            threads: Default::default(),

            #[cfg(feature = "tls")]
            tls: None,
        }
    }
}

impl Config {
    /// Overrides deployment specific values from the environment
    fn apply_env(&mut self) {
        if let Ok(path) = env::var("QBNOTES_DATABASE") {
            self.database.path = path.into();
        }
        if let Ok(secret) = env::var("QBNOTES_SECRET") {
            self.password.secret = Some(secret);
        }
    }
}

pub fn read(path: impl AsRef<Path>) -> Result<&'static Config, Error> {
    let file = File::open(path)?;
    let mut config: Config = serde_json::from_reader(BufReader::new(file))?;
    config.apply_env();
    Ok(&*Box::leak(Box::new(config)))
}

pub fn write(path: impl AsRef<Path>) -> Result<(), Error> {
    let config: Config = Default::default();
    let file = File::create(path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), &config)?;
    Ok(())
}

#[derive(Debug, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub mode: DatabaseMode,
    pub cache_capacity: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("qbnotes.db"),
            mode: Default::default(),
            cache_capacity: 64 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum DatabaseMode {
    LowSpace,
    HighThroughput,
}

impl Default for DatabaseMode {
    fn default() -> Self {
        Self::LowSpace
    }
}

impl From<DatabaseMode> for sled::Mode {
    fn from(mode: DatabaseMode) -> Self {
        match mode {
            DatabaseMode::LowSpace => Self::LowSpace,
            DatabaseMode::HighThroughput => Self::HighThroughput,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Default, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct PasswordConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash_length: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lanes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_cost: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_cost: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub salt_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct SessionConfig {
    /// Name of the session cookie
    pub cookie: String,
    /// Whether the cookie is only sent over HTTPS
    pub secure: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie: "qbnotes_session".to_owned(),
            secure: false,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct LimitsConfig {
    /// Maximum size of a form body in bytes
    pub form: u64,
    /// Maximum size of an uploaded backup in bytes
    pub upload: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            form: 256 * 1024,
            upload: 32 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Default, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct ThreadsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_threads: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_blocking_threads: Option<usize>,
}

#[cfg(feature = "tls")]
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TlsConfig {
    pub cert: PathBuf,
    pub key: PathBuf,
}
