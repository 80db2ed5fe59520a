//! # Runtime configuration
//!
//! Usage:
//! Setting any of the `MAILSUBMIT_*` variables in the OS env or a `.env`
//! file, such as `MAILSUBMIT_PORT=6543`. Anything unset falls back to the
//! defaults below.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 6543;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);
/// 10 MiB
pub const DEFAULT_MAX_ATTACHMENT_SIZE: u64 = 10 * 1024 * 1024;
/// 64 MiB
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_SPOOL_DIR: &str = "spool";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} has an invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Everything the client needs to reach a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub max_attachment_size: u64,
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Loads `.env` (if any) and reads the `MAILSUBMIT_*` variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            host: lookup("MAILSUBMIT_HOST").unwrap_or_else(|| DEFAULT_HOST.to_owned()),
            port: port(&lookup)?,
            connect_timeout: millis(&lookup, "MAILSUBMIT_CONNECT_TIMEOUT_MS", DEFAULT_CONNECT_TIMEOUT)?,
            read_timeout: millis(&lookup, "MAILSUBMIT_READ_TIMEOUT_MS", DEFAULT_READ_TIMEOUT)?,
            write_timeout: millis(&lookup, "MAILSUBMIT_WRITE_TIMEOUT_MS", DEFAULT_WRITE_TIMEOUT)?,
            max_attachment_size: parsed(
                &lookup,
                "MAILSUBMIT_MAX_ATTACHMENT_BYTES",
                DEFAULT_MAX_ATTACHMENT_SIZE,
            )?,
        })
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            max_attachment_size: DEFAULT_MAX_ATTACHMENT_SIZE,
        }
    }
}

/// Settings for the `mailsubmitd` daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub spool_dir: PathBuf,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub max_message_size: usize,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("MAILSUBMIT_BIND").unwrap_or_else(|| DEFAULT_BIND.to_owned());
        let port = port(&lookup)?;
        let ip: IpAddr = host.trim().parse().map_err(|e: std::net::AddrParseError| {
            ConfigError::Invalid {
                var: "MAILSUBMIT_BIND",
                value: host.clone(),
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            bind: SocketAddr::new(ip, port),
            spool_dir: lookup("MAILSUBMIT_SPOOL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SPOOL_DIR)),
            read_timeout: millis(&lookup, "MAILSUBMIT_READ_TIMEOUT_MS", DEFAULT_READ_TIMEOUT)?,
            write_timeout: millis(&lookup, "MAILSUBMIT_WRITE_TIMEOUT_MS", DEFAULT_WRITE_TIMEOUT)?,
            max_message_size: parsed(
                &lookup,
                "MAILSUBMIT_MAX_MESSAGE_BYTES",
                DEFAULT_MAX_MESSAGE_SIZE,
            )?,
        })
    }
}

fn parsed<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}

fn millis<F>(lookup: &F, var: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    parsed(lookup, var, default.as_millis() as u64).map(Duration::from_millis)
}

fn port<F>(lookup: &F) -> Result<u16, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let port = parsed(lookup, "MAILSUBMIT_PORT", DEFAULT_PORT)?;
    if port == 0 {
        return Err(ConfigError::Invalid {
            var: "MAILSUBMIT_PORT",
            value: port.to_string(),
            reason: "port must be between 1 and 65535".to_owned(),
        });
    }
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn client_defaults_when_nothing_is_set() {
        let config = ClientConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn client_reads_overrides() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("MAILSUBMIT_HOST", "mail.internal"),
            ("MAILSUBMIT_PORT", "2626"),
            ("MAILSUBMIT_READ_TIMEOUT_MS", "250"),
            ("MAILSUBMIT_MAX_ATTACHMENT_BYTES", "1024"),
        ]))
        .unwrap();

        assert_eq!(config.host, "mail.internal");
        assert_eq!(config.port, 2626);
        assert_eq!(config.read_timeout, Duration::from_millis(250));
        assert_eq!(config.max_attachment_size, 1024);
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
    }

    #[test]
    fn port_zero_is_rejected() {
        let err = ClientConfig::from_lookup(lookup_from(&[("MAILSUBMIT_PORT", "0")])).unwrap_err();
        assert!(err.to_string().contains("MAILSUBMIT_PORT"));
    }

    #[test]
    fn garbage_values_name_the_variable() {
        let err = ClientConfig::from_lookup(lookup_from(&[(
            "MAILSUBMIT_CONNECT_TIMEOUT_MS",
            "soon",
        )]))
        .unwrap_err();

        match err {
            ConfigError::Invalid { var, value, .. } => {
                assert_eq!(var, "MAILSUBMIT_CONNECT_TIMEOUT_MS");
                assert_eq!(value, "soon");
            }
        }
    }

    #[test]
    fn server_binds_host_and_port() {
        let config = ServerConfig::from_lookup(lookup_from(&[
            ("MAILSUBMIT_BIND", "0.0.0.0"),
            ("MAILSUBMIT_PORT", "7000"),
            ("MAILSUBMIT_SPOOL_DIR", "/var/spool/mailsubmit"),
        ]))
        .unwrap();

        assert_eq!(config.bind, "0.0.0.0:7000".parse().unwrap());
        assert_eq!(config.spool_dir, PathBuf::from("/var/spool/mailsubmit"));
        assert_eq!(config.max_message_size, DEFAULT_MAX_MESSAGE_SIZE);
    }

    #[test]
    fn server_rejects_unparsable_bind() {
        let err = ServerConfig::from_lookup(lookup_from(&[("MAILSUBMIT_BIND", "not an ip")]))
            .unwrap_err();
        assert!(err.to_string().contains("MAILSUBMIT_BIND"));
    }
}
