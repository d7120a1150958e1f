use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

/// Largest request body accepted by default: 16 MiB.
pub const DEFAULT_MAX_BODY_SIZE: usize = 1 << 24;

/// CSRF keys are used directly as BLAKE3 keys.
pub const CSRF_KEY_LEN: usize = 32;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub db_path: PathBuf,
    pub max_body_size: usize,
    pub csrf: Option<CsrfConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            db_path: PathBuf::from("bkt.db"),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            csrf: None,
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(raw: &str) -> ServerResult<Self> {
        let config: Self = toml::from_str(raw)
            .map_err(|e| ServerError::Config(format!("couldn't parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> ServerResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ServerError::Config(format!("couldn't read config file {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> ServerResult<()> {
        if self.max_body_size == 0 {
            return Err(ServerError::Config("max_body_size must be positive".into()));
        }
        if let Some(csrf) = &self.csrf {
            csrf.validate()?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsrfConfig {
    pub key: String,
    /// Mark the token cookie `Secure` (HTTPS only).
    #[serde(default)]
    pub secure: bool,
}

impl CsrfConfig {
    pub fn validate(&self) -> ServerResult<()> {
        if self.key.len() != CSRF_KEY_LEN {
            return Err(ServerError::Config(format!(
                "bad CSRF key: want {CSRF_KEY_LEN} bytes, got {}",
                self.key.len()
            )));
        }
        Ok(())
    }

    pub fn key_bytes(&self) -> ServerResult<[u8; CSRF_KEY_LEN]> {
        self.key
            .as_bytes()
            .try_into()
            .map_err(|_| ServerError::Config("CSRF key must be exactly 32 bytes".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn default_config() {
        let c = ServerConfig::default();
        assert_eq!(c.bind_addr, "127.0.0.1:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(c.db_path, PathBuf::from("bkt.db"));
        assert_eq!(c.max_body_size, 16 * 1024 * 1024);
        assert!(c.csrf.is_none());
        c.validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = ServerConfig::from_toml_str("db_path = \"/var/lib/bkt.db\"\n").unwrap();
        assert_eq!(c.db_path, PathBuf::from("/var/lib/bkt.db"));
        assert_eq!(c.bind_addr, ServerConfig::default().bind_addr);
    }

    #[test]
    fn csrf_section() {
        let raw = format!("bind_addr = \"0.0.0.0:9000\"\n[csrf]\nkey = \"{KEY}\"\nsecure = true\n");
        let c = ServerConfig::from_toml_str(&raw).unwrap();
        let csrf = c.csrf.unwrap();
        assert!(csrf.secure);
        assert_eq!(&csrf.key_bytes().unwrap(), KEY.as_bytes());
    }

    #[test]
    fn short_csrf_key_is_rejected() {
        let err = ServerConfig::from_toml_str("[csrf]\nkey = \"short\"\n").unwrap_err();
        assert!(matches!(err, ServerError::Config(msg) if msg.contains("got 5")));
    }

    #[test]
    fn garbage_is_a_config_error() {
        assert!(matches!(
            ServerConfig::from_toml_str("bind_addr = 12"),
            Err(ServerError::Config(_))
        ));
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bkt.toml");
        std::fs::write(&path, "max_body_size = 1024\n").unwrap();
        assert_eq!(ServerConfig::from_file(&path).unwrap().max_body_size, 1024);
        assert!(ServerConfig::from_file(dir.path().join("missing.toml")).is_err());
    }
}
