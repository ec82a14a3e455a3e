//! TOML-deserializable connection parameters, as a convenience layer over
//! [`SshShellBuilder`](crate::ssh::SshShellBuilder).
//!
//! Not grounded on `spur` (the Python library has no config-file loader of
//! its own); grounded instead on the teacher's own `SessionBuilder`
//! parameter set plus the `serde`+`toml` pairing used for config structs
//! throughout the example pack (e.g. `visiquate-cco`'s `Config`).

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::Error;
use crate::ssh::{HostKeyPolicy, SshShellBuilder};

fn default_port() -> u16 {
    22
}

fn default_connect_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum HostKeyPolicyConfig {
    Raise,
    Warn,
    AcceptBlind,
    AutoAdd,
}

impl From<HostKeyPolicyConfig> for HostKeyPolicy {
    fn from(value: HostKeyPolicyConfig) -> Self {
        match value {
            HostKeyPolicyConfig::Raise => HostKeyPolicy::Raise,
            HostKeyPolicyConfig::Warn => HostKeyPolicy::Warn,
            HostKeyPolicyConfig::AcceptBlind => HostKeyPolicy::AcceptBlind,
            HostKeyPolicyConfig::AutoAdd => HostKeyPolicy::AutoAdd,
        }
    }
}

/// Connection parameters for an [`SshShell`](crate::ssh::SshShell), loadable
/// from a TOML file.
///
/// ```toml
/// host = "example.com"
/// user = "deploy"
/// private_key_file = "/home/deploy/.ssh/id_ed25519"
/// host_key_policy = "auto_add"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct SshConfig {
    /// The remote hostname or address.
    pub host: String,
    /// The remote port (default 22).
    #[serde(default = "default_port")]
    pub port: u16,
    /// The remote username.
    pub user: String,
    /// Path to a private key file to authenticate with.
    #[serde(default)]
    pub private_key_file: Option<PathBuf>,
    /// A password to authenticate with, in addition to or instead of a key.
    #[serde(default)]
    pub password: Option<String>,
    /// TCP connect timeout, in seconds (default 60).
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// How to treat an unrecognized host key (default `raise`).
    #[serde(default)]
    host_key_policy: Option<HostKeyPolicyConfig>,
}

impl SshConfig {
    /// Parse `contents` as TOML.
    pub fn from_toml(contents: &str) -> Result<Self, Error> {
        toml::from_str(contents)
            .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())))
    }

    /// Read and parse a TOML config file from `path`.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Build an [`SshShellBuilder`] from these parameters. Remaining options
    /// (e.g. `shell_type`) can still be chained before calling `.build()`.
    pub fn builder(&self) -> SshShellBuilder {
        let mut builder = SshShellBuilder::new(self.host.clone(), self.user.clone())
            .port(self.port)
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .host_key_policy(self.host_key_policy.unwrap_or(HostKeyPolicyConfig::Raise).into());
        if let Some(key) = &self.private_key_file {
            builder = builder.private_key_file(key.clone());
        }
        if let Some(password) = &self.password {
            builder = builder.password(password.clone());
        }
        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let config = SshConfig::from_toml("host = \"example.com\"\nuser = \"deploy\"\n").unwrap();
        assert_eq!(config.host, "example.com");
        assert_eq!(config.port, 22);
        assert_eq!(config.connect_timeout_secs, 60);
    }

    #[test]
    fn parses_full_config() {
        let toml = r#"
            host = "example.com"
            port = 2222
            user = "deploy"
            private_key_file = "/home/deploy/.ssh/id_ed25519"
            host_key_policy = "auto_add"
        "#;
        let config = SshConfig::from_toml(toml).unwrap();
        assert_eq!(config.port, 2222);
        assert_eq!(
            config.private_key_file,
            Some(PathBuf::from("/home/deploy/.ssh/id_ed25519"))
        );
    }
}
