//! The server configuration as read from disk, and the validated form the server is built
//! from. Only settings that decide how operations are authorized live here.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use sketching::LogLevel;

use crate::prelude::*;

/// The on disk form. Every field is optional so a partial file falls back to defaults.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Enforce access control items. When false the fixed default policy applies instead.
    #[serde(default)]
    pub access_control_enabled: bool,
    pub admin_dn: Option<String>,
    pub admin_group_dn: Option<String>,
    pub users_base_dn: Option<String>,
    pub groups_base_dn: Option<String>,
    pub log_level: Option<LogLevel>,
}

impl ServerConfig {
    pub fn new<P: AsRef<Path>>(config_path: P) -> Result<Self, OperationError> {
        let mut f = File::open(config_path.as_ref()).map_err(|e| {
            admin_error!(?e, path = ?config_path.as_ref(), "unable to open config file");
            OperationError::InvalidConfig(e.to_string())
        })?;

        let mut contents = String::new();
        f.read_to_string(&mut contents).map_err(|e| {
            admin_error!(?e, "unable to read config contents");
            OperationError::InvalidConfig(e.to_string())
        })?;

        contents.parse()
    }
}

impl FromStr for ServerConfig {
    type Err = OperationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        toml::from_str(s).map_err(|e| {
            admin_error!(?e, "unable to parse config");
            OperationError::InvalidConfig(e.to_string())
        })
    }
}

/// The validated configuration, with names parsed and defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub access_control_enabled: bool,
    pub admin_dn: Dn,
    pub admin_group_dn: Dn,
    pub users_base_dn: Dn,
    pub groups_base_dn: Dn,
    pub log_level: LogLevel,
}

fn parse_dn(setting: &str, value: Option<&str>, default: &str) -> Result<Dn, OperationError> {
    let value = value.unwrap_or(default);
    Dn::parse(value).map_err(|_| {
        admin_error!(%setting, %value, "configured name is not a valid dn");
        OperationError::InvalidConfig(format!("{} is not a valid dn: {}", setting, value))
    })
}

impl Configuration {
    /// Read and validate the configuration file at `config_path`.
    pub fn new<P: AsRef<Path>>(config_path: P) -> Result<Self, OperationError> {
        ServerConfig::new(config_path).and_then(Configuration::try_from)
    }

    pub fn with_access_control(mut self, enabled: bool) -> Self {
        self.access_control_enabled = enabled;
        self
    }
}

impl Default for Configuration {
    fn default() -> Self {
        // The defaults are constants that always parse.
        #[allow(clippy::expect_used)]
        Configuration::try_from(ServerConfig::default()).expect("default configuration is invalid")
    }
}

impl FromStr for Configuration {
    type Err = OperationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<ServerConfig>().and_then(Configuration::try_from)
    }
}

impl TryFrom<ServerConfig> for Configuration {
    type Error = OperationError;

    fn try_from(cfg: ServerConfig) -> Result<Self, Self::Error> {
        Ok(Configuration {
            access_control_enabled: cfg.access_control_enabled,
            admin_dn: parse_dn("admin_dn", cfg.admin_dn.as_deref(), DEFAULT_ADMIN_DN)?,
            admin_group_dn: parse_dn(
                "admin_group_dn",
                cfg.admin_group_dn.as_deref(),
                DEFAULT_ADMIN_GROUP_DN,
            )?,
            users_base_dn: parse_dn(
                "users_base_dn",
                cfg.users_base_dn.as_deref(),
                DEFAULT_USERS_BASE_DN,
            )?,
            groups_base_dn: parse_dn(
                "groups_base_dn",
                cfg.groups_base_dn.as_deref(),
                DEFAULT_GROUPS_BASE_DN,
            )?,
            log_level: cfg.log_level.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        sketching::test_init();
        let config: Configuration = "".parse().expect("empty config rejected");
        assert!(!config.access_control_enabled);
        assert_eq!(config.admin_dn, Dn::parse(DEFAULT_ADMIN_DN).expect("invalid dn"));
        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(config, Configuration::default());
    }

    #[test]
    fn test_overrides() {
        sketching::test_init();
        let config: Configuration = r#"
            access_control_enabled = true
            admin_dn = "cn=root,dc=example"
            users_base_dn = "ou=people,dc=example"
            log_level = "debug"
        "#
        .parse()
        .expect("config rejected");
        assert!(config.access_control_enabled);
        assert_eq!(config.admin_dn, Dn::parse("cn=root,dc=example").expect("invalid dn"));
        assert_eq!(
            config.users_base_dn,
            Dn::parse("ou=people,dc=example").expect("invalid dn")
        );
        assert_eq!(
            config.groups_base_dn,
            Dn::parse(DEFAULT_GROUPS_BASE_DN).expect("invalid dn")
        );
        assert_eq!(config.log_level, LogLevel::Debug);
    }

    #[test]
    fn test_rejects_bad_input() {
        sketching::test_init();
        assert!(matches!(
            "admin_dn = \"not a dn\"".parse::<Configuration>(),
            Err(OperationError::InvalidConfig(_))
        ));
        assert!(matches!(
            "unknown_setting = 1".parse::<Configuration>(),
            Err(OperationError::InvalidConfig(_))
        ));
    }
}
