use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use log::warn;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Env var holding the path of the platform config file.
pub const CONFIG_PATH_ENV: &str = "OSP_CONFIG_PATH";

// Configuration
// The json layout is the one the platform tooling already writes, toml is
// accepted for hand written files.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,

    // Bearer credential and tls mode of the platform's http file repository.
    // The local sqlite store ignores both, they are handed to whichever
    // TransferClient talks to the platform.
    pub token: String,

    #[serde(default)]
    pub tls: TlsMode,

    // Local sqlite store, in memory if unset
    #[serde(default)]
    pub database: Option<PathBuf>,

    #[serde(default)]
    pub walk: WalkConfig,
}

#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TlsMode {
    #[default]
    Verify,
    SkipVerify,
}

#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkConfig {
    #[serde(default)]
    pub follow_links: bool,

    #[serde(default)]
    pub same_file_system: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        match env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Config::load(Path::new(&path)),
            None => Err(Error::Configuration(format!(
                "{} env variable not set",
                CONFIG_PATH_ENV
            ))),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("unable to open config file {}: {}", path.display(), e))
        })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let parsed = if is_json {
            Config::from_json(&content)
        } else {
            Config::from_toml(&content)
        };
        parsed.map_err(|e| match e {
            Error::Configuration(msg) => {
                Error::Configuration(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(content)
            .map_err(|e| Error::Configuration(format!("unable to parse config: {}", e)))?;
        config.validate()
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| Error::Configuration(format!("unable to parse config: {}", e)))?;
        config.validate()
    }

    fn validate(self) -> Result<Self> {
        if self.host.trim().is_empty() {
            return Err(Error::Configuration("attribute host is empty".to_string()));
        }
        if self.token.trim().is_empty() {
            return Err(Error::Configuration("attribute token is empty".to_string()));
        }
        if self.tls == TlsMode::SkipVerify {
            warn!("TLS certificate verification disabled for {}", self.host);
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_defaults() {
        let config = Config::from_json(r#"{"host": "lab.example.com", "token": "abc"}"#).unwrap();
        assert_eq!(config.host, "lab.example.com");
        assert_eq!(config.token, "abc");
        assert_eq!(config.tls, TlsMode::Verify);
        assert_eq!(config.database, None);
        assert_eq!(config.walk, WalkConfig::default());
    }

    #[test]
    fn toml_full() {
        let config = Config::from_toml(
            r#"
            host = "lab.example.com"
            token = "abc"
            tls = "skip-verify"
            database = "/var/lib/osp/store.sqlite"

            [walk]
                follow_links = true
        "#,
        )
        .unwrap();
        assert_eq!(config.tls, TlsMode::SkipVerify);
        assert_eq!(
            config.database.as_deref(),
            Some(Path::new("/var/lib/osp/store.sqlite"))
        );
        assert!(config.walk.follow_links);
        assert!(!config.walk.same_file_system);
    }

    #[test]
    fn missing_attributes() {
        for content in [
            r#"{"host": "h"}"#,
            r#"{"token": "t"}"#,
            r#"{"host": "", "token": "t"}"#,
            r#"{"host": "h", "token": "  "}"#,
            r#"{"host": "h", "token": "t", "tls": "maybe"}"#,
            "[1, 2]",
            "not json",
        ] {
            assert!(
                matches!(Config::from_json(content), Err(Error::Configuration(_))),
                "{} accepted",
                content
            );
        }
    }

    #[test]
    fn load_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let json = dir.path().join("osp.json");
        fs::write(&json, r#"{"host": "h", "token": "t"}"#).unwrap();
        assert_eq!(Config::load(&json).unwrap().host, "h");

        let toml = dir.path().join("osp.toml");
        fs::write(&toml, "host = \"h2\"\ntoken = \"t\"\n").unwrap();
        assert_eq!(Config::load(&toml).unwrap().host, "h2");

        let missing = dir.path().join("missing.json");
        assert!(matches!(
            Config::load(&missing),
            Err(Error::Configuration(_))
        ));
    }
}
