//! Warehouse configuration shared by every binary.
//!
//! Settings come from CLI flags backed by environment variables, optionally
//! layered over a TOML file. Flags and environment always win over the file.

use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;
use reqwest::Url;
use serde::Deserialize;

pub const ENV_PROJECT: &str = "BIGQUERY_PROJECT";
pub const ENV_LOCATION: &str = "BIGQUERY_LOCATION";
pub const ENV_CREDENTIALS: &str = "GOOGLE_APPLICATION_CREDENTIALS";
pub const ENV_DATASET_FILTER: &str = "BIGQUERY_DATASET_FILTER";
pub const ENV_ACCESS_TOKEN: &str = "BIGQUERY_ACCESS_TOKEN";
pub const ENV_API_BASE: &str = "BIGQUERY_API_BASE";
pub const ENV_QUERY_TIMEOUT_SECS: &str = "BIGQUERY_QUERY_TIMEOUT_SECS";
pub const ENV_CONFIG_FILE: &str = "BQ_MCP_CONFIG";

pub const DEFAULT_API_BASE: &str = "https://bigquery.googleapis.com/bigquery/v2";
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// Warehouse flags, flattened into each binary's argument parser.
#[derive(Args, Debug, Clone, Default)]
pub struct WarehouseArgs {
    /// Project that owns the datasets.
    #[arg(long, env = ENV_PROJECT)]
    pub project: Option<String>,

    /// Location/region jobs run in (e.g. `US`, `EU`).
    #[arg(long, env = ENV_LOCATION)]
    pub location: Option<String>,

    /// Path to a service-account or authorized-user credentials file.
    #[arg(long, env = ENV_CREDENTIALS)]
    pub credentials: Option<String>,

    /// Restrict dataset listings to this dataset id.
    #[arg(long, env = ENV_DATASET_FILTER)]
    pub dataset_filter: Option<String>,

    /// Pre-minted OAuth access token; replaces the credentials file.
    #[arg(long, env = ENV_ACCESS_TOKEN, hide_env_values = true)]
    pub access_token: Option<String>,

    #[arg(long, env = ENV_API_BASE)]
    pub api_base: Option<String>,

    #[arg(long, env = ENV_QUERY_TIMEOUT_SECS)]
    pub query_timeout_secs: Option<u64>,

    /// Optional TOML file with a `[warehouse]` table.
    #[arg(long = "config", env = ENV_CONFIG_FILE)]
    pub config_file: Option<PathBuf>,
}

/// The `[warehouse]` table of a TOML config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WarehouseFileConfig {
    pub project: Option<String>,
    pub location: Option<String>,
    pub credentials: Option<String>,
    pub dataset_filter: Option<String>,
    pub access_token: Option<String>,
    pub api_base: Option<String>,
    pub query_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFileRoot {
    #[serde(default)]
    warehouse: WarehouseFileConfig,
}

impl WarehouseFileConfig {
    /// Reads and parses a TOML config file.
    ///
    /// # Errors
    /// Returns `ConfigError::File` if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|err| ConfigError::File {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        Self::parse(&text).map_err(|message| ConfigError::File {
            path: path.to_path_buf(),
            message,
        })
    }

    fn parse(text: &str) -> Result<Self, String> {
        toml::from_str::<ConfigFileRoot>(text)
            .map(|root| root.warehouse)
            .map_err(|err| err.to_string())
    }
}

/// Where warehouse access tokens come from.
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialSource {
    File(PathBuf),
    AccessToken(String),
}

impl fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
            Self::AccessToken(_) => f.write_str("AccessToken(<redacted>)"),
        }
    }
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "credentials file {}", path.display()),
            Self::AccessToken(_) => f.write_str("static access token"),
        }
    }
}

/// Validated warehouse configuration. Every field needed before the first
/// warehouse call is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarehouseConfig {
    pub project: String,
    pub location: String,
    pub credentials: CredentialSource,
    pub dataset_filter: Option<String>,
    pub api_base: Url,
    pub query_timeout: Duration,
}

#[derive(Debug)]
pub enum ConfigError {
    MissingSettings(Vec<&'static str>),
    InvalidSetting { name: &'static str, value: String },
    File { path: PathBuf, message: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSettings(names) => {
                write!(f, "missing required settings: {}", names.join(", "))
            }
            Self::InvalidSetting { name, value } => {
                write!(f, "invalid {name} value: {value}")
            }
            Self::File { path, message } => {
                write!(f, "failed to load config file {}: {message}", path.display())
            }
        }
    }
}

impl Error for ConfigError {}

impl WarehouseArgs {
    /// Fills settings missing from flags and environment with file values.
    #[must_use]
    pub fn layered_over(self, file: WarehouseFileConfig) -> Self {
        Self {
            project: non_blank(self.project).or(file.project),
            location: non_blank(self.location).or(file.location),
            credentials: non_blank(self.credentials).or(file.credentials),
            dataset_filter: non_blank(self.dataset_filter).or(file.dataset_filter),
            access_token: non_blank(self.access_token).or(file.access_token),
            api_base: non_blank(self.api_base).or(file.api_base),
            query_timeout_secs: self.query_timeout_secs.or(file.query_timeout_secs),
            config_file: self.config_file,
        }
    }
}

impl WarehouseConfig {
    /// Resolves the config file (if any) and validates the merged settings.
    ///
    /// # Errors
    /// Returns `ConfigError` when the file is unreadable or settings are
    /// missing or invalid.
    pub fn from_args(args: WarehouseArgs) -> Result<Self, ConfigError> {
        let args = match args.config_file.clone() {
            Some(path) => {
                let file = WarehouseFileConfig::load(&path)?;
                args.layered_over(file)
            }
            None => args,
        };
        Self::try_from(args)
    }
}

impl TryFrom<WarehouseArgs> for WarehouseConfig {
    type Error = ConfigError;

    fn try_from(args: WarehouseArgs) -> Result<Self, Self::Error> {
        let project = non_blank(args.project);
        let location = non_blank(args.location);
        let access_token = non_blank(args.access_token);
        let credentials_file = non_blank(args.credentials).map(PathBuf::from);

        let credentials = match (access_token, credentials_file) {
            (Some(token), _) => Some(CredentialSource::AccessToken(token)),
            (None, Some(path)) => Some(CredentialSource::File(path)),
            (None, None) => None,
        };

        let mut missing = Vec::new();
        if project.is_none() {
            missing.push(ENV_PROJECT);
        }
        if location.is_none() {
            missing.push(ENV_LOCATION);
        }
        if credentials.is_none() {
            missing.push(ENV_CREDENTIALS);
        }
        let (Some(project), Some(location), Some(credentials)) = (project, location, credentials)
        else {
            return Err(ConfigError::MissingSettings(missing));
        };

        let api_base_raw = non_blank(args.api_base).unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let api_base = match Url::parse(api_base_raw.trim_end_matches('/')) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => url,
            _ => {
                return Err(ConfigError::InvalidSetting {
                    name: ENV_API_BASE,
                    value: api_base_raw,
                });
            }
        };

        let timeout_secs = args
            .query_timeout_secs
            .unwrap_or(DEFAULT_QUERY_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidSetting {
                name: ENV_QUERY_TIMEOUT_SECS,
                value: timeout_secs.to_string(),
            });
        }

        Ok(Self {
            project,
            location,
            credentials,
            dataset_filter: non_blank(args.dataset_filter),
            api_base,
            query_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> WarehouseArgs {
        WarehouseArgs {
            project: Some("acme-analytics".to_string()),
            location: Some("US".to_string()),
            credentials: Some("/etc/bq/key.json".to_string()),
            ..WarehouseArgs::default()
        }
    }

    #[test]
    fn reports_every_missing_setting() {
        let err = WarehouseConfig::try_from(WarehouseArgs::default())
            .expect_err("empty args should fail");

        match err {
            ConfigError::MissingSettings(names) => {
                assert_eq!(names, vec![ENV_PROJECT, ENV_LOCATION, ENV_CREDENTIALS]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn blank_values_count_as_missing() {
        let mut args = base_args();
        args.location = Some("   ".to_string());

        let err = WarehouseConfig::try_from(args).expect_err("blank location should fail");
        assert_eq!(err.to_string(), "missing required settings: BIGQUERY_LOCATION");
    }

    #[test]
    fn applies_defaults() {
        let config = WarehouseConfig::try_from(base_args()).expect("config should parse");

        assert_eq!(config.project, "acme-analytics");
        assert_eq!(config.api_base.as_str(), DEFAULT_API_BASE);
        assert_eq!(config.query_timeout, Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS));
        assert_eq!(
            config.credentials,
            CredentialSource::File(PathBuf::from("/etc/bq/key.json"))
        );
        assert!(config.dataset_filter.is_none());
    }

    #[test]
    fn access_token_replaces_credentials_file() {
        let mut args = base_args();
        args.credentials = None;
        args.access_token = Some("ya29.token".to_string());

        let config = WarehouseConfig::try_from(args).expect("token should satisfy credentials");
        assert_eq!(
            config.credentials,
            CredentialSource::AccessToken("ya29.token".to_string())
        );
        assert!(!format!("{:?}", config.credentials).contains("ya29"));
    }

    #[test]
    fn rejects_invalid_api_base_and_zero_timeout() {
        let mut args = base_args();
        args.api_base = Some("ftp://example".to_string());
        assert!(matches!(
            WarehouseConfig::try_from(args),
            Err(ConfigError::InvalidSetting { name: ENV_API_BASE, .. })
        ));

        let mut args = base_args();
        args.query_timeout_secs = Some(0);
        assert!(matches!(
            WarehouseConfig::try_from(args),
            Err(ConfigError::InvalidSetting { name: ENV_QUERY_TIMEOUT_SECS, .. })
        ));
    }

    #[test]
    fn flags_win_over_file_values() {
        let file = WarehouseFileConfig::parse(
            r#"
[warehouse]
project = "from-file"
location = "EU"
dataset_filter = "sales"
query_timeout_secs = 90
"#,
        )
        .expect("file should parse");

        let args = WarehouseArgs {
            project: Some("from-flag".to_string()),
            location: Some(String::new()),
            credentials: Some("key.json".to_string()),
            ..WarehouseArgs::default()
        };
        let config = WarehouseConfig::try_from(args.layered_over(file)).expect("merged config");

        assert_eq!(config.project, "from-flag");
        assert_eq!(config.location, "EU");
        assert_eq!(config.dataset_filter.as_deref(), Some("sales"));
        assert_eq!(config.query_timeout, Duration::from_secs(90));
    }

    #[test]
    fn blank_credentials_fall_back_to_file() {
        let file = WarehouseFileConfig::parse(
            r#"
[warehouse]
credentials = "/etc/bq/from-file.json"
"#,
        )
        .expect("file should parse");

        let args = WarehouseArgs {
            credentials: Some(String::new()),
            ..base_args()
        };
        let config = WarehouseConfig::try_from(args.layered_over(file)).expect("merged config");
        assert_eq!(
            config.credentials,
            CredentialSource::File(PathBuf::from("/etc/bq/from-file.json"))
        );
    }

    #[test]
    fn empty_credentials_env_does_not_block_access_token() {
        #[derive(clap::Parser, Debug)]
        struct TestCli {
            #[command(flatten)]
            warehouse: WarehouseArgs,
        }

        let cli = <TestCli as clap::Parser>::try_parse_from([
            "bq-admin",
            "--project",
            "acme-analytics",
            "--location",
            "US",
            "--credentials",
            "",
            "--access-token",
            "ya29.token",
        ])
        .expect("an empty credentials path should parse");

        let config =
            WarehouseConfig::try_from(cli.warehouse).expect("token should satisfy credentials");
        assert_eq!(
            config.credentials,
            CredentialSource::AccessToken("ya29.token".to_string())
        );
    }

    #[test]
    fn file_rejects_unknown_keys() {
        let err = WarehouseFileConfig::parse("[warehouse]\nprojekt = \"typo\"\n");
        assert!(err.is_err());
    }
}
