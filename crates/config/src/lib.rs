//! Layered configuration for archivist.
//!
//! Values are merged from, lowest priority first:
//! 1. built-in defaults ([`Config::default`]),
//! 2. an optional configuration file (YAML, TOML or JSON, picked by extension),
//! 3. environment variables prefixed with `ARCHIVIST_` (`ARCHIVIST_WORKERS=8`).

pub mod error;

use crate::error::{ErrorKind, Result};
use archivist_inventory::LineFormat;
use directories::ProjectDirs;
use exn::{OptionExt, ResultExt};
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

pub const ENV_PREFIX: &str = "ARCHIVIST_";
const DEFAULT_API_URL: &str = "http://localhost:8080/";

/// How a location's diff is written to the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApplyMode {
    /// Stage every merged document in a temporary table and apply them with
    /// a single joined update.
    #[default]
    Staged,
    /// One short read-modify-write transaction per file, spread over a
    /// bounded pool of workers.
    PerFile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the storage API serving the device catalog and snapshots.
    pub api_url: String,
    /// SQLite database holding the file catalog.
    pub database: PathBuf,
    /// Where snapshots are downloaded to. Purged after each successful run.
    pub scratch_dir: PathBuf,
    pub format: LineFormat,
    pub apply: ApplyMode,
    /// Worker count for [`ApplyMode::PerFile`].
    pub workers: usize,
    /// How many file ids are cleared per statement in the orphan pass.
    pub page_size: usize,
    /// Only process these locations. Empty means every catalogued device.
    pub locations: Vec<String>,
    /// HTTP timeout in seconds.
    pub request_timeout: u64,
    /// Compute everything, write nothing.
    pub dry_run: bool,
}

impl Default for Config {
    fn default() -> Self {
        let (data, cache) = match ProjectDirs::from("", "", "archivist") {
            Some(dirs) => (dirs.data_dir().to_path_buf(), dirs.cache_dir().to_path_buf()),
            None => (PathBuf::from(".archivist"), PathBuf::from(".archivist").join("cache")),
        };
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            database: data.join("archivist.db"),
            scratch_dir: cache.join("snapshots"),
            format: LineFormat::default(),
            apply: ApplyMode::default(),
            workers: 5,
            page_size: 1000,
            locations: Vec::new(),
            request_timeout: 300,
            dry_run: false,
        }
    }
}

impl Config {
    /// Load, merge and validate configuration.
    ///
    /// A `file` that is given but missing is an error; without one only the
    /// defaults and environment apply.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = file {
            figment = merge_file(figment, path)?;
        }
        Self::from_figment(figment.merge(Env::prefixed(ENV_PREFIX)))
    }

    fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().or_raise(|| ErrorKind::Extract)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.api_url()?;
        for (key, value) in [
            ("workers", self.workers as u64),
            ("page_size", self.page_size as u64),
            ("request_timeout", self.request_timeout),
        ] {
            if value == 0 {
                exn::bail!(ErrorKind::Invalid {
                    key,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }

    /// The API base URL, always ending in a slash so that relative endpoint
    /// paths join onto it rather than replacing its last segment.
    pub fn api_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.api_url).or_raise(|| ErrorKind::Invalid {
            key: "api_url",
            reason: format!("not a URL: {}", self.api_url),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            exn::bail!(ErrorKind::Invalid {
                key: "api_url",
                reason: format!("unsupported scheme: {}", url.scheme()),
            });
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }
}

fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
    if !path.is_file() {
        exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
    }
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .ok_or_raise(|| ErrorKind::UnsupportedFormat(path.to_path_buf()))?;
    Ok(match extension.as_str() {
        "yaml" | "yml" => figment.merge(Yaml::file(path)),
        "toml" => figment.merge(Toml::file(path)),
        "json" => figment.merge(Json::file(path)),
        _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    fn base() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.workers, 5);
        assert_eq!(config.page_size, 1000);
        assert_eq!(config.request_timeout, 300);
        assert_eq!(config.apply, ApplyMode::Staged);
        assert_eq!(config.format, LineFormat::Positional);
        assert!(config.locations.is_empty());
        assert!(!config.dry_run);
    }

    #[rstest]
    #[case("settings.yaml", "workers: 9\napply: per-file\nlocations: [a, b]\n")]
    #[case("settings.toml", "workers = 9\napply = \"per-file\"\nlocations = [\"a\", \"b\"]\n")]
    #[case("settings.json", r#"{"workers": 9, "apply": "per-file", "locations": ["a", "b"]}"#)]
    fn test_file_formats(#[case] name: &str, #[case] contents: &str) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        let config = Config::from_figment(merge_file(base(), &path).unwrap()).unwrap();
        assert_eq!(config.workers, 9);
        assert_eq!(config.apply, ApplyMode::PerFile);
        assert_eq!(config.locations, vec!["a", "b"]);
        // Untouched keys keep their defaults.
        assert_eq!(config.page_size, 1000);
    }

    #[test]
    fn test_environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("archivist.toml", "workers = 2\nformat = \"json-array\"\n")?;
            jail.set_env("ARCHIVIST_WORKERS", "7");
            jail.set_env("ARCHIVIST_DRY_RUN", "true");
            let config = Config::load(Some(Path::new("archivist.toml"))).unwrap();
            assert_eq!(config.workers, 7);
            assert_eq!(config.format, LineFormat::JsonArray);
            assert!(config.dry_run);
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = Config::load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[test]
    fn test_unknown_extension() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        let err = merge_file(base(), file.path()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnsupportedFormat(_)));
    }

    #[rstest]
    #[case(Config { workers: 0, ..Config::default() }, "workers")]
    #[case(Config { page_size: 0, ..Config::default() }, "page_size")]
    #[case(Config { request_timeout: 0, ..Config::default() }, "request_timeout")]
    #[case(Config { api_url: "not a url".to_string(), ..Config::default() }, "api_url")]
    #[case(Config { api_url: "ftp://example.com/".to_string(), ..Config::default() }, "api_url")]
    fn test_validation(#[case] config: Config, #[case] expected: &str) {
        let err = config.validate().unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid { key, .. } if *key == expected), "{err:?}");
    }

    #[rstest]
    #[case("http://storage.local/api", "http://storage.local/api/")]
    #[case("http://storage.local/api/", "http://storage.local/api/")]
    #[case("https://storage.local", "https://storage.local/")]
    fn test_api_url_gets_trailing_slash(#[case] input: &str, #[case] expected: &str) {
        let config = Config {
            api_url: input.to_string(),
            ..Config::default()
        };
        assert_eq!(config.api_url().unwrap().as_str(), expected);
    }
}
