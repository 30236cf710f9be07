use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::{Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot write config {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("unknown timezone {0}")]
    Timezone(String),
    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub cities: Vec<String>,
    pub site_base_url: String,
    /// `{city}` is replaced by the lowercased city name.
    pub listing_path_template: String,
    pub full_horizon_days: i64,
    pub update_horizon_days: i64,
    pub max_scrolls: usize,
    pub scroll_min_px: u32,
    pub scroll_max_px: u32,
    pub pause_min_ms: u64,
    pub pause_max_ms: u64,
    pub page_load_timeout_secs: u64,
    pub batch_size: usize,
    pub store_view: Option<String>,
    pub timezone: String,
    pub output_dir: Option<PathBuf>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            cities: vec![
                "Valencia".to_string(),
                "Barcelona".to_string(),
                "Madrid".to_string(),
            ],
            site_base_url: "https://xceed.me".to_string(),
            listing_path_template: "/en/{city}/events/all/all-events".to_string(),
            full_horizon_days: 45,
            update_horizon_days: 10,
            max_scrolls: 400,
            scroll_min_px: 500,
            scroll_max_px: 1000,
            pause_min_ms: 1000,
            pause_max_ms: 3000,
            page_load_timeout_secs: 60,
            batch_size: 10,
            store_view: Some("Grid view".to_string()),
            timezone: "Europe/Madrid".to_string(),
            output_dir: None,
        }
    }
}

impl HarvestConfig {
    /// Reads `path`, or the default location when `path` is `None`. A
    /// missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(utils::config_path);
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse { path, source })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        utils::ensure_parent(path);
        let contents = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, contents).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn listing_url(&self, city: &str) -> String {
        let path = self
            .listing_path_template
            .replace("{city}", &city.to_lowercase());
        format!("{}{}", self.site_base_url.trim_end_matches('/'), path)
    }

    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::Timezone(self.timezone.clone()))
    }

    /// Today's date where the events take place.
    pub fn today(&self) -> Result<NaiveDate, ConfigError> {
        let tz = self.tz()?;
        Ok(Utc::now().with_timezone(&tz).date_naive())
    }

    pub fn horizon(&self, days: i64) -> Result<NaiveDate, ConfigError> {
        Ok(self.today()? + Duration::days(days))
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(utils::default_output_dir)
    }
}

/// Access to the remote record store, read from the environment.
#[derive(Debug, Clone)]
pub struct StoreCredentials {
    pub api_url: String,
    pub token: String,
    pub base_id: String,
    pub table_id: String,
}

const DEFAULT_API_URL: &str = "https://api.airtable.com/v0";

impl StoreCredentials {
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_url =
            std::env::var("AIRTABLE_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let token = required_env("XCEED_TOKEN")?;
        let base_id = required_env("BASE_ID")?;
        let table_id = required_env("TABLE_ID")?;
        Ok(Self {
            api_url,
            token,
            base_id,
            table_id,
        })
    }

    pub fn endpoint(&self) -> String {
        format!(
            "{}/{}/{}",
            self.api_url.trim_end_matches('/'),
            self.base_id,
            self.table_id
        )
    }
}

fn required_env(name: &'static str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ConfigError::MissingEnv(name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_listing_urls_from_template() {
        let config = HarvestConfig::default();
        assert_eq!(
            config.listing_url("Valencia"),
            "https://xceed.me/en/valencia/events/all/all-events"
        );
    }

    #[test]
    fn missing_file_means_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = HarvestConfig::load(Some(&dir.path().join("absent.json"))).expect("load");
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.cities.len(), 3);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"cities": ["Madrid"], "batch_size": 5}"#).expect("write");
        let config = HarvestConfig::load(Some(&path)).expect("load");
        assert_eq!(config.cities, vec!["Madrid".to_string()]);
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.update_horizon_days, 10);
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.json");
        let mut config = HarvestConfig::default();
        config.max_scrolls = 12;
        config.save(&path).expect("save");
        assert_eq!(HarvestConfig::load(Some(&path)).expect("load").max_scrolls, 12);
    }

    #[test]
    fn rejects_unknown_timezone() {
        let config = HarvestConfig {
            timezone: "Mars/Olympus".to_string(),
            ..HarvestConfig::default()
        };
        assert!(matches!(config.tz(), Err(ConfigError::Timezone(_))));
    }

    #[test]
    fn store_endpoint_joins_ids() {
        let creds = StoreCredentials {
            api_url: "https://api.airtable.com/v0/".into(),
            token: "t".into(),
            base_id: "app1".into(),
            table_id: "tbl2".into(),
        };
        assert_eq!(creds.endpoint(), "https://api.airtable.com/v0/app1/tbl2");
    }
}
