use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::ScrapeResult;
use crate::fetch::{DriverOptions, ProxyPool, ProxySelection};
use crate::scrapers::SearchParams;

const CONFIG_PATH_ENV: &str = "CONFIG_PATH";
const DATABASE_URL_ENV: &str = "DATABASE_URL";

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    pub database_url: String,
    /// Directory holding `{room,kamernet}_mapping.json`
    pub mapping_dir: PathBuf,
    pub city: String,
    pub render_timeout_secs: u64,
    pub page_load_timeout_secs: u64,
    pub randomize_user_agent: bool,
    pub kamernet_page_delay_secs: u64,
    pub proxy: ProxyConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ProxyConfig {
    pub list: Option<Vec<String>>,
    pub list_path: Option<PathBuf>,
    /// Round-robin when true, uniform random otherwise
    pub sequential: bool,
    pub probe_timeout_secs: u64,
    pub max_probe_attempts: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://listings.db".to_string(),
            mapping_dir: PathBuf::from("db_mappings"),
            city: "leiden".to_string(),
            render_timeout_secs: 10,
            page_load_timeout_secs: 60,
            randomize_user_agent: true,
            kamernet_page_delay_secs: 5,
            proxy: ProxyConfig::default(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            list: None,
            list_path: None,
            sequential: true,
            probe_timeout_secs: 10,
            max_probe_attempts: 10,
        }
    }
}

impl Config {
    /// `.env`, then the TOML file named by `CONFIG_PATH`, then `DATABASE_URL`
    pub fn load() -> Result<Self> {
        dotenv().ok();

        let mut config = match env::var(CONFIG_PATH_ENV) {
            Ok(path) => {
                info!("Reading config from {}", path);
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file {path}"))?;
                Self::from_toml(&raw).with_context(|| format!("Malformed config file {path}"))?
            }
            Err(_) => {
                debug!("{} not set, using defaults", CONFIG_PATH_ENV);
                Self::default()
            }
        };

        if let Ok(url) = env::var(DATABASE_URL_ENV) {
            config.database_url = url;
        }
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn search(&self) -> SearchParams {
        SearchParams::new(&self.city)
    }

    pub fn mapping_path(&self, source_name: &str) -> PathBuf {
        self.mapping_dir
            .join(format!("{}_mapping.json", source_name.to_lowercase()))
    }

    pub fn kamernet_page_delay(&self) -> Duration {
        Duration::from_secs(self.kamernet_page_delay_secs)
    }

    pub fn driver_options(&self, headless: bool) -> DriverOptions {
        DriverOptions {
            headless,
            randomize_user_agent: self.randomize_user_agent,
            render_timeout: Duration::from_secs(self.render_timeout_secs),
            page_load_timeout: Duration::from_secs(self.page_load_timeout_secs),
            probe_timeout: Duration::from_secs(self.proxy.probe_timeout_secs),
            max_probe_attempts: self.proxy.max_probe_attempts,
        }
    }

    pub fn proxy_pool(&self) -> ScrapeResult<Option<ProxyPool>> {
        let selection = if self.proxy.sequential {
            ProxySelection::Sequential
        } else {
            ProxySelection::Random
        };
        ProxyPool::resolve(
            self.proxy.list.clone(),
            self.proxy.list_path.as_deref(),
            selection,
        )
    }
}
