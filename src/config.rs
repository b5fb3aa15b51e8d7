use crate::error::{Result, ScrapeError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub task_pool: TaskPoolConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub sites: HashMap<String, SiteConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPoolConfig {
    pub concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    #[default]
    Generic,
    MangaStream,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    pub label: String,
    pub base_url: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub preset: Preset,
    pub url_pattern: String,
    #[serde(default)]
    pub detect_mime: bool,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default)]
    pub selectors: SelectorsConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SelectorsConfig {
    #[serde(default)]
    pub series_title: Option<String>,
    #[serde(default)]
    pub series_list_path: Option<String>,
    #[serde(default)]
    pub series_list: Option<String>,
    #[serde(default)]
    pub use_title_attribute: bool,
    #[serde(default)]
    pub chapter_list: Option<String>,
    #[serde(default)]
    pub chapter_title: Option<String>,
    #[serde(default)]
    pub chapter_title_bloat: Option<String>,
    #[serde(default)]
    pub page_list: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TerminationConfig {
    #[default]
    EmptyPage,
    RepeatedId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    pub start: u32,
    pub throttle_ms: u64,
    #[serde(default)]
    pub termination: TerminationConfig,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let settings = config::Config::builder()
            .add_source(config::File::new(
                &path.to_string_lossy(),
                config::FileFormat::Toml,
            ))
            .add_source(
                config::Environment::with_prefix("MANGAPIPE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ScrapeError::malformed(format!("cannot encode configuration: {e}")))?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.task_pool.concurrency == 0 {
            return Err(ScrapeError::Config(config::ConfigError::Message(
                "task_pool.concurrency must be at least 1".to_string(),
            )));
        }
        for (id, site) in &self.sites {
            url::Url::parse(&site.base_url).map_err(|e| {
                ScrapeError::Config(config::ConfigError::Message(format!(
                    "site '{id}' has an invalid base_url: {e}"
                )))
            })?;
        }
        Ok(())
    }

    pub fn get_site_config(&self, site_id: &str) -> Option<&SiteConfig> {
        self.sites.get(site_id)
    }
}

impl Default for TaskPoolConfig {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            connect_timeout_secs: 10,
            user_agent: "MangaPipe/0.1 (Manga Catalog Extraction)".to_string(),
        }
    }
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            start: 1,
            throttle_ms: 0,
            termination: TerminationConfig::EmptyPage,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut sites = HashMap::new();

        sites.insert("erosmoon".to_string(), SiteConfig {
            label: "Eros Moon".to_string(),
            base_url: "https://eros-moon.xyz".to_string(),
            icon: Some("erosmoon.webp".to_string()),
            preset: Preset::MangaStream,
            url_pattern: r"^https?://eros-moon\.xyz/manga/[^/]+/$".to_string(),
            detect_mime: true,
            user_agent: Some("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36".to_string()),
            headers: None,
            selectors: SelectorsConfig::default(),
            pagination: PaginationConfig {
                start: 1,
                throttle_ms: 1500,
                termination: TerminationConfig::EmptyPage,
            },
        });

        Config {
            task_pool: TaskPoolConfig::default(),
            http: HttpConfig::default(),
            sites,
        }
    }
}
