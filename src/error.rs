use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Invalid CSS selector: {0}")]
    Selector(String),

    #[error("Element not found: {0}")]
    NotFound(String),

    #[error("Malformed data: {0}")]
    MalformedData(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Capability '{capability}' is not supported by {site}")]
    Unsupported { site: String, capability: &'static str },

    #[error("Site not supported: {0}")]
    SiteNotSupported(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    NetworkFailure,
    Cancelled,
    MalformedData,
    Configuration,
    Unsupported,
}

impl ScrapeError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedData(msg.into())
    }

    pub fn selector(query: impl Into<String>) -> Self {
        Self::Selector(query.into())
    }

    pub fn unsupported(site: impl Into<String>, capability: &'static str) -> Self {
        Self::Unsupported {
            site: site.into(),
            capability,
        }
    }

    pub fn site_not_supported(site: impl Into<String>) -> Self {
        Self::SiteNotSupported(site.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Http(_) | Self::HttpStatus { .. } | Self::Io(_) => ErrorKind::NetworkFailure,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Serialization(_) | Self::Url(_) | Self::MalformedData(_) => {
                ErrorKind::MalformedData
            }
            Self::Config(_) | Self::Pattern(_) | Self::Selector(_) => ErrorKind::Configuration,
            Self::Unsupported { .. } | Self::SiteNotSupported(_) => ErrorKind::Unsupported,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }
}

pub type Result<T> = std::result::Result<T, ScrapeError>;
