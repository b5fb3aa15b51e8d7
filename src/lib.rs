pub mod capabilities;
pub mod composer;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod models;
pub mod pagination;
pub mod registry;
pub mod sniff;
pub mod taskpool;
pub mod traits;

pub use composer::{Scraper, ScraperBuilder, ScraperContext};
pub use config::Config;
pub use error::{ErrorKind, Result, ScrapeError};
pub use fetch::{FetchProvider, HttpFetcher};
pub use models::{BinaryResult, Catalog, Chapter, Page, Series, SiteInfo};
pub use registry::SiteRegistry;
pub use taskpool::{Priority, TaskPool};
