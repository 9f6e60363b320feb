pub mod app_config;
pub mod categories;
pub mod config;
pub mod listing;
pub mod search;

pub use app_config::AppConfig;
pub use categories::{load_categories, CategoriesFile, Category};
pub use config::{load_app_config, load_app_config_from_env};
pub use listing::ListingRecord;
pub use search::{Condition, SearchContext};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read categories file {path}: {source}")]
    CategoriesFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse categories file: {0}")]
    CategoriesFileParse(#[from] serde_yaml::Error),

    #[error("categories validation failed: {0}")]
    Validation(String),
}
