//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

use crate::filter::FilterError;
use crate::permalink::PermalinkError;

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error when reading `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Config file parsing error")]
    Toml(#[from] toml::de::Error),

    #[error("Config validation error: {0}")]
    Validation(String),

    #[error("invalid filter for `{field}`")]
    Filter {
        field: String,
        #[source]
        source: FilterError,
    },

    #[error("invalid permalink for `{field}`")]
    Permalink {
        field: String,
        #[source]
        source: PermalinkError,
    },

    #[error("unknown timezone `{0}`")]
    Timezone(String),

    #[error("invalid site url `{url}`")]
    SiteUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}
