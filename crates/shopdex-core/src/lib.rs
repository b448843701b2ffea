use thiserror::Error;

pub mod app_config;
pub mod config;
pub mod filters;
pub mod pricing;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use filters::{
    normalize_labels, parse_shop_ids, FilterCriteria, SortOrder, PRICE_DOMAIN_MAX,
    PRICE_DOMAIN_MIN,
};
pub use pricing::{resolve_pricing_rows, OfferPrice, ProductPricing, VariantPrice};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
