//! Shared types, error model, and configuration for Localvore.
//!
//! This crate is the foundation depended on by all other Localvore crates.
//! It provides:
//! - [`LocalvoreError`], the unified error type
//! - Domain types ([`Recipe`], [`RecipePost`], [`SiteTags`], [`RecipeId`])
//! - Configuration ([`AppConfig`], [`ScrapePolicy`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, EtlConfig, ScrapeConfig, ScrapePolicy, SeasonalConfig,
    ServerConfig, VectorizerConfig, config_dir, config_file_path, expand_home, init_config,
    load_config, load_config_from, validate_config,
};
pub use error::{LocalvoreError, Result};
pub use types::{Recipe, RecipeId, RecipePost, SiteTags, TermField};
