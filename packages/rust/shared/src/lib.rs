//! Shared types, error model, and configuration for newsmirror.
//!
//! This crate is the foundation depended on by all other newsmirror crates.
//! It provides:
//! - [`NewsMirrorError`], the unified error type
//! - Domain types ([`Item`], [`RawItem`], [`ItemId`], [`Dataset`], [`ImageDescriptor`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, EnrichmentConfig, PipelineConfig, ScheduleConfig, SourceConfig, StorageConfig,
    config_dir, config_file_path, init_config, load_config, load_config_from,
};
pub use error::{NewsMirrorError, Result};
pub use types::{
    Dataset, EXPANDED_WIDTH_THRESHOLD, ImageDescriptor, Item, ItemId, RawItem, SizeClass,
};
