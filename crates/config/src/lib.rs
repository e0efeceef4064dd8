//! Configuration loading, environment overrides, and validation.
//!
//! Config file: `parley.toml`, searched in `./` then the user config
//! directory. Environment variables (optionally from `.env`) override file
//! values; command-line flags override both.

pub mod env;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    env::{apply_env_overrides, parse_allowlist},
    error::{Error, Result},
    loader::{config_dir, discover_and_load, load_config, load_dotenv},
    schema::{ParleyConfig, SlotLoadPolicy},
    validate::validate,
};
