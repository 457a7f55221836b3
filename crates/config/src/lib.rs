//! Configuration loading: file discovery, `${ENV}` substitution and the
//! typed schema.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{config_dir, discover_and_load, load_config, load_or_discover},
    schema::{
        BotConfig, BotSection, DEFAULT_POLL_INTERVAL_SECS, DatabaseSection, Environment,
        PollerSection, ServerSection, TwitchSection, VaultSection,
    },
};
