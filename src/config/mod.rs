//! Configuration: `medguard.toml` settings.

pub mod settings;

pub use settings::Settings;
