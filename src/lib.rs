pub mod config;
pub mod db;
pub mod error;
pub mod plugin;
pub mod settings;
pub mod store;
pub mod token;
pub mod web;

pub use config::AppConfig;
pub use error::{OptionsError, OptionsResult};
pub use plugin::{PluginIdentity, PluginOptions};
pub use settings::{AuthSettings, ConfigMap, PluginSettings};
pub use store::ConfigStore;
