pub mod node;
pub mod ssh_config;
pub mod store;

pub use node::{CallbackShell, Node};
pub use store::{ConfigError, ConfigStore};
