pub mod collector;
pub mod commands;
pub mod config;
pub mod connector;
pub mod credentials;
pub mod error;
pub mod notifier;
pub mod packer;
pub mod reference;
pub mod store;
pub mod transfer;
pub mod view;

// Re-exports for easy access
pub use commands::{InspectOptions, Kroctl, PushOptions};
pub use config::CliConfig;
pub use error::{KroctlError, Result};
pub use notifier::Notifier;
pub use reference::ArtifactReference;
pub use transfer::{OciRegistry, Registry};
