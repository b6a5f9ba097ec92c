#[cfg(feature = "cli")]
pub mod cli;
pub mod env;
pub mod portal;

#[cfg(feature = "cli")]
pub use cli::ProbeCli;
pub use portal::{PortalConfig, SecretString, StoreKind};
