pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod server;
pub mod utils;

pub use adapters::{MemoryStore, RestStore};
pub use config::portal::PortalConfig;
pub use core::functions::{FunctionContext, FunctionRequest, FunctionResponse, PortalFunction};
pub use utils::error::{PortalError, Result};
