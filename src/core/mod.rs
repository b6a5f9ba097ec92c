pub mod cache;
pub mod dashboard;
pub mod functions;
pub mod poll;
pub mod reconcile;
pub mod repository;
pub mod webhook;

pub use crate::domain::ports::{Clock, KeyValueStorage, RecordStore};
pub use crate::utils::error::Result;
pub use reconcile::{ReconcileOutcome, Reconciler};
pub use repository::PortalRepository;
