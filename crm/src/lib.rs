//! Client for the Systeme.io REST API.
//!
//! Only the endpoints needed to upsert a contact and reconcile its tags are
//! covered. Every call is a single request: there are no retries and no
//! caching, so callers always observe the current remote state.

pub mod client;
pub mod config;
pub mod errors;
pub mod metrics_defs;
pub mod types;

pub use client::{Crm, CrmClient};
pub use config::{ApiKey, CrmConfig};
pub use errors::CrmError;
