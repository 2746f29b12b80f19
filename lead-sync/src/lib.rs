//! HTTP endpoint that upserts a lead into the CRM.
//!
//! A `POST` carrying `{email, first_name?, score?, tagNames?}` is normalized
//! into a [`lead::Lead`] and written to the CRM by [`sync::LeadSync`]: missing
//! tags are created, the contact is created or its fields are merge-patched,
//! and the tags are assigned. The response carries the contact as re-fetched
//! from the CRM.
//!
//! Health and readiness probes are served on a separate admin listener.

pub mod config;
pub mod errors;
pub mod lead;
pub mod metrics_defs;
pub mod service;
pub mod sync;

#[cfg(test)]
mod testutils;

use crate::errors::SyncError;
use crate::service::SyncService;
use shared::admin_service::AdminService;
use shared::http::run_http_service;

pub async fn run(config: config::Config) -> Result<(), SyncError> {
    let sync_service = SyncService::new(&config)?;

    let readiness = sync_service.clone();
    let admin_service = AdminService::<SyncError>::new(move || readiness.is_ready());

    let sync_task = run_http_service(&config.listener.host, config.listener.port, sync_service);
    let admin_task = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        admin_service,
    );

    tokio::try_join!(sync_task, admin_task)?;
    Ok(())
}
