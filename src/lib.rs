pub mod configuration;
pub mod delivery_worker;
pub mod dispatcher;
pub mod domain;
pub mod email_client;
pub mod event_source;
pub mod link_signer;
pub mod routes;
pub mod scheduler;
pub mod startup;
pub mod store;
pub mod subscription;
pub mod telemetry;
pub mod token_issuer;
pub mod utils;

#[cfg(test)]
mod fakes;
