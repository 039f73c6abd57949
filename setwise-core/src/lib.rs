pub mod auth;
pub mod blob;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod history;
pub mod logging;
pub mod rest_timer;
pub mod retry;
pub mod runtime;
pub mod session;
pub mod store;

#[cfg(feature = "uniffi")]
uniffi::setup_scaffolding!();
#[cfg(feature = "uniffi")]
pub mod uniffi_interface;
