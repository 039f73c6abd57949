//! Synchronous bindings for mobile front ends. Every call blocks on the
//! shared runtime from [`crate::runtime::global_runtime`].

pub mod app;
pub mod errors;
pub mod objects;

#[uniffi::export]
pub fn set_log_level(level: &str) -> bool {
    crate::logging::set_log_level(level)
}

#[uniffi::export]
pub fn format_elapsed(seconds: u64) -> String {
    crate::clock::format_elapsed(seconds)
}
