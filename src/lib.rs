pub mod config;
pub mod core;
pub mod native;

#[cfg(all(test, unix))]
mod integration_test;
