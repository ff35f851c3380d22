pub mod compiler;
pub mod config;
pub mod constants;
pub mod db;
pub mod engine;
pub mod error;
pub mod models;
pub mod native_host;
pub mod schedule;
pub mod store;
pub mod sync;
#[cfg(test)]
mod test_utils;
pub mod validation;
