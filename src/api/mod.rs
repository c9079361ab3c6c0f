pub mod client;
pub mod models;

pub use client::{DEFAULT_BASE_URL, RustoreApiClient};
