//! Publish Android builds to RuStore
//!
//! Configuration is loaded with [`ConfigLoader`], credentials with
//! [`CredentialStore`], and a [`PublishOrchestrator`] drives the run against
//! a [`StoreApi`] implementation such as [`RustoreApiClient`].

pub mod api;
pub mod core;
pub mod orchestration;
pub mod security;

pub use crate::api::RustoreApiClient;
pub use crate::core::*;
pub use crate::orchestration::{PublishEvent, PublishOrchestrator, PublishOutcome, PublishReport};
pub use crate::security::{AccessToken, CredentialStore, Credentials};
