pub mod credentials;
pub mod token_manager;

pub use credentials::{CLIENT_SECRET_ENV, CredentialStore, Credentials, KEY_ID_ENV};
pub use token_manager::{AccessToken, mask_secret_in, mask_token};
