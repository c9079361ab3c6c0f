pub mod config;
pub mod config_loader;
pub mod error;
pub mod retry;
pub mod seo_tag;
pub mod state_machine;
pub mod traits;

pub use config::*;
pub use config_loader::*;
pub use error::*;
pub use retry::*;
pub use seo_tag::*;
pub use state_machine::*;
pub use traits::*;
