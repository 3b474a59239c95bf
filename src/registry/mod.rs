//! Registry-facing helpers: references, auth encoding and interactive login

pub mod auth;
pub mod login;
pub mod reference;

pub use auth::{AuthConfig, IndexInfo};
pub use reference::ImageReference;
