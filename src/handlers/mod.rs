//! HTTP handlers for nested resources.

pub mod resource;
pub use resource::*;
