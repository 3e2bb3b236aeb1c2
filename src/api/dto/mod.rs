//! Data Transfer Objects for REST request/response serialization.
//!
//! Responses serialize domain types directly; only requests and query
//! strings need their own shapes.

pub mod common_dto;
pub mod device_dto;

pub use common_dto::*;
pub use device_dto::*;
