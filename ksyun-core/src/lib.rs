//! Ksyun Core
//!
//! Schema-driven mapping engine shared by every Ksyun resource: field-name
//! transcoding, request encoding, response decoding, pagination and the
//! API call pipeline.

pub mod api;
pub mod case_convert;
pub mod pagination;
pub mod pipeline;
pub mod provider;
pub mod request;
pub mod resource;
pub mod response;
pub mod schema;
pub mod waiter;
