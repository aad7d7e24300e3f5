//! # remote
//!
//! Blocking client for the backup server's REST API.
//!
//! The reconciler only needs three operations, captured by [`ResourceApi`]:
//! fetch a resource's live document by name, push an update by id, and
//! create a new resource. [`RestApi`] talks to a real server; [`MockApi`]
//! keeps resources in memory for tests.

pub mod api;
pub mod error;
pub mod profile;

pub use api::rest::RestApi;
pub use api::{FetchedResource, MockApi, ResourceApi};
pub use error::{Error, ErrorCategory, Result};
pub use profile::{DEFAULT_PRODUCT, ProductProfile};
