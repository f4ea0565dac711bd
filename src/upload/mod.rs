//! Upload pipeline
//!
//! [`HttpApi`] speaks the collection server's REST contract;
//! [`UploadCoordinator`] drains the point buffer into it with
//! requeue-on-failure semantics.

mod api;
mod coordinator;

pub use api::{ApiConfig, ApiError, HttpApi, LocationApi};
pub use coordinator::{FlushReason, UploadCoordinator, UploadStatus};
