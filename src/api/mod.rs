//! REST surface over the control store.
//!
//! Reads come straight from the [`ControlStore`]; uploads go through the
//! [`CustomUploadAdmitter`]. The scheduler is not reachable from here.

mod error;
pub mod handlers;
pub mod router;

use std::sync::Arc;

use crate::store::ControlStore;
use crate::upload::CustomUploadAdmitter;

pub use error::ApiError;
pub use router::build_router;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ControlStore>,
    pub uploads: Arc<CustomUploadAdmitter>,
}

impl AppState {
    pub fn new(store: Arc<dyn ControlStore>, max_upload_bytes: usize) -> Self {
        Self {
            uploads: Arc::new(CustomUploadAdmitter::new(
                Arc::clone(&store),
                max_upload_bytes,
            )),
            store,
        }
    }
}
