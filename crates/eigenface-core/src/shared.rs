//! Read-mostly slot for the current model.
//!
//! Recognition threads grab an `Arc` to the current model and keep using it;
//! retraining builds a complete new model off to the side and replaces the
//! slot's pointer in one step.

use crate::linalg::GrayBuffer;
use crate::recognizer::{RecognizerError, RecognizerModel};
use crate::types::Recognition;
use std::sync::{Arc, PoisonError, RwLock};

/// Clone-safe handle to the model currently in service.
#[derive(Clone, Default)]
pub struct SharedModel {
    slot: Arc<RwLock<Option<Arc<RecognizerModel>>>>,
}

impl SharedModel {
    /// An untrained slot.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(model: RecognizerModel) -> Self {
        Self {
            slot: Arc::new(RwLock::new(Some(Arc::new(model)))),
        }
    }

    /// The model in service, or `None` while untrained.
    pub fn current(&self) -> Option<Arc<RecognizerModel>> {
        // The slot only ever holds a fully built model, so a poisoned lock
        // still guards a consistent value.
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Put `model` in service, returning the one it replaces.
    pub fn replace(&self, model: RecognizerModel) -> Option<Arc<RecognizerModel>> {
        let model = Arc::new(model);
        tracing::info!(images = model.len(), "model replaced");
        self.slot
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(model)
    }

    pub fn is_trained(&self) -> bool {
        self.current().is_some()
    }

    /// Recognize `query` with whichever model is in service.
    pub fn recognize(&self, query: &GrayBuffer) -> Result<Recognition, RecognizerError> {
        let model = self.current().ok_or(RecognizerError::EmptyModel)?;
        model.recognize(query)
    }
}
