//! View models. Each view owns its local state, talks to the backend
//! through the shared [`Session`], and learns about other views' mutations
//! only through the [`EventBus`].

pub mod analysis;
pub mod batch;
pub mod dashboard;
pub mod history;
pub mod import;
pub mod patients;

use std::sync::Arc;

use crate::backend::ClinicalBackend;
use crate::events::EventBus;
use crate::session::Session;

/// What every view needs: the session (backend + user) and the bus.
#[derive(Clone)]
pub struct ViewContext {
    pub session: Arc<Session>,
    pub bus: EventBus,
}

impl ViewContext {
    pub fn new(session: Arc<Session>, bus: EventBus) -> Self {
        Self { session, bus }
    }

    /// Context over a fresh session and bus for `backend`.
    pub fn for_backend(backend: Arc<dyn ClinicalBackend>) -> Self {
        Self::new(Arc::new(Session::new(backend)), EventBus::new())
    }

    pub fn backend(&self) -> &dyn ClinicalBackend {
        self.session.backend().as_ref()
    }
}

/// Lifecycle of an analysis or batch run. No retry: an error stays until
/// the next run or reset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AnalysisState {
    #[default]
    Idle,
    Analyzing,
    ResultsShown,
    Error(String),
}

impl AnalysisState {
    pub fn is_busy(&self) -> bool {
        matches!(self, AnalysisState::Analyzing)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            AnalysisState::Error(message) => Some(message),
            _ => None,
        }
    }
}
