use weft_core::errors::BackendError;
use weft_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("max transitions exceeded: {max} ({persisted} snapshots persisted)")]
    MaxTransitionsExceeded { max: u32, persisted: u32 },

    #[error("unknown node: {0}")]
    UnknownNode(String),

    #[error("run ended without a response")]
    MissingResponse,

    #[error("run aborted")]
    Aborted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bound_error_reports_snapshot_count() {
        let err = EngineError::MaxTransitionsExceeded { max: 4, persisted: 4 };
        assert_eq!(err.to_string(), "max transitions exceeded: 4 (4 snapshots persisted)");
    }

    #[test]
    fn backend_error_converts() {
        let err: EngineError = BackendError::Cancelled.into();
        assert!(matches!(err, EngineError::Backend(BackendError::Cancelled)));
    }
}
