use thiserror::Error;

/// Errors a cell view can signal while bidding on or applying a single
/// request. All of these are local to the bidding round for one cell: they
/// never abort the batch, they just mean "this cell does not bid".
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CellError {
    #[error("cell {cell_id} has stack {cell_stack:?}, request needs {request_stack:?}")]
    StackMismatch {
        cell_id: String,
        cell_stack: String,
        request_stack: String,
    },

    #[error("cell {cell_id} has insufficient resources for the request")]
    InsufficientResources { cell_id: String },

    #[error("cell {cell_id} has nothing matching process {process_guid} index {index} to stop")]
    NothingToStop {
        cell_id: String,
        process_guid: String,
        index: u32,
    },
}

/// Error returned by a [`crate::work::CellClient::perform`] call. Commit-phase
/// RPC errors are silenced by the work accumulator (see its docs) rather than
/// propagated to the caller of `schedule`; this type exists so the
/// accumulator has something concrete to log.
#[derive(Debug, Error, Clone)]
pub enum RpcError {
    #[error("perform call to cell failed: {0}")]
    Transport(String),
}
