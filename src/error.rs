use sea_orm::DbErr;

/// Error taxonomy for the dataset store.
///
/// `Malformed`, `Conflict`, `NotFound` and `Capacity` are client-facing
/// rejections; `InvalidState` and `Database` are internal conditions that
/// get logged and surface as a generic server error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad upload content: unknown content type or encoding, missing or
    /// duplicated CSV header, unparsable arrow stream, bad role keys.
    #[error("{0}")]
    Malformed(String),

    /// A dataset with the requested name already exists.
    #[error("{0}")]
    Conflict(String),

    /// Unknown dataset, version, or example reference.
    #[error("{0}")]
    NotFound(String),

    /// The ingestion admission queue is full; retry later.
    #[error("ingestion queue is at capacity")]
    Capacity,

    /// Writer invariant violation, e.g. an append against a stale version
    /// id or a PATCH/DELETE of an example with no prior revision.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Database(#[from] DbErr),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
