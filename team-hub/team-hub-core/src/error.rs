use thiserror::Error;

/// Everything an operation on the document can fail with. All variants are
/// request-local: the whole-document save is the atomicity boundary, so a
/// failed operation leaves no partial state behind.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Not allowed")]
    Forbidden,
    #[error("Mobile number already exists")]
    DuplicateMobile,
    #[error("Already voted")]
    AlreadyVoted,
    #[error("Invalid option")]
    InvalidOption,
    #[error("A poll needs at least two distinct options")]
    InvalidOptions,
    #[error("Failed to process file")]
    MalformedUpload,
    #[error("identifier space exhausted")]
    IdSpaceExhausted,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
