use thiserror::Error;

/// The five error kinds this crate's read path can produce.
///
/// `schema_misuse` and `query_misuse` are rejected before any I/O is
/// issued; `fragment_io`/`fragment_corrupt` are fatal to the query that
/// observed them but leave the array handle usable for other queries;
/// `internal` indicates a bug in this crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error("schema misuse: {0}")]
    SchemaMisuse(#[from] cellstore_schema::array::schema::Error),
    #[error("query misuse: {0}")]
    QueryMisuse(String),
    #[error("fragment I/O error: {0}")]
    FragmentIo(#[from] std::io::Error),
    #[error("fragment corrupt: {0}")]
    FragmentCorrupt(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn query_misuse(msg: impl Into<String>) -> Self {
        Error::QueryMisuse(msg.into())
    }

    pub fn fragment_corrupt(msg: impl Into<String>) -> Self {
        Error::FragmentCorrupt(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// The `ErrorKind` this error belongs to, used by callers to decide
    /// propagation policy without matching on `Error`'s variants directly.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::SchemaMisuse(_) => ErrorKind::SchemaMisuse,
            Error::QueryMisuse(_) => ErrorKind::QueryMisuse,
            Error::FragmentIo(_) => ErrorKind::FragmentIo,
            Error::FragmentCorrupt(_) => ErrorKind::FragmentCorrupt,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    SchemaMisuse,
    QueryMisuse,
    FragmentIo,
    FragmentCorrupt,
    Internal,
}

pub type Result<T> = std::result::Result<T, Error>;
