//! The core is agnostic to the VFS used for fragment storage; it only
//! requires a blob-read interface (`spec.md` §6).

use std::io::{Error as IoError, ErrorKind as IoErrorKind};
use std::sync::Arc;

use crate::error::Result;

/// A minimal read-only byte-range interface standing in for the VFS layer.
pub trait Storage: Send + Sync {
    fn byte_range(&self, offset: u64, len: u64) -> Result<Vec<u8>>;
}

/// A `Storage` backed by an already-materialized in-memory blob, used by
/// tests and by callers who have already read fragment bytes off of
/// whatever VFS they use.
#[derive(Clone, Debug, Default)]
pub struct InMemoryStorage {
    bytes: Arc<Vec<u8>>,
}

impl InMemoryStorage {
    pub fn new(bytes: Vec<u8>) -> Self {
        InMemoryStorage {
            bytes: Arc::new(bytes),
        }
    }
}

impl Storage for InMemoryStorage {
    fn byte_range(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        let start = usize::try_from(offset)
            .map_err(|_| crate::error::Error::fragment_corrupt("offset overflow"))?;
        let len = usize::try_from(len)
            .map_err(|_| crate::error::Error::fragment_corrupt("length overflow"))?;
        let end = start
            .checked_add(len)
            .ok_or_else(|| crate::error::Error::fragment_corrupt("byte range overflow"))?;
        self.bytes.get(start..end).map(<[u8]>::to_vec).ok_or_else(|| {
            crate::error::Error::FragmentIo(IoError::new(
                IoErrorKind::UnexpectedEof,
                "byte range out of bounds",
            ))
        })
    }
}
