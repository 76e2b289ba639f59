use crate::storage::StorageError;

/// Three-way result of a baseline fetch: present, expectedly absent, or a
/// backend failure that should be surfaced as a warning.
#[derive(Debug)]
pub enum FetchOutcome {
    Found(Vec<u8>),
    Absent,
    Error(StorageError),
}

impl FetchOutcome {
    pub fn from_download(result: Result<Vec<u8>, StorageError>) -> Self {
        match result {
            Ok(bytes) => FetchOutcome::Found(bytes),
            Err(err) if err.is_not_found() => FetchOutcome::Absent,
            Err(err) => FetchOutcome::Error(err),
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, FetchOutcome::Found(_))
    }

    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            FetchOutcome::Found(bytes) => Some(bytes),
            FetchOutcome::Absent | FetchOutcome::Error(_) => None,
        }
    }
}
