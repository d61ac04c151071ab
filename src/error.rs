use thiserror::Error;
use uuid::Uuid;

/// The per-drive unique constraints a write can collide with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueIndexKind {
    FileId,
    GlobalTransitId,
    UniqueId,
}

impl std::fmt::Display for UniqueIndexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UniqueIndexKind::FileId => write!(f, "fileId"),
            UniqueIndexKind::GlobalTransitId => write!(f, "globalTransitId"),
            UniqueIndexKind::UniqueId => write!(f, "uniqueId"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveDbErrorCode {
    InvalidArgument,
    UniqueViolation,
    NotFound,
    Encode,
    Decode,
}

impl DriveDbErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            DriveDbErrorCode::InvalidArgument => "invalid_argument",
            DriveDbErrorCode::UniqueViolation => "unique_violation",
            DriveDbErrorCode::NotFound => "not_found",
            DriveDbErrorCode::Encode => "encode",
            DriveDbErrorCode::Decode => "decode",
        }
    }
}

#[derive(Debug, Error)]
pub enum DriveDbError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("unique constraint violation on '{index}' in drive {drive_id}")]
    UniqueViolation {
        drive_id: Uuid,
        index: UniqueIndexKind,
    },
    #[error("{resource} not found")]
    NotFound { resource: String },
    #[error("encode error: {0}")]
    Encode(String),
    #[error("decode error: {0}")]
    Decode(String),
}

impl DriveDbError {
    pub fn code(&self) -> DriveDbErrorCode {
        match self {
            DriveDbError::InvalidArgument(_) => DriveDbErrorCode::InvalidArgument,
            DriveDbError::UniqueViolation { .. } => DriveDbErrorCode::UniqueViolation,
            DriveDbError::NotFound { .. } => DriveDbErrorCode::NotFound,
            DriveDbError::Encode(_) => DriveDbErrorCode::Encode,
            DriveDbError::Decode(_) => DriveDbErrorCode::Decode,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }

    pub(crate) fn not_found(resource: impl Into<String>) -> Self {
        DriveDbError::NotFound {
            resource: resource.into(),
        }
    }
}
