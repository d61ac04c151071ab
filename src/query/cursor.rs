use crate::error::DriveDbError;
use crate::time::UnixTimeUtc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Paging state of a batch query, round-tripped to the caller as an opaque
/// hex token between calls.
///
/// Three positions, in two flavors depending on the sort field:
/// `paging_*` is the last delivered key of the current pass, `stop_*` is
/// the boundary the current pass must not cross (the top edge of the
/// previous pass), and `next_boundary_*` is the boundary the next pass
/// will stop at, captured while the current pass runs. When a pass drains,
/// the executor rotates `next_boundary_*` into `stop_*` so the caller can
/// keep polling the same cursor and only ever receive rows it has not seen
/// in the current pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryBatchCursor {
    pub paging_cursor: Option<Uuid>,
    pub stop_at_boundary: Option<Uuid>,
    pub next_boundary_cursor: Option<Uuid>,
    pub paging_user_date: Option<(UnixTimeUtc, Uuid)>,
    pub stop_at_boundary_user_date: Option<(UnixTimeUtc, Uuid)>,
    pub next_boundary_user_date: Option<(UnixTimeUtc, Uuid)>,
}

impl QueryBatchCursor {
    /// Fresh cursor that begins a file-id ordered scan strictly past
    /// `file_id` instead of at the edge of the drive.
    pub fn from_start_point(file_id: Uuid) -> Self {
        Self {
            paging_cursor: Some(file_id),
            ..Self::default()
        }
    }

    /// Fresh cursor that begins a user-date ordered scan at `user_date`.
    /// The file-id tie break is saturated so every row carrying exactly
    /// `user_date` is still delivered.
    pub fn from_user_date_start_point(user_date: UnixTimeUtc, newest_first: bool) -> Self {
        let tie_break = if newest_first {
            Uuid::max()
        } else {
            Uuid::nil()
        };
        Self {
            paging_user_date: Some((user_date, tie_break)),
            ..Self::default()
        }
    }

    pub fn encode(&self) -> Result<String, DriveDbError> {
        let bytes =
            rmp_serde::to_vec(self).map_err(|e| DriveDbError::Encode(e.to_string()))?;
        Ok(hex::encode(bytes))
    }

    pub fn decode(token: &str) -> Result<Self, DriveDbError> {
        let bytes = hex::decode(token).map_err(|e| DriveDbError::Decode(e.to_string()))?;
        rmp_serde::from_slice(&bytes).map_err(|e| DriveDbError::Decode(e.to_string()))
    }
}
