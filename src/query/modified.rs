//! Modified-time cursor. A single watermark over the `by_modified` index:
//! each call returns rows whose unique `modified` stamp is strictly past
//! the watermark, in ascending stamp order. Rows that have never been
//! modified carry no stamp and are not visible here.

use crate::config::DriveDbConfig;
use crate::error::DriveDbError;
use crate::filter::QueryFilters;
use crate::record::FileEntry;
use crate::store::keyspace::IndexSnapshot;
use crate::time::UnixTimeUtcUnique;
use std::ops::Bound;
use tracing::trace;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ModifiedResult {
    pub rows: Vec<FileEntry>,
    pub more_rows: bool,
    /// Stamp of the last delivered row; pass it back to resume. Unchanged
    /// when the page is empty.
    pub cursor: UnixTimeUtcUnique,
}

pub fn execute_query_modified(
    snapshot: &IndexSnapshot,
    config: &DriveDbConfig,
    drive_id: Uuid,
    limit: usize,
    cursor: UnixTimeUtcUnique,
    filters: &QueryFilters,
) -> Result<ModifiedResult, DriveDbError> {
    if limit == 0 {
        return Err(DriveDbError::InvalidArgument(
            "limit must be at least 1".into(),
        ));
    }
    if limit > config.max_page_size {
        return Err(DriveDbError::InvalidArgument(format!(
            "limit {limit} exceeds maximum page size {}",
            config.max_page_size
        )));
    }
    filters.validate(config)?;
    let overfetch = limit
        .checked_add(1)
        .ok_or_else(|| DriveDbError::InvalidArgument("limit overflow".into()))?;

    let Some(tables) = snapshot.drive(&drive_id) else {
        return Ok(ModifiedResult {
            rows: Vec::new(),
            more_rows: false,
            cursor,
        });
    };
    let filter = filters.compile();

    let mut matched: Vec<(UnixTimeUtcUnique, Uuid)> = Vec::new();
    let range = (Bound::Excluded(&cursor), Bound::Unbounded);
    for (stamp, id) in tables.by_modified.range(range) {
        let Some(record) = tables.main.get(id) else {
            continue;
        };
        if filter.matches(record, tables.acl.members(id), tables.tags.members(id)) {
            matched.push((*stamp, *id));
            if matched.len() == overfetch {
                break;
            }
        }
    }

    let more_rows = matched.len() > limit;
    matched.truncate(limit);
    let next_cursor = matched.last().map_or(cursor, |(stamp, _)| *stamp);

    let rows = matched
        .into_iter()
        .filter_map(|(_, id)| tables.entry(&id))
        .collect::<Vec<_>>();

    trace!(%drive_id, rows = rows.len(), more_rows, "query modified page served");
    Ok(ModifiedResult {
        rows,
        more_rows,
        cursor: next_cursor,
    })
}
