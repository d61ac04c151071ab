//! Batch cursor executor. A query walks one sort order (file id or user
//! date, either direction) in passes: within a pass every matching row is
//! delivered exactly once, and when a pass drains the cursor rotates so the
//! next pass covers only rows that moved past the previous pass's top edge.

use crate::config::DriveDbConfig;
use crate::error::DriveDbError;
use crate::filter::QueryFilters;
use crate::query::cursor::QueryBatchCursor;
use crate::record::FileEntry;
use crate::store::keyspace::{DriveTables, IndexSnapshot};
use crate::time::UnixTimeUtc;
use std::ops::Bound;
use tracing::trace;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchSortField {
    FileId,
    UserDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOrder {
    NewestFirst,
    OldestFirst,
}

/// One page of results plus the cursor to pass back for the next page.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub rows: Vec<FileEntry>,
    pub more_rows: bool,
    pub cursor: QueryBatchCursor,
}

/// The three cursor positions of whichever sort field is active.
struct Pass<K> {
    paging: Option<K>,
    stop: Option<K>,
    next_boundary: Option<K>,
}

impl<K: Copy> Pass<K> {
    /// Folds one delivered page into the pass state. `more` means the scan
    /// found a row beyond the page, so the pass continues; otherwise the
    /// pass drained and the captured boundary rotates into the stop slot.
    fn advance(&mut self, delivered: &[K], order: BatchOrder, more: bool) {
        if let (Some(first), Some(last)) = (delivered.first(), delivered.last()) {
            match order {
                // Newest first walks away from the top edge, so the
                // boundary is the very first row of the pass.
                BatchOrder::NewestFirst => {
                    if self.next_boundary.is_none() {
                        self.next_boundary = Some(*first);
                    }
                }
                // Oldest first walks toward the top edge, so the boundary
                // tracks the newest row seen so far.
                BatchOrder::OldestFirst => self.next_boundary = Some(*last),
            }
            self.paging = Some(*last);
        }
        if !more {
            self.paging = None;
            if let Some(boundary) = self.next_boundary.take() {
                self.stop = Some(boundary);
            }
        }
    }
}

pub fn execute_query_batch(
    snapshot: &IndexSnapshot,
    config: &DriveDbConfig,
    drive_id: Uuid,
    limit: usize,
    cursor: QueryBatchCursor,
    field: BatchSortField,
    order: BatchOrder,
    filters: &QueryFilters,
) -> Result<BatchResult, DriveDbError> {
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
    // Fetch one row past the page to learn whether the pass continues.
    let overfetch = limit
        .checked_add(1)
        .ok_or_else(|| DriveDbError::InvalidArgument("limit overflow".into()))?;

    let Some(tables) = snapshot.drive(&drive_id) else {
        return Ok(BatchResult {
            rows: Vec::new(),
            more_rows: false,
            cursor,
        });
    };
    let filter = filters.compile();

    let mut next_cursor = cursor;
    let result = match field {
        BatchSortField::FileId => {
            let mut pass = Pass {
                paging: next_cursor.paging_cursor,
                stop: next_cursor.stop_at_boundary,
                next_boundary: next_cursor.next_boundary_cursor,
            };
            let mut matched: Vec<Uuid> = Vec::new();
            scan_file_id(tables, &filter, order, &pass, |id| {
                matched.push(id);
                matched.len() < overfetch
            });
            let more = matched.len() > limit;
            matched.truncate(limit);
            pass.advance(&matched, order, more);
            next_cursor.paging_cursor = pass.paging;
            next_cursor.stop_at_boundary = pass.stop;
            next_cursor.next_boundary_cursor = pass.next_boundary;
            (collect_entries(tables, matched.into_iter()), more)
        }
        BatchSortField::UserDate => {
            let mut pass = Pass {
                paging: next_cursor.paging_user_date,
                stop: next_cursor.stop_at_boundary_user_date,
                next_boundary: next_cursor.next_boundary_user_date,
            };
            let mut matched: Vec<(UnixTimeUtc, Uuid)> = Vec::new();
            scan_user_date(tables, &filter, order, &pass, |key| {
                matched.push(key);
                matched.len() < overfetch
            });
            let more = matched.len() > limit;
            matched.truncate(limit);
            pass.advance(&matched, order, more);
            next_cursor.paging_user_date = pass.paging;
            next_cursor.stop_at_boundary_user_date = pass.stop;
            next_cursor.next_boundary_user_date = pass.next_boundary;
            (
                collect_entries(tables, matched.into_iter().map(|(_, id)| id)),
                more,
            )
        }
    };

    let (rows, more_rows) = result;
    trace!(%drive_id, rows = rows.len(), more_rows, "query batch page served");
    Ok(BatchResult {
        rows,
        more_rows,
        cursor: next_cursor,
    })
}

/// Walks the main index in `order` within the pass bounds, feeding matching
/// file ids to `emit` until it declines more.
fn scan_file_id(
    tables: &DriveTables,
    filter: &crate::filter::CompiledFilter,
    order: BatchOrder,
    pass: &Pass<Uuid>,
    mut emit: impl FnMut(Uuid) -> bool,
) {
    match order {
        BatchOrder::NewestFirst => {
            let lower = bound(pass.stop.as_ref());
            let upper = bound(pass.paging.as_ref());
            for (id, record) in tables.main.range((lower, upper)).rev() {
                if filter.matches(record, tables.acl.members(id), tables.tags.members(id))
                    && !emit(*id)
                {
                    return;
                }
            }
        }
        BatchOrder::OldestFirst => {
            // Within a pass `paging` is always past `stop`, so the floor is
            // whichever of the two is set.
            let floor = pass.paging.or(pass.stop);
            for (id, record) in tables.main.range((bound(floor.as_ref()), Bound::Unbounded)) {
                if filter.matches(record, tables.acl.members(id), tables.tags.members(id))
                    && !emit(*id)
                {
                    return;
                }
            }
        }
    }
}

fn scan_user_date(
    tables: &DriveTables,
    filter: &crate::filter::CompiledFilter,
    order: BatchOrder,
    pass: &Pass<(UnixTimeUtc, Uuid)>,
    mut emit: impl FnMut((UnixTimeUtc, Uuid)) -> bool,
) {
    let visit = |key: &(UnixTimeUtc, Uuid), emit: &mut dyn FnMut((UnixTimeUtc, Uuid)) -> bool| {
        let Some(record) = tables.main.get(&key.1) else {
            return true;
        };
        if filter.matches(record, tables.acl.members(&key.1), tables.tags.members(&key.1)) {
            return emit(*key);
        }
        true
    };
    match order {
        BatchOrder::NewestFirst => {
            let lower = bound(pass.stop.as_ref());
            let upper = bound(pass.paging.as_ref());
            for (key, _) in tables.by_user_date.range((lower, upper)).rev() {
                if !visit(key, &mut emit) {
                    return;
                }
            }
        }
        BatchOrder::OldestFirst => {
            let floor = pass.paging.or(pass.stop);
            for (key, _) in tables
                .by_user_date
                .range((bound(floor.as_ref()), Bound::Unbounded))
            {
                if !visit(key, &mut emit) {
                    return;
                }
            }
        }
    }
}

fn bound<K>(key: Option<&K>) -> Bound<&K> {
    match key {
        Some(k) => Bound::Excluded(k),
        None => Bound::Unbounded,
    }
}

fn collect_entries(tables: &DriveTables, ids: impl Iterator<Item = Uuid>) -> Vec<FileEntry> {
    ids.filter_map(|id| tables.entry(&id)).collect()
}
