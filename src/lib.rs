//! In-memory indexed metadata store for a multi-tenant file drive.
//!
//! Every drive owns a main index of [`FileRecord`] rows plus side tables
//! for ACL and tag membership and unique secondary ids. Reads run against
//! O(1) copy-on-write snapshots; writes validate first and then apply
//! atomically under the instance write lock. Two cursor protocols page
//! over the data: [`DriveDb::query_batch`] walks a sort order in boundary
//! rotating passes, [`DriveDb::query_modified`] follows a strictly
//! increasing modified watermark.

pub mod config;
pub mod error;
pub mod filter;
pub mod query;
pub mod record;
pub mod store;
pub mod time;

pub use config::DriveDbConfig;
pub use error::{DriveDbError, DriveDbErrorCode, UniqueIndexKind};
pub use filter::{QueryFilters, SecurityGroupRange, UserDateSpan};
pub use query::{
    BatchOrder, BatchResult, BatchSortField, ModifiedResult, QueryBatchCursor,
    execute_query_batch, execute_query_modified,
};
pub use record::{FileEntry, FileRecord, RecordPatch};
pub use store::{IndexKeyspace, IndexSnapshot};
pub use time::{Clock, SystemClock, UniqueTimeSource, UnixTimeUtc, UnixTimeUtcUnique};

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

/// Handle to one store instance. Cheap to share behind an `Arc`; all
/// methods take `&self`.
pub struct DriveDb {
    config: DriveDbConfig,
    time: Arc<UniqueTimeSource>,
    state: RwLock<IndexKeyspace>,
}

impl DriveDb {
    pub fn new(config: DriveDbConfig) -> Self {
        info!(
            max_page_size = config.max_page_size,
            max_filter_values = config.max_filter_values,
            "opening drive index"
        );
        Self {
            config,
            time: Arc::new(UniqueTimeSource::new()),
            state: RwLock::new(IndexKeyspace::default()),
        }
    }

    /// Instance with an injected clock, for deterministic tests.
    pub fn with_clock(config: DriveDbConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            time: Arc::new(UniqueTimeSource::with_clock(clock)),
            state: RwLock::new(IndexKeyspace::default()),
        }
    }

    /// Time-ordered file id; ids issued by one instance sort in issue
    /// order, so "newest first" over `file_id` is reverse creation order.
    pub fn next_file_id(&self) -> Uuid {
        self.time.next_file_id()
    }

    pub fn now_unique(&self) -> UnixTimeUtcUnique {
        self.time.now_unique()
    }

    pub fn now(&self) -> UnixTimeUtc {
        self.time.now()
    }

    /// Point-in-time view; never observes writes committed after it.
    pub async fn snapshot(&self) -> IndexSnapshot {
        self.state.read().await.snapshot()
    }

    /// Inserts a new row with its memberships. Rejects duplicate `file_id`,
    /// `global_transit_id`, or `unique_id` within the drive without
    /// changing anything. The store assigns `created`; `modified` stays
    /// unset until the first update.
    pub async fn insert(
        &self,
        record: FileRecord,
        acl: &[Uuid],
        tags: &[Uuid],
    ) -> Result<(), DriveDbError> {
        let mut state = self.state.write().await;
        store::write::apply_insert(&mut state, &self.time, record, acl, tags)
    }

    /// Inserts or fully replaces a row. Membership sets are replaced
    /// wholesale; `created` survives, `modified` is bumped on replace.
    pub async fn upsert(
        &self,
        record: FileRecord,
        acl: &[Uuid],
        tags: &[Uuid],
    ) -> Result<(), DriveDbError> {
        let mut state = self.state.write().await;
        store::write::apply_upsert(&mut state, &self.time, record, acl, tags)
    }

    /// Applies a partial patch to an existing row, returning its new
    /// `modified` stamp. `NotFound` when the row does not exist.
    pub async fn update(
        &self,
        drive_id: Uuid,
        file_id: Uuid,
        patch: &RecordPatch,
    ) -> Result<UnixTimeUtcUnique, DriveDbError> {
        let mut state = self.state.write().await;
        store::write::apply_update(&mut state, &self.time, drive_id, file_id, patch)
    }

    /// Bumps `modified` without changing any other field.
    pub async fn touch(
        &self,
        drive_id: Uuid,
        file_id: Uuid,
    ) -> Result<UnixTimeUtcUnique, DriveDbError> {
        let mut state = self.state.write().await;
        store::write::apply_touch(&mut state, &self.time, drive_id, file_id)
    }

    /// Removes a row and all of its side state. Returns whether a row
    /// existed.
    pub async fn delete(&self, drive_id: Uuid, file_id: Uuid) -> bool {
        let mut state = self.state.write().await;
        store::write::apply_delete(&mut state, drive_id, file_id)
    }

    pub async fn get_by_file_id(&self, drive_id: Uuid, file_id: Uuid) -> Option<FileEntry> {
        let snapshot = self.snapshot().await;
        snapshot.drive(&drive_id)?.entry(&file_id)
    }

    pub async fn get_by_global_transit_id(
        &self,
        drive_id: Uuid,
        global_transit_id: Uuid,
    ) -> Option<FileEntry> {
        let snapshot = self.snapshot().await;
        let tables = snapshot.drive(&drive_id)?;
        let owner = tables.by_global_transit_id.owner(&global_transit_id)?;
        tables.entry(&owner)
    }

    pub async fn get_by_unique_id(&self, drive_id: Uuid, unique_id: Uuid) -> Option<FileEntry> {
        let snapshot = self.snapshot().await;
        let tables = snapshot.drive(&drive_id)?;
        let owner = tables.by_unique_id.owner(&unique_id)?;
        tables.entry(&owner)
    }

    /// `(file_count, total_bytes)` of a drive; `(0, 0)` for an unknown
    /// drive.
    pub async fn drive_size(&self, drive_id: Uuid) -> (u64, u64) {
        let snapshot = self.snapshot().await;
        snapshot
            .drive(&drive_id)
            .map(|tables| (tables.file_count() as u64, tables.total_bytes))
            .unwrap_or((0, 0))
    }

    /// One page of a sorted batch scan. Pass the returned cursor back to
    /// continue; a drained cursor keeps serving later passes that cover
    /// only rows written past the previous pass's top edge.
    pub async fn query_batch(
        &self,
        drive_id: Uuid,
        limit: usize,
        cursor: QueryBatchCursor,
        field: BatchSortField,
        order: BatchOrder,
        filters: &QueryFilters,
    ) -> Result<BatchResult, DriveDbError> {
        let snapshot = self.snapshot().await;
        execute_query_batch(
            &snapshot,
            &self.config,
            drive_id,
            limit,
            cursor,
            field,
            order,
            filters,
        )
    }

    /// One page of modified rows strictly past `cursor`, ascending by
    /// modified stamp.
    pub async fn query_modified(
        &self,
        drive_id: Uuid,
        limit: usize,
        cursor: UnixTimeUtcUnique,
        filters: &QueryFilters,
    ) -> Result<ModifiedResult, DriveDbError> {
        let snapshot = self.snapshot().await;
        execute_query_modified(&snapshot, &self.config, drive_id, limit, cursor, filters)
    }
}
