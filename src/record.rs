use crate::time::{UnixTimeUtc, UnixTimeUtcUnique};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One row of the per-drive main index. The header blob is opaque to this
/// layer; everything else is filterable metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_id: Uuid,
    pub drive_id: Uuid,
    pub global_transit_id: Option<Uuid>,
    pub unique_id: Option<Uuid>,
    pub file_type: i32,
    pub data_type: i32,
    pub sender_id: Option<CompactString>,
    pub group_id: Option<Uuid>,
    pub user_date: UnixTimeUtc,
    pub required_security_group: i32,
    pub archival_status: i32,
    pub file_state: i32,
    pub file_system_type: i32,
    pub byte_count: u64,
    pub header: Vec<u8>,
    /// Assigned by the store on insert; immutable afterwards.
    pub created: UnixTimeUtcUnique,
    /// `None` until the first update; strictly increases on every write
    /// that touches the row.
    pub modified: Option<UnixTimeUtcUnique>,
}

impl FileRecord {
    pub fn new(drive_id: Uuid, file_id: Uuid) -> Self {
        Self {
            file_id,
            drive_id,
            global_transit_id: None,
            unique_id: None,
            file_type: 0,
            data_type: 0,
            sender_id: None,
            group_id: None,
            user_date: UnixTimeUtc::ZERO,
            required_security_group: 0,
            archival_status: 0,
            file_state: 0,
            file_system_type: 0,
            byte_count: 0,
            header: Vec::new(),
            created: UnixTimeUtcUnique::ZERO,
            modified: None,
        }
    }
}

/// A main-index row together with its side-table memberships, as returned
/// by the point lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub record: FileRecord,
    pub acl_members: Vec<Uuid>,
    pub tags: Vec<Uuid>,
}

/// Partial-field update. `None` leaves a field untouched; the doubly
/// optional fields distinguish "leave as is" from "set to NULL".
/// Membership deltas are applied inside the same write as the row update.
#[derive(Debug, Clone, Default)]
pub struct RecordPatch {
    pub global_transit_id: Option<Option<Uuid>>,
    pub unique_id: Option<Option<Uuid>>,
    pub file_type: Option<i32>,
    pub data_type: Option<i32>,
    pub sender_id: Option<Option<CompactString>>,
    pub group_id: Option<Option<Uuid>>,
    pub user_date: Option<UnixTimeUtc>,
    pub required_security_group: Option<i32>,
    pub archival_status: Option<i32>,
    pub file_state: Option<i32>,
    pub file_system_type: Option<i32>,
    pub byte_count: Option<u64>,
    pub header: Option<Vec<u8>>,
    pub add_acl_members: Vec<Uuid>,
    pub remove_acl_members: Vec<Uuid>,
    pub add_tags: Vec<Uuid>,
    pub remove_tags: Vec<Uuid>,
}

impl RecordPatch {
    pub fn is_empty(&self) -> bool {
        self.global_transit_id.is_none()
            && self.unique_id.is_none()
            && self.file_type.is_none()
            && self.data_type.is_none()
            && self.sender_id.is_none()
            && self.group_id.is_none()
            && self.user_date.is_none()
            && self.required_security_group.is_none()
            && self.archival_status.is_none()
            && self.file_state.is_none()
            && self.file_system_type.is_none()
            && self.byte_count.is_none()
            && self.header.is_none()
            && self.add_acl_members.is_empty()
            && self.remove_acl_members.is_empty()
            && self.add_tags.is_empty()
            && self.remove_tags.is_empty()
    }

    /// Copies the populated fields onto `record`. Identity, `created`, and
    /// `modified` are never patched here; the write path owns those.
    pub(crate) fn apply_to(&self, record: &mut FileRecord) {
        if let Some(gtid) = &self.global_transit_id {
            record.global_transit_id = *gtid;
        }
        if let Some(uid) = &self.unique_id {
            record.unique_id = *uid;
        }
        if let Some(file_type) = self.file_type {
            record.file_type = file_type;
        }
        if let Some(data_type) = self.data_type {
            record.data_type = data_type;
        }
        if let Some(sender_id) = &self.sender_id {
            record.sender_id = sender_id.clone();
        }
        if let Some(group_id) = &self.group_id {
            record.group_id = *group_id;
        }
        if let Some(user_date) = self.user_date {
            record.user_date = user_date;
        }
        if let Some(rsg) = self.required_security_group {
            record.required_security_group = rsg;
        }
        if let Some(archival_status) = self.archival_status {
            record.archival_status = archival_status;
        }
        if let Some(file_state) = self.file_state {
            record.file_state = file_state;
        }
        if let Some(file_system_type) = self.file_system_type {
            record.file_system_type = file_system_type;
        }
        if let Some(byte_count) = self.byte_count {
            record.byte_count = byte_count;
        }
        if let Some(header) = &self.header {
            record.header = header.clone();
        }
    }
}
