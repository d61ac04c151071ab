use crate::record::{FileEntry, FileRecord};
use crate::time::{UnixTimeUtc, UnixTimeUtcUnique};
use im::{HashMap, OrdMap, OrdSet};
use std::sync::Arc;
use uuid::Uuid;

/// Membership side table: file id -> set of member ids. One shape serves
/// both the ACL table and the tag table. An absent entry and an empty set
/// are the same state; `replace` with an empty list removes the entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipIndex {
    entries: HashMap<Uuid, OrdSet<Uuid>>,
}

impl MembershipIndex {
    pub fn members(&self, file_id: &Uuid) -> Option<&OrdSet<Uuid>> {
        self.entries.get(file_id)
    }

    /// Delete-all-then-insert-new semantics for a file's membership set.
    pub fn replace(&mut self, file_id: Uuid, members: impl IntoIterator<Item = Uuid>) {
        let set: OrdSet<Uuid> = members.into_iter().collect();
        if set.is_empty() {
            self.entries.remove(&file_id);
        } else {
            self.entries.insert(file_id, set);
        }
    }

    pub fn add(&mut self, file_id: Uuid, member: Uuid) {
        self.entries.entry(file_id).or_default().insert(member);
    }

    pub fn remove_member(&mut self, file_id: &Uuid, member: &Uuid) {
        let emptied = match self.entries.get_mut(file_id) {
            Some(set) => {
                set.remove(member);
                set.is_empty()
            }
            None => false,
        };
        if emptied {
            self.entries.remove(file_id);
        }
    }

    pub fn remove_file(&mut self, file_id: &Uuid) {
        self.entries.remove(file_id);
    }
}

/// Unique single-column side index: value -> owning file id. Used for the
/// per-drive `global_transit_id` and `unique_id` constraints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UniqueIdIndex {
    entries: HashMap<Uuid, Uuid>,
}

impl UniqueIdIndex {
    pub fn owner(&self, value: &Uuid) -> Option<Uuid> {
        self.entries.get(value).copied()
    }

    /// True when `value` is already owned by a file other than `file_id`.
    pub fn conflicts(&self, value: &Uuid, file_id: &Uuid) -> bool {
        self.owner(value).is_some_and(|owner| owner != *file_id)
    }

    pub fn claim(&mut self, value: Uuid, file_id: Uuid) {
        self.entries.insert(value, file_id);
    }

    pub fn release(&mut self, value: &Uuid) {
        self.entries.remove(value);
    }
}

/// All index state of a single drive. Orderings the cursor protocols scan:
/// `main` by `file_id` (creation order), `by_modified` by unique modified
/// stamp, `by_user_date` by `(user_date, file_id)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriveTables {
    pub main: OrdMap<Uuid, FileRecord>,
    pub by_modified: OrdMap<UnixTimeUtcUnique, Uuid>,
    pub by_user_date: OrdMap<(UnixTimeUtc, Uuid), ()>,
    pub by_global_transit_id: UniqueIdIndex,
    pub by_unique_id: UniqueIdIndex,
    pub acl: MembershipIndex,
    pub tags: MembershipIndex,
    /// Highest `modified` stamp issued in this drive; the next bump takes
    /// `max(high_water + 1, now_unique())` so `modified` is monotonically
    /// non-decreasing across rows and strictly increasing per row.
    pub modified_high_water: UnixTimeUtcUnique,
    pub total_bytes: u64,
}

impl DriveTables {
    pub fn file_count(&self) -> usize {
        self.main.len()
    }

    /// Assembles a main-index row together with its memberships.
    pub fn entry(&self, file_id: &Uuid) -> Option<FileEntry> {
        let record = self.main.get(file_id)?.clone();
        Some(FileEntry {
            record,
            acl_members: self
                .acl
                .members(file_id)
                .map(|set| set.iter().copied().collect())
                .unwrap_or_default(),
            tags: self
                .tags
                .members(file_id)
                .map(|set| set.iter().copied().collect())
                .unwrap_or_default(),
        })
    }
}

/// The whole store: drive id -> per-drive tables, copy-on-write. Snapshots
/// are O(1) Arc clones; writers mutate through `Arc::make_mut`.
#[derive(Debug, Clone, Default)]
pub struct IndexKeyspace {
    drives: Arc<HashMap<Uuid, DriveTables>>,
}

impl IndexKeyspace {
    pub fn snapshot(&self) -> IndexSnapshot {
        IndexSnapshot {
            drives: Arc::clone(&self.drives),
        }
    }

    pub fn drive(&self, drive_id: &Uuid) -> Option<&DriveTables> {
        self.drives.get(drive_id)
    }

    pub fn drive_mut(&mut self, drive_id: Uuid) -> &mut DriveTables {
        Arc::make_mut(&mut self.drives)
            .entry(drive_id)
            .or_default()
    }
}

/// A point-in-time view of the keyspace. Reads against a snapshot never
/// observe writes committed after it was taken.
#[derive(Debug, Clone)]
pub struct IndexSnapshot {
    drives: Arc<HashMap<Uuid, DriveTables>>,
}

impl IndexSnapshot {
    pub fn drive(&self, drive_id: &Uuid) -> Option<&DriveTables> {
        self.drives.get(drive_id)
    }
}
