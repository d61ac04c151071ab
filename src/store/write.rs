//! Write path: validate first, then apply, so a rejected write leaves the
//! keyspace untouched. The caller holds the instance write lock for the
//! duration of one operation; main-row and side-index updates within an
//! operation are therefore atomic with respect to readers, who only ever
//! see committed snapshots.

use crate::error::{DriveDbError, UniqueIndexKind};
use crate::record::{FileRecord, RecordPatch};
use crate::store::keyspace::{DriveTables, IndexKeyspace};
use crate::time::{UniqueTimeSource, UnixTimeUtcUnique};
use tracing::{debug, warn};
use uuid::Uuid;

fn next_modified_stamp(tables: &DriveTables, time: &UniqueTimeSource) -> UnixTimeUtcUnique {
    // max(previous + 1, now): strict per-row increase even when repeated
    // writes land in the same millisecond, monotone across the drive.
    time.now_unique().max(tables.modified_high_water.successor())
}

fn check_identity(record: &FileRecord) -> Result<(), DriveDbError> {
    if record.file_id.is_nil() || record.drive_id.is_nil() {
        return Err(DriveDbError::InvalidArgument(
            "fileId and driveId must be non-nil".into(),
        ));
    }
    Ok(())
}

fn check_unique_side_ids(
    tables: &DriveTables,
    drive_id: Uuid,
    file_id: Uuid,
    global_transit_id: Option<Uuid>,
    unique_id: Option<Uuid>,
) -> Result<(), DriveDbError> {
    if let Some(gtid) = global_transit_id
        && tables.by_global_transit_id.conflicts(&gtid, &file_id)
    {
        warn!(%drive_id, %file_id, "write rejected: duplicate globalTransitId");
        return Err(DriveDbError::UniqueViolation {
            drive_id,
            index: UniqueIndexKind::GlobalTransitId,
        });
    }
    if let Some(uid) = unique_id
        && tables.by_unique_id.conflicts(&uid, &file_id)
    {
        warn!(%drive_id, %file_id, "write rejected: duplicate uniqueId");
        return Err(DriveDbError::UniqueViolation {
            drive_id,
            index: UniqueIndexKind::UniqueId,
        });
    }
    Ok(())
}

pub(crate) fn apply_insert(
    ks: &mut IndexKeyspace,
    time: &UniqueTimeSource,
    mut record: FileRecord,
    acl: &[Uuid],
    tags: &[Uuid],
) -> Result<(), DriveDbError> {
    check_identity(&record)?;
    let drive_id = record.drive_id;
    let file_id = record.file_id;

    if let Some(tables) = ks.drive(&drive_id) {
        if tables.main.contains_key(&file_id) {
            warn!(%drive_id, %file_id, "insert rejected: duplicate fileId");
            return Err(DriveDbError::UniqueViolation {
                drive_id,
                index: UniqueIndexKind::FileId,
            });
        }
        check_unique_side_ids(
            tables,
            drive_id,
            file_id,
            record.global_transit_id,
            record.unique_id,
        )?;
    }

    record.created = time.now_unique();
    record.modified = None;

    let tables = ks.drive_mut(drive_id);
    tables.by_user_date.insert((record.user_date, file_id), ());
    if let Some(gtid) = record.global_transit_id {
        tables.by_global_transit_id.claim(gtid, file_id);
    }
    if let Some(uid) = record.unique_id {
        tables.by_unique_id.claim(uid, file_id);
    }
    tables.acl.replace(file_id, acl.iter().copied());
    tables.tags.replace(file_id, tags.iter().copied());
    tables.total_bytes += record.byte_count;
    tables.main.insert(file_id, record);

    debug!(%drive_id, %file_id, "inserted main index row");
    Ok(())
}

pub(crate) fn apply_upsert(
    ks: &mut IndexKeyspace,
    time: &UniqueTimeSource,
    mut record: FileRecord,
    acl: &[Uuid],
    tags: &[Uuid],
) -> Result<(), DriveDbError> {
    check_identity(&record)?;
    let drive_id = record.drive_id;
    let file_id = record.file_id;

    let found = ks
        .drive(&drive_id)
        .and_then(|tables| tables.main.get(&file_id).map(|row| (tables, row)));
    let (existing, stamp) = match found {
        Some((tables, row)) => {
            check_unique_side_ids(
                tables,
                drive_id,
                file_id,
                record.global_transit_id,
                record.unique_id,
            )?;
            (row.clone(), next_modified_stamp(tables, time))
        }
        // New row: upsert degrades to insert, `modified` stays unset.
        None => return apply_insert(ks, time, record, acl, tags),
    };

    record.created = existing.created;
    record.modified = Some(stamp);

    let tables = ks.drive_mut(drive_id);
    reindex_replaced_row(tables, &existing, &record, stamp);
    tables.acl.replace(file_id, acl.iter().copied());
    tables.tags.replace(file_id, tags.iter().copied());
    tables.main.insert(file_id, record);

    debug!(%drive_id, %file_id, modified = stamp.as_raw(), "upserted main index row");
    Ok(())
}

pub(crate) fn apply_update(
    ks: &mut IndexKeyspace,
    time: &UniqueTimeSource,
    drive_id: Uuid,
    file_id: Uuid,
    patch: &RecordPatch,
) -> Result<UnixTimeUtcUnique, DriveDbError> {
    let found = ks
        .drive(&drive_id)
        .and_then(|tables| tables.main.get(&file_id).map(|row| (tables, row)));
    let Some((tables, row)) = found else {
        return Err(DriveDbError::not_found(format!(
            "file {file_id} in drive {drive_id}"
        )));
    };

    let existing = row.clone();
    let mut next = existing.clone();
    patch.apply_to(&mut next);

    check_unique_side_ids(
        tables,
        drive_id,
        file_id,
        next.global_transit_id,
        next.unique_id,
    )?;
    let stamp = next_modified_stamp(tables, time);
    next.modified = Some(stamp);

    let tables = ks.drive_mut(drive_id);
    reindex_replaced_row(tables, &existing, &next, stamp);
    for member in &patch.add_acl_members {
        tables.acl.add(file_id, *member);
    }
    for member in &patch.remove_acl_members {
        tables.acl.remove_member(&file_id, member);
    }
    for tag in &patch.add_tags {
        tables.tags.add(file_id, *tag);
    }
    for tag in &patch.remove_tags {
        tables.tags.remove_member(&file_id, tag);
    }
    tables.main.insert(file_id, next);

    debug!(%drive_id, %file_id, modified = stamp.as_raw(), "patched main index row");
    Ok(stamp)
}

pub(crate) fn apply_delete(ks: &mut IndexKeyspace, drive_id: Uuid, file_id: Uuid) -> bool {
    let Some(existing) = ks
        .drive(&drive_id)
        .and_then(|tables| tables.main.get(&file_id))
        .cloned()
    else {
        return false;
    };

    let tables = ks.drive_mut(drive_id);
    tables.main.remove(&file_id);
    if let Some(old) = existing.modified {
        tables.by_modified.remove(&old);
    }
    tables.by_user_date.remove(&(existing.user_date, file_id));
    if let Some(gtid) = existing.global_transit_id {
        tables.by_global_transit_id.release(&gtid);
    }
    if let Some(uid) = existing.unique_id {
        tables.by_unique_id.release(&uid);
    }
    tables.acl.remove_file(&file_id);
    tables.tags.remove_file(&file_id);
    tables.total_bytes = tables.total_bytes.saturating_sub(existing.byte_count);

    debug!(%drive_id, %file_id, "deleted main index row and memberships");
    true
}

pub(crate) fn apply_touch(
    ks: &mut IndexKeyspace,
    time: &UniqueTimeSource,
    drive_id: Uuid,
    file_id: Uuid,
) -> Result<UnixTimeUtcUnique, DriveDbError> {
    let Some(existing) = ks
        .drive(&drive_id)
        .and_then(|tables| tables.main.get(&file_id))
        .cloned()
    else {
        return Err(DriveDbError::not_found(format!(
            "file {file_id} in drive {drive_id}"
        )));
    };

    let tables = ks.drive_mut(drive_id);
    let stamp = next_modified_stamp(tables, time);
    tables.modified_high_water = stamp;
    if let Some(old) = existing.modified {
        tables.by_modified.remove(&old);
    }
    tables.by_modified.insert(stamp, file_id);
    let mut next = existing;
    next.modified = Some(stamp);
    tables.main.insert(file_id, next);

    debug!(%drive_id, %file_id, modified = stamp.as_raw(), "touched main index row");
    Ok(stamp)
}

/// Secondary-index maintenance shared by upsert and patch update: the old
/// row is being replaced by `next` whose `modified` was just bumped to
/// `stamp`.
fn reindex_replaced_row(
    tables: &mut DriveTables,
    existing: &FileRecord,
    next: &FileRecord,
    stamp: UnixTimeUtcUnique,
) {
    let file_id = existing.file_id;
    tables.modified_high_water = stamp;
    if let Some(old) = existing.modified {
        tables.by_modified.remove(&old);
    }
    tables.by_modified.insert(stamp, file_id);

    if existing.user_date != next.user_date {
        tables.by_user_date.remove(&(existing.user_date, file_id));
        tables.by_user_date.insert((next.user_date, file_id), ());
    }
    if existing.global_transit_id != next.global_transit_id {
        if let Some(old) = existing.global_transit_id {
            tables.by_global_transit_id.release(&old);
        }
        if let Some(new) = next.global_transit_id {
            tables.by_global_transit_id.claim(new, file_id);
        }
    }
    if existing.unique_id != next.unique_id {
        if let Some(old) = existing.unique_id {
            tables.by_unique_id.release(&old);
        }
        if let Some(new) = next.unique_id {
            tables.by_unique_id.claim(new, file_id);
        }
    }
    tables.total_bytes = tables.total_bytes - existing.byte_count + next.byte_count;
}

#[cfg(test)]
mod tests {
    use super::{apply_delete, apply_insert, apply_touch, apply_update, apply_upsert};
    use crate::error::{DriveDbError, UniqueIndexKind};
    use crate::record::{FileRecord, RecordPatch};
    use crate::store::keyspace::IndexKeyspace;
    use crate::time::UniqueTimeSource;
    use uuid::Uuid;

    fn seeded() -> (IndexKeyspace, UniqueTimeSource, Uuid) {
        (
            IndexKeyspace::default(),
            UniqueTimeSource::new(),
            Uuid::new_v4(),
        )
    }

    #[test]
    fn insert_assigns_created_and_leaves_modified_unset() {
        let (mut ks, time, drive) = seeded();
        let file = time.next_file_id();
        apply_insert(&mut ks, &time, FileRecord::new(drive, file), &[], &[]).expect("insert");

        let row = ks.drive(&drive).unwrap().main.get(&file).unwrap();
        assert!(!row.created.is_zero());
        assert_eq!(row.modified, None);
        assert!(ks.drive(&drive).unwrap().by_modified.is_empty());
    }

    #[test]
    fn duplicate_unique_id_rejects_and_leaves_store_unchanged() {
        let (mut ks, time, drive) = seeded();
        let shared = Uuid::new_v4();

        let mut first = FileRecord::new(drive, time.next_file_id());
        first.unique_id = Some(shared);
        apply_insert(&mut ks, &time, first.clone(), &[], &[]).expect("first insert");

        let mut second = FileRecord::new(drive, time.next_file_id());
        second.unique_id = Some(shared);
        let err = apply_insert(&mut ks, &time, second, &[Uuid::new_v4()], &[])
            .expect_err("second insert must fail");
        assert!(matches!(
            err,
            DriveDbError::UniqueViolation {
                index: UniqueIndexKind::UniqueId,
                ..
            }
        ));

        let tables = ks.drive(&drive).unwrap();
        assert_eq!(tables.main.len(), 1);
        assert_eq!(
            tables.by_unique_id.owner(&shared),
            Some(first.file_id),
            "original owner untouched"
        );
    }

    #[test]
    fn two_null_unique_ids_do_not_collide() {
        let (mut ks, time, drive) = seeded();
        apply_insert(
            &mut ks,
            &time,
            FileRecord::new(drive, time.next_file_id()),
            &[],
            &[],
        )
        .expect("first");
        apply_insert(
            &mut ks,
            &time,
            FileRecord::new(drive, time.next_file_id()),
            &[],
            &[],
        )
        .expect("second");
        assert_eq!(ks.drive(&drive).unwrap().main.len(), 2);
    }

    #[test]
    fn upsert_preserves_created_and_bumps_modified() {
        let (mut ks, time, drive) = seeded();
        let file = time.next_file_id();
        apply_insert(&mut ks, &time, FileRecord::new(drive, file), &[], &[]).expect("insert");
        let created = ks.drive(&drive).unwrap().main.get(&file).unwrap().created;

        let mut replacement = FileRecord::new(drive, file);
        replacement.file_type = 42;
        apply_upsert(&mut ks, &time, replacement, &[], &[]).expect("upsert");

        let row = ks.drive(&drive).unwrap().main.get(&file).unwrap();
        assert_eq!(row.created, created);
        assert_eq!(row.file_type, 42);
        assert!(row.modified.is_some());
        assert_eq!(ks.drive(&drive).unwrap().by_modified.len(), 1);
    }

    #[test]
    fn touch_bumps_strictly_even_in_same_millisecond() {
        let (mut ks, time, drive) = seeded();
        let file = time.next_file_id();
        apply_insert(&mut ks, &time, FileRecord::new(drive, file), &[], &[]).expect("insert");

        let a = apply_touch(&mut ks, &time, drive, file).expect("touch");
        let b = apply_touch(&mut ks, &time, drive, file).expect("touch");
        assert!(b > a);
        assert_eq!(
            ks.drive(&drive).unwrap().by_modified.len(),
            1,
            "old modified key replaced, not accumulated"
        );
    }

    #[test]
    fn update_moves_unique_id_claims_and_user_date_index() {
        let (mut ks, time, drive) = seeded();
        let file = time.next_file_id();
        let mut record = FileRecord::new(drive, file);
        record.unique_id = Some(Uuid::new_v4());
        let old_uid = record.unique_id.unwrap();
        apply_insert(&mut ks, &time, record, &[], &[]).expect("insert");

        let new_uid = Uuid::new_v4();
        let patch = RecordPatch {
            unique_id: Some(Some(new_uid)),
            user_date: Some(crate::time::UnixTimeUtc::from_millis(777)),
            ..RecordPatch::default()
        };
        apply_update(&mut ks, &time, drive, file, &patch).expect("update");

        let tables = ks.drive(&drive).unwrap();
        assert_eq!(tables.by_unique_id.owner(&old_uid), None);
        assert_eq!(tables.by_unique_id.owner(&new_uid), Some(file));
        assert!(
            tables
                .by_user_date
                .contains_key(&(crate::time::UnixTimeUtc::from_millis(777), file))
        );
        assert_eq!(tables.by_user_date.len(), 1);
    }

    #[test]
    fn delete_removes_row_and_all_side_state() {
        let (mut ks, time, drive) = seeded();
        let file = time.next_file_id();
        let mut record = FileRecord::new(drive, file);
        record.global_transit_id = Some(Uuid::new_v4());
        record.byte_count = 100;
        let gtid = record.global_transit_id.unwrap();
        apply_insert(&mut ks, &time, record, &[Uuid::new_v4()], &[Uuid::new_v4()])
            .expect("insert");
        apply_touch(&mut ks, &time, drive, file).expect("touch");

        assert!(apply_delete(&mut ks, drive, file));
        assert!(!apply_delete(&mut ks, drive, file), "second delete is a no-op");

        let tables = ks.drive(&drive).unwrap();
        assert!(tables.main.is_empty());
        assert!(tables.by_modified.is_empty());
        assert!(tables.by_user_date.is_empty());
        assert_eq!(tables.by_global_transit_id.owner(&gtid), None);
        assert!(tables.acl.members(&file).is_none());
        assert!(tables.tags.members(&file).is_none());
        assert_eq!(tables.total_bytes, 0);
    }
}
