use drivedb::{
    BatchOrder, BatchSortField, DriveDb, DriveDbConfig, FileRecord, QueryBatchCursor,
    QueryFilters, SecurityGroupRange, UserDateSpan,
};
use drivedb::time::UnixTimeUtc;
use uuid::Uuid;

async fn insert_row(db: &DriveDb, drive: Uuid, security_group: i32, acl: &[Uuid]) -> Uuid {
    let file = db.next_file_id();
    let mut record = FileRecord::new(drive, file);
    record.required_security_group = security_group;
    db.insert(record, acl, &[]).await.expect("insert");
    file
}

async fn visible(db: &DriveDb, drive: Uuid, filters: &QueryFilters) -> Vec<Uuid> {
    let page = db
        .query_batch(
            drive,
            100,
            QueryBatchCursor::default(),
            BatchSortField::FileId,
            BatchOrder::OldestFirst,
            filters,
        )
        .await
        .expect("query");
    page.rows.iter().map(|e| e.record.file_id).collect()
}

#[tokio::test]
async fn acl_grants_compose_with_the_security_range() {
    let db = DriveDb::new(DriveDbConfig::default());
    let drive = Uuid::new_v4();
    let a1 = Uuid::new_v4();
    let a2 = Uuid::new_v4();
    let a3 = Uuid::new_v4();

    let open_low = insert_row(&db, drive, 1, &[]).await;
    let gated_a1 = insert_row(&db, drive, 2, &[a1]).await;
    let gated_a1_a2 = insert_row(&db, drive, 2, &[a1, a2]).await;
    let gated_a3 = insert_row(&db, drive, 2, &[a3]).await;
    let open_high = insert_row(&db, drive, 2, &[]).await;

    // In-range callers see open rows plus rows granting one of their
    // members; the a3-only row stays hidden.
    let filters =
        QueryFilters::security(SecurityGroupRange::new(0, 100)).with_acl_any_of(vec![a1]);
    assert_eq!(
        visible(&db, drive, &filters).await,
        vec![open_low, gated_a1, gated_a1_a2, open_high]
    );

    // An ACL grant never overrides a failed security range.
    let filters =
        QueryFilters::security(SecurityGroupRange::new(0, 0)).with_acl_any_of(vec![a1]);
    assert!(visible(&db, drive, &filters).await.is_empty());

    // Narrowing the range keeps the composition intact.
    let filters =
        QueryFilters::security(SecurityGroupRange::single(2)).with_acl_any_of(vec![a1]);
    assert_eq!(
        visible(&db, drive, &filters).await,
        vec![gated_a1, gated_a1_a2, open_high]
    );

    // Without an ACL filter the range alone decides.
    let filters = QueryFilters::security(SecurityGroupRange::single(2));
    assert_eq!(
        visible(&db, drive, &filters).await,
        vec![gated_a1, gated_a1_a2, gated_a3, open_high]
    );
}

#[tokio::test]
async fn tag_filters_match_any_and_all_semantics() {
    let db = DriveDb::new(DriveDbConfig::default());
    let drive = Uuid::new_v4();
    let t1 = Uuid::new_v4();
    let t2 = Uuid::new_v4();

    let untagged = db.next_file_id();
    db.insert(FileRecord::new(drive, untagged), &[], &[])
        .await
        .expect("insert");
    let only_t1 = db.next_file_id();
    db.insert(FileRecord::new(drive, only_t1), &[], &[t1])
        .await
        .expect("insert");
    let both = db.next_file_id();
    db.insert(FileRecord::new(drive, both), &[], &[t1, t2])
        .await
        .expect("insert");

    let any = QueryFilters::security(SecurityGroupRange::new(0, 100)).with_tags_any_of(vec![t1]);
    assert_eq!(visible(&db, drive, &any).await, vec![only_t1, both]);

    let all =
        QueryFilters::security(SecurityGroupRange::new(0, 100)).with_tags_all_of(vec![t1, t2]);
    assert_eq!(visible(&db, drive, &all).await, vec![both]);
}

#[tokio::test]
async fn null_columns_never_match_value_filters() {
    let db = DriveDb::new(DriveDbConfig::default());
    let drive = Uuid::new_v4();
    let group = Uuid::new_v4();

    let anonymous = db.next_file_id();
    db.insert(FileRecord::new(drive, anonymous), &[], &[])
        .await
        .expect("insert");

    let attributed = db.next_file_id();
    let mut record = FileRecord::new(drive, attributed);
    record.sender_id = Some("alice".into());
    record.group_id = Some(group);
    db.insert(record, &[], &[]).await.expect("insert");

    let by_sender =
        QueryFilters::security(SecurityGroupRange::new(0, 100)).with_senders(vec!["alice".into()]);
    assert_eq!(visible(&db, drive, &by_sender).await, vec![attributed]);

    let by_group =
        QueryFilters::security(SecurityGroupRange::new(0, 100)).with_group_ids(vec![group]);
    assert_eq!(visible(&db, drive, &by_group).await, vec![attributed]);
}

#[tokio::test]
async fn scalar_and_date_filters_narrow_the_page() {
    let db = DriveDb::new(DriveDbConfig::default());
    let drive = Uuid::new_v4();

    let early = db.next_file_id();
    let mut record = FileRecord::new(drive, early);
    record.file_type = 3;
    record.user_date = UnixTimeUtc::from_millis(100);
    db.insert(record, &[], &[]).await.expect("insert");

    let late = db.next_file_id();
    let mut record = FileRecord::new(drive, late);
    record.file_type = 3;
    record.file_state = 1;
    record.user_date = UnixTimeUtc::from_millis(900);
    db.insert(record, &[], &[]).await.expect("insert");

    let filters = QueryFilters::security(SecurityGroupRange::new(0, 100))
        .with_file_types(vec![3])
        .with_file_states(vec![1]);
    assert_eq!(visible(&db, drive, &filters).await, vec![late]);

    let filters = QueryFilters::security(SecurityGroupRange::new(0, 100)).with_user_date_span(
        UserDateSpan::new(UnixTimeUtc::from_millis(0), UnixTimeUtc::from_millis(500)),
    );
    assert_eq!(visible(&db, drive, &filters).await, vec![early]);
}

#[tokio::test]
async fn restrictive_filters_still_fill_whole_pages() {
    let db = DriveDb::new(DriveDbConfig::default());
    let drive = Uuid::new_v4();
    let wanted_tag = Uuid::new_v4();

    // Tagged rows interleaved with ten times as many noise rows.
    let mut tagged = Vec::new();
    for i in 0..50 {
        let file = db.next_file_id();
        let tags: &[Uuid] = if i % 10 == 0 { &[wanted_tag] } else { &[] };
        db.insert(FileRecord::new(drive, file), &[], tags)
            .await
            .expect("insert");
        if !tags.is_empty() {
            tagged.push(file);
        }
    }

    let filters =
        QueryFilters::security(SecurityGroupRange::new(0, 100)).with_tags_any_of(vec![wanted_tag]);
    let page = db
        .query_batch(
            drive,
            3,
            QueryBatchCursor::default(),
            BatchSortField::FileId,
            BatchOrder::OldestFirst,
            &filters,
        )
        .await
        .expect("page");
    assert_eq!(
        page.rows.len(),
        3,
        "page fills to the limit across non-matching rows"
    );
    assert!(page.more_rows);
    let ids: Vec<Uuid> = page.rows.iter().map(|e| e.record.file_id).collect();
    assert_eq!(ids, tagged[..3].to_vec());
}

#[tokio::test]
async fn oversized_filter_lists_are_rejected() {
    let db = DriveDb::new(DriveDbConfig::default());
    let drive = Uuid::new_v4();
    let too_many: Vec<Uuid> = (0..DriveDbConfig::default().max_filter_values + 1)
        .map(|_| Uuid::new_v4())
        .collect();

    let filters =
        QueryFilters::security(SecurityGroupRange::new(0, 100)).with_tags_any_of(too_many);
    let err = db
        .query_batch(
            drive,
            10,
            QueryBatchCursor::default(),
            BatchSortField::FileId,
            BatchOrder::NewestFirst,
            &filters,
        )
        .await
        .expect_err("oversized list");
    assert_eq!(err.code(), drivedb::DriveDbErrorCode::InvalidArgument);
}
