//! End-to-end statement lifecycle tests against the in-memory engine.

mod common;

use common::{t_descriptor, FakeEngine, ATTACHMENT};
use dsql_rs::descriptor::codec;
use dsql_rs::registry::{RawHandle, RuntimeConfig, StatementRegistry};
use dsql_rs::statement::info::{self, InfoItem};
use dsql_rs::status::StatusCode;
use dsql_rs::{
    DescriptorError, DsqlError, ExecuteOutcome, FetchDirection, FetchOutcome, FreeOption,
    StatementError, StatementHandle, StatementKind, StatementState, StatusVector, TransactionId,
    Value,
};
use proptest::prelude::*;
use std::sync::Arc;

const TXN: Option<TransactionId> = Some(TransactionId(1));

fn registry(engine: &Arc<FakeEngine>) -> StatementRegistry {
    StatementRegistry::with_engine(Arc::clone(engine) as Arc<dyn dsql_rs::Engine>)
}

fn open_select(registry: &StatementRegistry, sql: &str) -> StatementHandle {
    let mut handle = registry.allocate(ATTACHMENT).unwrap();
    registry
        .prepare(&mut handle, TXN, None, sql, &[], &mut [])
        .unwrap();
    assert_eq!(
        registry.execute(&mut handle, TXN, &[]).unwrap(),
        ExecuteOutcome::CursorOpened
    );
    handle
}

#[test]
fn test_select_fetch_close_drop() {
    let engine = FakeEngine::shared();
    let registry = registry(&engine);

    let mut handle = registry.allocate(ATTACHMENT).unwrap();
    assert_eq!(registry.state(&handle).unwrap(), StatementState::Allocated);

    let prepared = registry
        .prepare(&mut handle, TXN, None, "SELECT * FROM T", &[], &mut [])
        .unwrap();
    assert_eq!(prepared.kind, StatementKind::Select);
    assert_eq!(prepared.output_count, 2);
    assert_eq!(registry.state(&handle).unwrap(), StatementState::Prepared);

    registry.execute(&mut handle, TXN, &[]).unwrap();
    assert_eq!(registry.state(&handle).unwrap(), StatementState::Cursored);

    let descriptor = t_descriptor();
    let mut buffer = vec![0u8; 128];
    let mut rows = Vec::new();
    for _ in 0..3 {
        match registry
            .fetch(&mut handle, FetchDirection::Next, &mut buffer)
            .unwrap()
        {
            FetchOutcome::Row { length } => {
                rows.push(codec::decode(&buffer[..length], &descriptor).unwrap())
            }
            FetchOutcome::EndOfCursor => panic!("cursor ended early"),
        }
    }
    assert_eq!(
        rows,
        vec![
            vec![Value::Integer(1), Value::Text("alpha".into())],
            vec![Value::Integer(2), Value::Null],
            vec![Value::Integer(3), Value::Text("gamma".into())],
        ]
    );

    let mut status = StatusVector::new();
    for _ in 0..3 {
        let fetched = registry.fetch(&mut handle, FetchDirection::Next, &mut buffer);
        status.record(&fetched);
        assert!(status.is_end_of_cursor());
        assert!(!status.is_error());
    }

    registry.free(&mut handle, FreeOption::Close).unwrap();
    assert_eq!(registry.state(&handle).unwrap(), StatementState::Prepared);

    registry.free(&mut handle, FreeOption::Drop).unwrap();
    assert!(registry.state(&handle).is_err());
    assert!(registry.is_empty());
    assert_eq!(engine.live_plans(), 0);
}

#[test]
fn test_allocate_then_drop_reuses_slot() {
    let engine = FakeEngine::shared();
    let registry = registry(&engine);

    let mut handle = registry.allocate(ATTACHMENT).unwrap();
    let first = handle.id();
    registry.free(&mut handle, FreeOption::Drop).unwrap();

    let second = registry.allocate(ATTACHMENT).unwrap();
    assert_eq!(second.id().index(), first.index());
    assert!(second.id().generation() > first.generation());
}

#[test]
fn test_stale_handle_is_rejected_everywhere() {
    let engine = FakeEngine::shared();
    let registry = registry(&engine);

    let mut stale = open_select(&registry, "SELECT * FROM T");
    let id = stale.id();
    registry.free(&mut stale, FreeOption::Drop).unwrap();

    // a new statement now lives in the same slot
    let reused = registry.allocate(ATTACHMENT).unwrap();
    assert_eq!(reused.id().index(), id.index());

    let expected = DsqlError::Statement(StatementError::InvalidHandle {
        index: id.index(),
        generation: id.generation(),
    });
    assert_eq!(
        registry
            .fetch(&mut stale, FetchDirection::Next, &mut [0u8; 64])
            .unwrap_err(),
        expected
    );
    assert_eq!(
        registry.execute(&mut stale, TXN, &[]).unwrap_err(),
        expected
    );
    assert_eq!(
        registry
            .prepare(&mut stale, TXN, None, "SELECT * FROM T", &[], &mut [])
            .unwrap_err(),
        expected
    );
    assert_eq!(
        registry.sql_info(&stale, &[4], &mut [0u8; 16]).unwrap_err(),
        expected
    );
    assert_eq!(
        registry.free(&mut stale, FreeOption::Drop).unwrap_err(),
        expected
    );
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_prepare_overflow_reports_required_size() {
    let engine = FakeEngine::shared();
    let registry = registry(&engine);
    let mut handle = registry.allocate(ATTACHMENT).unwrap();
    let items = [InfoItem::StatementType as u8, InfoItem::OutputDescribe as u8];

    let mut small = vec![0u8; 16];
    let err = registry
        .prepare(&mut handle, TXN, None, "SELECT * FROM T", &items, &mut small)
        .unwrap_err();
    let required = err.required_size().unwrap();
    assert!(required > 16);
    assert!(matches!(
        err,
        DsqlError::Descriptor(DescriptorError::DescriptorOverflow { available: 16, .. })
    ));
    assert_eq!(registry.state(&handle).unwrap(), StatementState::Allocated);
    assert_eq!(engine.live_plans(), 0);

    let mut status = StatusVector::new();
    status.record(&Err::<(), _>(err));
    assert_eq!(status.primary_code(), Some(StatusCode::DescriptorOverflow));

    let mut buffer = vec![0u8; required];
    let prepared = registry
        .prepare(&mut handle, TXN, None, "SELECT * FROM T", &items, &mut buffer)
        .unwrap();
    assert_eq!(prepared.info_length, required);

    let clusters = info::parse_reply(&buffer).unwrap();
    assert_eq!(clusters[0], (InfoItem::StatementType, &1u32.to_le_bytes()[..]));
    let described = dsql_rs::Descriptor::from_describe(clusters[1].1).unwrap();
    assert_eq!(described, t_descriptor());
}

#[test]
fn test_duplicate_cursor_name_in_transaction() {
    let engine = FakeEngine::shared();
    let registry = registry(&engine);

    let mut a = open_select(&registry, "SELECT * FROM T");
    let mut b = open_select(&registry, "SELECT * FROM U");

    registry.set_cursor(&mut a, "C1").unwrap();
    let err = registry.set_cursor(&mut b, "C1").unwrap_err();
    assert_eq!(
        err,
        DsqlError::Statement(StatementError::DuplicateCursorName("C1".to_string()))
    );

    let mut status = StatusVector::new();
    status.record(&Err::<(), _>(err));
    assert_eq!(status.primary_code(), Some(StatusCode::DuplicateCursorName));

    // closing A frees the name for B
    registry.free(&mut a, FreeOption::Close).unwrap();
    registry.set_cursor(&mut b, "C1").unwrap();
    assert_eq!(
        registry.resolve_cursor(TransactionId(1), "C1").unwrap().owner,
        b.id()
    );
}

#[test]
fn test_same_cursor_name_in_different_transactions() {
    let engine = FakeEngine::shared();
    let registry = registry(&engine);

    let mut a = open_select(&registry, "SELECT * FROM T");
    let mut b = registry.allocate(ATTACHMENT).unwrap();
    let other = Some(TransactionId(2));
    registry
        .prepare(&mut b, other, None, "SELECT * FROM T", &[], &mut [])
        .unwrap();
    registry.execute(&mut b, other, &[]).unwrap();

    registry.set_cursor(&mut a, "C1").unwrap();
    registry.set_cursor(&mut b, "C1").unwrap();
}

#[test]
fn test_positioned_target_follows_fetch() {
    let engine = FakeEngine::shared();
    let registry = registry(&engine);

    let mut handle = open_select(&registry, "SELECT * FROM T FOR UPDATE");
    registry.set_cursor(&mut handle, "EMP_CUR").unwrap();
    registry.fetch_values(&mut handle, FetchDirection::Next).unwrap();
    registry.fetch_values(&mut handle, FetchDirection::Next).unwrap();

    let target = registry
        .resolve_cursor(TransactionId(1), "EMP_CUR  ")
        .unwrap();
    assert_eq!(target.owner, handle.id());
    assert_eq!(target.position, Some(2));
    assert_eq!(target.rows_fetched, 2);
}

#[test]
fn test_forward_only_when_scrolling_disabled() {
    let engine = FakeEngine::shared();
    let config = RuntimeConfig::builder()
        .scrollable_cursors(false)
        .build()
        .unwrap();
    let registry = StatementRegistry::new(engine as Arc<dyn dsql_rs::Engine>, config);

    let mut handle = registry.allocate(ATTACHMENT).unwrap();
    let prepared = registry
        .prepare(&mut handle, TXN, None, "SELECT * FROM T", &[], &mut [])
        .unwrap();
    assert!(!prepared.scrollable);
    registry.execute(&mut handle, TXN, &[]).unwrap();

    let err = registry
        .fetch(&mut handle, FetchDirection::Last, &mut [0u8; 64])
        .unwrap_err();
    assert_eq!(
        err,
        DsqlError::Statement(StatementError::UnsupportedDirection(FetchDirection::Last))
    );
    // cursor is still usable going forward
    assert!(registry
        .fetch_values(&mut handle, FetchDirection::Next)
        .unwrap()
        .is_some());
}

#[test]
fn test_scrollable_cursor_moves_both_ways() {
    let engine = FakeEngine::shared();
    let registry = registry(&engine);
    let mut handle = open_select(&registry, "SELECT * FROM U");

    let last = registry
        .fetch_values(&mut handle, FetchDirection::Last)
        .unwrap();
    assert_eq!(last, Some(vec![Value::BigInt(5000)]));
    let prior = registry
        .fetch_values(&mut handle, FetchDirection::Prior)
        .unwrap();
    assert_eq!(prior, Some(vec![Value::BigInt(4000)]));
    let absolute = registry
        .fetch_values(&mut handle, FetchDirection::Absolute(1))
        .unwrap();
    assert_eq!(absolute, Some(vec![Value::BigInt(1000)]));
    assert_eq!(
        registry
            .fetch_values(&mut handle, FetchDirection::Prior)
            .unwrap(),
        None
    );
}

#[test]
fn test_fetch_overflow_then_retry_loses_no_row() {
    let engine = FakeEngine::shared();
    let registry = registry(&engine);
    let mut handle = open_select(&registry, "SELECT * FROM T");

    let err = registry
        .fetch(&mut handle, FetchDirection::Next, &mut [0u8; 4])
        .unwrap_err();
    let required = err.required_size().unwrap();

    let mut buffer = vec![0u8; required];
    registry
        .fetch(&mut handle, FetchDirection::Next, &mut buffer)
        .unwrap();
    assert_eq!(
        codec::decode(&buffer, &t_descriptor()).unwrap(),
        vec![Value::Integer(1), Value::Text("alpha".into())]
    );
}

#[test]
fn test_execute_with_open_cursor_fails() {
    let engine = FakeEngine::shared();
    let registry = registry(&engine);
    let mut handle = open_select(&registry, "SELECT * FROM T");
    assert_eq!(
        registry.execute(&mut handle, TXN, &[]).unwrap_err(),
        DsqlError::Statement(StatementError::CursorAlreadyOpen)
    );
}

#[test]
fn test_parse_and_plan_errors_leave_state() {
    let engine = FakeEngine::shared();
    let registry = registry(&engine);
    let mut handle = registry.allocate(ATTACHMENT).unwrap();
    registry
        .prepare(&mut handle, TXN, None, "SELECT * FROM T", &[], &mut [])
        .unwrap();

    let err = registry
        .prepare(&mut handle, TXN, None, "SELEKT * FROM T", &[], &mut [])
        .unwrap_err();
    assert_eq!(err.to_status_code(), StatusCode::ParseError);

    let err = registry
        .prepare(&mut handle, TXN, None, "SELECT * FROM MISSING", &[], &mut [])
        .unwrap_err();
    assert_eq!(err.to_status_code(), StatusCode::PlanError);

    assert_eq!(registry.state(&handle).unwrap(), StatementState::Prepared);
    let sql = registry
        .with_statement(&handle, |s| s.sql().map(str::to_string))
        .unwrap();
    assert_eq!(sql.as_deref(), Some("SELECT * FROM T"));
    assert_eq!(engine.live_plans(), 1);
}

#[test]
fn test_reprepare_warns_about_closed_cursor() {
    let engine = FakeEngine::shared();
    let registry = registry(&engine);
    let mut handle = open_select(&registry, "SELECT * FROM T");

    let result = registry.prepare(&mut handle, TXN, None, "SELECT * FROM U", &[], &mut []);
    let mut status = StatusVector::new();
    status.record(&result);
    assert_eq!(status.severity(), dsql_rs::Severity::Warning);
    assert_eq!(status.primary_code(), Some(StatusCode::CursorClosedByPrepare));
    assert_eq!(registry.state(&handle).unwrap(), StatementState::Prepared);
    assert_eq!(engine.live_plans(), 1);
}

#[test]
fn test_insert_then_select() {
    let engine = FakeEngine::shared();
    let registry = registry(&engine);
    let mut handle = registry.allocate(ATTACHMENT).unwrap();

    let count = registry
        .insert(
            &mut handle,
            TXN,
            None,
            "INSERT INTO T VALUES (?, ?)",
            &[Value::Integer(4), Value::from("delta")],
        )
        .unwrap();
    assert_eq!(count, 1);
    assert_eq!(engine.row_count("T"), Some(4));

    let err = registry
        .insert(&mut handle, TXN, None, "SELECT * FROM T", &[])
        .unwrap_err();
    assert_eq!(err, DsqlError::Statement(StatementError::UnexpectedResultSet));

    let err = registry
        .insert(
            &mut handle,
            TXN,
            None,
            "INSERT INTO T VALUES (?, ?)",
            &[Value::from("four"), Value::Null],
        )
        .unwrap_err();
    assert_eq!(err.to_status_code(), StatusCode::TypeMismatch);
    assert_eq!(engine.row_count("T"), Some(4));
}

#[test]
fn test_sql_info_is_read_only() {
    let engine = FakeEngine::shared();
    let registry = registry(&engine);
    let mut handle = open_select(&registry, "SELECT * FROM T");
    registry.set_cursor(&mut handle, "C9").unwrap();
    registry.fetch_values(&mut handle, FetchDirection::Next).unwrap();

    let items = [
        InfoItem::StatementType as u8,
        InfoItem::InputCount as u8,
        InfoItem::OutputCount as u8,
        InfoItem::Records as u8,
        InfoItem::Plan as u8,
        InfoItem::Scrollable as u8,
        InfoItem::CursorName as u8,
    ];
    let mut buffer = vec![0u8; 256];
    let length = registry.sql_info(&handle, &items, &mut buffer).unwrap();
    let clusters = info::parse_reply(&buffer[..length]).unwrap();

    assert_eq!(clusters[1].1, &0u32.to_le_bytes()[..]);
    assert_eq!(clusters[2].1, &2u32.to_le_bytes()[..]);
    assert_eq!(&clusters[3].1[8..], &1u64.to_le_bytes()[..]);
    assert_eq!(clusters[4].1, b"PLAN (T NATURAL)");
    assert_eq!(clusters[5].1, &[1u8][..]);
    assert_eq!(clusters[6].1, b"C9");
    assert_eq!(registry.state(&handle).unwrap(), StatementState::Cursored);

    let err = registry
        .sql_info(&handle, &[InfoItem::Plan as u8], &mut [0u8; 3])
        .unwrap_err();
    assert!(err.required_size().is_some());
    let err = registry.sql_info(&handle, &[77], &mut buffer).unwrap_err();
    assert_eq!(err, DsqlError::Statement(StatementError::UnknownInfoItem(77)));
}

#[test]
fn test_commit_closes_transaction_cursors() {
    let engine = FakeEngine::shared();
    let registry = registry(&engine);
    let mut reader = open_select(&registry, "SELECT * FROM T");

    let mut commit = registry.allocate(ATTACHMENT).unwrap();
    registry
        .prepare(&mut commit, TXN, None, "COMMIT", &[], &mut [])
        .unwrap();
    assert_eq!(
        registry.execute(&mut commit, TXN, &[]).unwrap(),
        ExecuteOutcome::TransactionEnded(TransactionId(1))
    );

    assert_eq!(registry.state(&reader).unwrap(), StatementState::Prepared);
    assert_eq!(
        registry
            .fetch(&mut reader, FetchDirection::Next, &mut [0u8; 64])
            .unwrap_err(),
        DsqlError::Statement(StatementError::CursorNotOpen)
    );
}

#[test]
fn test_handle_survives_raw_round_trip() {
    let engine = FakeEngine::shared();
    let registry = registry(&engine);
    let handle = registry.allocate(ATTACHMENT).unwrap();

    let bits = handle.into_raw().to_bits();
    let mut handle = StatementHandle::from_raw(RawHandle::from_bits(bits).unwrap());
    registry
        .prepare(&mut handle, TXN, None, "SELECT * FROM U", &[], &mut [])
        .unwrap();
    assert_eq!(registry.state(&handle).unwrap(), StatementState::Prepared);
}

#[test]
fn test_schemas_describe_prepared_statement() {
    let engine = FakeEngine::shared();
    let registry = registry(&engine);
    let mut handle = registry.allocate(ATTACHMENT).unwrap();

    registry
        .prepare(&mut handle, TXN, None, "SELECT * FROM T", &[], &mut [])
        .unwrap();
    let schema = registry.output_schema(&handle).unwrap().unwrap();
    assert_eq!(schema.field(0).name(), "ID");
    assert_eq!(schema.field(1).name(), "NAME");
    assert!(schema.field(1).is_nullable());
    assert_eq!(
        dsql_rs::types::schema_to_descriptor(&schema).unwrap(),
        t_descriptor()
    );

    registry
        .prepare(&mut handle, TXN, None, "INSERT INTO T VALUES (?, ?)", &[], &mut [])
        .unwrap();
    assert!(registry.output_schema(&handle).unwrap().is_none());
    assert_eq!(registry.input_schema(&handle).unwrap().fields().len(), 2);
}

#[test]
fn test_blank_cursor_name_is_rejected() {
    let engine = FakeEngine::shared();
    let registry = registry(&engine);
    let mut handle = open_select(&registry, "SELECT * FROM T");

    let result = registry.set_cursor(&mut handle, "  ");
    let mut status = StatusVector::new();
    status.record(&result);
    assert_eq!(status.primary_code(), Some(StatusCode::InvalidCursorName));
    assert!(registry.resolve_cursor(TransactionId(1), "").is_none());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_n_rows_then_end_of_cursor(rows in 0usize..20, extra in 1usize..4) {
        let engine = Arc::new(FakeEngine::new().with_numbers("NUMS", rows));
        let registry = registry(&engine);
        let mut handle = open_select(&registry, "SELECT * FROM NUMS");
        let mut buffer = [0u8; 16];

        for _ in 0..rows {
            let outcome = registry.fetch(&mut handle, FetchDirection::Next, &mut buffer).unwrap();
            prop_assert!(matches!(outcome, FetchOutcome::Row { .. }), "expected a row");
        }
        for _ in 0..extra {
            let outcome = registry.fetch(&mut handle, FetchDirection::Next, &mut buffer).unwrap();
            prop_assert_eq!(outcome, FetchOutcome::EndOfCursor);
        }
    }
}
