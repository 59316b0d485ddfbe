use std::sync::Arc;

use sheetsync_core::{Mapping, MappingId, SheetId, TabName, Table};
use sheetsync_engine::rate_limiter::DEFAULT_WINDOW;
use sheetsync_engine::{
    ChecksumStore, Direction, MemorySheets, PushOutcome, PushUpdate, RateLimiter, SyncEngine,
    SyncError,
};

fn mapping(id: &str, source_tab: &str, dest_sheet: &str, dest_tab: &str) -> Mapping {
    Mapping {
        id: MappingId::from(id),
        source_sheet_id: SheetId::from("SheetA"),
        source_tab: TabName::from(source_tab),
        dest_sheet_id: SheetId::from(dest_sheet),
        dest_tab: TabName::from(dest_tab),
        name: format!("mapping-{id}"),
        description: String::new(),
    }
}

fn engine(sheets: &Arc<MemorySheets>, capacity: u32) -> SyncEngine {
    SyncEngine::new(
        sheets.clone(),
        Arc::new(RateLimiter::new(capacity, DEFAULT_WINDOW)),
        ChecksumStore::default(),
    )
}

fn push(sheet_name: &str, range: &str, values: Table) -> PushUpdate {
    PushUpdate {
        sheet_name: sheet_name.to_string(),
        range: range.to_string(),
        values,
    }
}

#[tokio::test]
async fn push_writes_target_range_and_invalidates_destination() {
    let sheets = Arc::new(MemorySheets::new());
    let engine = engine(&sheets, 80);
    let m = mapping("1", "Tab1", "SheetB", "Mirror");
    sheets.put(&SheetId::from("SheetA"), "Tab1", Table::from_strings([vec!["a", "b"]]));
    engine.run_cycle(&[m.clone()]).await;
    assert!(engine.checksum(&m.dest_key()).await.is_some());
    sheets.clear_log();

    let outcome = engine
        .apply_push(&[m.clone()], push("Tab1", "B1", Table::from_strings([vec!["B"]])))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        PushOutcome::Applied {
            mapping_id: MappingId::from("1"),
            dest_sheet_id: SheetId::from("SheetB"),
            dest_range: "Mirror!B1".to_string(),
        }
    );
    let writes = sheets.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].0, SheetId::from("SheetB"));
    assert_eq!(writes[0].1.len(), 1);
    assert_eq!(writes[0].1[0].range, "Mirror!B1");
    assert_eq!(
        sheets.table(&SheetId::from("SheetB"), "Mirror"),
        Table::from_strings([vec!["a", "B"]])
    );
    assert_eq!(engine.checksum(&m.dest_key()).await, None);
}

#[tokio::test]
async fn next_cycle_rechecks_an_invalidated_destination() {
    let sheets = Arc::new(MemorySheets::new());
    let engine = engine(&sheets, 80);
    let m = mapping("1", "Tab1", "SheetB", "Tab1");
    let sheet_a = SheetId::from("SheetA");
    sheets.put(&sheet_a, "Tab1", Table::from_strings([vec!["a", "b"]]));
    engine.run_cycle(&[m.clone()]).await;

    // The webhook only carried part of the edit.
    let full = Table::from_strings([vec!["a", "B"], vec!["c"]]);
    sheets.put(&sheet_a, "Tab1", full.clone());
    engine
        .apply_push(&[m.clone()], push("Tab1", "B1", Table::from_strings([vec!["B"]])))
        .await
        .unwrap();

    let report = engine.run_cycle(&[m]).await;
    assert_eq!(report.decisions[0].direction, Direction::Forward);
    assert_eq!(sheets.table(&SheetId::from("SheetB"), "Tab1"), full);
}

#[tokio::test]
async fn pushed_value_diverging_from_unchanged_source_is_reconciled() {
    let sheets = Arc::new(MemorySheets::new());
    let engine = engine(&sheets, 80);
    let m = mapping("1", "Tab1", "SheetB", "Tab1");
    let source = Table::from_strings([vec!["a", "b"]]);
    sheets.put(&SheetId::from("SheetA"), "Tab1", source.clone());
    engine.run_cycle(&[m.clone()]).await;

    engine
        .apply_push(&[m.clone()], push("Tab1", "B1", Table::from_strings([vec!["X"]])))
        .await
        .unwrap();
    assert_eq!(
        sheets.table(&SheetId::from("SheetB"), "Tab1"),
        Table::from_strings([vec!["a", "X"]])
    );

    let report = engine.run_cycle(&[m.clone()]).await;
    assert_eq!(report.decisions.len(), 1);
    assert_eq!(report.decisions[0].direction, Direction::Initial);
    assert!(report.decisions[0].applied);
    assert_eq!(sheets.table(&SheetId::from("SheetB"), "Tab1"), source);

    let settled = engine.run_cycle(&[m]).await;
    assert!(settled.decisions.is_empty());
}

#[tokio::test]
async fn push_without_mapping_is_ignored() {
    let sheets = Arc::new(MemorySheets::new());
    let engine = engine(&sheets, 80);
    let outcome = engine
        .apply_push(
            &[mapping("1", "Tab1", "SheetB", "Tab1")],
            push("Other", "A1", Table::from_strings([vec!["x"]])),
        )
        .await
        .unwrap();

    assert_eq!(outcome, PushOutcome::NoMapping);
    assert!(sheets.writes().is_empty());
    assert_eq!(engine.limiter().available(), 80);
}

#[tokio::test]
async fn first_matching_mapping_wins() {
    let sheets = Arc::new(MemorySheets::new());
    let engine = engine(&sheets, 80);
    let mappings = [
        mapping("1", "Tab1", "SheetB", "First"),
        mapping("2", "Tab1", "SheetC", "Second"),
    ];

    engine
        .apply_push(&mappings, push("Tab1", "A1", Table::from_strings([vec!["x"]])))
        .await
        .unwrap();

    let writes = sheets.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].0, SheetId::from("SheetB"));
}

#[tokio::test]
async fn push_is_dropped_when_rate_limited() {
    let sheets = Arc::new(MemorySheets::new());
    let engine = engine(&sheets, 0);
    let outcome = engine
        .apply_push(
            &[mapping("1", "Tab1", "SheetB", "Tab1")],
            push("Tab1", "A1", Table::from_strings([vec!["x"]])),
        )
        .await
        .unwrap();

    assert_eq!(outcome, PushOutcome::RateLimited);
    assert!(sheets.writes().is_empty());
}

#[tokio::test]
async fn push_remote_failure_propagates() {
    let sheets = Arc::new(MemorySheets::new());
    let engine = engine(&sheets, 80);
    sheets.fail_next_write(&SheetId::from("SheetB"), 403, 1);

    let err = engine
        .apply_push(
            &[mapping("1", "Tab1", "SheetB", "Tab1")],
            push("Tab1", "A1", Table::from_strings([vec!["x"]])),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Remote { status: 403, .. }));
}
