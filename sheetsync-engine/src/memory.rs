//! In-process [`SheetGateway`] backed by plain grids.
//!
//! Mirrors the remote service's value semantics closely enough for the engine:
//! writes are anchored at the range's top-left cell, `""` blanks a cell, `null`
//! leaves it untouched, and reads come back with trailing empty cells and rows
//! trimmed. Every call is recorded, and failures can be injected per sheet.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use sheetsync_core::types::{parse_anchor, split_range};
use sheetsync_core::{SheetId, Table};

use crate::error::SyncError;
use crate::gateway::{RangeUpdate, SheetGateway};

#[derive(Debug, Default)]
struct MemoryState {
    tabs: HashMap<(SheetId, String), Vec<Vec<Value>>>,
    reads: Vec<(SheetId, Vec<String>)>,
    writes: Vec<(SheetId, Vec<RangeUpdate>)>,
    read_failures: HashMap<SheetId, VecDeque<u16>>,
    write_failures: HashMap<SheetId, VecDeque<u16>>,
}

#[derive(Debug, Default)]
pub struct MemorySheets {
    state: Mutex<MemoryState>,
}

impl MemorySheets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents of `sheet`/`tab`.
    pub fn put(&self, sheet: &SheetId, tab: &str, table: Table) {
        let mut grid = table.0;
        trim(&mut grid);
        self.state()
            .tabs
            .insert((sheet.clone(), tab.to_string()), grid);
    }

    /// Current contents of `sheet`/`tab` (empty when never written).
    pub fn table(&self, sheet: &SheetId, tab: &str) -> Table {
        Table(
            self.state()
                .tabs
                .get(&(sheet.clone(), tab.to_string()))
                .cloned()
                .unwrap_or_default(),
        )
    }

    /// Make the next `times` reads of `sheet` fail with `status`.
    pub fn fail_next_read(&self, sheet: &SheetId, status: u16, times: usize) {
        queue_failures(&mut self.state().read_failures, sheet, status, times);
    }

    /// Make the next `times` writes to `sheet` fail with `status`.
    pub fn fail_next_write(&self, sheet: &SheetId, status: u16, times: usize) {
        queue_failures(&mut self.state().write_failures, sheet, status, times);
    }

    /// Every read call so far: `(sheet, ranges requested)`.
    pub fn reads(&self) -> Vec<(SheetId, Vec<String>)> {
        self.state().reads.clone()
    }

    /// Every successful write call so far: `(sheet, updates)`.
    pub fn writes(&self) -> Vec<(SheetId, Vec<RangeUpdate>)> {
        self.state().writes.clone()
    }

    /// Forget recorded calls, keeping contents.
    pub fn clear_log(&self) {
        let mut state = self.state();
        state.reads.clear();
        state.writes.clear();
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn queue_failures(queue: &mut HashMap<SheetId, VecDeque<u16>>, sheet: &SheetId, status: u16, times: usize) {
    queue
        .entry(sheet.clone())
        .or_default()
        .extend(std::iter::repeat(status).take(times));
}

fn injected_failure(
    queue: &mut HashMap<SheetId, VecDeque<u16>>,
    sheet: &SheetId,
    operation: &'static str,
) -> Result<(), SyncError> {
    match queue.get_mut(sheet).and_then(VecDeque::pop_front) {
        Some(status) => Err(SyncError::Remote {
            status,
            operation,
            message: format!("injected failure for {sheet}"),
        }),
        None => Ok(()),
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn trim(grid: &mut Vec<Vec<Value>>) {
    for row in grid.iter_mut() {
        while row.last().is_some_and(is_blank) {
            row.pop();
        }
    }
    while grid.last().is_some_and(|row| row.is_empty()) {
        grid.pop();
    }
}

#[async_trait]
impl SheetGateway for MemorySheets {
    async fn read_ranges(&self, sheet: &SheetId, ranges: &[String]) -> Result<Vec<Table>, SyncError> {
        let mut state = self.state();
        state.reads.push((sheet.clone(), ranges.to_vec()));
        injected_failure(&mut state.read_failures, sheet, "values.batchGet")?;

        Ok(ranges
            .iter()
            .map(|range| {
                let (tab, _) = split_range(range);
                Table(
                    state
                        .tabs
                        .get(&(sheet.clone(), tab))
                        .cloned()
                        .unwrap_or_default(),
                )
            })
            .collect())
    }

    async fn write_ranges(&self, sheet: &SheetId, updates: &[RangeUpdate]) -> Result<(), SyncError> {
        let mut state = self.state();
        injected_failure(&mut state.write_failures, sheet, "values.batchUpdate")?;

        for update in updates {
            let (tab, cells) = split_range(&update.range);
            let (row0, col0) = parse_anchor(&cells).unwrap_or((0, 0));
            let grid = state.tabs.entry((sheet.clone(), tab)).or_default();

            for (r, row) in update.values.rows().iter().enumerate() {
                for (c, cell) in row.iter().enumerate() {
                    if cell.is_null() {
                        continue;
                    }
                    let (ri, ci) = (row0 + r, col0 + c);
                    if grid.len() <= ri {
                        grid.resize(ri + 1, Vec::new());
                    }
                    if grid[ri].len() <= ci {
                        grid[ri].resize(ci + 1, Value::String(String::new()));
                    }
                    grid[ri][ci] = cell.clone();
                }
            }
            trim(grid);
        }
        state.writes.push((sheet.clone(), updates.to_vec()));
        Ok(())
    }
}
