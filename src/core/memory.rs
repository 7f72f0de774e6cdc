// In-memory column-family store implementing the connection and cursor boundary.
// Rows iterate in key order; cells within a row are ordered by (family, qualifier).
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::core::cell::{Cell, Row};
use crate::core::error::{Error, ErrorKind};
use crate::core::scan::{Connection, RowSource, ScanRequest};

type Table = BTreeMap<Vec<u8>, Vec<Cell>>;

#[derive(Debug, Default)]
pub struct StoreStats {
    opens: AtomicUsize,
    fetches: AtomicUsize,
    closes: AtomicUsize,
}

impl StoreStats {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::Relaxed)
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: BTreeMap<Vec<u8>, Table>,
    stats: StoreStats,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_table(&mut self, name: impl Into<Vec<u8>>) {
        self.tables.entry(name.into()).or_default();
    }

    /// Stores `cell`, replacing any cell at the same row, family and qualifier.
    pub fn put(&mut self, table: &[u8], cell: Cell) -> Result<(), Error> {
        let rows = self
            .tables
            .get_mut(table)
            .ok_or_else(|| Error::new(ErrorKind::Usage).with_message("no such table"))?;
        let cells = rows.entry(cell.row().to_vec()).or_default();
        let found = cells.binary_search_by(|probe| {
            (probe.family(), probe.qualifier()).cmp(&(cell.family(), cell.qualifier()))
        });
        match found {
            Ok(index) => cells[index] = cell,
            Err(index) => cells.insert(index, cell),
        }
        Ok(())
    }

    pub fn stats(&self) -> &StoreStats {
        &self.stats
    }
}

impl Connection for MemoryStore {
    type Source<'c> = MemorySource<'c>;

    fn open_scan<'c>(
        &'c self,
        table: &[u8],
        request: &ScanRequest,
    ) -> Result<MemorySource<'c>, Error> {
        let rows = self.tables.get(table).ok_or_else(|| {
            Error::new(ErrorKind::Upstream).with_message(format!(
                "table {:?} not found",
                bstr::BStr::new(table)
            ))
        })?;
        self.stats.opens.fetch_add(1, Ordering::Relaxed);
        Ok(MemorySource {
            rows: Some(rows.values()),
            request: request.clone(),
            stats: &self.stats,
        })
    }
}

pub struct MemorySource<'a> {
    rows: Option<btree_map::Values<'a, Vec<u8>, Vec<Cell>>>,
    request: ScanRequest,
    stats: &'a StoreStats,
}

impl RowSource for MemorySource<'_> {
    fn next_row(&mut self) -> Result<Option<Row>, Error> {
        let rows = self
            .rows
            .as_mut()
            .ok_or_else(|| Error::new(ErrorKind::Closed).with_message("cursor already closed"))?;
        self.stats.fetches.fetch_add(1, Ordering::Relaxed);
        for cells in rows.by_ref() {
            let projected: Vec<Cell> = cells
                .iter()
                .filter(|cell| self.request.wants(cell.family(), cell.qualifier()))
                .cloned()
                .collect();
            if !projected.is_empty() {
                return Ok(Some(Row::new(projected)));
            }
        }
        Ok(None)
    }

    fn close(&mut self) -> Result<(), Error> {
        if self.rows.take().is_some() {
            self.stats.closes.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }
}
