//! Purpose: Pull rows from a store cursor one at a time and encode them into row frames.
//! Exports: `RowSource`, `Connection`, `ScanRequest`, `ScanOptions`, `Scanner`, `open_scanner`.
//! Role: The pull-based production surface handed to the tuple consumer.
//! Invariants: At most one fetched-but-unencoded row is held; it is never re-fetched or skipped.
//! Invariants: Once exhausted, closed, or aborted the row source is never called again.
//! Invariants: `close` releases the source exactly once and never fails.
#![allow(clippy::should_implement_trait)]

use tracing::{debug, trace, warn};

use crate::core::cell::Row;
use crate::core::column::{ColumnDesc, ColumnSet};
use crate::core::error::{Error, ErrorKind};
use crate::core::frame::FrameBuf;
use crate::core::row::encode_row;

pub const DEFAULT_BUFFER_CAPACITY: usize = 64 * 1024;

/// A store cursor yielding rows in key order.
///
/// Each yielded row must carry at least one cell. `close` releases the cursor
/// together with any table handle it holds.
pub trait RowSource {
    fn next_row(&mut self) -> Result<Option<Row>, Error>;
    fn close(&mut self) -> Result<(), Error>;
}

impl<S: RowSource + ?Sized> RowSource for Box<S> {
    fn next_row(&mut self) -> Result<Option<Row>, Error> {
        (**self).next_row()
    }

    fn close(&mut self) -> Result<(), Error> {
        (**self).close()
    }
}

/// An established store connection. Owned by the caller and lent to each scan.
pub trait Connection {
    type Source<'c>: RowSource
    where
        Self: 'c;

    fn open_scan<'c>(
        &'c self,
        table: &[u8],
        request: &ScanRequest,
    ) -> Result<Self::Source<'c>, Error>;
}

/// Families and qualifiers the store must return for a column set.
///
/// An empty request means every cell of the row.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ScanRequest {
    families: Vec<Vec<u8>>,
    qualifiers: Vec<(Vec<u8>, Vec<u8>)>,
}

impl ScanRequest {
    pub fn from_columns(columns: &ColumnSet) -> Self {
        let mut request = ScanRequest::default();
        for column in columns {
            if let ColumnDesc::Family { name } = column {
                if !request.families.contains(name) {
                    request.families.push(name.clone());
                }
            }
        }
        for column in columns {
            if let ColumnDesc::Leaf { family, qualifier } = column {
                let pair = (family.clone(), qualifier.clone());
                if !request.families.contains(family) && !request.qualifiers.contains(&pair) {
                    request.qualifiers.push(pair);
                }
            }
        }
        request
    }

    pub fn families(&self) -> &[Vec<u8>] {
        &self.families
    }

    pub fn qualifiers(&self) -> &[(Vec<u8>, Vec<u8>)] {
        &self.qualifiers
    }

    pub fn is_unrestricted(&self) -> bool {
        self.families.is_empty() && self.qualifiers.is_empty()
    }

    pub fn wants(&self, family: &[u8], qualifier: &[u8]) -> bool {
        if self.is_unrestricted() {
            return true;
        }
        self.families.iter().any(|name| name.as_slice() == family)
            || self
                .qualifiers
                .iter()
                .any(|(f, q)| f.as_slice() == family && q.as_slice() == qualifier)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ScanOptions {
    pub buffer_capacity: usize,
}

impl ScanOptions {
    pub fn new() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }

    pub fn with_buffer_capacity(mut self, buffer_capacity: usize) -> Self {
        self.buffer_capacity = buffer_capacity;
        self
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    Open,
    Exhausted,
    Closed,
    Aborted(ErrorKind),
}

pub struct Scanner<S: RowSource> {
    source: Option<S>,
    columns: ColumnSet,
    options: ScanOptions,
    pending: Option<Row>,
    state: State,
    rows: u64,
}

impl<S: RowSource> Scanner<S> {
    pub fn new(source: S, columns: ColumnSet, options: ScanOptions) -> Self {
        debug!(columns = columns.len(), "scan opened");
        Self {
            source: Some(source),
            columns,
            options,
            pending: None,
            state: State::Open,
            rows: 0,
        }
    }

    /// A scanner known up front to match nothing; it never touches a store.
    pub fn empty(columns: ColumnSet, options: ScanOptions) -> Self {
        debug!(columns = columns.len(), "empty scan");
        Self {
            source: None,
            columns,
            options,
            pending: None,
            state: State::Exhausted,
            rows: 0,
        }
    }

    pub fn columns(&self) -> &ColumnSet {
        &self.columns
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    pub fn rows_encoded(&self) -> u64 {
        self.rows
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.source.is_none()
    }

    /// Appends the next row frame to `buf`.
    ///
    /// Returns `Ok(false)` without touching `buf` once no rows remain. On a
    /// capacity error the row stays pending and the next call retries it.
    pub fn next_into(&mut self, buf: &mut FrameBuf) -> Result<bool, Error> {
        match self.state {
            State::Open => {}
            State::Exhausted | State::Closed => return Ok(false),
            State::Aborted(kind) => {
                return Err(Error::new(ErrorKind::Closed)
                    .with_message(format!("scan aborted after {kind:?} error")));
            }
        }
        let Some(source) = self.source.as_mut() else {
            self.state = State::Exhausted;
            return Ok(false);
        };

        let row = match self.pending.take() {
            Some(row) => row,
            None => match source.next_row() {
                Ok(Some(row)) => row,
                Ok(None) => {
                    debug!(rows = self.rows, "scan exhausted");
                    self.state = State::Exhausted;
                    return Ok(false);
                }
                Err(err) => return Err(self.abort(err)),
            },
        };

        match encode_row(buf, row.cells(), self.columns.as_slice()) {
            Ok(len) => {
                self.rows += 1;
                trace!(len, rows = self.rows, "row encoded");
                Ok(true)
            }
            Err(err) if err.is_retryable() => {
                let err = match row.key() {
                    Some(key) => err.with_row_key(key),
                    None => err,
                };
                self.pending = Some(row);
                Err(err)
            }
            Err(err) => {
                let err = match row.key() {
                    Some(key) => err.with_row_key(key),
                    None => err,
                };
                Err(self.abort(err))
            }
        }
    }

    /// Encodes the next row into a fresh buffer of `options.buffer_capacity` bytes.
    pub fn next(&mut self) -> Result<Option<Vec<u8>>, Error> {
        let mut buf = FrameBuf::with_capacity(self.options.buffer_capacity);
        if self.next_into(&mut buf)? {
            Ok(Some(buf.into_vec()))
        } else {
            Ok(None)
        }
    }

    /// Releases the row source. Safe to call any number of times.
    pub fn close(&mut self) {
        self.pending = None;
        if let Some(mut source) = self.source.take() {
            if let Err(err) = source.close() {
                warn!(error = %err, "ignoring row source release failure");
            }
            debug!(rows = self.rows, "scan closed");
        }
        if !matches!(self.state, State::Aborted(_)) {
            self.state = State::Closed;
        }
    }

    fn abort(&mut self, err: Error) -> Error {
        warn!(error = %err, rows = self.rows, "scan aborted");
        self.close();
        self.state = State::Aborted(err.kind());
        err
    }
}

impl<S: RowSource> Drop for Scanner<S> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens a scan over `table` on a borrowed connection.
pub fn open_scanner<'c, C: Connection>(
    conn: &'c C,
    table: &[u8],
    columns: ColumnSet,
    options: ScanOptions,
) -> Result<Scanner<C::Source<'c>>, Error> {
    let request = ScanRequest::from_columns(&columns);
    let source = conn.open_scan(table, &request)?;
    Ok(Scanner::new(source, columns, options))
}
