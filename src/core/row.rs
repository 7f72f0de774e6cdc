//! Purpose: Encode one fetched row into a row frame, one column frame per descriptor.
//! Exports: `encode_row`.
//! Role: Pure composition of column descriptors over a row's cells; no I/O.
//! Invariants: Output is a function of the cells, the descriptors, and the buffer's end position.
//! Invariants: A failed encode leaves the buffer exactly as it was before the call.
use crate::core::cell::{family_cells, Cell};
use crate::core::column::ColumnDesc;
use crate::core::error::{Error, ErrorKind};
use crate::core::frame::{self, FrameBuf, COLUMN_ALIGN, ROW_TERMINATOR};

/// Appends one row frame to `buf` and returns its length in bytes.
///
/// Layout: raw row length, then per column a raw column length, the value
/// payload and zero padding to four bytes, then a zero terminator.
pub fn encode_row(
    buf: &mut FrameBuf,
    cells: &[Cell],
    columns: &[ColumnDesc],
) -> Result<usize, Error> {
    buf.transaction(|buf| {
        let row = buf.begin()?;
        for (index, column) in columns.iter().enumerate() {
            encode_column(buf, cells, column).map_err(|err| err.with_column(index))?;
        }
        buf.put_i32(ROW_TERMINATOR)?;
        buf.finish_raw(row)
    })
}

fn encode_column(buf: &mut FrameBuf, cells: &[Cell], column: &ColumnDesc) -> Result<(), Error> {
    let slot = buf.begin()?;
    match column {
        ColumnDesc::RowKey => {
            let cell = cells.first().ok_or_else(|| {
                Error::new(ErrorKind::Malformed).with_message("row has no cells to take a key from")
            })?;
            frame::write_scalar(buf, cell.row())?;
        }
        ColumnDesc::Family { name } => {
            let pairs: Vec<(&[u8], &[u8])> = family_cells(cells, name)
                .map(|cell| (cell.qualifier(), cell.value()))
                .collect();
            frame::write_object(buf, &pairs)?;
        }
        // An empty column frame is read back as NULL.
        ColumnDesc::Leaf { .. } => {}
    }
    frame::align(buf, COLUMN_ALIGN)?;
    buf.finish_raw(slot)?;
    Ok(())
}
