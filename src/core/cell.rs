// Cells and rows as handed over by the column-family store cursor.
use bytes::Bytes;

/// One family/qualifier/value triple tied to a row key.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Cell {
    row: Bytes,
    family: Bytes,
    qualifier: Bytes,
    value: Bytes,
}

impl Cell {
    pub fn new(
        row: impl Into<Bytes>,
        family: impl Into<Bytes>,
        qualifier: impl Into<Bytes>,
        value: impl Into<Bytes>,
    ) -> Self {
        Self {
            row: row.into(),
            family: family.into(),
            qualifier: qualifier.into(),
            value: value.into(),
        }
    }

    pub fn row(&self) -> &[u8] {
        &self.row
    }

    pub fn family(&self) -> &[u8] {
        &self.family
    }

    pub fn qualifier(&self) -> &[u8] {
        &self.qualifier
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }
}

/// The ordered cells returned for one key by a single cursor step.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Row {
    cells: Vec<Cell>,
}

impl Row {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Key shared by every cell; `None` only for a row that violates the cursor contract.
    pub fn key(&self) -> Option<&[u8]> {
        self.cells.first().map(Cell::row)
    }
}

/// Cells of `family`, in row order.
pub fn family_cells<'a>(
    cells: &'a [Cell],
    family: &'a [u8],
) -> impl Iterator<Item = &'a Cell> + 'a {
    cells.iter().filter(move |cell| cell.family() == family)
}
