//! Purpose: Describe which bytes each output column carries for a scan.
//! Exports: `ColumnDesc`, `ColumnKind`, `ColumnSet`, descriptor size limits.
//! Role: Fixed, validated input to the row encoder and to scan projection.
//! Invariants: A descriptor's kind never changes after construction.
//! Invariants: A `ColumnSet` is immutable for the lifetime of the scan that owns it.
use crate::core::error::{Error, ErrorKind};

pub const MAX_FAMILY_LEN: usize = 31;
pub const MAX_QUALIFIER_LEN: usize = 255;
pub const MAX_COLUMNS: usize = 64;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ColumnKind {
    RowKey,
    Family,
    Leaf,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ColumnDesc {
    /// The row key as a scalar value.
    RowKey,
    /// Every cell of one family, packed as an object keyed by qualifier.
    Family { name: Vec<u8> },
    /// A single qualifier; always encoded as NULL.
    Leaf { family: Vec<u8>, qualifier: Vec<u8> },
}

impl ColumnDesc {
    pub fn row_key() -> Self {
        ColumnDesc::RowKey
    }

    pub fn family(name: impl Into<Vec<u8>>) -> Result<Self, Error> {
        let name = name.into();
        validate_family(&name)?;
        Ok(ColumnDesc::Family { name })
    }

    pub fn leaf(family: impl Into<Vec<u8>>, qualifier: impl Into<Vec<u8>>) -> Result<Self, Error> {
        let family = family.into();
        let qualifier = qualifier.into();
        validate_family(&family)?;
        if qualifier.len() > MAX_QUALIFIER_LEN {
            return Err(Error::new(ErrorKind::Usage).with_message(format!(
                "qualifier exceeds {MAX_QUALIFIER_LEN} bytes"
            )));
        }
        Ok(ColumnDesc::Leaf { family, qualifier })
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            ColumnDesc::RowKey => ColumnKind::RowKey,
            ColumnDesc::Family { .. } => ColumnKind::Family,
            ColumnDesc::Leaf { .. } => ColumnKind::Leaf,
        }
    }

    pub fn family_name(&self) -> Option<&[u8]> {
        match self {
            ColumnDesc::RowKey => None,
            ColumnDesc::Family { name } => Some(name),
            ColumnDesc::Leaf { family, .. } => Some(family),
        }
    }
}

fn validate_family(name: &[u8]) -> Result<(), Error> {
    if name.is_empty() {
        return Err(Error::new(ErrorKind::Usage).with_message("family name is empty"));
    }
    if name.len() > MAX_FAMILY_LEN {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("family name exceeds {MAX_FAMILY_LEN} bytes")));
    }
    Ok(())
}

/// The ordered output columns of one scan.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ColumnSet {
    columns: Vec<ColumnDesc>,
}

impl ColumnSet {
    pub fn new(columns: Vec<ColumnDesc>) -> Result<Self, Error> {
        if columns.len() > MAX_COLUMNS {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("at most {MAX_COLUMNS} columns per scan")));
        }
        Ok(Self { columns })
    }

    pub fn as_slice(&self) -> &[ColumnDesc] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ColumnDesc> {
        self.columns.iter()
    }
}

impl<'a> IntoIterator for &'a ColumnSet {
    type Item = &'a ColumnDesc;
    type IntoIter = std::slice::Iter<'a, ColumnDesc>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::{ColumnDesc, ColumnKind, ColumnSet, MAX_COLUMNS, MAX_FAMILY_LEN, MAX_QUALIFIER_LEN};
    use crate::core::error::ErrorKind;

    #[test]
    fn kinds_are_reported() {
        assert_eq!(ColumnDesc::row_key().kind(), ColumnKind::RowKey);
        assert_eq!(ColumnDesc::family("cf").expect("family").kind(), ColumnKind::Family);
        assert_eq!(ColumnDesc::leaf("cf", "q").expect("leaf").kind(), ColumnKind::Leaf);
    }

    #[test]
    fn family_name_limits_are_enforced() {
        let err = ColumnDesc::family("").expect_err("empty");
        assert_eq!(err.kind(), ErrorKind::Usage);

        ColumnDesc::family(vec![b'f'; MAX_FAMILY_LEN]).expect("at limit");
        let err = ColumnDesc::family(vec![b'f'; MAX_FAMILY_LEN + 1]).expect_err("too long");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn qualifier_limit_is_enforced() {
        ColumnDesc::leaf("cf", "").expect("empty qualifier is legal");
        ColumnDesc::leaf("cf", vec![b'q'; MAX_QUALIFIER_LEN]).expect("at limit");
        let err = ColumnDesc::leaf("cf", vec![b'q'; MAX_QUALIFIER_LEN + 1]).expect_err("too long");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn column_count_is_capped() {
        ColumnSet::new(vec![ColumnDesc::RowKey; MAX_COLUMNS]).expect("at limit");
        let err = ColumnSet::new(vec![ColumnDesc::RowKey; MAX_COLUMNS + 1]).expect_err("too many");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn family_name_is_exposed_for_family_and_leaf() {
        assert_eq!(ColumnDesc::RowKey.family_name(), None);
        let family = ColumnDesc::family("cf").expect("family");
        assert_eq!(family.family_name(), Some(b"cf".as_slice()));
        let leaf = ColumnDesc::leaf("cf2", "q").expect("leaf");
        assert_eq!(leaf.family_name(), Some(b"cf2".as_slice()));
    }
}
