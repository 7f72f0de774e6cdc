//! Purpose: Read row frames back the way the relational side consumes them.
//! Exports: `RowFrameRef`, `ColumnFrames`, `ColumnValue`, `ObjectRef`, `decode_row`,
//! `decode_columns`.
//! Role: Validation and inspection of encoder output; borrows from the input bytes.
//! Invariants: Every length is bounds-checked before slicing; inconsistencies are `Corrupt`.
//! Invariants: A column frame with no value past its padding is NULL.
use bstr::ByteSlice;
use serde_json::{Map, Value};

use crate::core::column::ColumnDesc;
use crate::core::error::{Error, ErrorKind};
use crate::core::frame::{read_i32, COUNT_MASK, LEN_FIELD, OBJECT_FLAG, ROW_TERMINATOR};

fn corrupt(message: &str, offset: usize) -> Error {
    Error::new(ErrorKind::Corrupt)
        .with_message(message)
        .with_offset(offset)
}

fn read_len(buf: &[u8], offset: usize, what: &str) -> Result<usize, Error> {
    let value = read_i32(buf, offset).ok_or_else(|| corrupt(what, offset))?;
    usize::try_from(value).map_err(|_| corrupt(what, offset))
}

/// A validated row frame.
#[derive(Clone, Copy, Debug)]
pub struct RowFrameRef<'a> {
    bytes: &'a [u8],
}

impl<'a> RowFrameRef<'a> {
    /// Parses the row frame at the start of `bytes`; trailing bytes are ignored.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, Error> {
        let total = read_len(bytes, 0, "truncated row length")?;
        if total < 2 * LEN_FIELD || total > bytes.len() {
            return Err(corrupt("row length out of range", 0));
        }
        let row = Self {
            bytes: &bytes[..total],
        };
        let mut frames = row.columns();
        for column in frames.by_ref() {
            column?;
        }
        if frames.pos + LEN_FIELD != total {
            return Err(corrupt("row length disagrees with its column frames", frames.pos));
        }
        Ok(row)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Column payloads in order, `None` for NULL. Payloads include alignment padding.
    ///
    /// Padding follows absolute buffer positions, so frames of a row that was
    /// appended at an unaligned offset need not be multiples of four.
    pub fn columns(&self) -> ColumnFrames<'a> {
        ColumnFrames::new(self.bytes, LEN_FIELD)
    }
}

/// Walks column frames up to the zero terminator.
#[derive(Clone, Debug)]
pub struct ColumnFrames<'a> {
    bytes: &'a [u8],
    pos: usize,
    done: bool,
}

impl<'a> ColumnFrames<'a> {
    pub fn new(bytes: &'a [u8], start: usize) -> Self {
        Self {
            bytes,
            pos: start,
            done: false,
        }
    }

    fn step(&mut self) -> Result<Option<Option<&'a [u8]>>, Error> {
        let len = read_len(self.bytes, self.pos, "missing row terminator")?;
        if len == ROW_TERMINATOR as usize {
            return Ok(None);
        }
        if len < LEN_FIELD {
            return Err(corrupt("column length shorter than its length word", self.pos));
        }
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| corrupt("column frame overruns row", self.pos))?;
        let payload = &self.bytes[self.pos + LEN_FIELD..end];
        // Anything shorter than a value header can only be alignment padding.
        if payload.len() < LEN_FIELD && payload.iter().any(|b| *b != 0) {
            return Err(corrupt("column padding is not zeroed", self.pos));
        }
        self.pos = end;
        Ok(Some((payload.len() >= LEN_FIELD).then_some(payload)))
    }
}

impl<'a> Iterator for ColumnFrames<'a> {
    type Item = Result<Option<&'a [u8]>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.step() {
            Ok(Some(column)) => Some(Ok(column)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ColumnValue<'a> {
    Null,
    Scalar(&'a [u8]),
    Object(ObjectRef<'a>),
}

/// A decoded object frame; entries keep their encoded order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectRef<'a> {
    entries: Vec<(&'a [u8], &'a [u8])>,
}

impl<'a> ObjectRef<'a> {
    pub fn parse(payload: &'a [u8]) -> Result<Self, Error> {
        let header = read_i32(payload, 0).ok_or_else(|| corrupt("truncated object header", 0))?;
        if header & 3 != 0 {
            return Err(corrupt("object header is not an uncompressed length", 0));
        }
        let total = (header as u32 >> 2) as usize;
        if total < 2 * LEN_FIELD || total > payload.len() {
            return Err(corrupt("object length out of range", 0));
        }
        let tag = read_i32(payload, LEN_FIELD)
            .ok_or_else(|| corrupt("truncated object count", LEN_FIELD))? as u32;
        if tag & OBJECT_FLAG == 0 {
            return Err(corrupt("value is not an object", LEN_FIELD));
        }
        let count = (tag & COUNT_MASK) as usize;
        let lens_start = 2 * LEN_FIELD;
        let data_start = count
            .checked_mul(2 * LEN_FIELD)
            .and_then(|lens| lens.checked_add(lens_start))
            .filter(|start| *start <= total)
            .ok_or_else(|| corrupt("object length arrays overrun frame", lens_start))?;

        let mut key_lens = Vec::with_capacity(count);
        let mut value_lens = Vec::with_capacity(count);
        for i in 0..count {
            let key_at = lens_start + i * LEN_FIELD;
            let value_at = lens_start + (count + i) * LEN_FIELD;
            key_lens.push(read_len(payload, key_at, "bad key length")?);
            value_lens.push(read_len(payload, value_at, "bad value length")?);
        }

        let mut pos = data_start;
        let mut keys = Vec::with_capacity(count);
        for len in &key_lens {
            keys.push(take(payload, &mut pos, *len, total)?);
        }
        let mut entries = Vec::with_capacity(count);
        for (key, len) in keys.into_iter().zip(&value_lens) {
            entries.push((key, take(payload, &mut pos, *len, total)?));
        }
        if pos != total {
            return Err(corrupt("object length disagrees with its entries", pos));
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(&'a [u8], &'a [u8])] {
        &self.entries
    }

    pub fn get(&self, key: &[u8]) -> Option<&'a [u8]> {
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, value)| *value)
    }

    /// Renders as a JSON object of strings, replacing invalid UTF-8.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for (key, value) in &self.entries {
            map.insert(
                key.to_str_lossy().into_owned(),
                Value::String(value.to_str_lossy().into_owned()),
            );
        }
        Value::Object(map)
    }
}

fn take<'a>(buf: &'a [u8], pos: &mut usize, len: usize, limit: usize) -> Result<&'a [u8], Error> {
    let end = pos
        .checked_add(len)
        .filter(|end| *end <= limit)
        .ok_or_else(|| corrupt("object entry overruns frame", *pos))?;
    let out = &buf[*pos..end];
    *pos = end;
    Ok(out)
}

/// Reads a scalar value frame and returns its payload.
pub fn parse_scalar(payload: &[u8]) -> Result<&[u8], Error> {
    let header = read_i32(payload, 0).ok_or_else(|| corrupt("truncated scalar header", 0))?;
    if header & 3 != 0 {
        return Err(corrupt("scalar header is not an uncompressed length", 0));
    }
    let total = (header as u32 >> 2) as usize;
    if total < LEN_FIELD || total > payload.len() {
        return Err(corrupt("scalar length out of range", 0));
    }
    Ok(&payload[LEN_FIELD..total])
}

/// Interprets raw column payloads against the descriptors that produced them.
pub fn decode_columns<'a, I>(
    frames: I,
    columns: &[ColumnDesc],
) -> Result<Vec<ColumnValue<'a>>, Error>
where
    I: IntoIterator<Item = Result<Option<&'a [u8]>, Error>>,
{
    let mut values = Vec::with_capacity(columns.len());
    let mut frames = frames.into_iter();
    for (index, column) in columns.iter().enumerate() {
        let frame = frames
            .next()
            .ok_or_else(|| {
                Error::new(ErrorKind::Corrupt).with_message("fewer column frames than columns")
            })?
            .map_err(|err| err.with_column(index))?;
        let value = match (frame, column) {
            (None, _) => ColumnValue::Null,
            (Some(payload), ColumnDesc::RowKey) => {
                ColumnValue::Scalar(parse_scalar(payload).map_err(|err| err.with_column(index))?)
            }
            (Some(payload), ColumnDesc::Family { .. }) => {
                let object = ObjectRef::parse(payload).map_err(|err| err.with_column(index))?;
                ColumnValue::Object(object)
            }
            (Some(_), ColumnDesc::Leaf { .. }) => {
                return Err(Error::new(ErrorKind::Corrupt)
                    .with_message("leaf column carries a payload")
                    .with_column(index));
            }
        };
        values.push(value);
    }
    if let Some(extra) = frames.next() {
        extra?;
        return Err(Error::new(ErrorKind::Corrupt).with_message("more column frames than columns"));
    }
    Ok(values)
}

/// Parses a row frame and decodes each column.
pub fn decode_row<'a>(
    bytes: &'a [u8],
    columns: &[ColumnDesc],
) -> Result<Vec<ColumnValue<'a>>, Error> {
    let row = RowFrameRef::parse(bytes)?;
    decode_columns(row.columns(), columns)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{decode_row, parse_scalar, ColumnValue, ObjectRef, RowFrameRef};
    use crate::core::cell::Cell;
    use crate::core::column::ColumnDesc;
    use crate::core::error::ErrorKind;
    use crate::core::frame::{write_object, FrameBuf};
    use crate::core::row::encode_row;

    fn encode(cells: &[Cell], columns: &[ColumnDesc]) -> Vec<u8> {
        let mut buf = FrameBuf::with_capacity(1024);
        encode_row(&mut buf, cells, columns).expect("encode");
        buf.into_vec()
    }

    #[test]
    fn decodes_every_column_kind() {
        let columns = vec![
            ColumnDesc::RowKey,
            ColumnDesc::family("cf").expect("family"),
            ColumnDesc::leaf("cf", "x").expect("leaf"),
        ];
        let cells = vec![Cell::new("r1", "cf", "x", "1"), Cell::new("r1", "cf", "y", "2")];
        let bytes = encode(&cells, &columns);
        let values = decode_row(&bytes, &columns).expect("decode");

        assert_eq!(values[0], ColumnValue::Scalar(b"r1"));
        let ColumnValue::Object(object) = &values[1] else {
            panic!("expected object, got {:?}", values[1]);
        };
        assert_eq!(object.len(), 2);
        assert_eq!(object.get(b"y"), Some(b"2".as_slice()));
        assert_eq!(object.to_json(), json!({"x": "1", "y": "2"}));
        assert_eq!(values[2], ColumnValue::Null);
    }

    #[test]
    fn row_length_covers_exactly_the_frame() {
        let columns = vec![ColumnDesc::RowKey];
        let mut bytes = encode(&[Cell::new("abc", "cf", "q", "v")], &columns);
        let row = RowFrameRef::parse(&bytes).expect("parse");
        assert_eq!(row.len(), bytes.len());

        bytes.extend_from_slice(b"trailing");
        let row = RowFrameRef::parse(&bytes).expect("parse with trailing bytes");
        assert_eq!(row.len(), bytes.len() - 8);
    }

    #[test]
    fn row_appended_at_unaligned_offset_decodes() {
        let columns = vec![ColumnDesc::leaf("cf", "q").expect("leaf"), ColumnDesc::RowKey];
        let mut buf = FrameBuf::with_capacity(128);
        buf.put(b"x").expect("prefix");
        let written = encode_row(&mut buf, &[Cell::new("abc", "cf", "q", "v")], &columns)
            .expect("encode");
        let bytes = &buf.as_slice()[1..];
        assert_eq!(written, bytes.len());

        let row = RowFrameRef::parse(bytes).expect("parse");
        assert_eq!(row.len(), bytes.len());
        assert_ne!(row.len() % 4, 0);
        let values = decode_row(bytes, &columns).expect("decode");
        assert_eq!(values, vec![ColumnValue::Null, ColumnValue::Scalar(b"abc")]);
    }

    #[test]
    fn nonzero_padding_is_corrupt() {
        let mut bytes = vec![0u8; 4];
        bytes.extend_from_slice(&7i32.to_ne_bytes());
        bytes.extend_from_slice(&[0, 1, 0]);
        bytes.extend_from_slice(&0i32.to_ne_bytes());
        let len = bytes.len() as i32;
        bytes[..4].copy_from_slice(&len.to_ne_bytes());
        let err = RowFrameRef::parse(&bytes).expect_err("dirty padding");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn truncated_row_is_corrupt() {
        let columns = vec![ColumnDesc::RowKey];
        let bytes = encode(&[Cell::new("abc", "cf", "q", "v")], &columns);
        let err = RowFrameRef::parse(&bytes[..bytes.len() - 1]).expect_err("truncated");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn inconsistent_row_length_is_corrupt() {
        let columns = vec![ColumnDesc::RowKey];
        let mut bytes = encode(&[Cell::new("abc", "cf", "q", "v")], &columns);
        bytes.extend_from_slice(&[0; 4]);
        let total = bytes.len() as i32;
        bytes[..4].copy_from_slice(&total.to_ne_bytes());
        let err = RowFrameRef::parse(&bytes).expect_err("length mismatch");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn column_count_must_match() {
        let columns = vec![ColumnDesc::RowKey, ColumnDesc::RowKey];
        let bytes = encode(&[Cell::new("k", "cf", "q", "v")], &columns);
        let err = decode_row(&bytes, &columns[..1]).expect_err("extra frame");
        assert_eq!(err.kind(), ErrorKind::Corrupt);

        let bytes = encode(&[Cell::new("k", "cf", "q", "v")], &columns[..1]);
        let err = decode_row(&bytes, &columns).expect_err("missing frame");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn scalar_rejects_compressed_tag() {
        let header = ((3 + 4) << 2 | 2) as i32;
        let mut bytes = header.to_ne_bytes().to_vec();
        bytes.extend_from_slice(b"abc");
        let err = parse_scalar(&bytes).expect_err("tagged");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn object_rejects_missing_flag_and_overruns() {
        let mut buf = FrameBuf::with_capacity(64);
        let pairs: [(&[u8], &[u8]); 1] = [(b"k", b"v")];
        write_object(&mut buf, &pairs).expect("write");
        let good = buf.into_vec();
        assert_eq!(
            ObjectRef::parse(&good).expect("parse").entries(),
            &[(b"k".as_slice(), b"v".as_slice())]
        );

        let mut no_flag = good.clone();
        no_flag[4..8].copy_from_slice(&1i32.to_ne_bytes());
        assert_eq!(ObjectRef::parse(&no_flag).expect_err("flag").kind(), ErrorKind::Corrupt);

        let mut long_key = good.clone();
        long_key[8..12].copy_from_slice(&100i32.to_ne_bytes());
        assert_eq!(ObjectRef::parse(&long_key).expect_err("overrun").kind(), ErrorKind::Corrupt);

        let err = ObjectRef::parse(&good[..good.len() - 1]).expect_err("short");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn invalid_utf8_renders_lossily() {
        let mut buf = FrameBuf::with_capacity(64);
        let pairs: [(&[u8], &[u8]); 1] = [(b"k", b"\xff")];
        write_object(&mut buf, &pairs).expect("write");
        let bytes = buf.into_vec();
        let object = ObjectRef::parse(&bytes).expect("parse");
        assert_eq!(object.to_json(), json!({"k": "\u{FFFD}"}));
    }
}
