//! Purpose: Public surface for producing and reading encoded row tuples.
//! Exports: Column descriptors, scanner and boundary traits, decoder, stream pump, errors.
//! Role: Additive-only facade over `core`; callers should not need deeper paths.
//! Invariants: Everything exported here is stable for consumers of the wire format.

pub use crate::core::cell::{Cell, Row};
pub use crate::core::column::{
    ColumnDesc, ColumnKind, ColumnSet, MAX_COLUMNS, MAX_FAMILY_LEN, MAX_QUALIFIER_LEN,
};
pub use crate::core::decode::{
    decode_columns, decode_row, parse_scalar, ColumnFrames, ColumnValue, ObjectRef, RowFrameRef,
};
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::frame::{align, write_object, write_scalar, FrameBuf, OBJECT_FLAG};
pub use crate::core::memory::{MemorySource, MemoryStore, StoreStats};
pub use crate::core::row::encode_row;
pub use crate::core::scan::{
    open_scanner, Connection, RowSource, ScanOptions, ScanRequest, Scanner, DEFAULT_BUFFER_CAPACITY,
};
pub use crate::core::stream::{
    end_of_stream, pump, read_message, tag_tuple, Message, MessageKind, MessageSink, PumpSummary,
    SendOutcome,
};
