//! Purpose: Encode rows from a column-family store into self-describing relational wire tuples.
//! Exports: `core` (framing, row encoding, scanning, decoding, errors) and the `api` facade.
//! Role: Library backing the tuple producer; the consumer side is a protocol-matching reader.
//! Invariants: All integers on the wire are 4-byte, native byte order.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod core;
