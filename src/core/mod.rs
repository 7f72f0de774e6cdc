// Core modules: cells, column descriptors, framing, row encoding, scanning, decoding, and errors.
pub mod cell;
pub mod column;
pub mod decode;
pub mod error;
pub mod frame;
pub mod memory;
pub mod row;
pub mod scan;
pub mod stream;
