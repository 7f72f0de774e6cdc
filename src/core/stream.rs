//! Purpose: Ship encoded rows to the relational side as tagged messages.
//! Exports: `MessageKind`, `Message`, `MessageSink`, `SendOutcome`, `PumpSummary`, `pump`,
//! `tag_tuple`, `end_of_stream`, `read_message`.
//! Role: Drives a `Scanner` to completion into a sink, one message per row.
//! Invariants: A tuple message is a row frame whose length word is replaced by the tuple tag.
//! Invariants: End of stream is sent only after the scan is exhausted, never after an error.
use tracing::{debug, warn};

use crate::core::decode::ColumnFrames;
use crate::core::error::{Error, ErrorKind};
use crate::core::frame::{read_i32, FrameBuf, LEN_FIELD};
use crate::core::scan::{RowSource, Scanner};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MessageKind {
    Tuple = 0,
    EndOfStream = 1,
}

impl MessageKind {
    fn from_i32(value: i32) -> Result<Self, Error> {
        match value {
            0 => Ok(MessageKind::Tuple),
            1 => Ok(MessageKind::EndOfStream),
            _ => Err(Error::new(ErrorKind::Corrupt).with_message("unknown message type")),
        }
    }
}

/// Overwrites the row length word of an encoded row frame with the tuple tag.
pub fn tag_tuple(row_frame: &mut [u8]) -> Result<(), Error> {
    let word = row_frame
        .get_mut(..LEN_FIELD)
        .ok_or_else(|| Error::new(ErrorKind::Usage).with_message("row frame too short to tag"))?;
    word.copy_from_slice(&(MessageKind::Tuple as i32).to_ne_bytes());
    Ok(())
}

pub fn end_of_stream() -> [u8; LEN_FIELD] {
    (MessageKind::EndOfStream as i32).to_ne_bytes()
}

#[derive(Clone, Debug)]
pub enum Message<'a> {
    Tuple(ColumnFrames<'a>),
    EndOfStream,
}

pub fn read_message(bytes: &[u8]) -> Result<Message<'_>, Error> {
    let tag = read_i32(bytes, 0)
        .ok_or_else(|| Error::new(ErrorKind::Corrupt).with_message("message too short"))?;
    match MessageKind::from_i32(tag)? {
        MessageKind::Tuple => Ok(Message::Tuple(ColumnFrames::new(bytes, LEN_FIELD))),
        MessageKind::EndOfStream => Ok(Message::EndOfStream),
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SendOutcome {
    Sent,
    Detached,
}

/// Receiver of whole messages, e.g. a shared-memory queue.
pub trait MessageSink {
    fn send(&mut self, message: &[u8]) -> Result<SendOutcome, Error>;
}

impl MessageSink for Vec<Vec<u8>> {
    fn send(&mut self, message: &[u8]) -> Result<SendOutcome, Error> {
        self.push(message.to_vec());
        Ok(SendOutcome::Sent)
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PumpSummary {
    pub rows: u64,
    pub bytes: u64,
    pub detached: bool,
}

/// Sends every remaining row of `scanner` to `sink`, then the end-of-stream marker.
///
/// Stops early if the sink detaches. The scanner is closed on every exit path.
pub fn pump<S, K>(scanner: &mut Scanner<S>, sink: &mut K) -> Result<PumpSummary, Error>
where
    S: RowSource,
    K: MessageSink + ?Sized,
{
    let result = pump_rows(scanner, sink);
    scanner.close();
    let summary = result?;
    debug!(
        rows = summary.rows,
        bytes = summary.bytes,
        detached = summary.detached,
        "pump finished"
    );
    Ok(summary)
}

fn pump_rows<S, K>(scanner: &mut Scanner<S>, sink: &mut K) -> Result<PumpSummary, Error>
where
    S: RowSource,
    K: MessageSink + ?Sized,
{
    let mut summary = PumpSummary::default();
    let mut buf = FrameBuf::with_capacity(scanner.options().buffer_capacity);
    loop {
        buf.clear();
        if !scanner.next_into(&mut buf)? {
            break;
        }
        tag_tuple(buf.as_mut_slice())?;
        let message = buf.as_slice();
        if sink.send(message)? == SendOutcome::Detached {
            warn!(rows = summary.rows, "message sink detached");
            summary.detached = true;
            return Ok(summary);
        }
        summary.rows += 1;
        summary.bytes += message.len() as u64;
    }
    let marker = end_of_stream();
    if sink.send(&marker)? == SendOutcome::Detached {
        warn!(rows = summary.rows, "message sink detached before end of stream");
        summary.detached = true;
    }
    Ok(summary)
}
