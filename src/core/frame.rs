// Frame primitives: bounded output buffer, deferred length slots, scalar/object frames, padding.
//
// Two length conventions coexist and must not be mixed:
// - value frames (scalar, object) store `len << 2`, leaving the low two bits zero;
// - row and column frames store the raw self-inclusive byte count.
use crate::core::error::{Error, ErrorKind};

pub const LEN_FIELD: usize = 4;
pub const COLUMN_ALIGN: usize = 4;
pub const ROW_TERMINATOR: i32 = 0;

pub const OBJECT_FLAG: u32 = 0x2000_0000;
pub const COUNT_MASK: u32 = 0x0FFF_FFFF;

/// Largest byte length that still fits a shifted length word.
pub const MAX_VALUE_LEN: usize = (i32::MAX as usize) >> 2;

// Up-front allocation cap; past this the vector grows on demand.
const INITIAL_RESERVE: usize = 64 * 1024;

/// Append-only output buffer with a hard byte limit.
///
/// The limit is logical: memory is reserved lazily, so any limit is accepted.
#[derive(Clone, Debug)]
pub struct FrameBuf {
    bytes: Vec<u8>,
    limit: usize,
}

impl FrameBuf {
    pub fn with_capacity(limit: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(limit.min(INITIAL_RESERVE)),
            limit,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.limit
    }

    pub fn remaining(&self) -> usize {
        self.limit - self.bytes.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.bytes
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    /// Raises the byte limit; never shrinks below the current contents.
    pub fn grow_to(&mut self, limit: usize) {
        self.limit = self.limit.max(limit);
    }

    /// Runs `write`; on failure the buffer is cut back to where it started.
    pub fn transaction<T>(
        &mut self,
        write: impl FnOnce(&mut Self) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let start = self.bytes.len();
        let result = write(self);
        if result.is_err() {
            self.bytes.truncate(start);
        }
        result
    }

    pub fn put(&mut self, data: &[u8]) -> Result<(), Error> {
        if data.len() > self.remaining() {
            return Err(Error::new(ErrorKind::Capacity)
                .with_message(format!(
                    "need {} bytes, {} remaining",
                    data.len(),
                    self.remaining()
                ))
                .with_offset(self.bytes.len()));
        }
        self.bytes.extend_from_slice(data);
        Ok(())
    }

    pub fn put_i32(&mut self, value: i32) -> Result<(), Error> {
        self.put(&value.to_ne_bytes())
    }

    fn put_len(&mut self, len: usize) -> Result<(), Error> {
        self.put_i32(to_i32(len)?)
    }

    /// Reserves a zeroed length word to be filled once the frame is complete.
    pub fn begin(&mut self) -> Result<LenSlot, Error> {
        let start = self.bytes.len();
        self.put_i32(0)?;
        Ok(LenSlot { start })
    }

    /// Fills `slot` with the raw byte count from the slot to the current end.
    pub fn finish_raw(&mut self, slot: LenSlot) -> Result<usize, Error> {
        let len = self.bytes.len() - slot.start;
        self.patch(slot.start, to_i32(len)?);
        Ok(len)
    }

    /// Fills `slot` with the byte count shifted left by two.
    pub fn finish_shifted(&mut self, slot: LenSlot) -> Result<usize, Error> {
        let len = self.bytes.len() - slot.start;
        self.patch(slot.start, shifted_len(len)?);
        Ok(len)
    }

    fn patch(&mut self, at: usize, value: i32) {
        self.bytes[at..at + LEN_FIELD].copy_from_slice(&value.to_ne_bytes());
    }
}

/// Position of a reserved length word.
#[must_use = "a reserved length slot must be finished"]
#[derive(Debug)]
pub struct LenSlot {
    start: usize,
}

pub fn write_scalar(buf: &mut FrameBuf, data: &[u8]) -> Result<usize, Error> {
    let header = shifted_len(data.len() + LEN_FIELD)?;
    buf.transaction(|buf| {
        buf.put_i32(header)?;
        buf.put(data)?;
        Ok(LEN_FIELD + data.len())
    })
}

/// Writes `pairs` as one object frame. Pair order is kept as given.
pub fn write_object(buf: &mut FrameBuf, pairs: &[(&[u8], &[u8])]) -> Result<usize, Error> {
    let count = pairs.len();
    if count > COUNT_MASK as usize {
        return Err(Error::new(ErrorKind::Capacity)
            .with_message(format!("object has {count} entries, limit {COUNT_MASK}")));
    }
    buf.transaction(|buf| {
        let slot = buf.begin()?;
        buf.put_i32((count as u32 | OBJECT_FLAG) as i32)?;
        for (key, _) in pairs {
            buf.put_len(key.len())?;
        }
        for (_, value) in pairs {
            buf.put_len(value.len())?;
        }
        for (key, _) in pairs {
            buf.put(key)?;
        }
        for (_, value) in pairs {
            buf.put(value)?;
        }
        buf.finish_shifted(slot)
    })
}

const ZEROS: [u8; 8] = [0; 8];

pub fn align(buf: &mut FrameBuf, n: usize) -> Result<usize, Error> {
    let pad = padding(buf.len(), n);
    if pad <= ZEROS.len() {
        buf.put(&ZEROS[..pad])?;
    } else {
        buf.put(&vec![0u8; pad])?;
    }
    Ok(pad)
}

pub fn padding(pos: usize, n: usize) -> usize {
    if n == 0 {
        return 0;
    }
    (n - pos % n) % n
}

pub fn shifted_len(len: usize) -> Result<i32, Error> {
    if len > MAX_VALUE_LEN {
        return Err(Error::new(ErrorKind::Capacity)
            .with_message(format!("value of {len} bytes exceeds {MAX_VALUE_LEN}")));
    }
    Ok((len << 2) as i32)
}

fn to_i32(len: usize) -> Result<i32, Error> {
    i32::try_from(len).map_err(|err| {
        Error::new(ErrorKind::Capacity)
            .with_message("length does not fit in 32 bits")
            .with_source(err)
    })
}

pub fn read_i32(buf: &[u8], offset: usize) -> Option<i32> {
    let end = offset.checked_add(LEN_FIELD)?;
    let bytes = buf.get(offset..end)?;
    let mut out = [0u8; 4];
    out.copy_from_slice(bytes);
    Some(i32::from_ne_bytes(out))
}

#[cfg(test)]
mod tests {
    use super::{
        align, padding, read_i32, shifted_len, write_object, write_scalar, FrameBuf, MAX_VALUE_LEN,
        OBJECT_FLAG,
    };
    use crate::core::error::ErrorKind;

    fn words(bytes: &[u8]) -> Vec<i32> {
        (0..bytes.len() / 4)
            .map(|i| read_i32(bytes, i * 4).expect("word"))
            .collect()
    }

    #[test]
    fn scalar_header_is_shifted_and_self_inclusive() {
        let mut buf = FrameBuf::with_capacity(64);
        let written = write_scalar(&mut buf, b"abc").expect("write");
        assert_eq!(written, 7);
        assert_eq!(read_i32(buf.as_slice(), 0), Some(28));
        assert_eq!(&buf.as_slice()[4..], b"abc");
        assert_eq!(read_i32(buf.as_slice(), 0).map(|h| h & 3), Some(0));
    }

    #[test]
    fn empty_scalar_is_header_only() {
        let mut buf = FrameBuf::with_capacity(8);
        assert_eq!(write_scalar(&mut buf, b"").expect("write"), 4);
        assert_eq!(read_i32(buf.as_slice(), 0), Some(16));
    }

    #[test]
    fn object_layout_matches_wire_format() {
        let mut buf = FrameBuf::with_capacity(128);
        let pairs: [(&[u8], &[u8]); 2] = [(b"a", b"1"), (b"b", b"22")];
        let written = write_object(&mut buf, &pairs).expect("write");
        // header + count + 2 key lens + 2 value lens + "ab" + "122"
        assert_eq!(written, 4 + 4 + 8 + 8 + 2 + 3);

        let bytes = buf.as_slice();
        assert_eq!(read_i32(bytes, 0), Some((written as i32) << 2));
        assert_eq!(read_i32(bytes, 4), Some((2 | OBJECT_FLAG) as i32));
        assert_eq!(words(&bytes[8..24]), vec![1, 1, 1, 2]);
        assert_eq!(&bytes[24..26], b"ab");
        assert_eq!(&bytes[26..29], b"122");
    }

    #[test]
    fn empty_object_is_still_framed() {
        let mut buf = FrameBuf::with_capacity(16);
        let written = write_object(&mut buf, &[]).expect("write");
        assert_eq!(written, 8);
        assert_eq!(words(buf.as_slice()), vec![8 << 2, OBJECT_FLAG as i32]);
    }

    #[test]
    fn object_keeps_caller_order() {
        let mut buf = FrameBuf::with_capacity(64);
        let pairs: [(&[u8], &[u8]); 2] = [(b"z", b"1"), (b"a", b"2")];
        write_object(&mut buf, &pairs).expect("write");
        assert_eq!(&buf.as_slice()[24..26], b"za");
    }

    #[test]
    fn align_pads_with_zeros() {
        let mut buf = FrameBuf::with_capacity(16);
        buf.put(b"\xff\xff\xff\xff\xff").expect("put");
        assert_eq!(align(&mut buf, 4).expect("align"), 3);
        assert_eq!(buf.len(), 8);
        assert_eq!(&buf.as_slice()[5..], &[0, 0, 0]);
        assert_eq!(align(&mut buf, 4).expect("align"), 0);
    }

    #[test]
    fn padding_values() {
        assert_eq!(padding(0, 4), 0);
        assert_eq!(padding(1, 4), 3);
        assert_eq!(padding(4, 4), 0);
        assert_eq!(padding(7, 4), 1);
        assert_eq!(padding(5, 0), 0);
    }

    #[test]
    fn slots_support_both_conventions() {
        let mut buf = FrameBuf::with_capacity(32);
        let outer = buf.begin().expect("outer");
        let inner = buf.begin().expect("inner");
        buf.put(b"1234").expect("put");
        assert_eq!(buf.finish_shifted(inner).expect("inner"), 8);
        assert_eq!(buf.finish_raw(outer).expect("outer"), 12);
        assert_eq!(words(buf.as_slice()), vec![12, 32, i32::from_ne_bytes(*b"1234")]);
    }

    #[test]
    fn capacity_exhaustion_is_reported() {
        let mut buf = FrameBuf::with_capacity(6);
        let err = write_scalar(&mut buf, b"abc").expect_err("too small");
        assert_eq!(err.kind(), ErrorKind::Capacity);
        assert!(buf.is_empty());
        assert_eq!(buf.capacity(), 6);
    }

    #[test]
    fn failed_object_leaves_buffer_untouched() {
        let mut buf = FrameBuf::with_capacity(20);
        buf.put(b"keep").expect("put");
        let pairs: [(&[u8], &[u8]); 1] = [(b"key", b"value")];
        let err = write_object(&mut buf, &pairs).expect_err("too small");
        assert_eq!(err.kind(), ErrorKind::Capacity);
        assert_eq!(buf.as_slice(), b"keep");
    }

    #[test]
    fn grow_to_raises_limit_only() {
        let mut buf = FrameBuf::with_capacity(4);
        buf.grow_to(2);
        assert_eq!(buf.capacity(), 4);
        buf.grow_to(16);
        assert_eq!(buf.remaining(), 16);
    }

    #[test]
    fn huge_limit_is_only_a_cap() {
        let mut buf = FrameBuf::with_capacity(usize::MAX);
        assert_eq!(write_scalar(&mut buf, b"abc").expect("write"), 7);
        assert_eq!(buf.remaining(), usize::MAX - 7);

        let mut buf = FrameBuf::with_capacity(4);
        buf.grow_to(usize::MAX);
        assert_eq!(buf.capacity(), usize::MAX);
        buf.put(b"12345678").expect("put");
        assert_eq!(buf.len(), 8);
    }

    #[test]
    fn oversized_values_are_rejected() {
        assert!(shifted_len(MAX_VALUE_LEN).is_ok());
        let err = shifted_len(MAX_VALUE_LEN + 1).expect_err("too large");
        assert_eq!(err.kind(), ErrorKind::Capacity);
    }

    #[test]
    fn read_i32_is_bounds_checked() {
        assert_eq!(read_i32(&[0, 0, 0], 0), None);
        assert_eq!(read_i32(&[0; 8], 5), None);
        assert_eq!(read_i32(&[0; 8], usize::MAX), None);
    }
}
