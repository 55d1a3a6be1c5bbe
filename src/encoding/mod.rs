// Entry codec for the payload of a frame.
//
// Every integer is fixed-width big-endian. A base frame is a run of pairs:
//
//   u32 key_len | key | u32 value_len | value
//
// where a value_len of ABSENT marks a pair with no value (no value bytes
// follow). An index frame is a run of entries:
//
//   u32 key_len | key | u64 offset
//
// Both kinds begin with a length-prefixed key, so the first key of any frame
// can be read without knowing which kind of frame it is.

use byteorder::{BigEndian, ByteOrder};

use crate::{
    error::{Error, Result},
    stream::PairRef,
};

pub const ABSENT: u32 = u32::MAX;

const LEN_BYTES: usize = 4;
const OFFSET_BYTES: usize = 8;

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    let mut b = [0_u8; LEN_BYTES];
    BigEndian::write_u32(&mut b, v);
    buf.extend_from_slice(&b);
}

fn put_u64(buf: &mut Vec<u8>, v: u64) {
    let mut b = [0_u8; OFFSET_BYTES];
    BigEndian::write_u64(&mut b, v);
    buf.extend_from_slice(&b);
}

fn put_bytes(buf: &mut Vec<u8>, b: &[u8]) {
    put_u32(buf, b.len() as u32);
    buf.extend_from_slice(b);
}

fn get_u32(from: &[u8]) -> Result<u32> {
    if from.len() < LEN_BYTES {
        return Err(Error::corrupt("truncated length field"));
    }
    Ok(BigEndian::read_u32(from))
}

fn get_bytes(from: &[u8], len: u32) -> Result<&[u8]> {
    let len = len as usize;
    if len > from.len() {
        return Err(Error::corrupt(format!(
            "entry length {} exceeds the {} bytes left in the frame",
            len,
            from.len()
        )));
    }
    Ok(&from[..len])
}

/// Number of bytes `encode_pair` appends for this pair.
pub fn pair_len(key: &[u8], value: Option<&[u8]>) -> usize {
    2 * LEN_BYTES + key.len() + value.map_or(0, |v| v.len())
}

/// Number of bytes `encode_index` appends for this key.
pub fn index_len(key: &[u8]) -> usize {
    LEN_BYTES + key.len() + OFFSET_BYTES
}

/// Appends the encoding of a pair to `buf`. Lengths are written as u32, so
/// the caller must keep keys and values under 4 GiB; the writer bounds whole
/// entries well below that.
pub(crate) fn encode_pair(buf: &mut Vec<u8>, key: &[u8], value: Option<&[u8]>) {
    put_bytes(buf, key);
    match value {
        Some(v) => put_bytes(buf, v),
        None => put_u32(buf, ABSENT),
    }
}

/// Decodes the pair at the front of `frame`, returning it and the number of
/// bytes it occupied. An empty suffix has no more entries and yields `None`.
pub fn decode_pair(frame: &[u8]) -> Result<Option<(PairRef<'_>, usize)>> {
    if frame.is_empty() {
        return Ok(None);
    }
    let klen = get_u32(frame)?;
    let mut n = LEN_BYTES;
    let key = get_bytes(&frame[n..], klen)?;
    n += key.len();

    let vlen = get_u32(&frame[n..])?;
    n += LEN_BYTES;
    let value = if vlen == ABSENT {
        None
    } else {
        let value = get_bytes(&frame[n..], vlen)?;
        n += value.len();
        Some(value)
    };

    Ok(Some((PairRef { key, value }, n)))
}

/// Appends an index entry to `buf`. The key length is subject to the same
/// bound as in `encode_pair`.
pub(crate) fn encode_index(buf: &mut Vec<u8>, key: &[u8], offset: u64) {
    put_bytes(buf, key);
    put_u64(buf, offset);
}

/// Decodes the index entry at the front of `frame` as `(key, offset, len)`.
/// An empty suffix yields `None`.
pub fn decode_index(frame: &[u8]) -> Result<Option<(&[u8], u64, usize)>> {
    if frame.is_empty() {
        return Ok(None);
    }
    let klen = get_u32(frame)?;
    let mut n = LEN_BYTES;
    let key = get_bytes(&frame[n..], klen)?;
    n += key.len();
    if frame.len() - n < OFFSET_BYTES {
        return Err(Error::corrupt("truncated index offset"));
    }
    let offset = BigEndian::read_u64(&frame[n..]);
    n += OFFSET_BYTES;
    Ok(Some((key, offset, n)))
}

/// Returns the key of the first entry of a frame of either kind.
pub fn first_key(frame: &[u8]) -> Result<&[u8]> {
    let klen = get_u32(frame)?;
    get_bytes(&frame[LEN_BYTES..], klen)
}

/// Iterates the pairs of a base frame; the frame length alone ends the
/// iteration.
pub struct Pairs<'a> {
    frame: &'a [u8],
}

impl<'a> Pairs<'a> {
    pub fn new(frame: &'a [u8]) -> Self {
        Pairs { frame }
    }
}

impl<'a> Iterator for Pairs<'a> {
    type Item = Result<PairRef<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        match decode_pair(self.frame) {
            Ok(Some((pair, n))) => {
                self.frame = &self.frame[n..];
                Some(Ok(pair))
            }
            Ok(None) => None,
            Err(e) => {
                self.frame = &[];
                Some(Err(e))
            }
        }
    }
}

/// Iterates the `(key, offset)` entries of an index frame.
pub struct IndexEntries<'a> {
    frame: &'a [u8],
}

impl<'a> IndexEntries<'a> {
    pub fn new(frame: &'a [u8]) -> Self {
        IndexEntries { frame }
    }
}

impl<'a> Iterator for IndexEntries<'a> {
    type Item = Result<(&'a [u8], u64)>;

    fn next(&mut self) -> Option<Self::Item> {
        match decode_index(self.frame) {
            Ok(Some((key, offset, n))) => {
                self.frame = &self.frame[n..];
                Some(Ok((key, offset)))
            }
            Ok(None) => None,
            Err(e) => {
                self.frame = &[];
                Some(Err(e))
            }
        }
    }
}
