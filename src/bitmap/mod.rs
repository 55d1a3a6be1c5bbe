use std::fmt::Write;

use rand::Rng;
use roaring::RoaringBitmap;

use crate::error::{Error, Result};

/// Serializes a set of integers as a roaring bitmap value.
pub fn encode<I: IntoIterator<Item = u32>>(values: I) -> Result<Vec<u8>> {
    let bitmap: RoaringBitmap = values.into_iter().collect();
    to_bytes(&bitmap)
}

pub fn to_bytes(bitmap: &RoaringBitmap) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(bitmap.serialized_size());
    bitmap.serialize_into(&mut buf)?;
    Ok(buf)
}

pub fn decode(value: &[u8]) -> Result<RoaringBitmap> {
    RoaringBitmap::deserialize_from(value)
        .map_err(|e| Error::corrupt(format!("malformed bitmap value: {}", e)))
}

/// Renders a bitmap as `{7, 9}`.
pub fn format(bitmap: &RoaringBitmap) -> String {
    let mut out = String::from("{");
    for (i, v) in bitmap.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{}", v);
    }
    out.push('}');
    out
}

/// Combines two bitmap values by union. Two absent values stay absent;
/// otherwise an absent value counts as the empty set.
pub fn or(a: Option<&[u8]>, b: Option<&[u8]>) -> anyhow::Result<Option<Vec<u8>>> {
    if a.is_none() && b.is_none() {
        return Ok(None);
    }
    let mut x = match a {
        Some(a) => decode(a)?,
        None => RoaringBitmap::new(),
    };
    if let Some(b) = b {
        x |= decode(b)?;
    }
    Ok(Some(to_bytes(&x)?))
}

/// Draws a small set of integers, for filling in test tables.
pub fn random<R: Rng>(rng: &mut R) -> RoaringBitmap {
    let n = rng.gen_range(1..=8);
    (0..n).map(|_| rng.gen_range(0..1000)).collect()
}
