use crate::error::Result;

/// An owned key/value entry. A `None` value is an absent value, which is
/// distinct from an empty one and is what key-only tables store.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Pair {
    pub key: Vec<u8>,
    pub value: Option<Vec<u8>>,
}

impl Pair {
    pub fn new<K, V>(key: K, value: V) -> Self
    where
        K: Into<Vec<u8>>,
        V: Into<Vec<u8>>,
    {
        Pair {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    pub fn key_only<K: Into<Vec<u8>>>(key: K) -> Self {
        Pair {
            key: key.into(),
            value: None,
        }
    }

    pub fn view(&self) -> PairRef<'_> {
        PairRef {
            key: &self.key,
            value: self.value.as_deref(),
        }
    }

    // Copies `p` into self, reusing the existing allocations.
    pub(crate) fn set(&mut self, p: PairRef<'_>) {
        self.key.clear();
        self.key.extend_from_slice(p.key);
        match (&mut self.value, p.value) {
            (Some(buf), Some(v)) => {
                buf.clear();
                buf.extend_from_slice(v);
            }
            (slot, v) => *slot = v.map(|v| v.to_vec()),
        }
    }
}

/// A pair borrowed from the buffer of whatever produced it. It is only valid
/// until the next call to [`Stream::read`] on that producer; use
/// [`PairRef::to_pair`] to keep it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairRef<'a> {
    pub key: &'a [u8],
    pub value: Option<&'a [u8]>,
}

impl<'a> PairRef<'a> {
    pub fn to_pair(&self) -> Pair {
        Pair {
            key: self.key.to_vec(),
            value: self.value.map(|v| v.to_vec()),
        }
    }
}

/// A source of pairs in strictly increasing key order.
pub trait Stream {
    /// Returns the next pair, or `None` once the stream is exhausted.
    fn read(&mut self) -> Result<Option<PairRef<'_>>>;
}

impl<S: Stream + ?Sized> Stream for &mut S {
    fn read(&mut self) -> Result<Option<PairRef<'_>>> {
        (**self).read()
    }
}

impl<S: Stream + ?Sized> Stream for Box<S> {
    fn read(&mut self) -> Result<Option<PairRef<'_>>> {
        (**self).read()
    }
}

/// A stream over pairs held in memory. The pairs must already be sorted.
#[derive(Debug, Default)]
pub struct VecStream {
    idx: usize,
    contents: Vec<Pair>,
}

impl VecStream {
    pub fn new(contents: Vec<Pair>) -> Self {
        VecStream { idx: 0, contents }
    }

}

impl FromIterator<Pair> for VecStream {
    fn from_iter<I: IntoIterator<Item = Pair>>(iter: I) -> Self {
        VecStream::new(iter.into_iter().collect())
    }
}

impl Stream for VecStream {
    fn read(&mut self) -> Result<Option<PairRef<'_>>> {
        if self.idx >= self.contents.len() {
            Ok(None)
        } else {
            self.idx += 1;
            Ok(Some(self.contents[self.idx - 1].view()))
        }
    }
}

/// Drains `s` into a vector of owned pairs.
pub fn collect<S: Stream>(mut s: S) -> Result<Vec<Pair>> {
    let mut out = Vec::new();
    while let Some(p) = s.read()? {
        out.push(p.to_pair());
    }
    Ok(out)
}
