use std::path::Path;

use super::frame::FrameReader;
use crate::{
    encoding::{first_key, IndexEntries, Pairs},
    error::Result,
    stream::Pair,
};

/// Where a frame lives in its level file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameInfo {
    pub first_key: Vec<u8>,
    pub offset: u64,
    pub len: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Pair(Pair),
    Index { key: Vec<u8>, offset: u64 },
}

impl Entry {
    pub fn key(&self) -> &[u8] {
        match self {
            Entry::Pair(p) => &p.key,
            Entry::Index { key, .. } => key,
        }
    }
}

/// Read-only access to the raw frames of a single level, for inspecting a
/// table by hand.
#[derive(Debug)]
pub struct Dump {
    frames: FrameReader,
    level: usize,
}

impl Dump {
    pub fn open<P: AsRef<Path>>(path: P, level: usize) -> Result<Self> {
        Ok(Dump {
            frames: FrameReader::open(path, level)?,
            level,
        })
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn value_size(&self) -> u32 {
        self.frames.header().value_size
    }

    pub fn frame_size(&self) -> u32 {
        self.frames.header().frame_size
    }

    /// Lists every frame of the level in file order.
    pub fn frames(&mut self) -> Result<Vec<FrameInfo>> {
        self.frames.rewind();
        let mut out = Vec::new();
        while let Some((offset, frame)) = self.frames.read_frame()? {
            out.push(FrameInfo {
                first_key: first_key(frame)?.to_vec(),
                offset,
                len: frame.len(),
            });
        }
        Ok(out)
    }

    /// Returns the offset of the frame whose first key is `key`.
    pub fn find(&mut self, key: &[u8]) -> Result<Option<u64>> {
        self.frames.rewind();
        while let Some((offset, frame)) = self.frames.read_frame()? {
            let first = first_key(frame)?;
            if first == key {
                return Ok(Some(offset));
            }
            if first > key {
                break;
            }
        }
        Ok(None)
    }

    /// Decodes the frame at `offset`: pairs at level 0, index entries above.
    pub fn entries_at(&mut self, offset: u64) -> Result<Vec<Entry>> {
        let frame = self.frames.read_frame_at(offset)?;
        if self.level == 0 {
            Pairs::new(frame)
                .map(|p| p.map(|p| Entry::Pair(p.to_pair())))
                .collect()
        } else {
            IndexEntries::new(frame)
                .map(|e| {
                    e.map(|(key, offset)| Entry::Index {
                        key: key.to_vec(),
                        offset,
                    })
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod test {
    use super::{Dump, Entry};
    use crate::{
        options::Options,
        stream::{Pair, VecStream},
    };

    #[test]
    fn test_dump_levels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t");
        let pairs: VecStream = ["a", "b", "c", "d", "e", "f"]
            .iter()
            .enumerate()
            .map(|(i, k)| Pair::new(*k, format!("{}", i + 1)))
            .collect();
        let opts = Options {
            frame_size: 32,
            value_size: 1,
        };
        crate::build(&path, &opts, pairs).unwrap();

        let mut base = Dump::open(&path, 0).unwrap();
        assert_eq!(base.value_size(), 1);
        assert_eq!(base.frame_size(), 32);
        let frames = base.frames().unwrap();
        let summary: Vec<_> = frames
            .iter()
            .map(|f| (f.first_key.as_slice(), f.offset, f.len))
            .collect();
        assert_eq!(summary, vec![(&b"a"[..], 14, 40), (&b"e"[..], 59, 20)]);

        assert_eq!(base.find(b"e").unwrap(), Some(59));
        assert_eq!(base.find(b"b").unwrap(), None);
        assert_eq!(
            base.entries_at(59).unwrap(),
            vec![Entry::Pair(Pair::new("e", "5")), Entry::Pair(Pair::new("f", "6"))]
        );

        let mut index = Dump::open(&path, 1).unwrap();
        assert_eq!(
            index.entries_at(14).unwrap(),
            vec![
                Entry::Index {
                    key: b"a".to_vec(),
                    offset: 14
                },
                Entry::Index {
                    key: b"e".to_vec(),
                    offset: 59
                },
            ]
        );
        assert!(Dump::open(&path, 2).is_err());
    }
}
