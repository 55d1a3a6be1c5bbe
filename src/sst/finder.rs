use std::path::Path;

use tracing::debug;

use super::{filename, frame::FrameReader};
use crate::{
    encoding::{first_key, IndexEntries, Pairs},
    error::{Error, Result},
    stream::Pair,
};

/// Answers point lookups against a built table by walking down its index
/// levels, reading one frame per level.
#[derive(Debug)]
pub struct Finder {
    // Indexed by level; the last one is the root.
    levels: Vec<FrameReader>,
}

enum Probe<'a> {
    Found(crate::stream::PairRef<'a>),
    // The frame holds keys greater than the target, so no later frame can
    // hold the target.
    Passed,
    Exhausted,
}

impl Finder {
    /// Opens every level of the table at `path`. The highest level present is
    /// taken to be the root.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut top = 0;
        while filename(path, top + 1).exists() {
            top += 1;
        }
        let mut levels = (0..=top)
            .rev()
            .map(|level| FrameReader::open(path, level))
            .collect::<Result<Vec<_>>>()?;
        levels.reverse();
        debug!(path = %path.display(), levels = levels.len(), "opened table");
        Ok(Finder { levels })
    }

    pub fn levels(&self) -> usize {
        self.levels.len()
    }

    /// Looks up `key`, returning the stored pair if the key is present.
    pub fn lookup(&mut self, key: &[u8]) -> Result<Option<Pair>> {
        let top = self.levels.len() - 1;
        if top == 0 {
            return self.scan_base(key);
        }

        let mut off = match self.search_root(key)? {
            Some(off) => off,
            None => return Ok(None),
        };
        for level in (1..top).rev() {
            let frame = self.levels[level].read_frame_at(off)?;
            off = match seek_index(frame, key)? {
                Some(off) => off,
                None => {
                    return Err(Error::corrupt(format!(
                        "{}: frame at offset {} does not cover the key its index entry points to",
                        self.levels[level].path().display(),
                        off
                    )))
                }
            };
        }

        let frame = self.levels[0].read_frame_at(off)?;
        match probe_pairs(frame, key)? {
            Probe::Found(pair) => Ok(Some(pair.to_pair())),
            Probe::Passed | Probe::Exhausted => Ok(None),
        }
    }

    // Finds the offset in the level below the root of the frame that could
    // hold `key`. The root is normally a single frame, but any number of
    // frames is read in order.
    fn search_root(&mut self, key: &[u8]) -> Result<Option<u64>> {
        let top = self.levels.len() - 1;
        let root = &mut self.levels[top];
        root.rewind();
        let mut found = None;
        while let Some((_, frame)) = root.read_frame()? {
            if first_key(frame)? > key {
                break;
            }
            if let Some(off) = seek_index(frame, key)? {
                found = Some(off);
            }
        }
        Ok(found)
    }

    // A table without index levels is searched by reading level 0 from the
    // start.
    fn scan_base(&mut self, key: &[u8]) -> Result<Option<Pair>> {
        let base = &mut self.levels[0];
        if base.is_empty() {
            return Ok(None);
        }
        base.rewind();
        while let Some((_, frame)) = base.read_frame()? {
            match probe_pairs(frame, key)? {
                Probe::Found(pair) => return Ok(Some(pair.to_pair())),
                Probe::Passed => return Ok(None),
                Probe::Exhausted => (),
            }
        }
        Ok(None)
    }
}

// Returns the offset of the last entry in an index frame whose key is <= key.
fn seek_index(frame: &[u8], key: &[u8]) -> Result<Option<u64>> {
    let mut found = None;
    let mut prev: Option<&[u8]> = None;
    for entry in IndexEntries::new(frame) {
        let (k, off) = entry?;
        if let Some(prev) = prev {
            if k <= prev {
                return Err(Error::corrupt("index keys out of order"));
            }
        }
        if k > key {
            break;
        }
        found = Some(off);
        prev = Some(k);
    }
    Ok(found)
}

fn probe_pairs<'a>(frame: &'a [u8], key: &[u8]) -> Result<Probe<'a>> {
    for pair in Pairs::new(frame) {
        let pair = pair?;
        if pair.key == key {
            return Ok(Probe::Found(pair));
        }
        if pair.key > key {
            return Ok(Probe::Passed);
        }
    }
    Ok(Probe::Exhausted)
}

#[cfg(test)]
mod test {
    use super::Finder;
    use crate::{
        bitmap,
        options::Options,
        sst,
        stream::{Pair, VecStream},
    };

    #[test]
    fn test_ip_bitmaps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sst:type:ip");
        let pairs = VecStream::new(vec![
            Pair::new("10.0.0.1", bitmap::encode([7]).unwrap()),
            Pair::new("10.0.0.2", bitmap::encode([9]).unwrap()),
        ]);
        crate::build(&path, &Options::default(), pairs).unwrap();

        let mut finder = Finder::open(&path).unwrap();
        assert_eq!(finder.levels(), 1);
        let found = finder.lookup(b"10.0.0.1").unwrap().unwrap();
        let value = bitmap::decode(found.value.as_deref().unwrap()).unwrap();
        assert_eq!(value.iter().collect::<Vec<_>>(), vec![7]);
        assert_eq!(finder.lookup(b"10.0.0.3").unwrap(), None);
    }

    #[test]
    fn test_key_only_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t");
        let pairs: VecStream = (0..200)
            .map(|i| Pair::key_only(format!("member{:04}", i * 2)))
            .collect();
        let opts = Options {
            frame_size: 48,
            ..Options::default()
        };
        crate::build(&path, &opts, pairs).unwrap();

        let mut finder = Finder::open(&path).unwrap();
        assert!(finder.levels() > 2);
        for i in 0..400 {
            let key = format!("member{:04}", i);
            let found = finder.lookup(key.as_bytes()).unwrap();
            if i % 2 == 0 {
                assert_eq!(found, Some(Pair::key_only(key)));
            } else {
                assert_eq!(found, None, "{}", key);
            }
        }
        assert_eq!(finder.lookup(b"a").unwrap(), None);
        assert_eq!(finder.lookup(b"z").unwrap(), None);
    }

    #[test]
    fn test_empty_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t");
        crate::build(&path, &Options::default(), VecStream::default()).unwrap();
        let mut finder = Finder::open(&path).unwrap();
        assert_eq!(finder.lookup(b"anything").unwrap(), None);
    }

    #[test]
    fn test_open_failures() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t");
        assert!(Finder::open(&path).is_err());

        let pairs: VecStream = (0..100)
            .map(|i| Pair::new(format!("{:03}", i), "v"))
            .collect();
        let opts = Options {
            frame_size: 32,
            ..Options::default()
        };
        crate::build(&path, &opts, pairs).unwrap();

        let top = sst::filename(&path, sst::num_levels(&path) - 1);
        let mut data = std::fs::read(&top).unwrap();
        data[0] ^= 0xff;
        std::fs::write(&top, &data).unwrap();
        assert!(Finder::open(&path).unwrap_err().is_format());
    }

    #[test]
    fn test_bad_index_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t");
        let pairs: VecStream = (0..100)
            .map(|i| Pair::new(format!("{:03}", i), "v"))
            .collect();
        let opts = Options {
            frame_size: 32,
            ..Options::default()
        };
        crate::build(&path, &opts, pairs).unwrap();
        assert!(sst::num_levels(&path) > 2);

        // The offset of the first entry of level 1's first frame: file
        // header, frame header, key length, then the 3-byte key.
        let level1 = sst::filename(&path, 1);
        let mut data = std::fs::read(&level1).unwrap();
        data[26..34].copy_from_slice(&(u64::MAX - 1).to_be_bytes());
        std::fs::write(&level1, &data).unwrap();

        let mut finder = Finder::open(&path).unwrap();
        let err = finder.lookup(b"000").unwrap_err();
        assert!(err.is_corruption(), "{}", err);
    }

    #[test]
    fn test_truncated_base() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t");
        let pairs: VecStream = (0..100)
            .map(|i| Pair::new(format!("{:03}", i), "v"))
            .collect();
        let opts = Options {
            frame_size: 32,
            ..Options::default()
        };
        crate::build(&path, &opts, pairs).unwrap();

        let data = std::fs::read(&path).unwrap();
        std::fs::write(&path, &data[..data.len() - 1]).unwrap();

        // The last key lives in the damaged frame.
        let mut finder = Finder::open(&path).unwrap();
        assert!(finder.lookup(b"099").unwrap_err().is_corruption());
    }
}
