use std::path::{Path, PathBuf};

use tracing::debug;

use super::{filename, frame::FrameWriter, FileHeader, MAX_FRAME_SIZE};
use crate::{
    encoding::{encode_index, encode_pair, pair_len},
    error::{Error, Result},
    options::Options,
    stream::Stream,
};

// An index frame must hold at least this many entries before it is closed,
// so that each index level has fewer frames than the level below it.
const MIN_INDEX_ENTRIES: usize = 2;

// Accumulates the entries of one level into frames.
#[derive(Debug)]
struct LevelWriter {
    level: usize,
    file: FrameWriter,
    buf: Vec<u8>,
    entries: usize,
    first_key: Vec<u8>,
    // The index entry for this level's first frame. It is held back until a
    // second frame shows that the level needs an index above it.
    pending: Option<(Vec<u8>, u64)>,
}

impl LevelWriter {
    fn new<P: AsRef<Path>>(path: P, level: usize, frame_size: usize) -> Result<Self> {
        Ok(LevelWriter {
            level,
            file: FrameWriter::create(path, level)?,
            buf: Vec::with_capacity(frame_size),
            entries: 0,
            first_key: Vec::new(),
            pending: None,
        })
    }

    fn start_entry(&mut self, key: &[u8]) {
        if self.entries == 0 {
            self.first_key.clear();
            self.first_key.extend_from_slice(key);
        }
        self.entries += 1;
    }

    fn add_pair(&mut self, key: &[u8], value: Option<&[u8]>) {
        self.start_entry(key);
        encode_pair(&mut self.buf, key, value);
    }

    fn add_index(&mut self, key: &[u8], offset: u64) {
        self.start_entry(key);
        encode_index(&mut self.buf, key, offset);
    }

    fn full(&self, frame_size: usize) -> bool {
        self.buf.len() >= frame_size && (self.level == 0 || self.entries >= MIN_INDEX_ENTRIES)
    }

    // Writes out the buffered entries as a frame and returns the index entry
    // that points at it.
    fn flush(&mut self) -> Result<Option<(Vec<u8>, u64)>> {
        if self.entries == 0 {
            return Ok(None);
        }
        let off = self.file.append_frame(&self.buf)?;
        self.buf.clear();
        self.entries = 0;
        Ok(Some((std::mem::take(&mut self.first_key), off)))
    }
}

/// Builds a table from pairs presented in strictly increasing key order.
///
/// Each level is a [`LevelWriter`] that packs entries into frames; closing a
/// frame at level N feeds its (first key, offset) entry to level N+1, which is
/// created on demand. Memory use is one frame buffer per level.
///
/// Nothing is visible at the table's path until [`Writer::finish`] returns.
/// Dropping a writer without finishing it deletes its partial files.
#[derive(Debug)]
pub struct Writer {
    path: PathBuf,
    frame_size: usize,
    value_size: u32,
    levels: Vec<LevelWriter>,
    last_key: Option<Vec<u8>>,
    pairs: u64,
    done: bool,
}

impl Writer {
    pub fn create<P: AsRef<Path>>(path: P, opts: &Options) -> Result<Self> {
        opts.validate()?;
        let path = path.as_ref().to_path_buf();
        if super::exists(&path) {
            return Err(Error::usage(format!(
                "table {} already exists",
                path.display()
            )));
        }
        let level0 = LevelWriter::new(&path, 0, opts.frame_size)?;
        Ok(Writer {
            path,
            frame_size: opts.frame_size,
            value_size: opts.value_size,
            levels: vec![level0],
            last_key: None,
            pairs: 0,
            done: false,
        })
    }

    pub fn write(&mut self, key: &[u8], value: Option<&[u8]>) -> Result<()> {
        if key.is_empty() {
            return Err(Error::usage("empty key"));
        }
        if let Some(last) = &self.last_key {
            if key <= last.as_slice() {
                return Err(Error::usage(format!(
                    "keys out of order: {:?} follows {:?}",
                    String::from_utf8_lossy(key),
                    String::from_utf8_lossy(last)
                )));
            }
        }
        if pair_len(key, value) > MAX_FRAME_SIZE {
            return Err(Error::usage(format!(
                "entry for key {:?} is larger than {} bytes",
                String::from_utf8_lossy(key),
                MAX_FRAME_SIZE
            )));
        }

        let last = self.last_key.get_or_insert_with(Vec::new);
        last.clear();
        last.extend_from_slice(key);
        self.pairs += 1;

        self.levels[0].add_pair(key, value);
        if self.levels[0].full(self.frame_size) {
            self.flush_level(0)?;
        }
        Ok(())
    }

    /// Writes every pair of `stream`.
    pub fn copy<S: Stream>(&mut self, mut stream: S) -> Result<()> {
        while let Some(pair) = stream.read()? {
            self.write(pair.key, pair.value)?;
        }
        Ok(())
    }

    // Flushes the buffer of `level` and pushes the resulting index entry
    // upwards, cascading through every level that fills up as a result.
    fn flush_level(&mut self, mut level: usize) -> Result<()> {
        loop {
            let (key, off) = match self.levels[level].flush()? {
                Some(entry) => entry,
                None => return Ok(()),
            };
            let parent = level + 1;
            if parent == self.levels.len() {
                match self.levels[level].pending.take() {
                    None => {
                        // Only one frame so far; this level may be the root.
                        self.levels[level].pending = Some((key, off));
                        return Ok(());
                    }
                    Some((first_key, first_off)) => {
                        debug!(level = parent, "adding index level");
                        let mut up = LevelWriter::new(&self.path, parent, self.frame_size)?;
                        up.add_index(&first_key, first_off);
                        self.levels.push(up);
                    }
                }
            }
            self.levels[parent].add_index(&key, off);
            if !self.levels[parent].full(self.frame_size) {
                return Ok(());
            }
            level = parent;
        }
    }

    /// Flushes the partial frame of every level, finalizes the file headers
    /// and moves the level files into place.
    pub fn finish(mut self) -> Result<()> {
        // Flushing a level can create the one above it.
        let mut level = 0;
        while level < self.levels.len() {
            self.flush_level(level)?;
            level += 1;
        }

        let header = FileHeader {
            value_size: self.value_size,
            frame_size: self.frame_size as u32,
        };
        for l in self.levels.iter_mut() {
            l.file.finish(&header)?;
            debug!(
                path = %self.path.display(),
                level = l.level,
                frames = l.file.frames(),
                "finished level"
            );
        }

        // Level 0 goes last: a table is visible once its data file is.
        for l in self.levels.iter().rev() {
            l.file.commit()?;
        }
        self.done = true;

        // Drop index files of an older, deeper table at the same path.
        let mut stale = self.levels.len();
        while filename(&self.path, stale).exists() {
            std::fs::remove_file(filename(&self.path, stale))?;
            stale += 1;
        }

        debug!(
            path = %self.path.display(),
            pairs = self.pairs,
            levels = self.levels.len(),
            "built table"
        );
        Ok(())
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        if !self.done {
            for l in &self.levels {
                l.file.discard();
            }
        }
    }
}
