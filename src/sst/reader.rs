use std::path::Path;

use super::frame::FrameReader;
use crate::{
    encoding::decode_pair,
    error::Result,
    stream::{PairRef, Stream},
};

/// Reads the pairs of a table in key order, straight off level 0.
///
/// The pairs handed out borrow the reader's frame buffer, so each is only
/// valid until the next call to `read`.
#[derive(Debug)]
pub struct Reader {
    frames: FrameReader,
    // Position of the next pair within the current frame, and the frame's
    // length.
    pos: usize,
    len: usize,
}

impl Reader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Reader {
            frames: FrameReader::open(path, 0)?,
            pos: 0,
            len: 0,
        })
    }

    /// The value size declared when the table was built; 0 for variable
    /// sized values.
    pub fn value_size(&self) -> u32 {
        self.frames.header().value_size
    }

    pub fn frame_size(&self) -> u32 {
        self.frames.header().frame_size
    }
}

impl Stream for Reader {
    fn read(&mut self) -> Result<Option<PairRef<'_>>> {
        while self.pos >= self.len {
            match self.frames.read_frame()? {
                None => return Ok(None),
                Some((_, frame)) => self.len = frame.len(),
            }
            self.pos = 0;
        }
        let frame = &self.frames.current()[self.pos..];
        match decode_pair(frame)? {
            Some((pair, n)) => {
                self.pos += n;
                Ok(Some(pair))
            }
            None => Ok(None),
        }
    }
}
