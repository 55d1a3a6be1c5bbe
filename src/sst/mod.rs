pub mod dump;
pub mod finder;
pub mod frame;
pub mod reader;
pub mod writer;

// This package provides facilities to both build and query Sorted-String
// Tables (SSTs).
//
// An SST is an indexed, immutable, durable mapping from keys to (optional)
// values. It is built once, in a single pass, from a stream of pairs that is
// already sorted, and is never modified afterwards. Rebuilding a table means
// removing its files and writing new ones.
//
// Physically, an SST is a hierarchy of _level files_. Level 0 holds the data
// and lives at the table's path; level N > 0 lives at "<path>.N" and is an
// index over level N-1. Every level file starts with a fixed file header:
//
//   u32 magic | u8 major | u8 minor | u32 value size | u32 frame size
//
// followed by a sequence of _frames_, each of which is
//
//   u8 compression (always 0) | u32 payload length | payload
//
// A level-0 payload is a run of encoded pairs; a payload at any higher level
// is a run of (key, offset) entries, one per frame of the level below, giving
// that frame's first key and the offset of its frame header. See the
// encoding module for the entry layouts. All integers are big-endian.
//
// Frames are filled to at least the configured frame size and closed at an
// entry boundary, so an entry never spans frames. Index levels are added
// until a level fits in a single frame; that frame is the root. A table whose
// data fits in one frame has no index files at all.

use std::{
    ffi::OsString,
    fs,
    io::{self, Read, Write},
    path::{Path, PathBuf},
};

use byteorder::{BigEndian, ByteOrder, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};

pub const MAGIC: u32 = 0x5353_5446;
pub const VERSION_MAJOR: u8 = 1;
pub const VERSION_MINOR: u8 = 0;

pub const FILE_HEADER_LEN: u64 = 4 + 1 + 1 + 4 + 4;
pub const FRAME_HEADER_LEN: u64 = 1 + 4;

pub const COMPRESSION_NONE: u8 = 0;

/// Upper bound on the frame size and value size a file header may declare,
/// and on the encoded size of a single entry.
pub const MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Upper bound on the payload length of any one frame. A frame can overshoot
/// the frame size by at most one entry.
pub const MAX_FRAME_LEN: usize = 32 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub value_size: u32,
    pub frame_size: u32,
}

impl FileHeader {
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<BigEndian>(MAGIC)?;
        w.write_u8(VERSION_MAJOR)?;
        w.write_u8(VERSION_MINOR)?;
        w.write_u32::<BigEndian>(self.value_size)?;
        w.write_u32::<BigEndian>(self.frame_size)?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let mut hdr = [0_u8; FILE_HEADER_LEN as usize];
        r.read_exact(&mut hdr)
            .map_err(|e| Error::from_read(e, "file header"))?;
        let mut hdr = &hdr[..];

        let magic = hdr.read_u32::<BigEndian>()?;
        if magic != MAGIC {
            return Err(Error::BadMagic(magic));
        }
        let major = hdr.read_u8()?;
        let minor = hdr.read_u8()?;
        if major != VERSION_MAJOR {
            return Err(Error::Version { major, minor });
        }
        let value_size = hdr.read_u32::<BigEndian>()?;
        if value_size as usize > MAX_FRAME_SIZE {
            return Err(Error::Format(format!(
                "implausible value size {}",
                value_size
            )));
        }
        let frame_size = hdr.read_u32::<BigEndian>()?;
        if frame_size == 0 || frame_size as usize > MAX_FRAME_SIZE {
            return Err(Error::Format(format!(
                "implausible frame size {}",
                frame_size
            )));
        }

        Ok(FileHeader {
            value_size,
            frame_size,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub compression: u8,
    pub len: u32,
}

impl FrameHeader {
    pub fn new(len: u32) -> Self {
        FrameHeader {
            compression: COMPRESSION_NONE,
            len,
        }
    }

    pub fn encode(&self) -> [u8; FRAME_HEADER_LEN as usize] {
        let mut hdr = [0_u8; FRAME_HEADER_LEN as usize];
        hdr[0] = self.compression;
        BigEndian::write_u32(&mut hdr[1..], self.len);
        hdr
    }

    pub fn decode(hdr: &[u8; FRAME_HEADER_LEN as usize]) -> Result<Self> {
        let compression = hdr[0];
        if compression != COMPRESSION_NONE {
            return Err(Error::corrupt(format!(
                "unknown compression type {}",
                compression
            )));
        }
        let len = BigEndian::read_u32(&hdr[1..]);
        if len as usize > MAX_FRAME_LEN {
            return Err(Error::corrupt(format!("implausible frame length {}", len)));
        }
        Ok(FrameHeader { compression, len })
    }
}

/// Returns the path of the file holding `level` of the table at `path`.
pub fn filename<P: AsRef<Path>>(path: P, level: usize) -> PathBuf {
    if level == 0 {
        return path.as_ref().to_path_buf();
    }
    let mut name: OsString = path.as_ref().as_os_str().to_owned();
    name.push(format!(".{}", level));
    name.into()
}

// Level files are written under this name and renamed into place once the
// whole table is complete.
pub(crate) fn tmp_filename<P: AsRef<Path>>(path: P, level: usize) -> PathBuf {
    let mut name: OsString = filename(path, level).into_os_string();
    name.push(".tmp");
    name.into()
}

/// Reports whether a table's data file exists at `path`.
pub fn exists<P: AsRef<Path>>(path: P) -> bool {
    filename(path, 0).exists()
}

/// Returns the number of contiguous level files present for `path`, counting
/// up from level 0.
pub fn num_levels<P: AsRef<Path>>(path: P) -> usize {
    let mut n = 0;
    while filename(path.as_ref(), n).exists() {
        n += 1;
    }
    n
}

fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Deletes every level file of the table at `path`, along with any temporary
/// files left by an interrupted build. Removing a table that does not exist
/// is not an error.
pub fn remove<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    let mut level = 0;
    loop {
        let a = remove_if_exists(&filename(path, level))?;
        let b = remove_if_exists(&tmp_filename(path, level))?;
        // Level 0 may be missing while index levels are not, if a build died
        // while committing.
        if !a && !b && level > 0 {
            break;
        }
        level += 1;
    }
    Ok(())
}
