use std::{
    fs::{self, File, OpenOptions},
    io::{BufWriter, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use tracing::trace;

use super::{
    filename, tmp_filename, FileHeader, FrameHeader, FILE_HEADER_LEN, FRAME_HEADER_LEN,
    MAX_FRAME_LEN,
};
use crate::error::{Error, Result};

/// Appends frames to one level file of a table under construction.
///
/// The file is written under a temporary name with a zeroed header, so that
/// nothing can open it as a valid level until [`FrameWriter::finish`] has
/// written the real header and [`FrameWriter::commit`] has moved it into
/// place.
#[derive(Debug)]
pub struct FrameWriter {
    path: PathBuf,
    tmp_path: PathBuf,
    file: BufWriter<File>,
    offset: u64,
    frames: usize,
}

impl FrameWriter {
    pub fn create<P: AsRef<Path>>(path: P, level: usize) -> Result<Self> {
        let tmp_path = tmp_filename(path.as_ref(), level);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        let mut file = BufWriter::new(file);
        file.write_all(&[0; FILE_HEADER_LEN as usize])?;
        Ok(FrameWriter {
            path: filename(path, level),
            tmp_path,
            file,
            offset: FILE_HEADER_LEN,
            frames: 0,
        })
    }

    /// Writes `payload` as the next frame and returns the offset of its frame
    /// header, which is what an index entry in the level above points at.
    pub fn append_frame(&mut self, payload: &[u8]) -> Result<u64> {
        if payload.len() > MAX_FRAME_LEN {
            return Err(Error::usage(format!(
                "frame of {} bytes exceeds the maximum of {}",
                payload.len(),
                MAX_FRAME_LEN
            )));
        }
        let off = self.offset;
        self.file
            .write_all(&FrameHeader::new(payload.len() as u32).encode())?;
        self.file.write_all(payload)?;
        self.offset += FRAME_HEADER_LEN + payload.len() as u64;
        self.frames += 1;
        Ok(off)
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Flushes every frame, writes the final file header and syncs the file.
    pub fn finish(&mut self, header: &FileHeader) -> Result<()> {
        self.file.flush()?;
        let file = self.file.get_mut();
        file.seek(SeekFrom::Start(0))?;
        header.write_to(file)?;
        file.sync_all()?;
        Ok(())
    }

    /// Moves the finished file to its level filename.
    pub fn commit(&self) -> Result<()> {
        fs::rename(&self.tmp_path, &self.path)?;
        trace!(path = %self.path.display(), frames = self.frames, "committed level file");
        Ok(())
    }

    pub(crate) fn discard(&self) {
        // Best effort: the file may already have been renamed.
        let _ = fs::remove_file(&self.tmp_path);
    }
}

/// Reads the frames of one level file, either in order through an internal
/// cursor or at arbitrary offsets.
///
/// Both kinds of read return a view into a buffer owned by the reader; it is
/// overwritten by the next read.
#[derive(Debug)]
pub struct FrameReader {
    path: PathBuf,
    file: File,
    header: FileHeader,
    file_len: u64,
    cursor: u64,
    buf: Vec<u8>,
}

impl FrameReader {
    pub fn open<P: AsRef<Path>>(path: P, level: usize) -> Result<Self> {
        let path = filename(path, level);
        let mut file = File::open(&path)?;
        let file_len = file.metadata()?.len();
        let header = FileHeader::read_from(&mut file)?;
        Ok(FrameReader {
            path,
            file,
            header,
            file_len,
            cursor: FILE_HEADER_LEN,
            buf: Vec::with_capacity(header.frame_size as usize),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// True if the file holds no frames.
    pub(crate) fn is_empty(&self) -> bool {
        self.file_len <= FILE_HEADER_LEN
    }

    /// Moves the sequential cursor back to the first frame.
    pub fn rewind(&mut self) {
        self.cursor = FILE_HEADER_LEN;
    }

    /// Returns the next frame and its offset, or `None` at end of file.
    pub fn read_frame(&mut self) -> Result<Option<(u64, &[u8])>> {
        if self.cursor >= self.file_len {
            return Ok(None);
        }
        let off = self.cursor;
        let len = self.load(off)?;
        self.cursor = off + FRAME_HEADER_LEN + len as u64;
        Ok(Some((off, &self.buf[..len])))
    }

    /// Returns the frame whose header starts at `off`. The sequential cursor
    /// is not moved.
    pub fn read_frame_at(&mut self, off: u64) -> Result<&[u8]> {
        let len = self.load(off)?;
        Ok(&self.buf[..len])
    }

    /// The frame returned by the most recent read.
    pub fn current(&self) -> &[u8] {
        &self.buf
    }

    fn load(&mut self, off: u64) -> Result<usize> {
        // Offsets come off disk, so the sum must not overflow.
        if off < FILE_HEADER_LEN || off > self.file_len.saturating_sub(FRAME_HEADER_LEN) {
            return Err(Error::corrupt(format!(
                "{}: no frame header at offset {}",
                self.path.display(),
                off
            )));
        }
        self.file.seek(SeekFrom::Start(off))?;
        let mut hdr = [0_u8; FRAME_HEADER_LEN as usize];
        self.file
            .read_exact(&mut hdr)
            .map_err(|e| Error::from_read(e, "frame header"))?;
        let hdr = FrameHeader::decode(&hdr)?;

        let len = hdr.len as usize;
        if off + FRAME_HEADER_LEN + len as u64 > self.file_len {
            return Err(Error::corrupt(format!(
                "{}: frame at offset {} runs past the end of the file",
                self.path.display(),
                off
            )));
        }
        // Resizing keeps the allocation, so the buffer only ever grows.
        self.buf.resize(len, 0);
        self.file
            .read_exact(&mut self.buf)
            .map_err(|e| Error::from_read(e, "frame"))?;
        Ok(len)
    }
}

#[cfg(test)]
mod test {
    use super::{FrameReader, FrameWriter};
    use crate::sst::{self, FileHeader, FILE_HEADER_LEN};

    fn write_frames(path: &std::path::Path, frames: &[&[u8]]) -> Vec<u64> {
        let mut w = FrameWriter::create(path, 0).unwrap();
        let offsets = frames.iter().map(|f| w.append_frame(f).unwrap()).collect();
        w.finish(&FileHeader {
            value_size: 0,
            frame_size: 8,
        })
        .unwrap();
        w.commit().unwrap();
        offsets
    }

    #[test]
    fn test_sequential_and_positioned() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t");
        let offsets = write_frames(&path, &[b"first", b"second frame", b"3"]);
        assert_eq!(offsets, vec![14, 24, 41]);

        let mut r = FrameReader::open(&path, 0).unwrap();
        assert_eq!(r.header().frame_size, 8);
        assert!(!r.is_empty());

        let mut seen = Vec::new();
        while let Some((off, frame)) = r.read_frame().unwrap() {
            seen.push((off, frame.to_vec()));
        }
        assert_eq!(
            seen,
            vec![
                (14, b"first".to_vec()),
                (24, b"second frame".to_vec()),
                (41, b"3".to_vec())
            ]
        );

        // Positioned reads leave the cursor alone.
        r.rewind();
        assert_eq!(r.read_frame_at(41).unwrap(), b"3");
        assert_eq!(r.read_frame().unwrap().unwrap().1, b"first");
        assert_eq!(r.read_frame_at(24).unwrap(), b"second frame");
        assert_eq!(r.read_frame().unwrap().unwrap().1, b"second frame");
    }

    #[test]
    fn test_bad_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t");
        write_frames(&path, &[b"first"]);

        let mut r = FrameReader::open(&path, 0).unwrap();
        assert!(r.read_frame_at(0).unwrap_err().is_corruption());
        assert!(r.read_frame_at(24).unwrap_err().is_corruption());
        // Lands inside the payload, which reads as a bogus frame header.
        assert!(r.read_frame_at(15).unwrap_err().is_corruption());
        assert!(r.read_frame_at(u64::MAX - 1).unwrap_err().is_corruption());
        assert!(r.read_frame_at(u64::MAX).unwrap_err().is_corruption());
    }

    #[test]
    fn test_unfinished_file_is_not_a_level() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t");
        let mut w = FrameWriter::create(&path, 0).unwrap();
        w.append_frame(b"payload").unwrap();
        drop(w);

        assert!(!path.exists());
        let tmp = sst::tmp_filename(&path, 0);
        assert!(tmp.exists());
        std::fs::rename(&tmp, &path).unwrap();
        assert!(matches!(
            FrameReader::open(&path, 0),
            Err(crate::Error::BadMagic(0))
        ));
    }

    #[test]
    fn test_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t");
        write_frames(&path, &[b"first", b"second"]);

        let data = std::fs::read(&path).unwrap();
        std::fs::write(&path, &data[..data.len() - 1]).unwrap();

        let mut r = FrameReader::open(&path, 0).unwrap();
        assert_eq!(r.read_frame().unwrap().unwrap().1, b"first");
        assert!(r.read_frame().unwrap_err().is_corruption());

        std::fs::write(&path, &data[..FILE_HEADER_LEN as usize - 1]).unwrap();
        assert!(FrameReader::open(&path, 0).unwrap_err().is_corruption());

        std::fs::write(&path, &data[..FILE_HEADER_LEN as usize + 3]).unwrap();
        let mut r = FrameReader::open(&path, 0).unwrap();
        assert!(r.read_frame().unwrap_err().is_corruption());
    }
}
