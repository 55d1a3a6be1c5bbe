use std::{
    ffi::OsString,
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    sst::MAX_FRAME_SIZE,
};

pub const DEFAULT_FRAME_SIZE: usize = 32 * 1024;

/// Settings for building a table. They are recorded in every level file's
/// header; nothing else about a table is configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Minimum payload size of a frame. Frames close at the first entry
    /// boundary at or past it.
    pub frame_size: usize,
    /// Declared width of values, or 0 if they vary. Recorded, not enforced.
    pub value_size: u32,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            frame_size: DEFAULT_FRAME_SIZE,
            value_size: 0,
        }
    }
}

impl Options {
    /// Reads options from a JSON file. Missing fields take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let opts: Options = serde_json::from_str(&contents)?;
        opts.validate()?;
        Ok(opts)
    }

    /// Writes the options as JSON, replacing the file atomically.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut tmp: OsString = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let mut file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .create(true)
            .open(&tmp)?;
        let encoded = serde_json::to_string_pretty(self)?;
        file.write_all(encoded.as_bytes())?;
        file.sync_all()?;
        fs::rename(tmp, path)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.frame_size == 0 {
            return Err(Error::usage("frame size must be positive"));
        }
        if self.frame_size > MAX_FRAME_SIZE {
            return Err(Error::usage(format!(
                "frame size {} exceeds the maximum of {}",
                self.frame_size, MAX_FRAME_SIZE
            )));
        }
        if self.value_size as usize > MAX_FRAME_SIZE {
            return Err(Error::usage(format!(
                "value size {} exceeds the maximum of {}",
                self.value_size, MAX_FRAME_SIZE
            )));
        }
        Ok(())
    }
}
