use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("bad magic number {0:#010x}")]
    BadMagic(u32),

    #[error("unsupported file version {major}.{minor}")]
    Version { major: u8, minor: u8 },

    #[error("unusable file header: {0}")]
    Format(String),

    #[error("corrupt sst: {0}")]
    Corrupt(String),

    #[error("{0}")]
    Usage(String),

    // Not a #[source]: anyhow::Error does not implement std::error::Error.
    #[error("combining values for key {key:?}: {cause:#}")]
    Combine { key: String, cause: anyhow::Error },

    #[error("invalid options: {0}")]
    Options(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for errors that make a level file unusable before any frame is
    /// read.
    pub fn is_format(&self) -> bool {
        matches!(
            self,
            Error::BadMagic(_) | Error::Version { .. } | Error::Format(_)
        )
    }

    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Corrupt(_))
    }

    pub(crate) fn corrupt<S: Into<String>>(msg: S) -> Self {
        Error::Corrupt(msg.into())
    }

    pub(crate) fn usage<S: Into<String>>(msg: S) -> Self {
        Error::Usage(msg.into())
    }

    // Short reads at a declared length mean the file was truncated.
    pub(crate) fn from_read(e: std::io::Error, what: &str) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::Corrupt(format!("short read of {}", what))
        } else {
            Error::Io(e)
        }
    }
}

#[test]
fn test_classify() {
    assert!(Error::BadMagic(7).is_format());
    assert!(Error::Version { major: 2, minor: 0 }.is_format());
    assert!(!Error::corrupt("x").is_format());
    assert!(Error::corrupt("x").is_corruption());

    let eof = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
    assert!(Error::from_read(eof, "frame").is_corruption());
    let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "no");
    assert!(matches!(Error::from_read(denied, "frame"), Error::Io(_)));
}
