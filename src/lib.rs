//! Sorted-string tables: immutable, indexed files mapping byte-string keys to
//! optional byte-string values.
//!
//! A table is built once from a stream of pairs in strictly increasing key
//! order and then only read. Point lookups descend a hierarchy of index
//! levels, reading one frame per level; [`Reader`] streams the pairs back in
//! order, and [`Combiner`] merges several streams so that tables can be
//! merged into a new one.

use std::path::Path;

pub mod bitmap;
pub mod combiner;
pub mod encoding;
pub mod error;
pub mod options;
pub mod sst;
pub mod stream;
pub mod table;

pub use combiner::{Combine, Combiner};
pub use error::{Error, Result};
pub use options::Options;
pub use sst::{dump::Dump, finder::Finder, reader::Reader, writer::Writer};
pub use stream::{Pair, PairRef, Stream, VecStream};

/// Deletes every file of the table at `path`. Succeeds if there is no table.
pub fn remove<P: AsRef<Path>>(path: P) -> Result<()> {
    sst::remove(path)
}

/// Builds a table at `path` from `stream`, which must be sorted by key.
///
/// Fails if a table already exists at `path`; [`remove`] it first to rebuild.
pub fn build<P, S>(path: P, opts: &Options, stream: S) -> Result<()>
where
    P: AsRef<Path>,
    S: Stream,
{
    let mut w = Writer::create(path, opts)?;
    w.copy(stream)?;
    w.finish()
}

/// Builds a table at `out` holding the union of the tables at `inputs`,
/// folding the values of keys that appear in more than one input with
/// `combine`.
pub fn merge<P, Q, F>(out: P, opts: &Options, inputs: &[Q], combine: F) -> Result<()>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
    F: Combine,
{
    let readers = inputs
        .iter()
        .map(Reader::open)
        .collect::<Result<Vec<_>>>()?;
    build(out, opts, Combiner::new(readers, combine))
}

/// Looks up `key` in the table at `path`. A missing key is `Ok(None)`.
pub fn lookup<P: AsRef<Path>>(path: P, key: &[u8]) -> Result<Option<Pair>> {
    Finder::open(path)?.lookup(key)
}

#[cfg(test)]
mod test {
    use crate::{bitmap, stream::collect, Options, Pair, Reader, VecStream};

    fn bitmap_table(path: &std::path::Path, entries: &[(&str, &[u32])]) {
        let pairs: VecStream = entries
            .iter()
            .map(|(k, v)| Pair::new(*k, bitmap::encode(v.iter().copied()).unwrap()))
            .collect();
        crate::build(path, &Options::default(), pairs).unwrap();
    }

    fn lookup_bitmap(path: &std::path::Path, key: &str) -> Option<String> {
        crate::lookup(path, key.as_bytes()).unwrap().map(|p| {
            bitmap::format(&bitmap::decode(p.value.as_deref().unwrap()).unwrap())
        })
    }

    #[test]
    fn test_merge_bitmaps() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        let out = dir.path().join("out");
        bitmap_table(&a, &[("10.0.0.1", &[7]), ("10.0.0.2", &[9])]);
        bitmap_table(&b, &[("10.0.0.1", &[8]), ("10.0.0.3", &[1, 2])]);

        crate::merge(&out, &Options::default(), &[&a, &b], bitmap::or).unwrap();
        assert_eq!(lookup_bitmap(&out, "10.0.0.1").as_deref(), Some("{7, 8}"));
        assert_eq!(lookup_bitmap(&out, "10.0.0.2").as_deref(), Some("{9}"));
        assert_eq!(lookup_bitmap(&out, "10.0.0.3").as_deref(), Some("{1, 2}"));
        assert_eq!(lookup_bitmap(&out, "10.0.0.4"), None);

        let keys: Vec<_> = collect(Reader::open(&out).unwrap())
            .unwrap()
            .into_iter()
            .map(|p| p.key)
            .collect();
        assert_eq!(keys, vec![b"10.0.0.1".to_vec(), b"10.0.0.2".to_vec(), b"10.0.0.3".to_vec()]);
    }

    #[test]
    fn test_merge_failures() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let out = dir.path().join("out");
        crate::build(
            &a,
            &Options::default(),
            VecStream::new(vec![Pair::new("k", "not a bitmap")]),
        )
        .unwrap();

        // A missing input fails before anything is written.
        let missing = dir.path().join("missing");
        assert!(crate::merge(&out, &Options::default(), &[&a, &missing], bitmap::or).is_err());
        assert!(!out.exists());

        let err = crate::merge(&out, &Options::default(), &[&a, &a], bitmap::or).unwrap_err();
        assert!(matches!(err, crate::Error::Combine { .. }), "{}", err);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t");
        bitmap_table(&path, &[("k", &[1])]);
        crate::remove(&path).unwrap();
        bitmap_table(&path, &[("k", &[2])]);
        assert_eq!(lookup_bitmap(&path, "k").as_deref(), Some("{2}"));
    }
}
