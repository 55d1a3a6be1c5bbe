use std::{collections::BTreeMap, io::BufRead};

use crate::{
    bitmap,
    error::{Error, Result},
    stream::{Pair, VecStream},
};

/// How the text after a line's last `:` is turned into a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueFormat {
    /// Hex digits; an empty payload is an absent value.
    Hex,
    /// A comma-separated list of integers, stored as a roaring bitmap. An
    /// empty list gets random integers.
    Bitmap,
}

/// Collects `key:payload` lines into a sorted stream of pairs. Lines without a
/// `:` are skipped, and a key seen twice keeps its last value.
#[derive(Debug)]
pub struct Table {
    format: ValueFormat,
    pairs: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl Table {
    pub fn new(format: ValueFormat) -> Self {
        Table {
            format,
            pairs: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn scan<R: BufRead>(&mut self, r: R) -> Result<()> {
        for (n, line) in r.lines().enumerate() {
            self.parse(&line?)
                .map_err(|e| Error::usage(format!("line {}: {}", n + 1, e)))?;
        }
        Ok(())
    }

    pub fn parse(&mut self, line: &str) -> Result<()> {
        let (key, payload) = match line.rfind(':') {
            Some(idx) => (&line[..idx], line[idx + 1..].trim()),
            None => return Ok(()),
        };
        if key.is_empty() {
            return Err(Error::usage("empty key"));
        }
        let value = match self.format {
            ValueFormat::Hex => unhex(payload)?,
            ValueFormat::Bitmap => Some(parse_bitmap(payload)?),
        };
        self.pairs.insert(key.as_bytes().to_vec(), value);
        Ok(())
    }

    pub fn into_stream(self) -> VecStream {
        self.pairs
            .into_iter()
            .map(|(key, value)| Pair { key, value })
            .collect()
    }
}

fn unhex(s: &str) -> Result<Option<Vec<u8>>> {
    if s.len() % 2 != 0 {
        return Err(Error::usage(format!(
            "hex value {:?} has an odd number of digits",
            s
        )));
    }
    if s.is_empty() {
        return Ok(None);
    }
    let digit = |b: u8| {
        (b as char)
            .to_digit(16)
            .map(|d| d as u8)
            .ok_or_else(|| Error::usage(format!("bad hex digit {:?} in {:?}", b as char, s)))
    };
    s.as_bytes()
        .chunks(2)
        .map(|pair| Ok(digit(pair[0])? << 4 | digit(pair[1])?))
        .collect::<Result<Vec<u8>>>()
        .map(Some)
}

fn parse_bitmap(s: &str) -> Result<Vec<u8>> {
    if s.is_empty() {
        return bitmap::to_bytes(&bitmap::random(&mut rand::thread_rng()));
    }
    let values = s
        .split(',')
        .map(|v| {
            let v = v.trim();
            v.parse::<u32>()
                .map_err(|_| Error::usage(format!("bad integer {:?}", v)))
        })
        .collect::<Result<Vec<u32>>>()?;
    bitmap::encode(values)
}

#[cfg(test)]
mod test {
    use super::{Table, ValueFormat};
    use crate::{
        bitmap,
        stream::{collect, Pair},
    };

    #[test]
    fn test_hex() {
        let input = "\
b:6869
# no colon here
a:
fe80::1:00ff
b:21
";
        let mut t = Table::new(ValueFormat::Hex);
        t.scan(input.as_bytes()).unwrap();
        assert_eq!(t.len(), 3);
        assert_eq!(
            collect(t.into_stream()).unwrap(),
            vec![
                Pair::key_only("a"),
                Pair::new("b", "!"),
                Pair::new("fe80::1", vec![0x00, 0xff]),
            ]
        );
    }

    #[test]
    fn test_hex_errors() {
        let mut t = Table::new(ValueFormat::Hex);
        let err = t.scan("a:00\nb:abc\n".as_bytes()).unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"line 2: hex value "abc" has an odd number of digits"#
        );
        assert!(t.parse("c:zz").is_err());
        assert!(t.parse(":00").is_err());
    }

    #[test]
    fn test_bitmap() {
        let mut t = Table::new(ValueFormat::Bitmap);
        t.parse("10.0.0.1: 7").unwrap();
        t.parse("10.0.0.2:9, 3").unwrap();
        t.parse("10.0.0.3:").unwrap();
        assert!(t.parse("10.0.0.4:x").is_err());

        let pairs = collect(t.into_stream()).unwrap();
        let sets: Vec<_> = pairs
            .iter()
            .map(|p| bitmap::decode(p.value.as_deref().unwrap()).unwrap())
            .collect();
        assert_eq!(bitmap::format(&sets[0]), "{7}");
        assert_eq!(bitmap::format(&sets[1]), "{3, 9}");
        assert!(!sets[2].is_empty());
    }
}
