use crate::{
    error::{Error, Result},
    stream::{Pair, PairRef, Stream},
};

/// Merges the values of two pairs that share a key. An absent value is passed
/// as `None`, and returning `None` yields a pair with an absent value.
pub trait Combine: FnMut(Option<&[u8]>, Option<&[u8]>) -> anyhow::Result<Option<Vec<u8>>> {}

impl<F> Combine for F where F: FnMut(Option<&[u8]>, Option<&[u8]>) -> anyhow::Result<Option<Vec<u8>>> {}

/// The sorted union of several streams. Pairs that share a key across inputs
/// are folded into one with the combine function, left to right in input
/// order, so the function should be associative.
#[derive(Debug)]
pub struct Combiner<S, F>
where
    S: Stream,
    F: Combine,
{
    streams: Vec<S>,
    // The next pair of each stream, or None once it is exhausted.
    heads: Vec<Option<Pair>>,
    started: bool,
    out: Pair,
    combine: F,
}

impl<S, F> Combiner<S, F>
where
    S: Stream,
    F: Combine,
{
    pub fn new<I>(streams: I, combine: F) -> Self
    where
        I: IntoIterator<Item = S>,
    {
        let streams: Vec<S> = streams.into_iter().collect();
        let heads = streams.iter().map(|_| None).collect();
        Combiner {
            streams,
            heads,
            started: false,
            out: Pair::default(),
            combine,
        }
    }

    fn lowest(&self) -> Option<usize> {
        let mut lowest: Option<(usize, &[u8])> = None;

        for (idx, head) in self.heads.iter().enumerate() {
            if let Some(p) = head {
                match lowest {
                    Some((_, k)) if k <= p.key.as_slice() => {}
                    _ => lowest = Some((idx, p.key.as_slice())),
                }
            }
        }

        lowest.map(|(x, _)| x)
    }

    // Pulls the next pair of stream `i` into its head slot.
    fn advance(&mut self, i: usize) -> Result<()> {
        match self.streams[i].read()? {
            None => self.heads[i] = None,
            Some(p) => match &mut self.heads[i] {
                Some(head) => {
                    if p.key <= head.key.as_slice() {
                        return Err(Error::usage(format!(
                            "input {}: keys out of order: {:?} follows {:?}",
                            i,
                            String::from_utf8_lossy(p.key),
                            String::from_utf8_lossy(&head.key)
                        )));
                    }
                    head.set(p);
                }
                slot => *slot = Some(p.to_pair()),
            },
        }
        Ok(())
    }
}

impl<S, F> Stream for Combiner<S, F>
where
    S: Stream,
    F: Combine,
{
    fn read(&mut self) -> Result<Option<PairRef<'_>>> {
        if !self.started {
            for i in 0..self.streams.len() {
                self.advance(i)?;
            }
            self.started = true;
        }

        let lo = match self.lowest() {
            Some(lo) => lo,
            None => return Ok(None),
        };
        if let Some(head) = &self.heads[lo] {
            self.out.set(head.view());
        }
        for i in lo + 1..self.heads.len() {
            let value = match &self.heads[i] {
                Some(head) if head.key == self.out.key => head.value.as_deref(),
                _ => continue,
            };
            self.out.value = (self.combine)(self.out.value.as_deref(), value).map_err(|cause| {
                Error::Combine {
                    key: String::from_utf8_lossy(&self.out.key).into_owned(),
                    cause,
                }
            })?;
            self.advance(i)?;
        }
        self.advance(lo)?;
        Ok(Some(self.out.view()))
    }
}
