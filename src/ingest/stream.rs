//! Lazy batch stream over a statement source.

use std::iter::Fuse;

use super::plan::BatchPlanner;
use super::{IngestReport, MutationBatch};
use crate::rdf::ParsedStatement;
use crate::{Error, Result};

/// Would-be mutation batches, pulled one at a time.
///
/// Never touches the store. Restart by building a new stream over the source;
/// after an error the stream is finished.
pub struct MutationStream<I> {
    source: Fuse<I>,
    planner: BatchPlanner,
    done: bool,
}

impl<I> MutationStream<I>
where
    I: Iterator<Item = ParsedStatement>,
{
    pub fn new(source: I, planner: BatchPlanner) -> Self {
        Self { source: source.fuse(), planner, done: false }
    }

    /// Counters for what has been read and planned so far.
    pub fn report(&self) -> &IngestReport {
        self.planner.report()
    }

    pub(crate) fn report_mut(&mut self) -> &mut IngestReport {
        self.planner.report_mut()
    }

    pub fn into_report(self) -> IngestReport {
        self.planner.into_report()
    }

    /// Statements buffered and not yet yielded.
    pub fn buffered(&self) -> usize {
        self.planner.buffered()
    }
}

impl<I> Iterator for MutationStream<I>
where
    I: Iterator<Item = ParsedStatement>,
{
    type Item = Result<MutationBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            match self.source.next() {
                Some(Ok(statement)) => match self.planner.push(statement) {
                    Ok(Some(batch)) => return Some(Ok(batch)),
                    Ok(None) => continue,
                    Err(e) => {
                        self.done = true;
                        return Some(Err(e));
                    }
                },
                // unflushed window contents are dropped with the stream
                Some(Err(parse)) => {
                    self.done = true;
                    return Some(Err(Error::Parse(parse)));
                }
                None => {
                    self.done = true;
                    return self.planner.finish().map(Ok);
                }
            }
        }
    }
}
