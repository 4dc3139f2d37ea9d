use std::num::NonZeroUsize;

use super::graph::{collate, GraphBatch, PpiGraph};
use super::traits::GraphDataset;
use crate::error::Result;

/// Walks a dataset in order, collating `batch_size` graphs at a time.
/// The final batch may be smaller.
pub struct GraphBatchLoader<'a> {
    chunks: std::slice::Chunks<'a, PpiGraph>,
}
impl<'a> GraphBatchLoader<'a> {
    pub fn new<T: GraphDataset>(dataset: &'a T, batch_size: NonZeroUsize) -> Self {
        Self {
            chunks: dataset.graphs().chunks(batch_size.get()),
        }
    }
}

impl<'a> Iterator for GraphBatchLoader<'a> {
    type Item = Result<GraphBatch>;
    fn next(&mut self) -> Option<Self::Item> {
        let chunk = self.chunks.next()?;
        let graphs: Vec<&PpiGraph> = chunk.iter().collect();
        Some(collate(&graphs))
    }
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

impl<'a> ExactSizeIterator for GraphBatchLoader<'a> {}
