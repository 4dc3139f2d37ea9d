use super::graph::PpiGraph;

/// A fixed, ordered collection of graphs sharing feature and class widths.
pub trait GraphDataset {
    fn num_features(&self) -> usize;
    fn num_classes(&self) -> usize;
    fn graphs(&self) -> &[PpiGraph];

    fn len(&self) -> usize {
        self.graphs().len()
    }
    fn is_empty(&self) -> bool {
        self.graphs().is_empty()
    }
}
