use candle_core::{Result, Tensor};

/// Node-level model over a graph given as an explicit `(2, num_edges)`
/// edge index.
pub trait GnnModule {
    fn forward(&self, x: &Tensor, edge_index: &Tensor) -> Result<Tensor>;
}
