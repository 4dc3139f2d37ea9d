use candle_core::{DType, IndexOp, Result, Tensor};
use candle_nn::{Init, Linear, VarBuilder};

//
// Linear layer with torch-equivalent initialisation
//
//   torch.nn.Linear is initialised by Uniform(-1/sqrt(fan_in), 1/sqrt(fan_in)).
//   see https://github.com/pytorch/pytorch/issues/57109
//
pub(crate) fn linear(in_dim: usize, out_dim: usize, vs: VarBuilder) -> Result<Linear> {
    let bound = 1.0 / (in_dim as f64).sqrt();
    let init_ws = Init::Uniform { lo: -bound, up: bound };
    let init_bs = Init::Uniform { lo: -bound, up: bound };
    let ws = vs.get_with_hints((out_dim, in_dim), "weight", init_ws)?;
    let bs = vs.get_with_hints(out_dim, "bias", init_bs)?;
    Ok(Linear::new(ws, Some(bs)))
}

fn count_endpoints(endpoints: &Tensor, num_nodes: usize) -> Result<Tensor> {
    let zeros = Tensor::zeros(num_nodes, DType::F32, endpoints.device())?;
    let num_edges = endpoints.dims1()?;
    if num_edges == 0 {
        return Ok(zeros);
    }
    let ones = Tensor::ones(num_edges, DType::F32, endpoints.device())?;
    zeros.index_add(endpoints, &ones, 0)
}

/// Number of edges leaving each node, as f32.
pub fn out_degree(edge_index: &Tensor, num_nodes: usize) -> Result<Tensor> {
    count_endpoints(&edge_index.i((0, ..))?, num_nodes)
}

/// Number of edges entering each node, as f32.
pub fn in_degree(edge_index: &Tensor, num_nodes: usize) -> Result<Tensor> {
    count_endpoints(&edge_index.i((1, ..))?, num_nodes)
}

/// out[v] = sum over edges e = (u, v) of edge_weight[e] * xs[u]
pub fn weighted_sum_agg(xs: &Tensor, edge_index: &Tensor, edge_weight: &Tensor) -> Result<Tensor> {
    if edge_index.dims2()?.1 == 0 {
        return xs.zeros_like();
    }
    let source = edge_index.i((0, ..))?;
    let target = edge_index.i((1, ..))?;
    let messages = xs.i(&source)?.broadcast_mul(&edge_weight.unsqueeze(1)?)?;
    xs.zeros_like()?.index_add(&target, &messages, 0)
}
