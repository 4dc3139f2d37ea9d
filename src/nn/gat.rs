use std::collections::BTreeMap;

use candle_core::{bail, DType, IndexOp, Result, Tensor, D};
use candle_nn::{ops, Activation, Linear, Module, VarBuilder};

use super::{traits::GnnModule, utils::linear};

/// Turns per-edge attention scores into mixed node features.
pub trait AttentionScheme {
    /// `wh`: projected features (nodes x out); `scores`: one score per
    /// column of `edge_index`.
    fn aggregate(&self, wh: &Tensor, scores: &Tensor, edge_index: &Tensor) -> Result<Tensor>;
}

/// Dense node-by-node attention. Each edge score is written to both `(u, v)`
/// and `(v, u)`, later edges overwriting earlier ones; the row softmax then
/// runs over the whole row, so non-neighbours keep weight `exp(0)`.
#[derive(Clone, Copy, Debug)]
pub struct DenseRowSoftmax {
    negative_slope: f64,
}
impl DenseRowSoftmax {
    pub fn new(negative_slope: f64) -> Self {
        Self { negative_slope }
    }

    /// Row-normalised attention matrix, `num_nodes x num_nodes`.
    pub fn coefficients(
        &self,
        scores: &Tensor,
        edge_index: &Tensor,
        num_nodes: usize,
    ) -> Result<Tensor> {
        let coeffs = scatter_symmetric(scores, edge_index, num_nodes)?;
        let coeffs = ops::leaky_relu(&coeffs, self.negative_slope)?;
        ops::softmax(&coeffs, D::Minus1)
    }
}
impl AttentionScheme for DenseRowSoftmax {
    fn aggregate(&self, wh: &Tensor, scores: &Tensor, edge_index: &Tensor) -> Result<Tensor> {
        let num_nodes = wh.dims2()?.0;
        self.coefficients(scores, edge_index, num_nodes)?.matmul(wh)
    }
}

fn scatter_symmetric(scores: &Tensor, edge_index: &Tensor, num_nodes: usize) -> Result<Tensor> {
    let cells = num_nodes * num_nodes;
    if cells > u32::MAX as usize {
        bail!("dense attention over {num_nodes} nodes overflows u32 cell indices")
    }
    let zeros = Tensor::zeros(cells, scores.dtype(), scores.device())?;
    let edges = edge_index.to_vec2::<u32>()?;
    if edges[0].is_empty() {
        return zeros.reshape((num_nodes, num_nodes));
    }

    // flat cell -> index of the last edge writing it
    let mut owner = BTreeMap::new();
    for (e, (&u, &v)) in edges[0].iter().zip(&edges[1]).enumerate() {
        let (u, v) = (u as usize, v as usize);
        owner.insert(u * num_nodes + v, e as u32);
        owner.insert(v * num_nodes + u, e as u32);
    }
    let (cell, edge): (Vec<u32>, Vec<u32>) =
        owner.into_iter().map(|(c, e)| (c as u32, e)).unzip();
    let cell = Tensor::from_vec(cell, edge.len(), scores.device())?;
    let edge = Tensor::from_vec(edge, cell.dims1()?, scores.device())?;
    zeros
        .index_add(&cell, &scores.i(&edge)?, 0)?
        .reshape((num_nodes, num_nodes))
}

#[derive(Clone, Copy, Debug)]
pub struct GatParams {
    pub negative_slope: f64,
    pub activation_fn: Activation,
}
impl Default for GatParams {
    fn default() -> Self {
        Self {
            negative_slope: 0.2,
            activation_fn: Activation::Elu(1.0),
        }
    }
}

/// Single-layer graph attention network with one head.
pub struct DenseGat {
    in_dim: usize,
    linear: Linear,
    attention: Linear,
    scheme: Box<dyn AttentionScheme>,
    activation_fn: Activation,
}
impl DenseGat {
    pub fn new(in_dim: usize, out_dim: usize, vs: VarBuilder) -> Result<Self> {
        Self::with_params(in_dim, out_dim, GatParams::default(), vs)
    }
    pub fn with_params(
        in_dim: usize,
        out_dim: usize,
        params: GatParams,
        vs: VarBuilder,
    ) -> Result<Self> {
        Ok(Self {
            in_dim,
            linear: linear(in_dim, out_dim, vs.pp("linear"))?,
            attention: linear(2 * out_dim, 1, vs.pp("attention"))?,
            scheme: Box::new(DenseRowSoftmax::new(params.negative_slope)),
            activation_fn: params.activation_fn,
        })
    }
    pub fn with_scheme(mut self, scheme: Box<dyn AttentionScheme>) -> Self {
        self.scheme = scheme;
        self
    }

    /// Unnormalised score of every edge: `attention([Wh[u] || Wh[v]])`.
    pub fn edge_scores(&self, wh: &Tensor, edge_index: &Tensor) -> Result<Tensor> {
        let num_edges = edge_index.dims2()?.1;
        if num_edges == 0 {
            return Tensor::zeros(0, wh.dtype(), wh.device());
        }
        let pairs = Tensor::cat(
            &[wh.i(&edge_index.i((0, ..))?)?, wh.i(&edge_index.i((1, ..))?)?],
            1,
        )?;
        self.attention.forward(&pairs)?.squeeze(1)
    }
}
impl GnnModule for DenseGat {
    fn forward(&self, x: &Tensor, edge_index: &Tensor) -> Result<Tensor> {
        let in_dim = x.dims2()?.1;
        if in_dim != self.in_dim {
            bail!("gat expects {} input features, got {in_dim}", self.in_dim)
        }
        let wh = self.linear.forward(&x.to_dtype(DType::F32)?)?;
        let scores = self.edge_scores(&wh, edge_index)?;
        let h = self.scheme.aggregate(&wh, &scores, edge_index)?;
        self.activation_fn.forward(&h)
    }
}
