use std::path::Path;

use candle_core::{DType, Device, Result, Tensor, Var};
use candle_nn::{VarBuilder, VarMap};
use tracing::warn;

use super::{
    gat::{DenseGat, GatParams},
    gcn::{Gcn, GcnParams},
    traits::GnnModule,
};
use crate::checkpoint;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ModelKind {
    /// Layered graph convolution, selected by `BGM`.
    Gcn,
    /// Single-layer dense graph attention, selected by anything else.
    Gat,
}
impl ModelKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "BGM" => Self::Gcn,
            "GAT" => Self::Gat,
            other => {
                warn!(model = other, "unrecognised model name, using the attention model");
                Self::Gat
            }
        }
    }
}

enum Network {
    Gcn(Gcn),
    Gat(DenseGat),
}

/// One of the two PPI networks together with the parameters it owns.
pub struct PpiModel {
    kind: ModelKind,
    in_dim: usize,
    out_dim: usize,
    network: Network,
    varmap: VarMap,
}
impl PpiModel {
    pub fn new(kind: ModelKind, in_dim: usize, out_dim: usize, device: &Device) -> Result<Self> {
        Self::with_params(
            kind,
            in_dim,
            out_dim,
            GcnParams::default(),
            GatParams::default(),
            device,
        )
    }
    pub fn with_params(
        kind: ModelKind,
        in_dim: usize,
        out_dim: usize,
        gcn_params: GcnParams,
        gat_params: GatParams,
        device: &Device,
    ) -> Result<Self> {
        let varmap = VarMap::new();
        let vs = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let network = match kind {
            ModelKind::Gcn => {
                Network::Gcn(Gcn::with_params(in_dim, out_dim, gcn_params, vs.pp("gcn"))?)
            }
            ModelKind::Gat => {
                Network::Gat(DenseGat::with_params(in_dim, out_dim, gat_params, vs.pp("gat"))?)
            }
        };
        Ok(Self {
            kind,
            in_dim,
            out_dim,
            network,
            varmap,
        })
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }
    pub fn in_dim(&self) -> usize {
        self.in_dim
    }
    pub fn out_dim(&self) -> usize {
        self.out_dim
    }
    pub fn parameters(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> crate::Result<()> {
        checkpoint::save(&self.varmap, path)
    }
    /// Overwrites every parameter with the snapshot stored at `path`.
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> crate::Result<()> {
        checkpoint::load(&self.varmap, path)
    }
}
impl GnnModule for PpiModel {
    fn forward(&self, x: &Tensor, edge_index: &Tensor) -> Result<Tensor> {
        match &self.network {
            Network::Gcn(gcn) => gcn.forward(x, edge_index),
            Network::Gat(gat) => gat.forward(x, edge_index),
        }
    }
}
