use candle_core::{bail, IndexOp, Result, Tensor};
use candle_nn::{Activation, Init, Module, VarBuilder};

use super::{
    traits::GnnModule,
    utils::{in_degree, out_degree, weighted_sum_agg},
};

/// Graph convolution with symmetric degree normalisation and no self-loops.
pub struct GcnConv {
    in_dim: usize,
    weight: Tensor,
    bias: Tensor,
}
impl GcnConv {
    pub fn new(in_dim: usize, out_dim: usize, vs: VarBuilder) -> Result<Self> {
        // Xavier Uniform
        let bound = (6.0 / (in_dim + out_dim) as f64).sqrt();
        let weight = vs.get_with_hints(
            (in_dim, out_dim),
            "weight",
            Init::Uniform {
                lo: -bound,
                up: bound,
            },
        )?;
        let bias = vs.get_with_hints((1, out_dim), "bias", Init::Const(0.0))?;
        Ok(Self {
            in_dim,
            weight,
            bias,
        })
    }
}
impl GnnModule for GcnConv {
    fn forward(&self, xs: &Tensor, edge_index: &Tensor) -> Result<Tensor> {
        let (num_nodes, in_dim) = xs.dims2()?;
        if in_dim != self.in_dim {
            bail!("gcn layer expects {} input features, got {in_dim}", self.in_dim)
        }
        let xs = xs.matmul(&self.weight)?;
        if edge_index.dims2()?.1 == 0 {
            return xs.zeros_like()?.broadcast_add(&self.bias);
        }
        let out_degree = out_degree(edge_index, num_nodes)?.maximum(1f32)?;
        let in_degree = in_degree(edge_index, num_nodes)?.maximum(1f32)?;
        let edge_weight = out_degree
            .i(&edge_index.i((0, ..))?)?
            .mul(&in_degree.i(&edge_index.i((1, ..))?)?)?
            .powf(-0.5)?;
        weighted_sum_agg(&xs, edge_index, &edge_weight)?.broadcast_add(&self.bias)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct GcnParams {
    /// Hidden layers; the network has `num_layers + 1` convolutions.
    pub num_layers: usize,
    pub hidden_dim: usize,
    pub activation_fn: Activation,
}
impl Default for GcnParams {
    fn default() -> Self {
        Self {
            num_layers: 2,
            hidden_dim: 256,
            activation_fn: Activation::Elu(1.0),
        }
    }
}

/// Stack of [`GcnConv`] layers; every layer but the last is followed by the
/// nonlinearity, so the output is raw logits.
pub struct Gcn {
    layers: Vec<GcnConv>,
    activation_fn: Activation,
}
impl Gcn {
    pub fn with_params(
        in_dim: usize,
        out_dim: usize,
        params: GcnParams,
        vs: VarBuilder,
    ) -> Result<Self> {
        if params.num_layers == 0 {
            bail!("gcn needs at least one hidden layer")
        }
        let mut sizes = vec![in_dim];
        sizes.extend(std::iter::repeat(params.hidden_dim).take(params.num_layers));
        sizes.push(out_dim);

        let mut layers = Vec::new();
        for i in 0..sizes.len() - 1 {
            let name = format!("layer_{}", i);
            layers.push(GcnConv::new(sizes[i], sizes[i + 1], vs.pp(name))?);
        }
        Ok(Self {
            layers,
            activation_fn: params.activation_fn,
        })
    }
    pub fn new(in_dim: usize, out_dim: usize, vs: VarBuilder) -> Result<Self> {
        Self::with_params(in_dim, out_dim, GcnParams::default(), vs)
    }
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }
}
impl GnnModule for Gcn {
    fn forward(&self, x: &Tensor, edge_index: &Tensor) -> Result<Tensor> {
        let mut h = x.clone();
        for (i, layer) in self.layers.iter().enumerate() {
            h = layer.forward(&h, edge_index)?;
            if i + 1 < self.layers.len() {
                h = self.activation_fn.forward(&h)?;
            }
        }
        Ok(h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn default_stack_has_three_convolutions() -> Result<()> {
        let varmap = VarMap::new();
        let vs = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let gcn = Gcn::new(50, 121, vs)?;
        assert_eq!(gcn.num_layers(), 3);
        assert_eq!(varmap.all_vars().len(), 6);
        Ok(())
    }

    #[test]
    fn conv_normalises_by_both_degrees() -> Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vs = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let conv = GcnConv::new(1, 1, vs)?;
        // weight := 1 so the layer is pure propagation
        for (name, var) in varmap.data().lock().unwrap().iter() {
            if name == "weight" {
                var.set(&Tensor::ones((1, 1), DType::F32, &device)?)?;
            }
        }
        // star: 0 -> 1, 0 -> 2, 1 -> 2
        let xs = Tensor::new(&[[4f32], [9.], [1.]], &device)?;
        let edge_index = Tensor::new(&[[0u32, 0, 1], [1, 2, 2]], &device)?;
        let out = conv.forward(&xs, &edge_index)?.to_vec2::<f32>()?;
        // node 1: 4 / sqrt(2 * 1); node 2: 4 / sqrt(2 * 2) + 9 / sqrt(1 * 2)
        let expected = [0.0, 4.0 / 2f32.sqrt(), 2.0 + 9.0 / 2f32.sqrt()];
        for (got, want) in out.iter().map(|row| row[0]).zip(expected) {
            assert!((got - want).abs() < 1e-5, "{got} != {want}");
        }
        Ok(())
    }

    #[test]
    fn rejects_wrong_input_width() -> Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vs = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let gcn = Gcn::new(4, 2, vs)?;
        let xs = Tensor::zeros((3, 5), DType::F32, &device)?;
        let edge_index = Tensor::new(&[[0u32, 1], [1, 0]], &device)?;
        assert!(gcn.forward(&xs, &edge_index).is_err());
        Ok(())
    }
}
