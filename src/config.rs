use std::{num::NonZeroUsize, path::PathBuf};

use candle_core::Device;
use clap::{Parser, ValueEnum};

use crate::{checkpoint, error::Result, train::TrainParams};

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum Mode {
    /// Train, save, then test the reloaded weights.
    Train,
    /// Test previously saved weights.
    Test,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "ppi-gnn")]
#[command(about = "GCN / GAT baselines on the PPI node classification benchmark", long_about = None)]
pub struct RunConfig {
    #[arg(long, value_enum, default_value_t = Mode::Train)]
    pub mode: Mode,

    /// GPU to use. Set -1 to use CPU.
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    pub gpu: i32,

    #[arg(long, default_value_t = 250)]
    pub epochs: usize,

    /// Graphs per mini-batch, at least 1
    #[arg(long, default_value = "2")]
    pub batch_size: NonZeroUsize,

    /// `BGM` for the graph convolution model, anything else for attention
    #[arg(long, default_value = "BGM")]
    pub model: String,

    /// Directory holding (or receiving) the PPI files
    #[arg(long, default_value = "datasets/ppi")]
    pub data_dir: PathBuf,

    /// Checkpoint path [default: model_state.safetensors next to the binary]
    #[arg(long)]
    pub weights: Option<PathBuf>,

    /// Evaluate on the test split every this many epochs (0 disables)
    #[arg(long, default_value_t = 5)]
    pub eval_every: usize,
}
impl RunConfig {
    pub fn device(&self) -> Result<Device> {
        if self.gpu < 0 {
            Ok(Device::Cpu)
        } else {
            Ok(Device::new_cuda(self.gpu as usize)?)
        }
    }
    pub fn weights_path(&self) -> Result<PathBuf> {
        match &self.weights {
            Some(path) => Ok(path.clone()),
            None => checkpoint::default_path(),
        }
    }
    pub fn train_params(&self) -> TrainParams {
        TrainParams {
            epochs: self.epochs,
            batch_size: self.batch_size,
            eval_every: self.eval_every,
            ..Default::default()
        }
    }
}
