//! Training loop, evaluation and the end-to-end driver.

use std::num::NonZeroUsize;

use candle_core::{Device, Tensor, Var};
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use indicatif::ProgressBar;
use tracing::{debug, info};

use crate::{
    config::{Mode, RunConfig},
    datasets::{GraphBatchLoader, GraphDataset, PpiDataset, PpiSplit},
    error::{Error, Result},
    metrics::{bce_with_logits, micro_f1},
    nn::{GnnModule, ModelKind, PpiModel},
};

/// Outputs at or above this value count as a positive label.
pub const PREDICTION_THRESHOLD: f64 = 0.5;

const DEFAULT_BATCH_SIZE: NonZeroUsize = match NonZeroUsize::new(2) {
    Some(size) => size,
    None => unreachable!(),
};

#[derive(Clone, Copy, Debug)]
pub struct TrainParams {
    pub epochs: usize,
    pub batch_size: NonZeroUsize,
    pub eval_every: usize,
    pub learning_rate: f64,
}
impl Default for TrainParams {
    fn default() -> Self {
        Self {
            epochs: 250,
            batch_size: DEFAULT_BATCH_SIZE,
            eval_every: 5,
            learning_rate: 1e-3,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct EpochStats {
    pub epoch: usize,
    pub loss: f32,
    /// Mean per-graph test F1, for epochs that ran an evaluation.
    pub f1: Option<f64>,
}

/// Adam without weight decay.
pub fn adam(vars: Vec<Var>, learning_rate: f64) -> Result<AdamW> {
    Ok(AdamW::new(
        vars,
        ParamsAdamW {
            lr: learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay: 0.0,
        },
    )?)
}

fn mean<T: Into<f64> + Copy>(values: &[T]) -> f64 {
    values.iter().map(|&v| v.into()).sum::<f64>() / values.len() as f64
}

pub fn train<M, D>(
    model: &M,
    optimizer: &mut AdamW,
    train_set: &D,
    test_set: &D,
    params: &TrainParams,
) -> Result<Vec<EpochStats>>
where
    M: GnnModule,
    D: GraphDataset,
{
    let mut history = Vec::with_capacity(params.epochs);
    for epoch in 0..params.epochs {
        let loader = GraphBatchLoader::new(train_set, params.batch_size);
        let pbar = ProgressBar::new(loader.len() as u64);
        let mut losses = Vec::with_capacity(loader.len());
        for (step, batch) in loader.enumerate() {
            let batch = batch?;
            let logits = model.forward(&batch.xs, &batch.edge_index)?;
            let loss = bce_with_logits(&logits, &batch.ys)?;
            optimizer.backward_step(&loss)?;
            let loss = loss.to_scalar::<f32>()?;
            debug!(epoch, step, nodes = batch.num_nodes(), loss, "train step");
            losses.push(loss);
            pbar.inc(1);
        }
        pbar.finish_and_clear();
        let loss = mean(&losses) as f32;
        info!("Epoch {:05} | Loss: {:.4}", epoch + 1, loss);

        let f1 = if params.eval_every > 0 && epoch % params.eval_every == 0 {
            let mut scores = Vec::with_capacity(test_set.len());
            for graph in test_set.graphs() {
                let (score, _) = evaluate(&graph.xs, model, &graph.edge_index, &graph.ys)?;
                scores.push(score);
            }
            let f1 = mean(&scores);
            info!("F1-Score: {:.4} ", f1);
            Some(f1)
        } else {
            None
        };
        history.push(EpochStats { epoch, loss, f1 });
    }
    Ok(history)
}

/// Micro-F1 and loss of one forward pass; the output is detached so no
/// gradient bookkeeping survives the call.
pub fn evaluate<M: GnnModule>(
    xs: &Tensor,
    model: &M,
    edge_index: &Tensor,
    ys: &Tensor,
) -> Result<(f64, f32)> {
    let output = model.forward(xs, edge_index)?.detach();
    let loss = bce_with_logits(&output, ys)?.to_scalar::<f32>()?;
    let score = micro_f1(&output, ys, PREDICTION_THRESHOLD)?;
    Ok((score, loss))
}

/// Mean micro-F1 over the batches of `loader`.
pub fn test<M: GnnModule>(model: &M, loader: GraphBatchLoader<'_>) -> Result<f64> {
    info!("-- Testing");
    let mut scores = Vec::with_capacity(loader.len());
    for batch in loader {
        let batch = batch?;
        scores.push(evaluate(&batch.xs, model, &batch.edge_index, &batch.ys)?.0);
    }
    let score = mean(&scores);
    info!("F1-Score: {:.4}", score);
    Ok(score)
}

/// Loads both PPI splits and runs [`run_with_datasets`].
pub fn run(config: &RunConfig) -> Result<f64> {
    let device = config.device()?;
    let train_set = PpiDataset::new(&config.data_dir, PpiSplit::Train, &device)?;
    let test_set = PpiDataset::new(&config.data_dir, PpiSplit::Test, &device)?;
    run_with_datasets(config, &train_set, &test_set, &device)
}

/// Builds the selected model, trains and saves it in train mode, then always
/// reloads the checkpoint from disk and returns the mean test micro-F1.
pub fn run_with_datasets<D: GraphDataset>(
    config: &RunConfig,
    train_set: &D,
    test_set: &D,
    device: &Device,
) -> Result<f64> {
    let (num_features, num_classes) = (train_set.num_features(), train_set.num_classes());
    if test_set.num_features() != num_features {
        return Err(Error::DimensionMismatch {
            context: "test features",
            expected: num_features,
            got: test_set.num_features(),
        });
    }
    if test_set.num_classes() != num_classes {
        return Err(Error::DimensionMismatch {
            context: "test classes",
            expected: num_classes,
            got: test_set.num_classes(),
        });
    }

    let kind = ModelKind::from_name(&config.model);
    let mut model = PpiModel::new(kind, num_features, num_classes, device)?;
    info!(?kind, num_features, num_classes, "built model");
    let weights = config.weights_path()?;
    let params = config.train_params();

    if config.mode == Mode::Train {
        let mut optimizer = adam(model.parameters(), params.learning_rate)?;
        train(&model, &mut optimizer, train_set, test_set, &params)?;
        model.save(&weights)?;
    }
    model.load(&weights)?;
    test(&model, GraphBatchLoader::new(test_set, params.batch_size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::PpiGraph;
    use crate::nn::{GatParams, GcnParams};
    use candle_core::DType;

    fn small_model(kind: ModelKind, device: &Device) -> Result<PpiModel> {
        let gcn_params = GcnParams {
            num_layers: 1,
            hidden_dim: 8,
            ..Default::default()
        };
        Ok(PpiModel::with_params(
            kind,
            4,
            2,
            gcn_params,
            GatParams::default(),
            device,
        )?)
    }

    fn tiny_graph(device: &Device) -> Result<PpiGraph> {
        let xs = Tensor::new(
            &[[1f32, 0.5, -0.2, 0.0], [0.3, -1.0, 0.8, 0.1], [-0.5, 0.2, 0.0, 1.0]],
            device,
        )?;
        let ys = Tensor::new(&[[1f32, 0.], [0., 1.], [1., 1.]], device)?;
        PpiGraph::from_edges(xs, ys, &[(0, 1), (1, 0)])
    }

    #[test]
    fn one_step_lowers_the_loss() -> Result<()> {
        let device = Device::Cpu;
        let graph = tiny_graph(&device)?;
        for kind in [ModelKind::Gcn, ModelKind::Gat] {
            let model = small_model(kind, &device)?;
            let (_, before) = evaluate(&graph.xs, &model, &graph.edge_index, &graph.ys)?;
            let (_, again) = evaluate(&graph.xs, &model, &graph.edge_index, &graph.ys)?;
            assert_eq!(before, again);

            let mut optimizer = adam(model.parameters(), 1e-3)?;
            let logits = model.forward(&graph.xs, &graph.edge_index)?;
            optimizer.backward_step(&bce_with_logits(&logits, &graph.ys)?)?;

            let (_, after) = evaluate(&graph.xs, &model, &graph.edge_index, &graph.ys)?;
            assert!(after < before, "{kind:?}: {after} >= {before}");
        }
        Ok(())
    }

    #[test]
    fn evaluation_score_is_a_probability() -> Result<()> {
        let device = Device::Cpu;
        let graph = tiny_graph(&device)?;
        for kind in [ModelKind::Gcn, ModelKind::Gat] {
            let model = PpiModel::new(kind, 4, 2, &device)?;
            let (score, loss) = evaluate(&graph.xs, &model, &graph.edge_index, &graph.ys)?;
            assert!((0.0..=1.0).contains(&score));
            assert!(loss.is_finite() && loss >= 0.0);
        }
        Ok(())
    }

    #[test]
    fn train_reports_every_epoch_and_evaluates_periodically() -> Result<()> {
        let device = Device::Cpu;
        let dataset = PpiDataset::from_graphs(vec![tiny_graph(&device)?, tiny_graph(&device)?])?;
        let model = PpiModel::new(ModelKind::Gcn, 4, 2, &device)?;
        let mut optimizer = adam(model.parameters(), 1e-3)?;
        let params = TrainParams {
            epochs: 7,
            batch_size: NonZeroUsize::new(2).unwrap(),
            eval_every: 5,
            ..Default::default()
        };
        let history = train(&model, &mut optimizer, &dataset, &dataset, &params)?;
        assert_eq!(history.len(), 7);
        let evaluated: Vec<usize> = history
            .iter()
            .filter(|stats| stats.f1.is_some())
            .map(|stats| stats.epoch)
            .collect();
        assert_eq!(evaluated, vec![0, 5]);
        assert!(history.iter().all(|stats| stats.loss.is_finite()));
        Ok(())
    }

    #[test]
    fn mismatched_splits_are_rejected() -> Result<()> {
        let device = Device::Cpu;
        let train_set = PpiDataset::from_graphs(vec![tiny_graph(&device)?])?;
        let test_set = PpiDataset::from_graphs(vec![PpiGraph::from_edges(
            Tensor::zeros((2, 3), DType::F32, &device)?,
            Tensor::zeros((2, 2), DType::F32, &device)?,
            &[],
        )?])?;
        let config = RunConfig {
            mode: Mode::Test,
            gpu: -1,
            epochs: 1,
            batch_size: NonZeroUsize::MIN,
            model: "BGM".into(),
            data_dir: "unused".into(),
            weights: Some("unused.safetensors".into()),
            eval_every: 5,
        };
        assert!(matches!(
            run_with_datasets(&config, &train_set, &test_set, &device),
            Err(Error::DimensionMismatch { .. })
        ));
        Ok(())
    }
}
