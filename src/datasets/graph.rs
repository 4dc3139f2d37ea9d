use candle_core::{DType, Device, Tensor};

use crate::error::{Error, Result};

/// One labelled graph: node features, multi-hot node labels and a
/// `(2, num_edges)` edge index whose first row holds sources.
#[derive(Debug, Clone)]
pub struct PpiGraph {
    pub xs: Tensor,
    pub ys: Tensor,
    pub edge_index: Tensor,
}
impl PpiGraph {
    pub fn new(xs: Tensor, ys: Tensor, edge_index: Tensor) -> Result<Self> {
        let (num_nodes, _) = xs.dims2()?;
        let (label_rows, _) = ys.dims2()?;
        if label_rows != num_nodes {
            return Err(Error::DimensionMismatch {
                context: "label rows",
                expected: num_nodes,
                got: label_rows,
            });
        }
        let (rows, _) = edge_index.dims2()?;
        if rows != 2 {
            return Err(Error::InvalidGraph(format!(
                "edge index must have 2 rows, got {rows}"
            )));
        }
        let edge_index = edge_index.to_dtype(DType::U32)?;
        if let Some(&node) = edge_index.flatten_all()?.to_vec1::<u32>()?.iter().max() {
            if node as usize >= num_nodes {
                return Err(Error::InvalidGraph(format!(
                    "edge endpoint {node} out of range for {num_nodes} nodes"
                )));
            }
        }
        Ok(Self {
            xs: xs.to_dtype(DType::F32)?,
            ys: ys.to_dtype(DType::F32)?,
            edge_index,
        })
    }

    /// Builds a graph from host-side edge pairs.
    pub fn from_edges(xs: Tensor, ys: Tensor, edges: &[(u32, u32)]) -> Result<Self> {
        let edge_index = edge_index_from_pairs(edges, xs.device())?;
        Self::new(xs, ys, edge_index)
    }

    pub fn num_nodes(&self) -> usize {
        self.xs.dims()[0]
    }
    pub fn num_edges(&self) -> usize {
        self.edge_index.dims()[1]
    }
    pub fn num_features(&self) -> usize {
        self.xs.dims()[1]
    }
    pub fn num_classes(&self) -> usize {
        self.ys.dims()[1]
    }
}

pub(crate) fn edge_index_from_pairs(edges: &[(u32, u32)], device: &Device) -> Result<Tensor> {
    let mut flat = Vec::with_capacity(2 * edges.len());
    flat.extend(edges.iter().map(|&(u, _)| u));
    flat.extend(edges.iter().map(|&(_, v)| v));
    Ok(Tensor::from_vec(flat, (2, edges.len()), device)?)
}

/// Block-diagonal union of several graphs.
#[derive(Debug, Clone)]
pub struct GraphBatch {
    pub xs: Tensor,
    pub ys: Tensor,
    pub edge_index: Tensor,
    pub batch_num_nodes: Vec<usize>,
}
impl GraphBatch {
    pub fn num_graphs(&self) -> usize {
        self.batch_num_nodes.len()
    }
    pub fn num_nodes(&self) -> usize {
        self.batch_num_nodes.iter().sum()
    }
    /// First node id of every member graph inside the batch.
    pub fn node_offsets(&self) -> Vec<usize> {
        self.batch_num_nodes
            .iter()
            .scan(0, |acc, &n| {
                let offset = *acc;
                *acc += n;
                Some(offset)
            })
            .collect()
    }
    /// Node id range occupied by graph `i`, `None` past the last graph.
    pub fn node_range(&self, i: usize) -> Option<std::ops::Range<usize>> {
        let len = *self.batch_num_nodes.get(i)?;
        let start: usize = self.batch_num_nodes[..i].iter().sum();
        Some(start..start + len)
    }
}

/// Merges graphs into one disconnected graph. Rows keep the order of
/// `graphs`; edges of graph `i` are shifted by the node count of the
/// graphs before it.
pub fn collate(graphs: &[&PpiGraph]) -> Result<GraphBatch> {
    let first = graphs.first().ok_or(Error::EmptyDataset)?;
    let device = first.xs.device();

    let mut xs = Vec::with_capacity(graphs.len());
    let mut ys = Vec::with_capacity(graphs.len());
    let mut edges = Vec::with_capacity(graphs.len());
    let mut batch_num_nodes = Vec::with_capacity(graphs.len());
    let mut offset = 0usize;
    for graph in graphs {
        if graph.num_features() != first.num_features() {
            return Err(Error::DimensionMismatch {
                context: "batched features",
                expected: first.num_features(),
                got: graph.num_features(),
            });
        }
        if graph.num_classes() != first.num_classes() {
            return Err(Error::DimensionMismatch {
                context: "batched labels",
                expected: first.num_classes(),
                got: graph.num_classes(),
            });
        }
        xs.push(&graph.xs);
        ys.push(&graph.ys);
        if graph.num_edges() > 0 {
            let shift = Tensor::new(offset as u32, device)?;
            edges.push(graph.edge_index.broadcast_add(&shift)?);
        }
        batch_num_nodes.push(graph.num_nodes());
        offset += graph.num_nodes();
    }
    let edge_index = if edges.is_empty() {
        Tensor::zeros((2, 0), DType::U32, device)?
    } else {
        Tensor::cat(&edges, 1)?
    };
    Ok(GraphBatch {
        xs: Tensor::cat(&xs, 0)?,
        ys: Tensor::cat(&ys, 0)?,
        edge_index,
        batch_num_nodes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::IndexOp;

    fn graph(num_nodes: usize, fill: f32, edges: &[(u32, u32)]) -> PpiGraph {
        let device = Device::Cpu;
        let xs = (Tensor::ones((num_nodes, 3), DType::F32, &device).unwrap() * fill as f64).unwrap();
        let ys = Tensor::zeros((num_nodes, 2), DType::F32, &device).unwrap();
        PpiGraph::from_edges(xs, ys, edges).unwrap()
    }

    #[test]
    fn collate_concatenates_rows_and_shifts_edges() -> Result<()> {
        let a = graph(3, 1.0, &[(0, 1), (1, 0)]);
        let b = graph(2, 2.0, &[(0, 1), (1, 0)]);
        let c = graph(4, 3.0, &[]);
        let batch = collate(&[&a, &b, &c])?;

        assert_eq!(batch.num_nodes(), 9);
        assert_eq!(batch.xs.dims(), &[9, 3]);
        assert_eq!(batch.ys.dims(), &[9, 2]);
        assert_eq!(batch.node_offsets(), vec![0, 3, 5]);
        assert_eq!(batch.node_range(1), Some(3..5));
        assert_eq!(batch.node_range(2), Some(5..9));
        assert_eq!(batch.node_range(3), None);

        let column = batch.xs.i((.., 0))?.to_vec1::<f32>()?;
        assert_eq!(column, vec![1.0, 1.0, 1.0, 2.0, 2.0, 3.0, 3.0, 3.0, 3.0]);
        assert_eq!(
            batch.edge_index.to_vec2::<u32>()?,
            vec![vec![0, 1, 3, 4], vec![1, 0, 4, 3]]
        );
        Ok(())
    }

    #[test]
    fn collate_of_edgeless_graphs_has_empty_edge_index() -> Result<()> {
        let a = graph(2, 1.0, &[]);
        let batch = collate(&[&a, &a])?;
        assert_eq!(batch.edge_index.dims(), &[2, 0]);
        assert_eq!(batch.num_graphs(), 2);
        Ok(())
    }

    #[test]
    fn rejects_mismatched_rows_and_dangling_edges() {
        let device = Device::Cpu;
        let xs = Tensor::zeros((3, 4), DType::F32, &device).unwrap();
        let ys = Tensor::zeros((2, 2), DType::F32, &device).unwrap();
        assert!(matches!(
            PpiGraph::from_edges(xs.clone(), ys, &[]),
            Err(Error::DimensionMismatch { .. })
        ));
        let ys = Tensor::zeros((3, 2), DType::F32, &device).unwrap();
        assert!(matches!(
            PpiGraph::from_edges(xs, ys, &[(0, 3)]),
            Err(Error::InvalidGraph(_))
        ));
    }

    #[test]
    fn collate_rejects_mixed_feature_widths() {
        let device = Device::Cpu;
        let a = graph(2, 1.0, &[]);
        let b = PpiGraph::from_edges(
            Tensor::zeros((2, 5), DType::F32, &device).unwrap(),
            Tensor::zeros((2, 2), DType::F32, &device).unwrap(),
            &[],
        )
        .unwrap();
        assert!(matches!(
            collate(&[&a, &b]),
            Err(Error::DimensionMismatch { .. })
        ));
    }
}
