use std::{
    collections::HashSet,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use candle_core::{DType, Device, Tensor};
use itertools::Itertools;
use serde::Deserialize;
use tracing::{debug, info};

use super::graph::{edge_index_from_pairs, PpiGraph};
use super::traits::GraphDataset;
use super::utils::download_and_extract;
use crate::error::{Error, Result};

const PPI_URL: &str = "https://data.dgl.ai/dataset/ppi.zip";

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum PpiSplit {
    Train,
    Valid,
    Test,
}
impl std::fmt::Display for PpiSplit {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Train => write!(f, "train"),
            Self::Valid => write!(f, "valid"),
            Self::Test => write!(f, "test"),
        }
    }
}

// networkx node-link layout, as written by `json_graph.node_link_data`
#[derive(Debug, Deserialize)]
struct NodeLinkGraph {
    nodes: Vec<NodeLinkNode>,
    #[serde(alias = "edges")]
    links: Vec<NodeLinkEdge>,
}
#[derive(Debug, Deserialize)]
struct NodeLinkNode {
    id: u64,
}
#[derive(Debug, Deserialize)]
struct NodeLinkEdge {
    source: u64,
    target: u64,
}
impl NodeLinkGraph {
    /// Undirected neighbour lists indexed by node id, neighbours in link
    /// order. Each link is recorded once in both directions; repeated links
    /// are dropped. Node ids must be exactly `0..nodes.len()`, since they
    /// address rows of the `.npy` arrays.
    fn adjacency(&self) -> Result<Vec<Vec<u32>>> {
        let num_nodes = self.nodes.len();
        let mut present = vec![false; num_nodes];
        for node in &self.nodes {
            let id = node.id as usize;
            if id >= num_nodes || std::mem::replace(&mut present[id], true) {
                return Err(Error::InvalidGraph(format!(
                    "node ids must cover 0..{num_nodes} exactly once, found {}",
                    node.id
                )));
            }
        }
        let lookup = |id: u64| {
            if (id as usize) < num_nodes {
                Ok(id as u32)
            } else {
                Err(Error::InvalidGraph(format!("link refers to unknown node {id}")))
            }
        };

        let mut adjacency = vec![Vec::new(); self.nodes.len()];
        let mut seen = HashSet::new();
        for link in &self.links {
            let u = lookup(link.source)?;
            let v = lookup(link.target)?;
            if !seen.insert((u.min(v), u.max(v))) {
                continue;
            }
            adjacency[u as usize].push(v);
            if u != v {
                adjacency[v as usize].push(u);
            }
        }
        Ok(adjacency)
    }
}

/// One split of the PPI benchmark: a list of disjoint protein graphs.
#[derive(Debug, Clone)]
pub struct PpiDataset {
    num_features: usize,
    num_classes: usize,
    graphs: Vec<PpiGraph>,
}
impl PpiDataset {
    /// Loads `split` from `root`, downloading the archive first when the raw
    /// files are absent.
    pub fn new<P: AsRef<Path>>(root: P, split: PpiSplit, device: &Device) -> Result<Self> {
        let root = root.as_ref();
        if Self::raw_dir(root).is_none() {
            Self::download(root)?;
        }
        Self::load(root, split, device)
    }

    pub fn download<P: AsRef<Path>>(root: P) -> Result<()> {
        std::fs::create_dir_all(root.as_ref())?;
        download_and_extract(PPI_URL, root)
    }

    fn raw_dir(root: &Path) -> Option<PathBuf> {
        [root.to_path_buf(), root.join("ppi")]
            .into_iter()
            .find(|dir| dir.join("train_graph.json").exists())
    }

    pub fn load<P: AsRef<Path>>(root: P, split: PpiSplit, device: &Device) -> Result<Self> {
        let root = root.as_ref();
        let dir = Self::raw_dir(root).ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no PPI files under {}", root.display()),
            ))
        })?;

        let reader = BufReader::new(File::open(dir.join(format!("{split}_graph.json")))?);
        let node_link: NodeLinkGraph = serde_json::from_reader(reader)?;
        let adjacency = node_link.adjacency()?;

        let feats = Tensor::read_npy(dir.join(format!("{split}_feats.npy")))?
            .to_dtype(DType::F32)?
            .to_device(device)?;
        let labels = Tensor::read_npy(dir.join(format!("{split}_labels.npy")))?
            .to_dtype(DType::F32)?
            .to_device(device)?;
        let graph_id = Tensor::read_npy(dir.join(format!("{split}_graph_id.npy")))?
            .flatten_all()?
            .to_dtype(DType::I64)?
            .to_vec1::<i64>()?;

        let num_nodes = adjacency.len();
        for (context, rows) in [
            ("feature rows", feats.dims2()?.0),
            ("label rows", labels.dims2()?.0),
            ("graph id entries", graph_id.len()),
        ] {
            if rows != num_nodes {
                return Err(Error::DimensionMismatch {
                    context,
                    expected: num_nodes,
                    got: rows,
                });
            }
        }

        let groups = graph_id
            .iter()
            .enumerate()
            .map(|(node, &gid)| (gid, node as u32))
            .into_group_map();

        let mut local = vec![u32::MAX; num_nodes];
        let mut graphs = Vec::with_capacity(groups.len());
        for gid in groups.keys().sorted() {
            let nodes = &groups[gid];
            for (i, &node) in nodes.iter().enumerate() {
                local[node as usize] = i as u32;
            }
            let mut edges = Vec::new();
            for &u in nodes {
                for &v in &adjacency[u as usize] {
                    if local[v as usize] != u32::MAX {
                        edges.push((local[u as usize], local[v as usize]));
                    }
                }
            }
            for &node in nodes {
                local[node as usize] = u32::MAX;
            }

            let index = Tensor::from_slice(nodes, nodes.len(), device)?;
            let edge_index = edge_index_from_pairs(&edges, device)?;
            let graph = PpiGraph::new(
                feats.index_select(&index, 0)?,
                labels.index_select(&index, 0)?,
                edge_index,
            )?;
            debug!(
                split = %split,
                graph_id = gid,
                nodes = graph.num_nodes(),
                edges = graph.num_edges(),
                "loaded graph"
            );
            graphs.push(graph);
        }

        let dataset = Self::from_graphs(graphs)?;
        info!(
            split = %split,
            graphs = dataset.len(),
            features = dataset.num_features,
            classes = dataset.num_classes,
            "loaded PPI split"
        );
        Ok(dataset)
    }

    /// Wraps already-built graphs; all must share feature and class widths.
    pub fn from_graphs(graphs: Vec<PpiGraph>) -> Result<Self> {
        let first = graphs.first().ok_or(Error::EmptyDataset)?;
        let (num_features, num_classes) = (first.num_features(), first.num_classes());
        for graph in &graphs {
            if graph.num_features() != num_features {
                return Err(Error::DimensionMismatch {
                    context: "dataset features",
                    expected: num_features,
                    got: graph.num_features(),
                });
            }
            if graph.num_classes() != num_classes {
                return Err(Error::DimensionMismatch {
                    context: "dataset classes",
                    expected: num_classes,
                    got: graph.num_classes(),
                });
            }
        }
        Ok(Self {
            num_features,
            num_classes,
            graphs,
        })
    }
}

impl GraphDataset for PpiDataset {
    fn num_features(&self) -> usize {
        self.num_features
    }
    fn num_classes(&self) -> usize {
        self.num_classes
    }
    fn graphs(&self) -> &[PpiGraph] {
        &self.graphs
    }
}
