mod traits;
pub use traits::*;
pub mod utils;

mod gcn;
pub use gcn::{Gcn, GcnConv, GcnParams};
mod gat;
pub use gat::{AttentionScheme, DenseGat, DenseRowSoftmax, GatParams};

mod model;
pub use model::{ModelKind, PpiModel};
