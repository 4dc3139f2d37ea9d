mod graph;
pub use graph::*;

mod loader;
pub use loader::*;

mod ppi;
pub use ppi::*;

mod traits;
pub use traits::*;

mod utils;
pub use utils::*;
