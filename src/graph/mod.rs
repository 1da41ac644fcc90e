mod model;
pub mod parse;
mod validate;

pub use model::{Community, Dimensions, GraphData, Link, LinkEnd, LinkId, Node, NodeRef};
pub use parse::parse_graph_json;
pub use validate::{GraphError, LinkSide, ResolvedGraph, degrees, resolve};
