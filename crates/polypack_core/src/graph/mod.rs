pub use dependency_graph::*;

mod dependency_graph;
