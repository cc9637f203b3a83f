pub mod discovery;
pub mod sink_graph;
