// Recursive index of the remote tree.
// Maintains the path map and directory adjacency with quick and full rebuilds.

mod builder;

pub use builder::{IndexBuilder, IndexStats, RebuildSink};
