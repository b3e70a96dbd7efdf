// Graph substrate over petgraph stable graphs
pub mod graph;

// Molecule definition, submolecules and R-group tables
pub mod molecule;

// Data IO
pub mod loader;

// Shared error type and cooperative cancellation
pub mod cancel;
pub mod error;

// Vertex/edge predicates, embeddings and automorphisms
pub mod automorphism;
pub mod embedding;
pub mod matching;

// Kekulé ring aromatization
pub mod aromatic;

// The hard bit: maximum common subgraph search
pub mod mcs;

// Folding a molecule set into one scaffold
pub mod scaffold;

// Scaffold/R-group decomposition
pub mod deconvolution;

pub use cancel::Cancellation;
pub use error::{Error, Result};
