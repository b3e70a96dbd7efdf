//! Error types shared by the search and decomposition layers.

use thiserror::Error;

/// Everything that can go wrong while searching for common substructures or
/// decomposing molecules against a scaffold.
///
/// Running out of iteration budget is not an error at the search level; see
/// [`crate::mcs::ExactResult::stopped`]. Only scaffold detection escalates it
/// into [`Error::IterationLimit`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("mcs search was cancelled")]
    Cancelled,
    #[error("input mapping incorrect")]
    IncorrectMapping,
    #[error("graph set size == 0")]
    EmptyGraphSet,
    #[error("no scaffolds found")]
    NoScaffoldsFound,
    #[error("scaffold detection exact searching max iteration limit reached")]
    IterationLimit,
    #[error("scaffold vertex count equals 0")]
    EmptyScaffold,
    #[error("no embeddings obtained")]
    NoEmbeddings,
    #[error("no embeddings were found for the molecule {0}")]
    NoEmbeddingsForMolecule(usize),
    #[error("internal error: can not find the edge for a scaffold")]
    MissingScaffoldEdge,
    #[error("internal error: can not find the edge for a fragment")]
    MissingFragmentEdge,
    #[error("internal error: can not calculate scaffold matchings for null automorphism")]
    NullAutomorphism,
    #[error("internal error: incorrect automorphism for a scaffold")]
    IncorrectAutomorphism,
    #[error("internal error: undefined mapping")]
    UndefinedMapping,
    #[error("no decomposition item with index {0}")]
    UnknownItem(usize),
    #[error("no decomposition match with index {0}")]
    UnknownMatch(usize),
}

pub type Result<T> = std::result::Result<T, Error>;
