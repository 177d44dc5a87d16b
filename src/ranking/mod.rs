//! Contextual multi-factor ranking with adaptive weights (§4.5).

pub mod adaptive;
pub mod factors;
pub mod scorer;
pub mod weights;

pub use adaptive::AdaptiveRanker;
pub use scorer::rank;
pub use weights::reference_table;
pub use weights::WeightTable;
