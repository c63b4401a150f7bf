pub mod hybrid;
pub mod weights;

pub use hybrid::HybridRetriever;
pub use weights::FusionWeights;
