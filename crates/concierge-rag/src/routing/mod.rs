pub mod cache;
pub mod gate;
pub mod keyword;
pub mod router;

pub use cache::DecisionCache;
pub use gate::DisambiguationGate;
pub use keyword::KeywordClassifier;
pub use router::LlmRouter;
