pub mod confidence;
pub mod expansion;
pub mod faithfulness;
pub mod generation;

pub use confidence::{AnswerSignals, RetrievalSignals};
pub use expansion::ContextExpander;
pub use generation::AnswerGenerator;
