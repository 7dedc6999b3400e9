//! Core session components: the conversation engine and the document
//! generator.

pub mod engine;
pub mod generator;

pub use engine::{
    ConfirmGate, ConversationEngine, EngineError, MessageObserver, SessionContext, SessionOutcome,
    SessionStatus,
};
pub use generator::{DocumentGenerator, DocumentKind, GenerateError, GenerationReport};
