// Core types and traits for the Lull ambient sound engine

pub mod catalog;
pub mod error;
pub mod event;
pub mod resolver;
pub mod state;

// Re-export commonly used types
pub use catalog::{SoundCatalog, SoundCategory, SoundDefinition, SoundSource};
pub use error::{AudioError, Result};
pub use event::{CallbackManager, EngineCallback, EngineEvent};
pub use resolver::SourceResolver;
pub use state::{LayerState, LayerStateContainer, PlayMode};
