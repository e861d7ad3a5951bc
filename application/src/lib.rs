pub mod dto;
pub mod error;
pub mod sanitize;
pub mod usecase;

pub use dto::{SynthesizeCommand, TranscribeCommand};
pub use error::ApplicationError;
pub use usecase::synthesize::{SynthesisDefaults, SynthesisUseCase};
pub use usecase::transcribe::{TranscriptionOrchestrator, TranscriptionSettings};
