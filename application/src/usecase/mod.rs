pub mod synthesize;
pub mod transcribe;
