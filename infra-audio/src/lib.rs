pub mod filters;
pub mod noise;
pub mod normalizer;
pub mod preprocess;
pub mod segments;
pub mod temp;
pub mod vad;

pub use normalizer::{AudioNormalizer, TARGET_SAMPLE_RATE};
pub use preprocess::{PreprocessOptions, Preprocessor};
pub use temp::{sweep_stale_artifacts, timestamped_artifact_path, TempArtifact};
