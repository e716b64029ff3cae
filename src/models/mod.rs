//! Concrete encoders and vocabularies, plus device selection and weight
//! sharing.

pub mod cache;
pub mod device;
pub mod sentence_bert;
pub mod word_vectors;

pub use cache::{global_cache, ModelCache, ModelOptions};
pub use device::DeviceRequest;
pub use sentence_bert::{SentenceEncoder, SentenceEncoderBuilder};
pub use word_vectors::{WordVectorFormat, WordVectors};
