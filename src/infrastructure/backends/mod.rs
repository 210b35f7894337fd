pub mod openai_backend;
pub mod speech_backend;

pub use openai_backend::OpenAiSpeechBackend;
pub use speech_backend::{AudioChunkStream, SpeechBackend};
