// LLM abstraction layer

pub mod provider;
pub mod stream;
pub mod openai;
pub mod groq;
pub mod ollama;

pub use provider::*;
pub use stream::FragmentStream;

#[cfg(test)]
pub mod stub;
