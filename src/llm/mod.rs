//! LLM 层：客户端抽象与实现（Gemini / OpenAI 兼容 / Ollama / Mock）

pub mod gemini;
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod traits;

pub use gemini::GeminiClient;
pub use mock::MockLlmClient;
pub use ollama::OllamaClient;
pub use openai::OpenAiClient;
pub use traits::{LlmClient, Message, Role};
