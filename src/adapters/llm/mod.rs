//! Language model adapters.

pub mod openai_compatible;
pub mod scripted;

pub use openai_compatible::OpenAiCompatibleModel;
pub use scripted::ScriptedLanguageModel;
