//! Wire format types for each HTTP backend

pub mod ollama;
pub mod openai;
