pub mod chat;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod logging;
pub mod rag;
pub mod smalltalk;
pub mod vector;

pub use error::DocQaError;

pub type Result<T> = anyhow::Result<T>;
