use thiserror::Error;

pub type Result<T> = std::result::Result<T, WebRagError>;

#[derive(Error, Debug)]
pub enum WebRagError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Scrape error: {0}")]
    Scrape(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod auth;
pub mod config;
pub mod embeddings;
pub mod export;
pub mod llm;
pub mod rag;
pub mod scrape;
pub mod server;
pub mod store;
pub mod visuals;
