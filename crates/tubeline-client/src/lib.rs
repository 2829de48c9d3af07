//! Tubeline Client - HTTP clients for external APIs
//!
//! This crate provides HTTP clients for interacting with:
//!
//! - [`openai`] - OpenAI embeddings API
//! - [`chat`] - OpenAI chat completions, used for video summaries
//! - [`youtube`] - YouTube Data API v3 `videos.list`
//! - [`pinecone`] - Pinecone vector fetch
//!
//! # Overview
//!
//! The clients handle authentication, request building, response parsing,
//! and error handling for their respective APIs. Each one implements a
//! provider trait from `tubeline_core::traits`, and all of them classify
//! failures into `AppError` the same way.

mod http;

pub mod chat;
pub mod openai;
pub mod pinecone;
pub mod youtube;

// Re-export main client types
pub use chat::ChatClient;
pub use openai::OpenAIClient;
pub use pinecone::PineconeClient;
pub use youtube::YouTubeClient;
