// src/lib.rs

pub mod api;
pub mod book;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;
pub mod graph;
pub mod logging;
pub mod media;
pub mod models;
pub mod payload;
pub mod stream;
pub mod utils;

pub use api::{ChatStream, InferenceStreamingCallback, RemoteInference};
pub use book::{BookAnalysis, BookChat, BookClient};
pub use errors::{InferenceError, InferenceResult};
pub use models::{Conversation, Message, MessageKind, Sender};
