pub mod auth;
pub mod chat;
pub mod config;
pub mod error;
pub mod identity;
pub mod import;
pub mod llm;
pub mod model;
pub mod prompt;
pub mod sessions;
pub mod storage;
pub mod turns;
