pub mod health;
pub mod models;
pub mod openai_chat;
