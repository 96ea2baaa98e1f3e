pub mod config;
pub mod content_parts;
pub mod conversation;
pub mod course_card;
pub mod decoder;
pub mod errors;
pub mod intent;
pub mod models;
pub mod request;
pub mod retry;
pub mod session;
pub mod streamer;
pub mod transport;
pub mod voice;
