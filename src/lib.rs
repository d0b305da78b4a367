pub mod api;
pub mod audio;
pub mod chatterbox;
pub mod config;
pub mod error;
pub mod registry;
