pub mod audio_models;
pub mod config;
pub mod error;
pub mod records;
pub mod settings;
pub mod state;
