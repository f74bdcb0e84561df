pub mod config;
pub mod context;
pub mod daemon;
pub mod media;
pub mod status;
pub mod sync;
