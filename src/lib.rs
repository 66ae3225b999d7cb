pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod gpu;
pub mod host;
pub mod loader;
pub mod particles;
pub mod scene;
pub mod scheduler;
pub mod settings;
pub mod watch;

pub use error::{Error, Result};
