use thiserror::Error;

/// Library error type for wallpaper operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The background URI does not name something the loader can read.
    #[error("unsupported background uri: {0}")]
    UnsupportedUri(String),

    /// Decoding the background image failed.
    #[error(transparent)]
    Image(#[from] image::ImageError),

    /// Underlying IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid YAML for [`crate::config::Configuration`].
    #[error("malformed configuration: {0}")]
    Config(#[from] serde_yaml::Error),

    /// Validation reported an error while drawing the first frame of a surface.
    #[error("gpu validation failed: {0}")]
    Gpu(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
