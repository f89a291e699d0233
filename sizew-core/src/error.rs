use thiserror::Error;

#[derive(Error, Debug)]
pub enum SizewError {
    #[error("Cache format error: {0}")]
    Cache(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SizewError>;
