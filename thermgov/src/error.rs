//! Crate-level error type.

use thiserror::Error;

use crate::config::ConfigError;
use crate::hw::HwError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Hardware(#[from] HwError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, Error>;
