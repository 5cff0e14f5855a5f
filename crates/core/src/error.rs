use thiserror::Error;

use crate::model::{OutlineError, ParseIdError};
use crate::navigator::NavigationError;

/// Any error raised by the domain layer.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    InvalidId(#[from] ParseIdError),
    #[error(transparent)]
    Outline(#[from] OutlineError),
    #[error(transparent)]
    Navigation(#[from] NavigationError),
}
