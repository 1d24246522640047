//! Provides the [`PathExt`](PathExt) trait which provides several commonly used functions on paths
//! and path-like objects.

use crate::error::PathError;
use std::path::Path;

/// Collection of common functions used with paths and path-like objects.
pub trait PathExt {
    /// Borrows the path as an `&str`. Returns `PathError::InvalidUnicode` error if the path
    /// contains invalid Unicode.
    fn get_str(&self) -> anyhow::Result<&str>;
    /// Copies the path as a `String`. Returns `PathError::InvalidUnicode` error if the path
    /// contains invalid Unicode.
    fn get_string(&self) -> anyhow::Result<String>;
}

impl<P> PathExt for P
where
    P: AsRef<Path>,
{
    fn get_str(&self) -> anyhow::Result<&str> {
        Ok(self.as_ref().to_str().ok_or(PathError::InvalidUnicode)?)
    }

    fn get_string(&self) -> anyhow::Result<String> {
        Ok(self
            .as_ref()
            .to_str()
            .ok_or(PathError::InvalidUnicode)?
            .to_string())
    }
}
