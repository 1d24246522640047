//! Provides all error types the program uses.

use thiserror::Error;

/// Represents all types of errors that can occur when transforming paths.
#[derive(Debug, Error)]
pub enum PathError {
    /// A given path isn't valid Unicode when converting it (or part of it) into a
    /// `String` or a `&str`.
    #[error("Path isn't valid unicode")]
    InvalidUnicode,
}

/// Represents all types of errors that can occur when interacting with the [`program
/// store`](crate::store::Store).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Returned when loading the program store database file and it has insufficient permissions.
    #[error(
        "Insufficient store file permissions ({path}): maximum {maximum:o}, actual {actual:o}"
    )]
    InsufficientFilePermissions {
        /// Path to the database file.
        path: String,
        /// The maximum required permissions.
        maximum: u32,
        /// The database file's actual permissions.
        actual: u32,
    },
}

/// Represents all types of errors that can occur when resolving a module from the catalog.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No module matches the given identifier.
    #[error("No such module: {0}")]
    ModuleNotFound(String),
    /// The module exists but doesn't have any releases. Distinct from the module not existing:
    /// such a module is valid but unusable until a feed provides a release for it.
    #[error("Module has no releases: {0}")]
    NoReleases(String),
    /// The module exists but doesn't have a release with the requested version.
    #[error("No such release version for {module}: {version}")]
    NoSuchRelease {
        /// The module's name.
        module: String,
        /// The requested version.
        version: String,
    },
}

/// Represents all types of errors that can occur when parsing [`GameVersion`s][GameVersion].
///
/// [GameVersion]: crate::version::GameVersion
#[derive(Debug, Error)]
pub enum GameVersionError {
    /// A given version string has more components than a game version can hold.
    #[error("Too many components in game version: {0}")]
    TooManyComponents(String),
    /// A component of a given version string isn't an integer.
    #[error(transparent)]
    ParsingError(#[from] std::num::ParseIntError),
}

/// Represents all types of errors that render a single module descriptor in a feed invalid. A
/// descriptor failing with one of these is skipped and reported; the rest of the feed is still
/// ingested.
#[derive(Debug, Error)]
pub enum DescriptorError {
    /// The descriptor isn't a valid module document.
    #[error("Invalid module descriptor: {0}")]
    Decode(#[from] serde_json::Error),
    /// The descriptor specifies both the generic game version constraint and a specific minimum or
    /// maximum bound.
    #[error(
        "Descriptor specifies both a generic game version and a specific {} bound",
        if *specific_is_max { "maximum" } else { "minimum" }
    )]
    DuplicateGameVersionConstraint {
        /// Whether the conflicting specific bound is the maximum bound.
        specific_is_max: bool,
    },
    /// The descriptor specifies a maximum version in its replacement directive, which only accepts
    /// an exact or minimum version.
    #[error("Descriptor specifies a maximum version in its replacement")]
    MaxVersionInReplacement,
}

/// Represents all types of errors that can occur when reading a repository feed document.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The feed document as a whole is unreadable. Fatal for the ingestion of that repository;
    /// nothing is written to the store.
    #[error("Feed document is unreadable: {0}")]
    Unreadable(#[source] serde_json::Error),
}
