//! Error handling for Scaffold.
//! Defines the error type and result alias used throughout the engine.

use std::io;
use thiserror::Error;

/// Errors that can surface from template loading, preparation and rendering.
///
/// Unreadable template files and unresolved placeholders never show up
/// here: the first degrades to literal markup, the second to empty text.
#[derive(Error, Debug)]
pub enum Error {
    /// Represents errors that occur during file system operations
    #[error("IO error: {0}.")]
    IoError(#[from] io::Error),

    /// The markup could not be parsed into a tree
    #[error("XML error: {0}.")]
    XmlError(#[from] quick_xml::Error),

    /// The markup contained bytes that could not be decoded
    #[error("Encoding error: {0}.")]
    EncodingError(#[from] quick_xml::encoding::EncodingError),

    /// A directive was used without an attribute it cannot work without
    #[error("Directive '{directive}' requires the '{attribute}' attribute.")]
    MissingAttribute {
        directive: String,
        attribute: String,
    },

    /// Represents errors that occur during template processing
    #[error("Template error: {0}.")]
    TemplateError(String),

    /// Represents errors that occur while reading configuration or variables
    #[error("Configuration error: {0}.")]
    ConfigError(String),
}

/// Convenience type alias for Results with [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Default error handler that prints the error and exits the program.
///
/// # Arguments
/// * `err` - The error to handle
pub fn default_error_handler(err: Error) {
    eprintln!("{}", err);
    std::process::exit(1);
}
