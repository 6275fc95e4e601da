use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use crate::position::Position;

/// Errors produced while compiling a schema or driving the scanner/reader pipeline.
#[derive(Debug)]
pub enum Error {
    /// A tag pattern contained a literal `<` or `>`.
    InvalidTagDefinition(String),
    /// A path definition line was malformed (duplicate name, empty path, bad identifier, ...).
    InvalidPathSyntax(String),
    /// An output template field was malformed (unbalanced quotes, empty field, ...).
    InvalidTemplateSyntax(String),
    /// The template referenced a path name that was never defined.
    MissingHeaderField(String),
    /// Failure opening a source file.
    IoOpen { path: PathBuf, source: std::io::Error },
    /// Failure reading from an already-open source file.
    IoRead { path: PathBuf, offset: u64, source: std::io::Error },
    /// Failure writing a row to the output sink.
    IoWrite { source: std::io::Error },
    /// The configured encoding could not decode a buffer.
    IoEncoding { path: PathBuf, offset: u64, position: Option<Position> },
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidTagDefinition(pattern) => {
                write!(f, "InvalidTagDefinition: tag pattern '{pattern}' must not contain '<' or '>'")
            }
            Error::InvalidPathSyntax(message) => write!(f, "InvalidPathSyntax: {message}"),
            Error::InvalidTemplateSyntax(message) => write!(f, "InvalidTemplateSyntax: {message}"),
            Error::MissingHeaderField(name) => {
                write!(f, "MissingHeaderField: template references undefined path '{name}'")
            }
            Error::IoOpen { path, source } => {
                write!(f, "IoError: failed to open '{}': {source}", path.display())
            }
            Error::IoRead { path, offset, source } => {
                write!(f, "IoError: failed to read '{}' at offset {offset}: {source}", path.display())
            }
            Error::IoWrite { source } => write!(f, "IoError: failed to write output: {source}"),
            Error::IoEncoding { path, offset, position } => match position {
                Some(p) => write!(f, "IoError: encoding error in '{}' at offset {offset} ({p})", path.display()),
                None => write!(f, "IoError: encoding error in '{}' at offset {offset}", path.display()),
            },
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoOpen { source, .. } | Error::IoRead { source, .. } | Error::IoWrite { source } => {
                Some(source)
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
