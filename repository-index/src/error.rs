// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Error handling. */

use {std::fmt::Display, thiserror::Error};

/// Primary crate error type.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    #[error("I/O error on path {0}: {1:?}")]
    IoPath(String, std::io::Error),

    #[error("path not found: {0}")]
    NotFound(String),

    #[error("hex parsing error: {0:?}")]
    Hex(#[from] hex::FromHexError),

    #[error("hex data would overflow byte array")]
    HexOverflow,

    #[error("integer parsing error: {0:?}")]
    ParseInt(#[from] std::num::ParseIntError),

    #[error("float parsing error: {0:?}")]
    ParseFloat(#[from] std::num::ParseFloatError),

    #[error("date parsing error: {0:?}")]
    DateParse(#[from] chrono::ParseError),

    #[error("invalid line: {0:?}")]
    InvalidLine(String),

    #[error("unsupported type: {0}")]
    UnsupportedType(&'static str),

    #[error("invalid value for {0}: {1:?}")]
    InvalidValue(&'static str, String),

    #[error("{0}")]
    Codec(String),

    #[error("PGP error: {0:?}")]
    Pgp(#[from] pgp::errors::Error),

    #[error("RSA error: {0:?}")]
    Rsa(#[from] rsa::errors::Error),

    #[error("RSA key error: {0}")]
    RsaKey(String),

    #[error("signature verification failed: {0}")]
    Signing(String),

    #[error("XML error: {0:?}")]
    Xml(#[from] serde_xml_rs::Error),

    #[error("XML write error: {0:?}")]
    XmlWrite(#[from] quick_xml::Error),

    #[error("RPM error: {0:?}")]
    Rpm(#[from] rpm::Error),

    #[error("malformed RPM header: {0}")]
    RpmHeader(&'static str),

    #[error("version constraint error: {0}")]
    Constraint(String),

    #[error("package metadata not found in archive: {0}")]
    MissingMetadata(&'static str),

    #[error("required package field missing: {0}")]
    MissingRequiredField(&'static str),

    #[error("{name} arch mismatch: {arch}")]
    ArchitectureMismatch { name: String, arch: String },

    #[error("failed to parse {path}: {source}")]
    CorruptIndex {
        path: String,
        #[source]
        source: Box<RepositoryError>,
    },

    #[error("no release found")]
    NoReleaseFound,
}

impl RepositoryError {
    /// Whether this error represents a missing file or path.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Io(e) | Self::IoPath(_, e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Wrap an error encountered while parsing an existing index file.
    pub fn corrupt_index(path: impl ToString, source: RepositoryError) -> Self {
        Self::CorruptIndex {
            path: path.to_string(),
            source: Box::new(source),
        }
    }
}

impl serde::ser::Error for RepositoryError {
    fn custom<T: Display>(msg: T) -> Self {
        Self::Codec(msg.to_string())
    }
}

impl serde::de::Error for RepositoryError {
    fn custom<T: Display>(msg: T) -> Self {
        Self::Codec(msg.to_string())
    }
}

/// Result wrapper for this crate.
pub type Result<T> = std::result::Result<T, RepositoryError>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn not_found_classification() {
        assert!(RepositoryError::NotFound("a".into()).is_not_found());
        assert!(RepositoryError::IoPath(
            "a".into(),
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone")
        )
        .is_not_found());
        assert!(!RepositoryError::HexOverflow.is_not_found());
        assert!(!RepositoryError::corrupt_index(
            "x86_64/repo.db",
            RepositoryError::NotFound("inner".into())
        )
        .is_not_found());
    }
}
