// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Build configuration.

These types hold plain values and deserialize from any serde format. Signing
keys are deliberately absent: they are passed to the builders directly.
*/

use {
    crate::io::Compression,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

/// Options common to every repository build.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildOptions {
    /// Constraint restricting which release versions are considered.
    pub version: String,

    /// Whether prerelease versions are considered.
    pub prerelease: bool,

    /// Clock used for dates and signature creation times.
    ///
    /// The wall clock is used when unset.
    pub timestamp: Option<DateTime<Utc>>,
}

impl BuildOptions {
    /// The current time as seen by the build.
    pub fn now(&self) -> DateTime<Utc> {
        self.timestamp.unwrap_or_else(Utc::now)
    }
}

/// Configuration of an APT repository.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AptConfig {
    /// Sub-directory of the target holding the repository.
    pub folder: String,

    /// Compression variants written for each `Packages` file.
    pub compress: Vec<Compression>,

    /// `Origin` field of `Release` files.
    pub origin: String,

    /// `Label` field of `Release` files.
    pub label: String,

    /// `Description` field of `Release` files.
    pub description: String,
}

impl Default for AptConfig {
    fn default() -> Self {
        Self {
            folder: String::new(),
            compress: vec![Compression::None, Compression::Gzip],
            origin: String::new(),
            label: String::new(),
            description: String::new(),
        }
    }
}

/// Configuration of an Arch Linux repository.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArchConfig {
    pub folder: String,

    /// Name of the repository, as used in `pacman.conf`.
    pub repo_name: String,
}

impl Default for ArchConfig {
    fn default() -> Self {
        Self {
            folder: String::new(),
            repo_name: "repo".to_string(),
        }
    }
}

/// Configuration of a YUM repository.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct YumConfig {
    pub folder: String,
}

/// Configuration of an Alpine repository.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApkConfig {
    pub folder: String,

    /// Base name of the public key file, `<key_name>.rsa.pub`.
    pub key_name: String,

    /// `DESCRIPTION` entry of each index. Omitted when empty.
    pub description: String,
}

impl Default for ApkConfig {
    fn default() -> Self {
        Self {
            folder: String::new(),
            key_name: "repository".to_string(),
            description: String::new(),
        }
    }
}

#[cfg(test)]
mod test {
    use {super::*, chrono::TimeZone};

    #[test]
    fn defaults() {
        assert_eq!(
            AptConfig::default().compress,
            vec![Compression::None, Compression::Gzip]
        );
        assert_eq!(ArchConfig::default().repo_name, "repo");
        assert_eq!(ApkConfig::default().key_name, "repository");
    }

    #[test]
    fn injected_clock() {
        let time = Utc.timestamp_opt(1700000000, 0).unwrap();
        let options = BuildOptions {
            timestamp: Some(time),
            ..Default::default()
        };
        assert_eq!(options.now(), time);
    }
}
