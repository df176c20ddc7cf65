// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Records found in APT repositories. */

use {
    crate::control::Timestamp,
    serde::{Deserialize, Serialize},
};

/// A binary package entry in a `Packages` index.
///
/// The same type decodes the `control` file of a `.deb`: fields only an index
/// carries are simply absent there.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Package {
    pub package: String,
    pub version: String,
    pub architecture: String,
    pub maintainer: String,
    #[serde(rename = "Installed-Size")]
    pub installed_size: u64,
    #[serde(rename = "Pre-Depends")]
    pub pre_depends: String,
    pub depends: String,
    pub recommends: String,
    pub conflicts: String,
    pub replaces: String,
    pub provides: String,
    pub priority: String,
    pub section: String,

    /// Path of the `.deb` relative to the repository root.
    pub filename: String,
    pub size: u64,
    #[serde(rename = "MD5sum")]
    pub md5sum: [u8; 16],
    #[serde(rename = "SHA1")]
    pub sha1: [u8; 20],
    #[serde(rename = "SHA256")]
    pub sha256: [u8; 32],
    pub homepage: String,
    pub description: String,
}

impl Package {
    /// The canonical pool path of this package.
    pub fn pool_path(&self) -> String {
        let prefix = self.package.chars().next().map(String::from).unwrap_or_default();

        format!(
            "pool/main/{}/{}/{}_{}_{}.deb",
            prefix, self.package, self.package, self.version, self.architecture
        )
    }
}

/// The `Release` file describing a single `binary-<arch>` directory.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ArchitectureRelease {
    pub origin: String,
    pub label: String,
    pub archive: String,
    pub suite: String,
    pub component: String,
    pub architecture: String,
    pub description: String,
}

/// The `Release` manifest at the top of a suite.
///
/// Checksum fields list one `<digest> <size> <path>` line per index file, with
/// paths relative to the suite directory.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct SuiteRelease {
    pub origin: String,
    pub label: String,
    pub suite: String,
    pub codename: String,
    pub date: Timestamp,
    pub architectures: String,
    pub components: String,
    pub description: String,
    #[serde(rename = "MD5Sum")]
    pub md5sum: String,
    #[serde(rename = "SHA1")]
    pub sha1: String,
    #[serde(rename = "SHA256")]
    pub sha256: String,
}

impl SuiteRelease {
    /// Record an index file in the checksum fields.
    pub fn add_file(&mut self, path: &str, data: &[u8]) {
        let digest = crate::io::MultiContentDigest::digest(data);

        for (field, value) in [
            (&mut self.md5sum, hex::encode(digest.md5)),
            (&mut self.sha1, hex::encode(digest.sha1)),
            (&mut self.sha256, hex::encode(digest.sha256)),
        ] {
            field.push_str(&format!("\n{} {} {}", value, data.len(), path));
        }
    }
}
