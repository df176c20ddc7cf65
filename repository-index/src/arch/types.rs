// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Arch Linux package metadata records. */

use {
    crate::control::Timestamp,
    serde::{Deserialize, Serialize},
};

/// A package entry in a repository database, stored as `<name>-<version>/desc`.
///
/// Field order follows `repo-add`.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct Package {
    pub filename: String,
    pub name: String,
    pub base: String,
    pub version: String,
    pub desc: String,
    pub groups: Vec<String>,
    #[serde(rename = "csize")]
    pub compressed_size: u64,
    #[serde(rename = "isize")]
    pub installed_size: u64,
    pub md5sum: [u8; 16],
    pub sha256sum: [u8; 32],

    /// Base64 of the binary detached signature of the package file.
    pub pgpsig: String,
    pub url: String,
    pub license: Vec<String>,
    pub arch: String,
    pub builddate: Timestamp,
    pub packager: String,
    pub replaces: Vec<String>,
    pub conflicts: Vec<String>,
    pub provides: Vec<String>,
    pub depends: Vec<String>,
    pub optdepends: Vec<String>,
    pub makedepends: Vec<String>,
    pub checkdepends: Vec<String>,
}

/// The `.PKGINFO` file at the root of a package archive.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct PkgInfo {
    pub pkgname: String,
    pub pkgbase: String,
    pub pkgver: String,
    pub pkgdesc: String,
    pub url: String,
    pub builddate: Timestamp,
    pub packager: String,
    pub size: u64,
    pub arch: String,
    pub license: Vec<String>,
    pub replaces: Vec<String>,
    pub group: Vec<String>,
    pub conflict: Vec<String>,
    pub provides: Vec<String>,
    pub backup: Vec<String>,
    pub depend: Vec<String>,
    pub optdepend: Vec<String>,
    pub makedepend: Vec<String>,
    pub checkdepend: Vec<String>,
}

impl From<PkgInfo> for Package {
    fn from(info: PkgInfo) -> Self {
        Self {
            name: info.pkgname,
            base: info.pkgbase,
            version: info.pkgver,
            desc: info.pkgdesc,
            groups: info.group,
            installed_size: info.size,
            url: info.url,
            license: info.license,
            arch: info.arch,
            builddate: info.builddate,
            packager: info.packager,
            replaces: info.replaces,
            conflicts: info.conflict,
            provides: info.provides,
            depends: info.depend,
            optdepends: info.optdepend,
            makedepends: info.makedepend,
            checkdepends: info.checkdepend,
            ..Default::default()
        }
    }
}
