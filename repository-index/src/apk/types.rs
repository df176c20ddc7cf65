// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Alpine package metadata records. */

use serde::{Deserialize, Serialize};

/// A record in an `APKINDEX` file.
///
/// Keys are single letters, in the order `apk index` writes them. Relations
/// (`D`, `p`, `i`) are space separated lists.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct Package {
    /// `Q1` followed by the base64 SHA-1 of the control segment.
    #[serde(rename = "C")]
    pub checksum: String,
    #[serde(rename = "P")]
    pub name: String,
    #[serde(rename = "V")]
    pub version: String,
    #[serde(rename = "A")]
    pub arch: String,
    #[serde(rename = "S")]
    pub size: u64,
    #[serde(rename = "I")]
    pub installed_size: u64,
    #[serde(rename = "T")]
    pub description: String,
    #[serde(rename = "U")]
    pub url: String,
    #[serde(rename = "L")]
    pub license: String,
    #[serde(rename = "o")]
    pub origin: String,
    #[serde(rename = "m")]
    pub maintainer: String,
    #[serde(rename = "t")]
    pub build_time: u64,
    #[serde(rename = "c")]
    pub commit: String,
    #[serde(rename = "k")]
    pub provider_priority: String,
    #[serde(rename = "D")]
    pub depends: String,
    #[serde(rename = "p")]
    pub provides: String,
    #[serde(rename = "i")]
    pub install_if: String,
}

impl Package {
    /// Canonical filename of the package file.
    pub fn filename(&self) -> String {
        format!("{}-{}.apk", self.name, self.version)
    }
}

/// The `.PKGINFO` file of an Alpine package, written by `abuild`.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct PkgInfo {
    pub pkgname: String,
    pub pkgver: String,
    pub pkgdesc: String,
    pub url: String,
    pub builddate: u64,
    pub packager: String,
    pub size: u64,
    pub arch: String,
    pub origin: String,
    pub commit: String,
    pub maintainer: String,
    pub provider_priority: String,
    pub license: String,
    pub depend: Vec<String>,
    pub provides: Vec<String>,
    pub install_if: Vec<String>,
    pub datahash: String,
}

impl From<PkgInfo> for Package {
    fn from(info: PkgInfo) -> Self {
        Self {
            name: info.pkgname,
            version: info.pkgver,
            arch: info.arch,
            installed_size: info.size,
            description: info.pkgdesc,
            url: info.url,
            license: info.license,
            origin: info.origin,
            maintainer: info.maintainer,
            build_time: info.builddate,
            commit: info.commit,
            provider_priority: info.provider_priority,
            depends: info.depend.join(" "),
            provides: info.provides.join(" "),
            install_if: info.install_if.join(" "),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod test {
    use {
        super::*,
        crate::{
            control::{APKINDEX, PKGINFO},
            error::Result,
        },
        indoc::indoc,
    };

    #[test]
    fn pkginfo_to_index_record() -> Result<()> {
        let info = PKGINFO.from_str::<PkgInfo>(indoc! {"
            # Generated by abuild 3.12.0
            # using fakeroot version 1.32.1
            pkgname = hello
            pkgver = 1.0.0-r0
            pkgdesc = A greeting tool
            url = https://example.com
            builddate = 1700000000
            size = 4096
            arch = x86_64
            origin = hello
            maintainer = Jane Doe <jane@example.com>
            license = MIT
            depend = so:libc.musl-x86_64.so.1
            depend = bash
            provides = cmd:hello=1.0.0-r0
            datahash = 0123abcd
        "})?;

        let mut package = Package::from(info);
        package.checksum = "Q1AAAA".into();
        package.size = 2048;

        assert_eq!(package.filename(), "hello-1.0.0-r0.apk");
        assert_eq!(
            APKINDEX.to_string(&package)?,
            indoc! {"
                C:Q1AAAA
                P:hello
                V:1.0.0-r0
                A:x86_64
                S:2048
                I:4096
                T:A greeting tool
                U:https://example.com
                L:MIT
                o:hello
                m:Jane Doe <jane@example.com>
                t:1700000000
                D:so:libc.musl-x86_64.so.1 bash
                p:cmd:hello=1.0.0-r0
            "}
        );

        Ok(())
    }

    #[test]
    fn index_records_round_trip() -> Result<()> {
        let text = indoc! {"
            C:Q1AAAA
            P:hello
            V:1.0.0-r0
            A:x86_64
            S:2048
            I:4096
            T:A greeting tool
            p:cmd:hello=1.0.0-r0

            C:Q1BBBB
            P:hello-doc
            V:1.0.0-r0
            A:x86_64
            S:100
            I:200
            T:Documentation
            i:docs hello=1.0.0-r0

        "};

        let packages = APKINDEX.from_str::<Vec<Package>>(text)?;
        assert_eq!(packages.len(), 2);
        assert_eq!(packages[0].name, "hello");
        assert_eq!(packages[0].provides, "cmd:hello=1.0.0-r0");
        assert_eq!(packages[1].install_if, "docs hello=1.0.0-r0");
        assert_eq!(APKINDEX.from_str::<Vec<Package>>(&APKINDEX.to_string(&packages)?)?, packages);

        Ok(())
    }
}
