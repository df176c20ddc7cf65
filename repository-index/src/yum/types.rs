// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! YUM repository metadata documents.

These types are read with `serde-xml-rs`. Namespace prefixes are not seen by
the deserializer, so `<rpm:license>` maps to a `license` field.
*/

use {
    crate::error::Result,
    serde::{Deserialize, Serialize},
    std::io::Read,
};

/// A `repomd.xml` file.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct RepoMd {
    /// Revision of the repository.
    #[serde(default)]
    pub revision: String,

    /// The metadata documents constituting this repository.
    #[serde(default)]
    pub data: Vec<RepoMdData>,
}

impl RepoMd {
    /// Construct an instance by parsing XML from a reader.
    pub fn from_reader(reader: impl Read) -> Result<Self> {
        Ok(serde_xml_rs::from_reader(reader)?)
    }

    /// Construct an instance by parsing XML from a string.
    pub fn from_xml(s: &str) -> Result<Self> {
        Ok(serde_xml_rs::from_str(s)?)
    }

    /// Location of the document of a given type.
    pub fn location(&self, data_type: &str) -> Option<&str> {
        self.data
            .iter()
            .find(|d| d.data_type == data_type)
            .map(|d| d.location.href.as_str())
    }
}

/// A `<data>` element in a `repomd.xml` file.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct RepoMdData {
    /// The type of data.
    #[serde(rename = "type")]
    pub data_type: String,
    /// Content checksum of this file.
    pub checksum: Checksum,
    /// Content checksum of the decompressed file.
    #[serde(rename = "open-checksum")]
    pub open_checksum: Option<Checksum>,
    /// Where the file is located.
    pub location: Location,
    /// Time file was created.
    pub timestamp: Option<i64>,
    /// Size in bytes of the file as stored in the repository.
    pub size: Option<u64>,
    /// Size in bytes of the decompressed file.
    #[serde(rename = "open-size")]
    pub open_size: Option<u64>,
}

/// A content checksum.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Checksum {
    /// Digest type.
    #[serde(rename = "type")]
    pub name: String,

    /// Hex encoded digest value.
    #[serde(rename = "$value")]
    pub value: String,

    #[serde(rename = "pkgid")]
    pub pkg_id: Option<String>,
}

impl Checksum {
    /// A SHA-256 checksum of some content.
    pub fn sha256(data: &[u8]) -> Self {
        Self {
            name: "sha256".to_string(),
            value: hex::encode(crate::io::sha256_digest(data)),
            pkg_id: None,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Location {
    pub href: String,
}

/// A `primary.xml` file.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Primary {
    /// The number of packages expressed by this document.
    #[serde(default, rename = "packages")]
    pub count: usize,

    #[serde(default, rename = "package")]
    pub packages: Vec<Package>,
}

impl Primary {
    pub fn from_reader(reader: impl Read) -> Result<Self> {
        Ok(serde_xml_rs::from_reader(reader)?)
    }
}

/// A package as advertised in a `primary.xml` file.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Package {
    /// The type/flavor of a package. Always `rpm`.
    #[serde(rename = "type")]
    pub package_type: String,
    pub name: String,
    pub arch: String,
    pub version: PackageVersion,

    /// SHA-256 of the package file, doubling as the package identifier.
    pub checksum: Checksum,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    pub packager: Option<String>,
    pub url: Option<String>,
    pub time: PackageTime,
    pub size: PackageSize,
    pub location: Location,
    #[serde(default)]
    pub format: PackageFormat,
}

impl Package {
    /// The package identifier shared by the three metadata documents.
    pub fn pkg_id(&self) -> &str {
        &self.checksum.value
    }
}

/// Describes a package version.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct PackageVersion {
    #[serde(default)]
    pub epoch: u64,

    #[serde(rename = "ver")]
    pub version: String,

    #[serde(rename = "rel")]
    pub release: String,
}

impl PackageVersion {
    /// The `epoch:version-release` form, with the epoch omitted when zero.
    pub fn evr(&self) -> String {
        let mut s = if self.epoch > 0 {
            format!("{}:{}", self.epoch, self.version)
        } else {
            self.version.clone()
        };

        if !self.release.is_empty() {
            s.push('-');
            s.push_str(&self.release);
        }

        s
    }
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct PackageTime {
    /// When the package was added to the repository.
    pub file: i64,
    pub build: i64,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct PackageSize {
    pub package: u64,

    /// Total size in bytes when installed.
    pub installed: u64,

    /// Size in bytes of the compressed payload.
    pub archive: u64,
}

/// The `<format>` element, holding the `rpm:` namespaced metadata.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct PackageFormat {
    pub license: Option<String>,
    pub vendor: Option<String>,
    pub group: Option<String>,

    #[serde(rename = "buildhost")]
    pub build_host: Option<String>,

    #[serde(rename = "sourcerpm")]
    pub source_rpm: Option<String>,

    /// File segment containing the main header.
    #[serde(rename = "header-range")]
    pub header_range: Option<HeaderRange>,

    pub provides: Option<Entries>,
    pub obsoletes: Option<Entries>,
    pub requires: Option<Entries>,
    pub conflicts: Option<Entries>,

    /// Files commonly depended on by path (`/etc/*` and `*/bin/*`).
    #[serde(default, rename = "file")]
    pub files: Vec<FileEntry>,
}

/// Byte offsets of the main header in a package file.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct HeaderRange {
    pub start: u64,
    pub end: u64,
}

/// A collection of [PackageEntry].
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Entries {
    #[serde(default, rename = "entry")]
    pub entries: Vec<PackageEntry>,
}

/// Describes a package relationship.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct PackageEntry {
    pub name: String,

    /// Version comparison flags: `EQ`, `LT`, `GT`, `LE` or `GE`.
    pub flags: Option<String>,
    pub epoch: Option<u64>,

    #[serde(rename = "ver")]
    pub version: Option<String>,

    #[serde(rename = "rel")]
    pub release: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct FileEntry {
    /// Type of file. A missing value implies a regular file.
    #[serde(rename = "type")]
    pub file_type: Option<String>,

    #[serde(rename = "$value")]
    pub path: String,
}

/// A `filelists.xml` file.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct FileLists {
    #[serde(default, rename = "packages")]
    pub count: usize,

    #[serde(default, rename = "package")]
    pub packages: Vec<FileListsPackage>,
}

impl FileLists {
    pub fn from_reader(reader: impl Read) -> Result<Self> {
        Ok(serde_xml_rs::from_reader(reader)?)
    }
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct FileListsPackage {
    #[serde(rename = "pkgid")]
    pub pkg_id: String,
    pub name: String,
    pub arch: String,
    pub version: PackageVersion,

    #[serde(default, rename = "file")]
    pub files: Vec<FileEntry>,
}

/// An `other.xml` file.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Other {
    #[serde(default, rename = "packages")]
    pub count: usize,

    #[serde(default, rename = "package")]
    pub packages: Vec<OtherPackage>,
}

impl Other {
    pub fn from_reader(reader: impl Read) -> Result<Self> {
        Ok(serde_xml_rs::from_reader(reader)?)
    }
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct OtherPackage {
    #[serde(rename = "pkgid")]
    pub pkg_id: String,
    pub name: String,
    pub arch: String,
    pub version: PackageVersion,
}

#[cfg(test)]
mod test {
    use {super::*, indoc::indoc};

    #[test]
    fn parse_repomd() -> Result<()> {
        let repomd = RepoMd::from_xml(indoc! {r#"
            <?xml version="1.0" encoding="UTF-8"?>
            <repomd xmlns="http://linux.duke.edu/metadata/repo" xmlns:rpm="http://linux.duke.edu/metadata/rpm">
              <revision>1700000000</revision>
              <data type="primary">
                <checksum type="sha256">aa</checksum>
                <open-checksum type="sha256">bb</open-checksum>
                <location href="repodata/aa-primary.xml.gz"/>
                <timestamp>1700000000</timestamp>
                <size>120</size>
                <open-size>400</open-size>
              </data>
              <data type="other">
                <checksum type="sha256">cc</checksum>
                <location href="repodata/cc-other.xml.gz"/>
              </data>
            </repomd>
        "#})?;

        assert_eq!(repomd.revision, "1700000000");
        assert_eq!(repomd.data.len(), 2);
        assert_eq!(repomd.data[0].checksum.value, "aa");
        assert_eq!(repomd.data[0].open_size, Some(400));
        assert_eq!(repomd.location("other"), Some("repodata/cc-other.xml.gz"));
        assert_eq!(repomd.location("filelists"), None);

        Ok(())
    }

    #[test]
    fn parse_primary() -> Result<()> {
        let primary = Primary::from_reader(
            indoc! {r#"
                <?xml version="1.0" encoding="UTF-8"?>
                <metadata xmlns="http://linux.duke.edu/metadata/common" xmlns:rpm="http://linux.duke.edu/metadata/rpm" packages="1">
                  <package type="rpm">
                    <name>hello</name>
                    <arch>x86_64</arch>
                    <version epoch="0" ver="1.0.0" rel="1"/>
                    <checksum type="sha256" pkgid="YES">abcd</checksum>
                    <summary>Says hello</summary>
                    <description>Prints a greeting</description>
                    <time file="1700000000" build="1690000000"/>
                    <size package="2048" installed="4096" archive="1024"/>
                    <location href="Packages/h/hello-1.0.0-1.x86_64.rpm"/>
                    <format>
                      <rpm:license>MIT</rpm:license>
                      <rpm:header-range start="280" end="1200"/>
                      <rpm:requires>
                        <rpm:entry name="glibc" flags="GE" epoch="0" ver="2.28"/>
                      </rpm:requires>
                      <file>/usr/bin/hello</file>
                    </format>
                  </package>
                </metadata>
            "#}
            .as_bytes(),
        )?;

        assert_eq!(primary.count, 1);
        let package = &primary.packages[0];
        assert_eq!(package.pkg_id(), "abcd");
        assert_eq!(package.version.evr(), "1.0.0-1");
        assert_eq!(package.format.license.as_deref(), Some("MIT"));
        assert_eq!(
            package.format.header_range,
            Some(HeaderRange {
                start: 280,
                end: 1200
            })
        );
        assert_eq!(
            package.format.requires.as_ref().map(|r| r.entries[0].flags.clone()),
            Some(Some("GE".to_string()))
        );
        assert_eq!(package.format.files[0].path, "/usr/bin/hello");

        Ok(())
    }

    #[test]
    fn evr() {
        let version = PackageVersion {
            epoch: 2,
            version: "1.0".into(),
            release: "3.el9".into(),
        };
        assert_eq!(version.evr(), "2:1.0-3.el9");
    }
}
