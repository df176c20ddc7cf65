// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Serialization of YUM metadata documents.

Documents are written with `quick-xml` events in the element order used by
`createrepo_c`. Optional values that are absent or empty are left out.
*/

use {
    super::types::{
        Entries, FileEntry, FileLists, Other, Package, PackageVersion, Primary, RepoMd,
    },
    crate::error::Result,
    quick_xml::{
        events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
        Writer,
    },
};

pub const COMMON_NAMESPACE: &str = "http://linux.duke.edu/metadata/common";
pub const RPM_NAMESPACE: &str = "http://linux.duke.edu/metadata/rpm";
pub const FILELISTS_NAMESPACE: &str = "http://linux.duke.edu/metadata/filelists";
pub const OTHER_NAMESPACE: &str = "http://linux.duke.edu/metadata/other";
pub const REPO_NAMESPACE: &str = "http://linux.duke.edu/metadata/repo";

struct XmlWriter {
    writer: Writer<Vec<u8>>,
}

impl XmlWriter {
    fn new() -> Result<Self> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        Ok(Self { writer })
    }

    fn start(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<()> {
        let element = BytesStart::new(name).with_attributes(attributes.iter().copied());
        Ok(self.writer.write_event(Event::Start(element))?)
    }

    fn end(&mut self, name: &str) -> Result<()> {
        Ok(self.writer.write_event(Event::End(BytesEnd::new(name)))?)
    }

    fn empty(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<()> {
        let element = BytesStart::new(name).with_attributes(attributes.iter().copied());
        Ok(self.writer.write_event(Event::Empty(element))?)
    }

    fn text(&mut self, name: &str, attributes: &[(&str, &str)], text: &str) -> Result<()> {
        self.start(name, attributes)?;
        self.writer.write_event(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    fn optional_text(&mut self, name: &str, text: Option<&str>) -> Result<()> {
        match text {
            Some(text) if !text.is_empty() => self.text(name, &[], text),
            _ => Ok(()),
        }
    }

    fn version(&mut self, version: &PackageVersion) -> Result<()> {
        let epoch = version.epoch.to_string();
        self.empty(
            "version",
            &[
                ("epoch", &epoch),
                ("ver", &version.version),
                ("rel", &version.release),
            ],
        )
    }

    fn entries(&mut self, name: &str, entries: Option<&Entries>) -> Result<()> {
        let entries = match entries {
            Some(entries) if !entries.entries.is_empty() => entries,
            _ => return Ok(()),
        };

        self.start(name, &[])?;
        for entry in &entries.entries {
            let epoch = entry.epoch.map(|e| e.to_string());

            let mut attributes = vec![("name", entry.name.as_str())];
            for (key, value) in [
                ("flags", entry.flags.as_deref()),
                ("epoch", epoch.as_deref()),
                ("ver", entry.version.as_deref()),
                ("rel", entry.release.as_deref()),
            ] {
                if let Some(value) = value {
                    attributes.push((key, value));
                }
            }

            self.empty("rpm:entry", &attributes)?;
        }
        self.end(name)
    }

    fn files(&mut self, files: &[FileEntry]) -> Result<()> {
        for file in files {
            match file.file_type.as_deref() {
                Some(file_type) => self.text("file", &[("type", file_type)], &file.path)?,
                None => self.text("file", &[], &file.path)?,
            }
        }

        Ok(())
    }

    fn package(&mut self, package: &Package) -> Result<()> {
        self.start("package", &[("type", &package.package_type)])?;
        self.text("name", &[], &package.name)?;
        self.text("arch", &[], &package.arch)?;
        self.version(&package.version)?;

        let checksum = &package.checksum;
        match &checksum.pkg_id {
            Some(pkg_id) => self.text(
                "checksum",
                &[("type", &checksum.name), ("pkgid", pkg_id)],
                &checksum.value,
            )?,
            None => self.text("checksum", &[("type", &checksum.name)], &checksum.value)?,
        }

        self.text("summary", &[], &package.summary)?;
        self.text("description", &[], &package.description)?;
        self.optional_text("packager", package.packager.as_deref())?;
        self.optional_text("url", package.url.as_deref())?;

        let (file_time, build_time) = (
            package.time.file.to_string(),
            package.time.build.to_string(),
        );
        self.empty("time", &[("file", &file_time), ("build", &build_time)])?;

        let (size, installed, archive) = (
            package.size.package.to_string(),
            package.size.installed.to_string(),
            package.size.archive.to_string(),
        );
        self.empty(
            "size",
            &[
                ("package", &size),
                ("installed", &installed),
                ("archive", &archive),
            ],
        )?;
        self.empty("location", &[("href", &package.location.href)])?;

        let format = &package.format;
        self.start("format", &[])?;
        self.optional_text("rpm:license", format.license.as_deref())?;
        self.optional_text("rpm:vendor", format.vendor.as_deref())?;
        self.optional_text("rpm:group", format.group.as_deref())?;
        self.optional_text("rpm:buildhost", format.build_host.as_deref())?;
        self.optional_text("rpm:sourcerpm", format.source_rpm.as_deref())?;
        if let Some(range) = &format.header_range {
            let (start, end) = (range.start.to_string(), range.end.to_string());
            self.empty("rpm:header-range", &[("start", &start), ("end", &end)])?;
        }
        self.entries("rpm:provides", format.provides.as_ref())?;
        self.entries("rpm:requires", format.requires.as_ref())?;
        self.entries("rpm:conflicts", format.conflicts.as_ref())?;
        self.entries("rpm:obsoletes", format.obsoletes.as_ref())?;
        self.files(&format.files)?;
        self.end("format")?;

        self.end("package")
    }

    fn finish(self) -> Vec<u8> {
        let mut data = self.writer.into_inner();
        data.push(b'\n');
        data
    }
}

/// Serialize a `primary.xml` document.
pub fn write_primary(primary: &Primary) -> Result<Vec<u8>> {
    let mut writer = XmlWriter::new()?;
    let count = primary.packages.len().to_string();

    writer.start(
        "metadata",
        &[
            ("xmlns", COMMON_NAMESPACE),
            ("xmlns:rpm", RPM_NAMESPACE),
            ("packages", &count),
        ],
    )?;
    for package in &primary.packages {
        writer.package(package)?;
    }
    writer.end("metadata")?;

    Ok(writer.finish())
}

/// Serialize a `filelists.xml` document.
pub fn write_filelists(filelists: &FileLists) -> Result<Vec<u8>> {
    let mut writer = XmlWriter::new()?;
    let count = filelists.packages.len().to_string();

    writer.start(
        "filelists",
        &[("xmlns", FILELISTS_NAMESPACE), ("packages", &count)],
    )?;
    for package in &filelists.packages {
        writer.start(
            "package",
            &[
                ("pkgid", &package.pkg_id),
                ("name", &package.name),
                ("arch", &package.arch),
            ],
        )?;
        writer.version(&package.version)?;
        writer.files(&package.files)?;
        writer.end("package")?;
    }
    writer.end("filelists")?;

    Ok(writer.finish())
}

/// Serialize an `other.xml` document.
pub fn write_other(other: &Other) -> Result<Vec<u8>> {
    let mut writer = XmlWriter::new()?;
    let count = other.packages.len().to_string();

    writer.start(
        "otherdata",
        &[("xmlns", OTHER_NAMESPACE), ("packages", &count)],
    )?;
    for package in &other.packages {
        writer.start(
            "package",
            &[
                ("pkgid", &package.pkg_id),
                ("name", &package.name),
                ("arch", &package.arch),
            ],
        )?;
        writer.version(&package.version)?;
        writer.end("package")?;
    }
    writer.end("otherdata")?;

    Ok(writer.finish())
}

/// Serialize a `repomd.xml` document.
pub fn write_repomd(repomd: &RepoMd) -> Result<Vec<u8>> {
    let mut writer = XmlWriter::new()?;

    writer.start(
        "repomd",
        &[("xmlns", REPO_NAMESPACE), ("xmlns:rpm", RPM_NAMESPACE)],
    )?;
    writer.text("revision", &[], &repomd.revision)?;

    for data in &repomd.data {
        writer.start("data", &[("type", &data.data_type)])?;
        writer.text(
            "checksum",
            &[("type", &data.checksum.name)],
            &data.checksum.value,
        )?;
        if let Some(checksum) = &data.open_checksum {
            writer.text("open-checksum", &[("type", &checksum.name)], &checksum.value)?;
        }
        writer.empty("location", &[("href", &data.location.href)])?;
        if let Some(timestamp) = data.timestamp {
            writer.text("timestamp", &[], &timestamp.to_string())?;
        }
        if let Some(size) = data.size {
            writer.text("size", &[], &size.to_string())?;
        }
        if let Some(size) = data.open_size {
            writer.text("open-size", &[], &size.to_string())?;
        }
        writer.end("data")?;
    }

    writer.end("repomd")?;

    Ok(writer.finish())
}
