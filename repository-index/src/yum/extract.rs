// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Reading `.rpm` packages into repository metadata. */

use {
    super::types::{
        Checksum, Entries, FileEntry, HeaderRange, Location, Package, PackageEntry,
        PackageFormat, PackageSize, PackageTime, PackageVersion,
    },
    crate::error::{RepositoryError, Result},
    chrono::{DateTime, Utc},
    rpm::DependencyFlags,
};

const LEAD_SIZE: usize = 96;
const HEADER_MAGIC: [u8; 3] = [0x8e, 0xad, 0xe8];

/// Read the index entry count and data size of the header starting at `offset`,
/// returning the offset just past it.
fn header_end(data: &[u8], offset: usize) -> Result<usize> {
    const TRUNCATED: RepositoryError = RepositoryError::RpmHeader("truncated header");

    let intro = offset
        .checked_add(16)
        .and_then(|end| data.get(offset..end))
        .ok_or(TRUNCATED)?;

    if intro[0..3] != HEADER_MAGIC {
        return Err(RepositoryError::RpmHeader("bad header magic"));
    }

    let count = u32::from_be_bytes([intro[8], intro[9], intro[10], intro[11]]) as usize;
    let size = u32::from_be_bytes([intro[12], intro[13], intro[14], intro[15]]) as usize;

    count
        .checked_mul(16)
        .and_then(|index| index.checked_add(size))
        .and_then(|len| len.checked_add(offset + 16))
        .filter(|end| *end <= data.len())
        .ok_or(TRUNCATED)
}

/// Locate the main header of a package file.
///
/// The signature header follows the lead and is padded to 8 bytes. The main
/// header follows it.
pub fn header_range(data: &[u8]) -> Result<HeaderRange> {
    let signature_end = header_end(data, LEAD_SIZE)?;
    let start = (signature_end + 7) & !7;
    let end = header_end(data, start)?;

    Ok(HeaderRange {
        start: start as u64,
        end: end as u64,
    })
}

fn dependency_flags(flags: DependencyFlags) -> Option<&'static str> {
    let less = flags.contains(DependencyFlags::LESS);
    let greater = flags.contains(DependencyFlags::GREATER);
    let equal = flags.contains(DependencyFlags::EQUAL);

    match (less, greater, equal) {
        (true, _, true) => Some("LE"),
        (_, true, true) => Some("GE"),
        (true, _, false) => Some("LT"),
        (_, true, false) => Some("GT"),
        (false, false, true) => Some("EQ"),
        _ => None,
    }
}

/// Split an `[epoch:]version[-release]` dependency version.
fn split_evr(evr: &str) -> (u64, &str, Option<&str>) {
    let (epoch, rest) = match evr.split_once(':') {
        Some((epoch, rest)) => (epoch.parse().unwrap_or_default(), rest),
        None => (0, evr),
    };

    match rest.rsplit_once('-') {
        Some((version, release)) => (epoch, version, Some(release)),
        None => (epoch, rest, None),
    }
}

fn entries(dependencies: Vec<rpm::Dependency>) -> Option<Entries> {
    let entries = dependencies
        .into_iter()
        .filter(|d| !d.name.starts_with("rpmlib("))
        .map(|d| {
            let mut entry = PackageEntry {
                name: d.name.clone(),
                flags: dependency_flags(d.flags).map(String::from),
                ..Default::default()
            };

            if !d.version.is_empty() {
                let (epoch, version, release) = split_evr(&d.version);
                entry.epoch = Some(epoch);
                entry.version = Some(version.to_string());
                entry.release = release.map(String::from);
            }

            entry
        })
        .collect::<Vec<_>>();

    if entries.is_empty() {
        None
    } else {
        Some(Entries { entries })
    }
}

/// Whether a file is listed in `primary.xml` as well as `filelists.xml`.
///
/// Dependency solvers resolve path requirements on these without downloading
/// file lists.
pub fn is_primary_file(file: &FileEntry) -> bool {
    (file.file_type.is_none() && file.path.starts_with("/etc/")) || file.path.contains("/bin/")
}

/// A package's `primary.xml` entry and its complete file list.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RpmPackage {
    pub package: Package,
    pub files: Vec<FileEntry>,
}

impl RpmPackage {
    /// Extract metadata from a package file.
    ///
    /// `time` is recorded as the time the package was added.
    pub fn parse(data: &[u8], time: DateTime<Utc>) -> Result<Self> {
        let header_range = header_range(data)?;
        let rpm = rpm::Package::parse(&mut std::io::BufReader::new(data))?;
        let metadata = &rpm.metadata;

        let name = metadata.get_name()?.to_string();
        if name.is_empty() {
            return Err(RepositoryError::MissingRequiredField("name"));
        }

        let version = PackageVersion {
            epoch: metadata.get_epoch().map(u64::from).unwrap_or_default(),
            version: metadata.get_version()?.to_string(),
            release: metadata.get_release().unwrap_or_default().to_string(),
        };
        if version.version.is_empty() {
            return Err(RepositoryError::MissingRequiredField("version"));
        }

        let arch = metadata.get_arch()?.to_string();
        if arch.is_empty() {
            return Err(RepositoryError::MissingRequiredField("arch"));
        }

        let optional = |value: std::result::Result<&str, rpm::Error>| {
            value.ok().filter(|s| !s.is_empty()).map(String::from)
        };

        let files = metadata
            .get_file_entries()
            .unwrap_or_default()
            .into_iter()
            .map(|entry| FileEntry {
                file_type: matches!(entry.mode, rpm::FileMode::Dir { .. })
                    .then(|| "dir".to_string()),
                path: entry.path.to_string_lossy().to_string(),
            })
            .collect::<Vec<_>>();

        let checksum = Checksum {
            pkg_id: Some("YES".to_string()),
            ..Checksum::sha256(data)
        };

        let location = Location {
            href: format!(
                "Packages/{}/{}-{}-{}.{}.rpm",
                name.chars().next().unwrap_or('_'),
                name,
                version.version,
                version.release,
                arch
            ),
        };

        let package = Package {
            package_type: "rpm".to_string(),
            summary: metadata.get_summary().unwrap_or_default().to_string(),
            description: metadata.get_description().unwrap_or_default().to_string(),
            packager: optional(metadata.get_packager()),
            url: optional(metadata.get_url()),
            time: PackageTime {
                file: time.timestamp(),
                build: metadata.get_build_time().unwrap_or_default() as i64,
            },
            size: PackageSize {
                package: data.len() as u64,
                installed: metadata.get_installed_size().unwrap_or_default(),
                archive: rpm.content.len() as u64,
            },
            location,
            format: PackageFormat {
                license: optional(metadata.get_license()),
                vendor: optional(metadata.get_vendor()),
                group: optional(metadata.get_group()),
                build_host: optional(metadata.get_build_host()),
                source_rpm: optional(metadata.get_source_rpm()),
                header_range: Some(header_range),
                provides: entries(metadata.get_provides().unwrap_or_default()),
                obsoletes: entries(metadata.get_obsoletes().unwrap_or_default()),
                requires: entries(metadata.get_requires().unwrap_or_default()),
                conflicts: entries(metadata.get_conflicts().unwrap_or_default()),
                files: files.iter().filter(|f| is_primary_file(f)).cloned().collect(),
            },
            name,
            arch,
            version,
            checksum,
        };

        Ok(Self { package, files })
    }
}

#[cfg(test)]
pub(crate) mod test {
    use {super::*, crate::signing::test::fixed_time};

    /// Build a package holding a configuration file and an executable.
    pub(crate) fn build_rpm(name: &str, version: &str, release: &str, arch: &str) -> Vec<u8> {
        let td = tempfile::tempdir().unwrap();
        let binary = td.path().join("hello");
        std::fs::write(&binary, b"#!/bin/sh\necho hello\n").unwrap();
        let config = td.path().join("hello.conf");
        std::fs::write(&config, b"greeting = hello\n").unwrap();

        let package = rpm::PackageBuilder::new(name, version, "MIT", arch, "Says hello")
            .release(release)
            .compression(rpm::CompressionType::Gzip)
            .requires(rpm::Dependency::any("bash"))
            .with_file(
                &binary,
                rpm::FileOptions::new(format!("/usr/bin/{}", name))
                    .mode(rpm::FileMode::from(0o100755)),
            )
            .unwrap()
            .with_file(
                &config,
                rpm::FileOptions::new(format!("/usr/share/{}/hello.conf", name)).is_config(),
            )
            .unwrap()
            .build()
            .unwrap();

        let mut data = vec![];
        package.write(&mut data).unwrap();

        data
    }

    #[test]
    fn package_from_rpm() -> Result<()> {
        let data = build_rpm("hello", "1.2.0", "1", "x86_64");
        let parsed = RpmPackage::parse(&data, fixed_time())?;
        let package = &parsed.package;

        assert_eq!(package.name, "hello");
        assert_eq!(package.arch, "x86_64");
        assert_eq!(package.version.evr(), "1.2.0-1");
        assert_eq!(package.summary, "Says hello");
        assert_eq!(package.checksum, Checksum {
            pkg_id: Some("YES".into()),
            ..Checksum::sha256(&data)
        });
        assert_eq!(package.location.href, "Packages/h/hello-1.2.0-1.x86_64.rpm");
        assert_eq!(package.size.package, data.len() as u64);
        assert_eq!(package.time.file, 1700000000);
        assert_eq!(package.format.license.as_deref(), Some("MIT"));

        let requires = package.format.requires.as_ref().unwrap();
        assert!(requires.entries.iter().any(|e| e.name == "bash"));
        assert!(!requires.entries.iter().any(|e| e.name.starts_with("rpmlib(")));

        let paths = |files: &[FileEntry]| files.iter().map(|f| f.path.clone()).collect::<Vec<_>>();
        assert_eq!(paths(&package.format.files), vec!["/usr/bin/hello".to_string()]);
        assert!(paths(&parsed.files).contains(&"/usr/share/hello/hello.conf".to_string()));

        Ok(())
    }

    #[test]
    fn header_range_brackets_main_header() -> Result<()> {
        let data = build_rpm("hello", "1.2.0", "1", "noarch");
        let range = header_range(&data)?;

        assert_eq!(range.start % 8, 0);
        assert_eq!(&data[range.start as usize..range.start as usize + 3], &HEADER_MAGIC);
        assert!(range.end as usize <= data.len());

        Ok(())
    }

    #[test]
    fn oversized_header_is_truncated() {
        let mut data = vec![0u8; LEAD_SIZE];
        data.extend_from_slice(&HEADER_MAGIC);
        data.extend_from_slice(&[0x01, 0, 0, 0, 0]);
        data.extend_from_slice(&u32::MAX.to_be_bytes());
        data.extend_from_slice(&u32::MAX.to_be_bytes());

        assert!(matches!(
            header_range(&data),
            Err(RepositoryError::RpmHeader("truncated header"))
        ));
    }

    #[test]
    fn not_an_rpm() {
        assert!(matches!(
            RpmPackage::parse(b"not a package", fixed_time()),
            Err(RepositoryError::RpmHeader(_))
        ));
    }

    #[test]
    fn dependency_versions() {
        assert_eq!(split_evr("1:2.0-3"), (1, "2.0", Some("3")));
        assert_eq!(split_evr("2.28"), (0, "2.28", None));
        assert_eq!(
            dependency_flags(DependencyFlags::GREATER | DependencyFlags::EQUAL),
            Some("GE")
        );
        assert_eq!(dependency_flags(DependencyFlags::ANY), None);
    }

    #[test]
    fn primary_files() {
        let file = |path: &str, dir: bool| FileEntry {
            file_type: dir.then(|| "dir".to_string()),
            path: path.to_string(),
        };

        assert!(is_primary_file(&file("/etc/hello.conf", false)));
        assert!(is_primary_file(&file("/usr/bin/hello", false)));
        assert!(!is_primary_file(&file("/etc/hello.d", true)));
        assert!(!is_primary_file(&file("/usr/share/hello", false)));
    }
}
