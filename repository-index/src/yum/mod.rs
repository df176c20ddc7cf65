// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! YUM (RPM) repositories.

```text
repodata/repomd.xml
repodata/repomd.xml.asc                       (signed)
repodata/repomd.xml.key                       (signed)
repodata/<sha256>-primary.xml.gz
repodata/<sha256>-filelists.xml.gz
repodata/<sha256>-other.xml.gz
Packages/<first letter>/<name>-<version>-<release>.<arch>.rpm
```

Metadata documents are named after the digest of their content, so every
build that changes the index produces new names. The documents referenced by
the previous `repomd.xml` are removed once the new ones are published.
*/

mod extract;
mod types;
mod xml;

pub use {
    extract::{header_range, is_primary_file, RpmPackage},
    types::{
        Checksum, Entries, FileEntry, FileLists, FileListsPackage, HeaderRange, Location,
        Other, OtherPackage, Package, PackageEntry, PackageFormat, PackageSize, PackageTime,
        PackageVersion, Primary, RepoMd, RepoMdData,
    },
    xml::{write_filelists, write_other, write_primary, write_repomd},
};

use {
    crate::{
        config::{BuildOptions, YumConfig},
        error::{RepositoryError, Result},
        io::Compression,
        pipeline::{self, BuildOutcome, RepositoryIndex, Staging},
        signing::PgpSigningKey,
        source::Source,
        target::Target,
        version::{compare_versions, ExclusionBuilder, VersionScheme},
    },
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    log::debug,
    std::collections::{BTreeMap, BTreeSet, HashMap},
};

pub const REPOMD_PATH: &str = "repodata/repomd.xml";

async fn read_document(target: &dyn Target, href: &str) -> Result<Vec<u8>> {
    let data = target.read_path(href).await?;

    Compression::from_filename(href)
        .decompress_all(&data)
        .map_err(|e| RepositoryError::corrupt_index(href, e))
}

/// The in-memory model of a YUM repository.
pub struct YumIndex {
    signing_key: Option<PgpSigningKey>,
    time: DateTime<Utc>,
    packages: BTreeMap<String, BTreeMap<String, BTreeMap<String, RpmPackage>>>,

    /// Metadata documents referenced by the `repomd.xml` that was read.
    previous: BTreeSet<String>,

    /// Metadata documents referenced by the `repomd.xml` that was written.
    current: BTreeSet<String>,
}

impl YumIndex {
    pub fn new(signing_key: Option<PgpSigningKey>, time: DateTime<Utc>) -> Self {
        Self {
            signing_key,
            time,
            packages: BTreeMap::new(),
            previous: BTreeSet::new(),
            current: BTreeSet::new(),
        }
    }

    /// Load the metadata of an existing repository.
    pub async fn open(
        target: &dyn Target,
        signing_key: Option<PgpSigningKey>,
        time: DateTime<Utc>,
    ) -> Result<Self> {
        let mut index = Self::new(signing_key, time);

        let repomd = match target.read_path(REPOMD_PATH).await {
            Ok(data) => RepoMd::from_reader(data.as_slice())
                .map_err(|e| RepositoryError::corrupt_index(REPOMD_PATH, e))?,
            Err(e) if e.is_not_found() => return Ok(index),
            Err(e) => return Err(e),
        };

        let location = |data_type: &'static str| {
            repomd.location(data_type).ok_or_else(|| {
                RepositoryError::corrupt_index(
                    REPOMD_PATH,
                    RepositoryError::MissingMetadata(data_type),
                )
            })
        };

        let primary_href = location("primary")?;
        let filelists_href = location("filelists")?;

        let primary = Primary::from_reader(read_document(target, primary_href).await?.as_slice())
            .map_err(|e| RepositoryError::corrupt_index(primary_href, e))?;
        let filelists =
            FileLists::from_reader(read_document(target, filelists_href).await?.as_slice())
                .map_err(|e| RepositoryError::corrupt_index(filelists_href, e))?;

        let mut files = filelists
            .packages
            .into_iter()
            .map(|p| (p.pkg_id, p.files))
            .collect::<HashMap<_, _>>();

        for package in primary.packages {
            let files = files
                .remove(package.pkg_id())
                .unwrap_or_else(|| package.format.files.clone());

            index.insert(RpmPackage { package, files });
        }

        index.previous = repomd
            .data
            .iter()
            .map(|d| d.location.href.clone())
            .collect();

        Ok(index)
    }

    pub fn insert(&mut self, package: RpmPackage) {
        self.packages
            .entry(package.package.arch.clone())
            .or_default()
            .entry(package.package.name.clone())
            .or_default()
            .insert(package.package.version.evr(), package);
    }

    pub fn iter_packages(&self) -> impl Iterator<Item = &RpmPackage> {
        self.packages
            .values()
            .flat_map(|names| names.values())
            .flat_map(|versions| versions.values())
    }

    /// The newest version of each package, sorted by architecture and name.
    pub fn latest(&self) -> Vec<&RpmPackage> {
        self.packages
            .values()
            .flat_map(|names| names.values())
            .filter_map(|versions| {
                versions
                    .iter()
                    .max_by(|(a, _), (b, _)| compare_versions(a, b))
                    .map(|(_, package)| package)
            })
            .collect()
    }

    /// Gzip a metadata document into the staging directory.
    fn write_document(&self, staging: &Staging, data_type: &str, raw: &[u8]) -> Result<RepoMdData> {
        let compressed = Compression::Gzip.compress(raw)?;
        let checksum = Checksum::sha256(&compressed);
        let href = format!("repodata/{}-{}.xml.gz", checksum.value, data_type);

        staging.write(&href, &compressed)?;

        Ok(RepoMdData {
            data_type: data_type.to_string(),
            open_checksum: Some(Checksum::sha256(raw)),
            location: Location { href },
            timestamp: Some(self.time.timestamp()),
            size: Some(compressed.len() as u64),
            open_size: Some(raw.len() as u64),
            checksum,
        })
    }
}

#[async_trait]
impl RepositoryIndex for YumIndex {
    fn format(&self) -> &'static str {
        "yum"
    }

    fn package_count(&self) -> usize {
        self.iter_packages().count()
    }

    fn is_package(&self, filename: &str) -> bool {
        filename.ends_with(".rpm")
    }

    fn exclusion_constraint(&self) -> String {
        let mut builder = ExclusionBuilder::new(VersionScheme::Yum);
        for package in self.iter_packages() {
            builder.add(&package.package.version.version);
        }

        builder.build()
    }

    fn add(&mut self, _filename: &str, data: &[u8], staging: &Staging) -> Result<()> {
        let package = RpmPackage::parse(data, self.time)?;
        staging.write(&package.package.location.href, data)?;
        self.insert(package);

        Ok(())
    }

    fn write(&mut self, staging: &Staging) -> Result<()> {
        let latest = self.latest();

        let primary = Primary {
            count: latest.len(),
            packages: latest.iter().map(|p| p.package.clone()).collect(),
        };
        let filelists = FileLists {
            count: latest.len(),
            packages: latest
                .iter()
                .map(|p| FileListsPackage {
                    pkg_id: p.package.pkg_id().to_string(),
                    name: p.package.name.clone(),
                    arch: p.package.arch.clone(),
                    version: p.package.version.clone(),
                    files: p.files.clone(),
                })
                .collect(),
        };
        let other = Other {
            count: latest.len(),
            packages: latest
                .iter()
                .map(|p| OtherPackage {
                    pkg_id: p.package.pkg_id().to_string(),
                    name: p.package.name.clone(),
                    arch: p.package.arch.clone(),
                    version: p.package.version.clone(),
                })
                .collect(),
        };

        let repomd = RepoMd {
            revision: self.time.timestamp().to_string(),
            data: vec![
                self.write_document(staging, "primary", &write_primary(&primary)?)?,
                self.write_document(staging, "filelists", &write_filelists(&filelists)?)?,
                self.write_document(staging, "other", &write_other(&other)?)?,
            ],
        };
        let repomd_xml = write_repomd(&repomd)?;

        if let Some(key) = &self.signing_key {
            staging.write(
                &format!("{}.asc", REPOMD_PATH),
                key.sign_armored(&repomd_xml, self.time)?.as_bytes(),
            )?;
            staging.write(
                &format!("{}.key", REPOMD_PATH),
                key.armored_public_key()?.as_bytes(),
            )?;
        }

        staging.write(REPOMD_PATH, &repomd_xml)?;

        self.current = repomd
            .data
            .into_iter()
            .map(|d| d.location.href)
            .collect();

        Ok(())
    }

    async fn cleanup(&self, target: &dyn Target) -> Result<()> {
        for href in self.previous.difference(&self.current) {
            if !href.starts_with("repodata/") {
                continue;
            }

            match target.remove_path(href).await {
                Ok(()) => debug!("yum: removed stale {}", href),
                Err(e) if e.is_not_found() => debug!("yum: stale {} already gone", href),
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }
}

/// Update a YUM repository with new releases from a source.
pub async fn build(
    config: &YumConfig,
    signing_key: Option<&PgpSigningKey>,
    source: &dyn Source,
    target: &dyn Target,
    options: &BuildOptions,
) -> Result<BuildOutcome> {
    let target = target.sub(&config.folder);
    let index = YumIndex::open(target.as_ref(), signing_key.cloned(), options.now()).await?;

    pipeline::build(index, source, target.as_ref(), options).await
}
