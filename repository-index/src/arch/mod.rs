// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Arch Linux repositories.

Every architecture has its own directory holding the package files and a
`<repo>.db` database listing the newest version of each package:

```text
<arch>/<repo>.db
<arch>/<repo>.db.sig                           (signed)
<arch>/<name>-<version>-<arch>.pkg.tar.<ext>
<arch>/<name>-<version>-<arch>.pkg.tar.<ext>.sig (signed)
key.asc                                        (signed)
```

Architecture independent packages live in the `any` directory.
*/

mod extract;
mod types;

pub use {
    extract::{
        package_extension, read_database, read_package, read_pkginfo, write_database,
        PACKAGE_EXTENSIONS,
    },
    types::{Package, PkgInfo},
};

use {
    crate::{
        config::{ArchConfig, BuildOptions},
        error::{RepositoryError, Result},
        pipeline::{self, BuildOutcome, RepositoryIndex, Staging},
        signing::PgpSigningKey,
        source::Source,
        target::Target,
        version::{compare_versions, ExclusionBuilder, VersionScheme},
    },
    chrono::{DateTime, Utc},
    std::collections::BTreeMap,
};

/// Architecture directories searched for existing databases.
///
/// Covers Arch Linux, Arch Linux ARM, Arch POWER and Arch Linux 32.
pub const ARCHITECTURES: [&str; 10] = [
    "x86_64",
    "any",
    "aarch64",
    "armv7h",
    "powerpc64le",
    "powerpc64",
    "powerpc",
    "riscv64",
    "i686",
    "pentium4",
];

/// The in-memory model of an Arch Linux repository.
pub struct ArchIndex {
    config: ArchConfig,
    signing_key: Option<PgpSigningKey>,
    time: DateTime<Utc>,
    packages: BTreeMap<String, BTreeMap<String, BTreeMap<String, Package>>>,
}

impl ArchIndex {
    pub fn new(config: ArchConfig, signing_key: Option<PgpSigningKey>, time: DateTime<Utc>) -> Self {
        Self {
            config,
            signing_key,
            time,
            packages: BTreeMap::new(),
        }
    }

    fn database_path(&self, arch: &str) -> String {
        format!("{}/{}.db", arch, self.config.repo_name)
    }

    /// Load the databases of an existing repository.
    pub async fn open(
        target: &dyn Target,
        config: ArchConfig,
        signing_key: Option<PgpSigningKey>,
        time: DateTime<Utc>,
    ) -> Result<Self> {
        let mut index = Self::new(config, signing_key, time);

        for arch in ARCHITECTURES {
            let path = index.database_path(arch);

            let data = match target.read_path(&path).await {
                Ok(data) => data,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            };

            let packages =
                read_database(&data).map_err(|e| RepositoryError::corrupt_index(&path, e))?;

            for package in packages {
                if package.arch != arch && package.arch != "any" {
                    return Err(RepositoryError::corrupt_index(
                        &path,
                        RepositoryError::ArchitectureMismatch {
                            name: package.name,
                            arch: package.arch,
                        },
                    ));
                }

                index.insert(package);
            }
        }

        Ok(index)
    }

    pub fn insert(&mut self, package: Package) {
        self.packages
            .entry(package.arch.clone())
            .or_default()
            .entry(package.name.clone())
            .or_default()
            .insert(package.version.clone(), package);
    }

    pub fn iter_packages(&self) -> impl Iterator<Item = &Package> {
        self.packages
            .values()
            .flat_map(|names| names.values())
            .flat_map(|versions| versions.values())
    }

    /// The newest version of each package in an architecture, sorted by name.
    pub fn latest(&self, arch: &str) -> Vec<&Package> {
        self.packages
            .get(arch)
            .map(|names| {
                names
                    .values()
                    .filter_map(|versions| {
                        versions
                            .values()
                            .max_by(|a, b| compare_versions(&a.version, &b.version))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl RepositoryIndex for ArchIndex {
    fn format(&self) -> &'static str {
        "arch"
    }

    fn package_count(&self) -> usize {
        self.iter_packages().count()
    }

    fn is_package(&self, filename: &str) -> bool {
        package_extension(filename).is_some()
    }

    fn exclusion_constraint(&self) -> String {
        let mut builder = ExclusionBuilder::new(VersionScheme::Arch);
        for package in self.iter_packages() {
            builder.add(&package.version);
        }

        builder.build()
    }

    fn add(&mut self, filename: &str, data: &[u8], staging: &Staging) -> Result<()> {
        let mut package = read_package(filename, data)?;
        let path = format!("{}/{}", package.arch, package.filename);

        if let Some(key) = &self.signing_key {
            let signature = key.sign_binary(data, self.time)?;
            package.pgpsig = base64::encode(&signature);
            staging.write(&format!("{}.sig", path), &signature)?;
        }

        staging.write(&path, data)?;
        self.insert(package);

        Ok(())
    }

    fn write(&mut self, staging: &Staging) -> Result<()> {
        for arch in self.packages.keys() {
            let path = self.database_path(arch);
            let database = write_database(self.latest(arch))?;

            if let Some(key) = &self.signing_key {
                staging.write(
                    &format!("{}.sig", path),
                    &key.sign_binary(&database, self.time)?,
                )?;
            }

            staging.write(&path, &database)?;
        }

        if let Some(key) = &self.signing_key {
            staging.write("key.asc", key.armored_public_key()?.as_bytes())?;
        }

        Ok(())
    }
}

/// Update an Arch Linux repository with new releases from a source.
pub async fn build(
    config: &ArchConfig,
    signing_key: Option<&PgpSigningKey>,
    source: &dyn Source,
    target: &dyn Target,
    options: &BuildOptions,
) -> Result<BuildOutcome> {
    let target = target.sub(&config.folder);

    let index = ArchIndex::open(
        target.as_ref(),
        config.clone(),
        signing_key.cloned(),
        options.now(),
    )
    .await?;

    pipeline::build(index, source, target.as_ref(), options).await
}
