// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Alpine (APK) repositories.

```text
<arch>/APKINDEX.tar.gz
<arch>/<name>-<version>.apk
<key_name>.rsa.pub                (signed)
```

Signed indices carry their RSA signature in a leading gzip member named after
the public key, which `apk` looks up in `/etc/apk/keys`.
*/

mod extract;
mod types;

pub use {
    extract::{
        control_segment, read_index, read_package, sign_archive, write_index, Segment,
    },
    types::{Package, PkgInfo},
};

use {
    crate::{
        config::{ApkConfig, BuildOptions},
        error::{RepositoryError, Result},
        pipeline::{self, BuildOutcome, RepositoryIndex, Staging},
        signing::RsaSigningKey,
        source::Source,
        target::Target,
        version::{compare_versions, ExclusionBuilder, VersionScheme},
    },
    std::{cmp::Ordering, collections::BTreeMap},
};

/// Architecture directories searched for existing indices.
pub const ARCHITECTURES: [&str; 10] = [
    "x86_64",
    "x86",
    "aarch64",
    "armhf",
    "armv7",
    "ppc64le",
    "s390x",
    "riscv64",
    "loongarch64",
    "noarch",
];

const PRERELEASE_SUFFIXES: [&str; 4] = ["_alpha", "_beta", "_pre", "_rc"];

/// Compare Alpine package versions.
///
/// `_alpha`, `_beta`, `_pre` and `_rc` suffixes sort below the plain release.
pub fn compare_apk_versions(a: &str, b: &str) -> Ordering {
    fn tilde(version: &str) -> String {
        PRERELEASE_SUFFIXES
            .iter()
            .fold(version.to_string(), |v, suffix| {
                v.replace(suffix, &format!("~{}", &suffix[1..]))
            })
    }

    compare_versions(&tilde(a), &tilde(b))
}

/// The in-memory model of an Alpine repository.
pub struct ApkIndex {
    config: ApkConfig,
    signing_key: Option<RsaSigningKey>,
    packages: BTreeMap<String, BTreeMap<String, BTreeMap<String, Package>>>,
}

impl ApkIndex {
    pub fn new(config: ApkConfig, signing_key: Option<RsaSigningKey>) -> Self {
        Self {
            config,
            signing_key,
            packages: BTreeMap::new(),
        }
    }

    fn index_path(arch: &str) -> String {
        format!("{}/APKINDEX.tar.gz", arch)
    }

    fn key_file(&self) -> String {
        format!("{}.rsa.pub", self.config.key_name)
    }

    /// Load the indices of an existing repository.
    pub async fn open(
        target: &dyn Target,
        config: ApkConfig,
        signing_key: Option<RsaSigningKey>,
    ) -> Result<Self> {
        let mut index = Self::new(config, signing_key);

        for arch in ARCHITECTURES {
            let path = Self::index_path(arch);

            let data = match target.read_path(&path).await {
                Ok(data) => data,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            };

            for package in read_index(&data).map_err(|e| RepositoryError::corrupt_index(&path, e))? {
                if package.arch != arch {
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
                            .max_by(|a, b| compare_apk_versions(&a.version, &b.version))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl RepositoryIndex for ApkIndex {
    fn format(&self) -> &'static str {
        "apk"
    }

    fn package_count(&self) -> usize {
        self.iter_packages().count()
    }

    fn is_package(&self, filename: &str) -> bool {
        filename.ends_with(".apk")
    }

    fn exclusion_constraint(&self) -> String {
        let mut builder = ExclusionBuilder::new(VersionScheme::Apk);
        for package in self.iter_packages() {
            builder.add(&package.version);
        }

        builder.build()
    }

    fn add(&mut self, _filename: &str, data: &[u8], staging: &Staging) -> Result<()> {
        let package = read_package(data)?;
        staging.write(&format!("{}/{}", package.arch, package.filename()), data)?;
        self.insert(package);

        Ok(())
    }

    fn write(&mut self, staging: &Staging) -> Result<()> {
        for arch in self.packages.keys() {
            let mut index = write_index(self.latest(arch), &self.config.description)?;

            if let Some(key) = &self.signing_key {
                index = sign_archive(&index, key, &self.key_file())?;
            }

            staging.write(&Self::index_path(arch), &index)?;
        }

        if let Some(key) = &self.signing_key {
            staging.write(&self.key_file(), key.public_key_pem()?.as_bytes())?;
        }

        Ok(())
    }
}

/// Update an Alpine repository with new releases from a source.
pub async fn build(
    config: &ApkConfig,
    signing_key: Option<&RsaSigningKey>,
    source: &dyn Source,
    target: &dyn Target,
    options: &BuildOptions,
) -> Result<BuildOutcome> {
    let target = target.sub(&config.folder);
    let index = ApkIndex::open(target.as_ref(), config.clone(), signing_key.cloned()).await?;

    pipeline::build(index, source, target.as_ref(), options).await
}
