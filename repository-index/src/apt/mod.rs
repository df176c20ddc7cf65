// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! APT repositories.

The repository has a single `main` component and up to two suites:

* `stable` indexes the newest non-prerelease version of every package.
* `edge` indexes the newest version of every package, prereleases included. It
  only exists once a prerelease has been published.

Layout:

```text
dists/<suite>/Release
dists/<suite>/Release.gpg          (signed)
dists/<suite>/InRelease            (signed)
dists/<suite>/main/binary-<arch>/Release
dists/<suite>/main/binary-<arch>/Packages[.gz|.xz|...]
pool/main/<first letter>/<name>/<name>_<version>_<arch>.deb
key.asc                            (signed)
```

See <https://wiki.debian.org/DebianRepository/Format>.
*/

mod extract;
mod types;

pub use {
    extract::{read_control, read_package},
    types::{ArchitectureRelease, Package, SuiteRelease},
};

use {
    crate::{
        config::{AptConfig, BuildOptions},
        control::{Timestamp, DEB},
        error::{RepositoryError, Result},
        io::Compression,
        pipeline::{self, BuildOutcome, RepositoryIndex, Staging},
        signing::PgpSigningKey,
        source::Source,
        target::Target,
        version::{compare_versions, parse_version, ExclusionBuilder, VersionScheme},
    },
    chrono::{DateTime, Utc},
    std::collections::BTreeMap,
    strum::IntoEnumIterator,
};

const STABLE: &str = "stable";
const EDGE: &str = "edge";
const COMPONENT: &str = "main";

/// Whether a Debian version denotes a prerelease.
fn is_prerelease(version: &str) -> bool {
    parse_version(&VersionScheme::Apt.normalize(version))
        .map(|v| !v.pre.is_empty())
        .unwrap_or(false)
}

/// Read the `Packages` index of an architecture, whatever its compression.
async fn read_packages(target: &dyn Target, suite: &str, arch: &str) -> Result<Vec<Package>> {
    let dir = format!("dists/{}/{}/binary-{}", suite, COMPONENT, arch);

    for compression in Compression::iter() {
        let path = format!("{}/Packages{}", dir, compression.extension());

        let data = match target.read_path(&path).await {
            Ok(data) => data,
            Err(e) if e.is_not_found() => continue,
            Err(e) => return Err(e),
        };

        return compression
            .decompress_all(&data)
            .and_then(|data| DEB.from_slice::<Vec<Package>>(&data))
            .map_err(|e| RepositoryError::corrupt_index(&path, e));
    }

    Err(RepositoryError::corrupt_index(
        &dir,
        RepositoryError::NotFound(format!("{}/Packages", dir)),
    ))
}

/// The in-memory model of an APT repository.
///
/// Every version ever seen is kept, keyed by architecture, then name, then
/// version. Suites are derived from it when writing.
pub struct AptIndex {
    config: AptConfig,
    signing_key: Option<PgpSigningKey>,
    time: DateTime<Utc>,
    packages: BTreeMap<String, BTreeMap<String, BTreeMap<String, Package>>>,
}

impl AptIndex {
    /// An empty index.
    pub fn new(config: AptConfig, signing_key: Option<PgpSigningKey>, time: DateTime<Utc>) -> Self {
        Self {
            config,
            signing_key,
            time,
            packages: BTreeMap::new(),
        }
    }

    /// Load the packages published in an existing repository.
    ///
    /// Both suites are read: `stable` may hold a version `edge` has superseded.
    /// A repository without a `Release` file is empty.
    pub async fn open(
        target: &dyn Target,
        config: AptConfig,
        signing_key: Option<PgpSigningKey>,
        time: DateTime<Utc>,
    ) -> Result<Self> {
        let mut index = Self::new(config, signing_key, time);

        for suite in [STABLE, EDGE] {
            let path = format!("dists/{}/Release", suite);

            let data = match target.read_path(&path).await {
                Ok(data) => data,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            };

            let release = DEB
                .from_slice::<SuiteRelease>(&data)
                .map_err(|e| RepositoryError::corrupt_index(&path, e))?;

            for arch in release.architectures.split_whitespace() {
                for package in read_packages(target, suite, arch).await? {
                    index.insert(package);
                }
            }
        }

        Ok(index)
    }

    /// Add a package record.
    pub fn insert(&mut self, package: Package) {
        self.packages
            .entry(package.architecture.clone())
            .or_default()
            .entry(package.package.clone())
            .or_default()
            .insert(package.version.clone(), package);
    }

    /// All known package records.
    pub fn iter_packages(&self) -> impl Iterator<Item = &Package> {
        self.packages
            .values()
            .flat_map(|names| names.values())
            .flat_map(|versions| versions.values())
    }

    fn has_prereleases(&self) -> bool {
        self.iter_packages().any(|p| is_prerelease(&p.version))
    }

    /// The newest version of each package, per architecture, sorted by name.
    pub fn latest(&self, include_prereleases: bool) -> BTreeMap<&str, Vec<&Package>> {
        let mut suite = BTreeMap::new();

        for (arch, names) in &self.packages {
            let packages = names
                .values()
                .filter_map(|versions| {
                    versions
                        .values()
                        .filter(|p| include_prereleases || !is_prerelease(&p.version))
                        .max_by(|a, b| compare_versions(&a.version, &b.version))
                })
                .collect::<Vec<_>>();

            if !packages.is_empty() {
                suite.insert(arch.as_str(), packages);
            }
        }

        suite
    }

    fn write_suite(
        &self,
        staging: &Staging,
        suite: &str,
        packages: &BTreeMap<&str, Vec<&Package>>,
    ) -> Result<()> {
        let compressions = if self.config.compress.is_empty() {
            vec![Compression::None]
        } else {
            self.config.compress.clone()
        };

        // Paths relative to the suite directory.
        let mut files = BTreeMap::new();

        for (arch, entries) in packages {
            let dir = format!("{}/binary-{}", COMPONENT, arch);

            let release = ArchitectureRelease {
                origin: self.config.origin.clone(),
                label: self.config.label.clone(),
                archive: suite.to_string(),
                suite: suite.to_string(),
                component: COMPONENT.to_string(),
                architecture: arch.to_string(),
                description: self.config.description.clone(),
            };
            files.insert(format!("{}/Release", dir), DEB.to_vec(&release)?);

            let index = DEB.to_vec(entries)?;
            for compression in &compressions {
                files.insert(
                    format!("{}/Packages{}", dir, compression.extension()),
                    compression.compress(&index)?,
                );
            }
        }

        let mut release = SuiteRelease {
            origin: self.config.origin.clone(),
            label: self.config.label.clone(),
            suite: suite.to_string(),
            codename: suite.to_string(),
            date: Timestamp::from(self.time),
            architectures: packages.keys().copied().collect::<Vec<_>>().join(" "),
            components: COMPONENT.to_string(),
            description: self.config.description.clone(),
            ..Default::default()
        };

        for (path, data) in &files {
            release.add_file(path, data);
            staging.write(&format!("dists/{}/{}", suite, path), data)?;
        }

        let release = DEB.to_string(&release)?;
        staging.write(&format!("dists/{}/Release", suite), release.as_bytes())?;

        if let Some(key) = &self.signing_key {
            staging.write(
                &format!("dists/{}/Release.gpg", suite),
                key.sign_armored(release.as_bytes(), self.time)?.as_bytes(),
            )?;
            staging.write(
                &format!("dists/{}/InRelease", suite),
                key.sign_cleartext(&release, self.time)?.as_bytes(),
            )?;
        }

        Ok(())
    }
}

impl RepositoryIndex for AptIndex {
    fn format(&self) -> &'static str {
        "apt"
    }

    fn package_count(&self) -> usize {
        self.iter_packages().count()
    }

    fn is_package(&self, filename: &str) -> bool {
        filename.ends_with(".deb")
    }

    fn exclusion_constraint(&self) -> String {
        let mut builder = ExclusionBuilder::new(VersionScheme::Apt);
        for package in self.iter_packages() {
            builder.add(&package.version);
        }

        builder.build()
    }

    fn add(&mut self, _filename: &str, data: &[u8], staging: &Staging) -> Result<()> {
        let package = read_package(data)?;

        staging.write(&package.filename, data)?;
        self.insert(package);

        Ok(())
    }

    fn write(&mut self, staging: &Staging) -> Result<()> {
        self.write_suite(staging, STABLE, &self.latest(false))?;

        if self.has_prereleases() {
            self.write_suite(staging, EDGE, &self.latest(true))?;
        }

        if let Some(key) = &self.signing_key {
            staging.write("key.asc", key.armored_public_key()?.as_bytes())?;
        }

        Ok(())
    }
}

/// Update an APT repository with new releases from a source.
pub async fn build(
    config: &AptConfig,
    signing_key: Option<&PgpSigningKey>,
    source: &dyn Source,
    target: &dyn Target,
    options: &BuildOptions,
) -> Result<BuildOutcome> {
    let target = target.sub(&config.folder);

    let index = AptIndex::open(
        target.as_ref(),
        config.clone(),
        signing_key.cloned(),
        options.now(),
    )
    .await?;

    pipeline::build(index, source, target.as_ref(), options).await
}

#[cfg(test)]
mod test {
    use {
        super::{extract::test::build_deb, extract::test::control, *},
        crate::{
            signing::{
                parse_armored_public_key,
                test::{fixed_time, PGP_KEY},
                verify_cleartext, verify_detached,
            },
            source::MemorySource,
            target::MemoryTarget,
        },
    };

    fn upload(source: &MemorySource, tag: &str, version: &str, arch: &str) {
        source.upload_asset(
            tag,
            &format!("hello_{}_{}.deb", version, arch),
            build_deb(&control("hello", version, arch)),
        );
    }

    fn options() -> BuildOptions {
        BuildOptions {
            timestamp: Some(fixed_time()),
            ..Default::default()
        }
    }

    fn packages(target: &MemoryTarget, path: &str) -> Result<Vec<Package>> {
        DEB.from_slice(&target.get(path).ok_or_else(|| RepositoryError::NotFound(path.into()))?)
    }

    #[tokio::test]
    async fn single_unsigned_package() -> Result<()> {
        let source = MemorySource::new();
        upload(&source, "v1.0.0", "1.0.0", "amd64");
        source.upload_asset("v1.0.0", "checksums.txt", "ignored");

        let target = MemoryTarget::new();
        let outcome = build(&AptConfig::default(), None, &source, &target, &options()).await?;
        assert!(matches!(outcome, BuildOutcome::Published { .. }));

        let entries = packages(&target, "dists/stable/main/binary-amd64/Packages")?;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].version, "1.0.0");
        assert_eq!(entries[0].filename, "pool/main/h/hello/hello_1.0.0_amd64.deb");

        assert!(target.contains("dists/stable/main/binary-amd64/Packages.gz"));
        assert!(target.contains("dists/stable/main/binary-amd64/Release"));
        assert!(target.contains("pool/main/h/hello/hello_1.0.0_amd64.deb"));
        assert!(!target.contains("dists/stable/Release.gpg"));
        assert!(!target.contains("dists/stable/InRelease"));
        assert!(!target.contains("key.asc"));
        assert!(!target.contains("dists/edge/Release"));

        let release: SuiteRelease = DEB.from_slice(&target.get("dists/stable/Release").unwrap())?;
        assert_eq!(release.architectures, "amd64");
        assert_eq!(release.date, Timestamp::from(fixed_time()));
        assert_eq!(release.sha256.lines().count(), 4);
        assert!(release.sha256.ends_with(" main/binary-amd64/Release"));

        Ok(())
    }

    #[tokio::test]
    async fn incremental_updates() -> Result<()> {
        let source = MemorySource::new();
        upload(&source, "v1.0.0", "1.0.0", "amd64");

        let target = MemoryTarget::new();
        build(&AptConfig::default(), None, &source, &target, &options()).await?;

        upload(&source, "v0.9.0", "0.9.0", "amd64");
        upload(&source, "v1.1.0", "1.1.0", "amd64");
        upload(&source, "v1.1.0", "1.1.0", "arm64");
        source.clear_downloads();

        build(&AptConfig::default(), None, &source, &target, &options()).await?;
        assert_eq!(
            source.downloads(),
            vec![
                ("v1.1.0".to_string(), "hello_1.1.0_amd64.deb".to_string()),
                ("v1.1.0".to_string(), "hello_1.1.0_arm64.deb".to_string()),
            ]
        );

        let amd64 = packages(&target, "dists/stable/main/binary-amd64/Packages")?;
        assert_eq!(amd64.len(), 1);
        assert_eq!(amd64[0].version, "1.1.0");
        assert!(target.contains("dists/stable/main/binary-arm64/Packages"));

        Ok(())
    }

    #[tokio::test]
    async fn unchanged_source_is_idempotent() -> Result<()> {
        let source = MemorySource::new();
        upload(&source, "v1.0.0", "1.0.0", "amd64");

        let target = MemoryTarget::new();
        build(&AptConfig::default(), Some(&*PGP_KEY), &source, &target, &options()).await?;
        let before = target.files();

        source.clear_downloads();
        let outcome =
            build(&AptConfig::default(), Some(&*PGP_KEY), &source, &target, &options()).await?;
        assert_eq!(outcome, BuildOutcome::Unchanged);
        assert!(source.downloads().is_empty());
        assert_eq!(target.files(), before);

        Ok(())
    }

    #[tokio::test]
    async fn prereleases_go_to_edge() -> Result<()> {
        let source = MemorySource::new();
        upload(&source, "v1.0.0", "1.0.0", "amd64");
        upload(&source, "v1.1.0-rc1", "1.1.0~rc1", "amd64");

        let target = MemoryTarget::new();
        let options = BuildOptions {
            prerelease: true,
            ..options()
        };
        build(&AptConfig::default(), None, &source, &target, &options).await?;

        let stable = packages(&target, "dists/stable/main/binary-amd64/Packages")?;
        assert_eq!(stable[0].version, "1.0.0");
        let edge = packages(&target, "dists/edge/main/binary-amd64/Packages")?;
        assert_eq!(edge.len(), 1);
        assert_eq!(edge[0].version, "1.1.0~rc1");

        // Reopening sees both suites.
        let index = AptIndex::open(&target, AptConfig::default(), None, fixed_time()).await?;
        assert_eq!(index.package_count(), 2);
        assert_eq!(index.exclusion_constraint(), "!=1.0.0,!=1.1.0-rc1,>1.0.0");

        Ok(())
    }

    #[tokio::test]
    async fn signed_repository() -> Result<()> {
        let source = MemorySource::new();
        upload(&source, "v1.0.0", "1.0.0", "amd64");

        let target = MemoryTarget::new();
        let config = AptConfig {
            folder: "deb".into(),
            compress: vec![Compression::Xz],
            origin: "Example".into(),
            ..Default::default()
        };
        build(&config, Some(&*PGP_KEY), &source, &target, &options()).await?;

        let key = parse_armored_public_key(&String::from_utf8_lossy(
            &target.get("deb/key.asc").unwrap(),
        ))?;
        let release = target.get("deb/dists/stable/Release").unwrap();

        verify_detached(&key, &release, &target.get("deb/dists/stable/Release.gpg").unwrap())?;

        let in_release = String::from_utf8_lossy(&target.get("deb/dists/stable/InRelease").unwrap())
            .to_string();
        assert_eq!(verify_cleartext(&key, &in_release)?.as_bytes(), release.as_slice());

        assert!(target.contains("deb/dists/stable/main/binary-amd64/Packages.xz"));
        assert!(!target.contains("deb/dists/stable/main/binary-amd64/Packages"));

        // The index is found through the compressed variant.
        let index = AptIndex::open(target.sub("deb").as_ref(), config, None, fixed_time()).await?;
        assert_eq!(index.package_count(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn latest_selection_ignores_merge_order() -> Result<()> {
        let mut rendered = vec![];

        for order in [["1.0.0", "1.1.0", "0.9.0"], ["1.1.0", "0.9.0", "1.0.0"]] {
            let mut index = AptIndex::new(AptConfig::default(), None, fixed_time());
            for version in order {
                index.insert(read_package(&build_deb(&control("hello", version, "amd64")))?);
            }

            let staging = Staging::new()?;
            index.write(&staging)?;
            rendered.push(staging.read("dists/stable/main/binary-amd64/Packages")?);
        }

        assert_eq!(rendered[0], rendered[1]);
        let entries = DEB.from_slice::<Vec<Package>>(&rendered[0])?;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].version, "1.1.0");

        Ok(())
    }

    #[tokio::test]
    async fn corrupt_index_aborts() {
        let target = MemoryTarget::new();
        target.insert("dists/stable/Release", "Suite: stable\nArchitectures: amd64\n");
        target.insert("dists/stable/main/binary-amd64/Packages", "garbage\n");

        let res = AptIndex::open(&target, AptConfig::default(), None, fixed_time()).await;
        assert!(matches!(res, Err(RepositoryError::CorruptIndex { .. })));

        target.remove_path("dists/stable/main/binary-amd64/Packages").await.unwrap();
        let res = AptIndex::open(&target, AptConfig::default(), None, fixed_time()).await;
        assert!(matches!(res, Err(RepositoryError::CorruptIndex { .. })));
    }
}
