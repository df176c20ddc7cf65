// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Repository build orchestration.

Every repository format follows the same sequence:

1. The existing index is read from the target (done by the format's
   constructor).
2. Versions already indexed are rendered into an exclusion constraint and
   combined with the caller's constraint.
3. Matching releases are listed. When there are none the build ends without
   touching anything.
4. Every asset the format recognizes is downloaded and added to the index. Added
   packages and their signatures are written to a staging directory.
5. The index is serialized into the staging directory.
6. The staging directory is copied over the target, after which the format
   may remove files it no longer references.

The staging directory is removed when the build ends, whatever the outcome.
The target is not written to until every previous step succeeded.
*/

use {
    crate::{
        config::BuildOptions,
        error::{RepositoryError, Result},
        source::{ListOptions, Source},
        target::Target,
        version::join_constraints,
    },
    async_trait::async_trait,
    log::{debug, info},
    std::path::{Path, PathBuf},
};

/// A scratch directory mirroring the layout of the repository being built.
#[derive(Debug)]
pub struct Staging {
    dir: tempfile::TempDir,
}

impl Staging {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: tempfile::Builder::new()
                .prefix("repository-index-")
                .tempdir()?,
        })
    }

    /// The root of the staged tree.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.dir.path().join(path.trim_start_matches('/'))
    }

    /// Write a file, creating parent directories as needed.
    pub fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let dest = self.resolve(path);

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RepositoryError::IoPath(format!("{}", parent.display()), e))?;
        }

        debug!("staging {} ({} bytes)", path, data.len());
        std::fs::write(&dest, data)
            .map_err(|e| RepositoryError::IoPath(format!("{}", dest.display()), e))
    }

    /// Read a staged file.
    pub fn read(&self, path: &str) -> Result<Vec<u8>> {
        let source = self.resolve(path);

        std::fs::read(&source).map_err(|e| RepositoryError::IoPath(format!("{}", source.display()), e))
    }

    /// Whether a file has been staged.
    pub fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_file()
    }
}

/// The in-memory model of a repository being updated.
#[async_trait]
pub trait RepositoryIndex: Send + Sync {
    /// Short name of the repository format, for diagnostics.
    fn format(&self) -> &'static str;

    /// Number of packages currently indexed.
    fn package_count(&self) -> usize;

    /// Whether a release asset is a package of this format.
    fn is_package(&self, filename: &str) -> bool;

    /// Constraint excluding the release versions already indexed.
    fn exclusion_constraint(&self) -> String;

    /// Extract a package and add it to the index.
    ///
    /// The package itself, and its signature if any, are staged at their
    /// canonical path.
    fn add(&mut self, filename: &str, data: &[u8], staging: &Staging) -> Result<()>;

    /// Serialize the index into the staging directory.
    fn write(&mut self, staging: &Staging) -> Result<()>;

    /// Tidy the target after the staged tree has been published.
    async fn cleanup(&self, _target: &dyn Target) -> Result<()> {
        Ok(())
    }
}

/// What a build did.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BuildOutcome {
    /// No new packages were found. The target was not modified.
    Unchanged,

    /// New packages were indexed and the listed files were written.
    Published { files: Vec<String> },
}

/// Bring a repository up to date with a source.
pub async fn build(
    mut index: impl RepositoryIndex,
    source: &dyn Source,
    target: &dyn Target,
    options: &BuildOptions,
) -> Result<BuildOutcome> {
    let format = index.format();
    info!("{}: opened index with {} packages", format, index.package_count());

    let exclusion = index.exclusion_constraint();
    let constraint = join_constraints([options.version.as_str(), exclusion.as_str()]);
    info!("{}: listing releases matching {:?}", format, constraint);

    let releases = match source
        .list_releases(&ListOptions {
            version: constraint,
            prerelease: options.prerelease,
        })
        .await
    {
        Ok(releases) => releases,
        Err(RepositoryError::NoReleaseFound) => {
            info!("{}: no new releases; repository unchanged", format);
            return Ok(BuildOutcome::Unchanged);
        }
        Err(e) => return Err(e),
    };

    let staging = Staging::new()?;
    let mut added = 0;

    for release in &releases {
        for asset in &release.assets {
            if !index.is_package(&asset.name) {
                debug!("{}: ignoring asset {}", format, asset.name);
                continue;
            }

            let data = source.download_asset(&release.version, &asset.name).await?;
            index.add(&asset.name, &data, &staging)?;
            info!("{}: added {} from {}", format, asset.name, release.version);
            added += 1;
        }
    }

    if added == 0 {
        info!("{}: no packages in new releases; repository unchanged", format);
        return Ok(BuildOutcome::Unchanged);
    }

    index.write(&staging)?;
    info!("{}: wrote index with {} packages", format, index.package_count());

    let files = target.copy_tree(staging.path()).await?;
    info!("{}: published {} files", format, files.len());

    index.cleanup(target).await?;

    Ok(BuildOutcome::Published { files })
}
