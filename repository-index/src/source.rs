// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Origins of release artifacts.

A [Source] lists versioned releases and downloads the files attached to them.
Hosting backends live outside this crate; [MemorySource] is provided for tests
and embedding.
*/

use {
    crate::{
        error::{RepositoryError, Result},
        version::{parse_version, Constraint},
    },
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    std::{
        collections::BTreeMap,
        sync::{Mutex, MutexGuard},
    },
};

/// A file attached to a release.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Asset {
    pub name: String,
    pub url: String,
    pub size: u64,
}

/// A published version of the software.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Release {
    pub name: String,
    pub description: String,
    pub date: DateTime<Utc>,
    pub version: String,
    pub prerelease: bool,
    pub assets: Vec<Asset>,
}

/// Filters applied when listing releases.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ListOptions {
    /// A [Constraint] string. Empty matches everything.
    pub version: String,

    /// Whether prerelease versions are included.
    pub prerelease: bool,
}

/// Provider of releases.
#[async_trait]
pub trait Source: Send + Sync {
    /// List releases matching the options, newest first.
    ///
    /// Fails with [RepositoryError::NoReleaseFound] when nothing matches.
    async fn list_releases(&self, options: &ListOptions) -> Result<Vec<Release>>;

    /// Obtain the content of a release asset.
    async fn download_asset(&self, version: &str, name: &str) -> Result<Vec<u8>>;
}

/// Order releases newest first.
pub fn sort_releases(releases: &mut [Release]) {
    releases.sort_by(|a, b| match (parse_version(&a.version), parse_version(&b.version)) {
        (Ok(va), Ok(vb)) => vb.cmp(&va).then_with(|| b.version.cmp(&a.version)),
        _ => b.version.cmp(&a.version),
    });
}

/// Filter and sort releases according to [ListOptions].
///
/// Releases whose version cannot be parsed are skipped.
pub fn select_releases(releases: Vec<Release>, options: &ListOptions) -> Result<Vec<Release>> {
    let constraint = Constraint::parse(&options.version)?;

    let mut selected = releases
        .into_iter()
        .filter_map(|mut release| {
            let version = match parse_version(&release.version) {
                Ok(version) => version,
                Err(_) => {
                    log::debug!("skipping invalid version {}", release.version);
                    return None;
                }
            };

            release.prerelease |= !version.pre.is_empty();
            if release.name.is_empty() {
                release.name = release.version.clone();
            }

            if release.prerelease && !options.prerelease {
                return None;
            }

            constraint.matches(&version).then(|| release)
        })
        .collect::<Vec<_>>();

    if selected.is_empty() {
        return Err(RepositoryError::NoReleaseFound);
    }

    sort_releases(&mut selected);

    Ok(selected)
}

/// A source holding release assets in memory.
///
/// Downloads are recorded so callers can observe what was fetched.
#[derive(Debug, Default)]
pub struct MemorySource {
    releases: Mutex<BTreeMap<String, BTreeMap<String, Vec<u8>>>>,
    downloads: Mutex<Vec<(String, String)>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an asset to a release, creating the release if needed.
    pub fn upload_asset(&self, version: &str, name: &str, data: impl Into<Vec<u8>>) {
        lock(&self.releases)
            .entry(version.to_string())
            .or_default()
            .insert(name.to_string(), data.into());
    }

    /// `(version, name)` pairs passed to [Source::download_asset], in call order.
    pub fn downloads(&self) -> Vec<(String, String)> {
        lock(&self.downloads).clone()
    }

    /// Forget recorded downloads.
    pub fn clear_downloads(&self) {
        lock(&self.downloads).clear();
    }
}

#[async_trait]
impl Source for MemorySource {
    async fn list_releases(&self, options: &ListOptions) -> Result<Vec<Release>> {
        let releases = lock(&self.releases)
            .iter()
            .map(|(version, assets)| Release {
                name: version.clone(),
                description: String::new(),
                date: DateTime::<Utc>::from(std::time::UNIX_EPOCH),
                version: version.clone(),
                prerelease: false,
                assets: assets
                    .iter()
                    .map(|(name, data)| Asset {
                        name: name.clone(),
                        url: format!("memory://{}/{}", version, name),
                        size: data.len() as u64,
                    })
                    .collect(),
            })
            .collect::<Vec<_>>();

        select_releases(releases, options)
    }

    async fn download_asset(&self, version: &str, name: &str) -> Result<Vec<u8>> {
        lock(&self.downloads).push((version.to_string(), name.to_string()));

        lock(&self.releases)
            .get(version)
            .and_then(|assets| assets.get(name))
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("{}/{}", version, name)))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn source() -> MemorySource {
        let source = MemorySource::new();
        for version in ["v1.0.0", "v1.1.0", "v2.0.0-rc1", "v0.9.0", "nightly"] {
            source.upload_asset(version, "app.deb", version.as_bytes());
        }
        source
    }

    fn versions(releases: &[Release]) -> Vec<&str> {
        releases.iter().map(|r| r.version.as_str()).collect()
    }

    #[tokio::test]
    async fn newest_first_without_prereleases() -> Result<()> {
        let releases = source().list_releases(&ListOptions::default()).await?;
        assert_eq!(versions(&releases), vec!["v1.1.0", "v1.0.0", "v0.9.0"]);
        assert_eq!(releases[0].assets[0].size, 6);

        Ok(())
    }

    #[tokio::test]
    async fn prereleases_on_request() -> Result<()> {
        let releases = source()
            .list_releases(&ListOptions {
                version: ">=1.0".into(),
                prerelease: true,
            })
            .await?;
        assert_eq!(versions(&releases), vec!["v2.0.0-rc1", "v1.1.0", "v1.0.0"]);
        assert!(releases[0].prerelease);

        Ok(())
    }

    #[tokio::test]
    async fn no_release_found() {
        let res = source()
            .list_releases(&ListOptions {
                version: ">5".into(),
                prerelease: false,
            })
            .await;
        assert!(matches!(res, Err(RepositoryError::NoReleaseFound)));
    }

    #[tokio::test]
    async fn downloads_are_recorded() -> Result<()> {
        let source = source();
        assert_eq!(source.download_asset("v1.0.0", "app.deb").await?, b"v1.0.0");
        assert!(source
            .download_asset("v1.0.0", "missing")
            .await
            .unwrap_err()
            .is_not_found());

        assert_eq!(
            source.downloads(),
            vec![
                ("v1.0.0".to_string(), "app.deb".to_string()),
                ("v1.0.0".to_string(), "missing".to_string())
            ]
        );

        Ok(())
    }
}
