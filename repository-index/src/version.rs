// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Version ordering and release constraints.

Two unrelated notions of "version" meet here.

Package versions (`1:2.0.1-3`, `1.0~rc1`, `3.2_p1-r0`) are ordered with
[compare_versions], which follows the segment rules of pacman's `vercmp`.
It is used to pick the latest build of each package when writing an index.

Release versions are the semantic versions attached to releases by a
[crate::source::Source]. They are filtered with a [Constraint], a comma
separated conjunction of clauses such as `>=1.2, !=1.3.0, <2`. The
[ExclusionBuilder] renders the package versions already present in an
index into such a constraint so they are not fetched again.
*/

use {
    crate::error::{RepositoryError, Result},
    semver::{BuildMetadata, Prerelease, Version},
    std::{cmp::Ordering, fmt::Display, str::FromStr},
};

/// Compare two package version strings.
///
/// The `epoch:` prefix dominates. The remainder is walked in alternating runs
/// of digits and non-digits. Digit runs compare by magnitude. A digit run
/// sorts below a non-digit run. Non-digit runs compare bytewise with `~`
/// below every other character and below the end of the string.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let (epoch_a, rest_a) = split_epoch(a);
    let (epoch_b, rest_b) = split_epoch(b);

    epoch_a
        .cmp(&epoch_b)
        .then_with(|| compare_segments(rest_a, rest_b))
}

fn split_epoch(version: &str) -> (u64, &str) {
    match version.split_once(':') {
        Some((epoch, rest)) => (epoch.parse().unwrap_or_default(), rest),
        None => (0, version),
    }
}

/// The next run of digits or non-digits starting at `s`.
fn next_segment(s: &str) -> (&str, bool) {
    let numeric = s.starts_with(|c: char| c.is_ascii_digit());
    let end = s
        .find(|c: char| c.is_ascii_digit() != numeric)
        .unwrap_or(s.len());

    (&s[..end], numeric)
}

fn char_order(c: u8) -> i16 {
    if c == b'~' {
        -1
    } else {
        c as i16
    }
}

fn compare_segments(mut a: &str, mut b: &str) -> Ordering {
    while !a.is_empty() || !b.is_empty() {
        let (seg_a, numeric_a) = next_segment(a);
        let (seg_b, numeric_b) = next_segment(b);

        let ordering = match (numeric_a, numeric_b) {
            _ if seg_a.is_empty() && seg_b.starts_with('~') => Ordering::Greater,
            _ if seg_b.is_empty() && seg_a.starts_with('~') => Ordering::Less,
            (true, true) => {
                let trimmed_a = seg_a.trim_start_matches('0');
                let trimmed_b = seg_b.trim_start_matches('0');

                trimmed_a
                    .len()
                    .cmp(&trimmed_b.len())
                    .then_with(|| trimmed_a.cmp(trimmed_b))
            }
            (true, false) if !seg_b.is_empty() => Ordering::Less,
            (false, true) if !seg_a.is_empty() => Ordering::Greater,
            _ => seg_a
                .bytes()
                .map(char_order)
                .cmp(seg_b.bytes().map(char_order)),
        };

        if ordering != Ordering::Equal {
            return ordering;
        }

        a = &a[seg_a.len()..];
        b = &b[seg_b.len()..];
    }

    Ordering::Equal
}

/// Parse a release version leniently.
///
/// A leading `v` is accepted and missing minor or patch components are
/// padded with zeros, so `v1.2-rc1` parses as `1.2.0-rc1`. Build metadata
/// is discarded.
pub fn parse_version(s: &str) -> Result<Version> {
    let trimmed = s.trim();
    let trimmed = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);

    let (core, pre) = match trimmed.find(|c: char| c == '-' || c == '+') {
        Some(pos) => (&trimmed[..pos], &trimmed[pos..]),
        None => (trimmed, ""),
    };
    let pre = pre
        .split_once('+')
        .map(|(pre, _)| pre)
        .unwrap_or(pre)
        .trim_start_matches('-');

    let parts = core
        .split('.')
        .map(|part| part.parse::<u64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| RepositoryError::InvalidValue("version", s.to_string()))?;

    if parts.is_empty() || parts.len() > 3 {
        return Err(RepositoryError::InvalidValue("version", s.to_string()));
    }

    Ok(Version {
        major: parts[0],
        minor: parts.get(1).copied().unwrap_or_default(),
        patch: parts.get(2).copied().unwrap_or_default(),
        pre: if pre.is_empty() {
            Prerelease::EMPTY
        } else {
            Prerelease::new(pre).map_err(|_| RepositoryError::InvalidValue("version", s.to_string()))?
        },
        build: BuildMetadata::EMPTY,
    })
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Op {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

#[derive(Clone, Debug, Eq, PartialEq)]
struct Comparator {
    op: Op,
    version: Version,
}

impl Comparator {
    fn new(op: Op, version: Version) -> Self {
        Self { op, version }
    }

    fn matches(&self, version: &Version) -> bool {
        let ordering = version.cmp(&self.version);

        match self.op {
            Op::Eq => ordering == Ordering::Equal,
            Op::Ne => ordering != Ordering::Equal,
            Op::Gt => ordering == Ordering::Greater,
            Op::Ge => ordering != Ordering::Less,
            Op::Lt => ordering == Ordering::Less,
            Op::Le => ordering != Ordering::Greater,
        }
    }
}

/// A version with possibly unspecified trailing components.
struct Partial {
    parts: Vec<u64>,
    pre: Prerelease,
}

impl Partial {
    fn parse(clause: &str, s: &str) -> Result<Self> {
        let invalid = || RepositoryError::Constraint(clause.to_string());

        let s = s.strip_prefix('v').unwrap_or(s);
        let (core, pre) = match s.split_once('-') {
            Some((core, pre)) => (core, pre.split('+').next().unwrap_or_default()),
            None => (s.split('+').next().unwrap_or_default(), ""),
        };

        let mut parts = vec![];
        for part in core.split('.') {
            if matches!(part, "*" | "x" | "X") {
                break;
            }
            parts.push(part.parse::<u64>().map_err(|_| invalid())?);
        }
        if parts.len() > 3 {
            return Err(invalid());
        }

        let pre = if pre.is_empty() {
            Prerelease::EMPTY
        } else {
            Prerelease::new(pre).map_err(|_| invalid())?
        };

        Ok(Self { parts, pre })
    }

    fn is_complete(&self) -> bool {
        self.parts.len() == 3
    }

    fn padded(&self) -> Version {
        Version {
            major: self.parts.first().copied().unwrap_or_default(),
            minor: self.parts.get(1).copied().unwrap_or_default(),
            patch: self.parts.get(2).copied().unwrap_or_default(),
            pre: self.pre.clone(),
            build: BuildMetadata::EMPTY,
        }
    }

    /// The first version past the range selected by the first `depth` parts.
    fn bump(&self, depth: usize) -> Version {
        let mut parts = [0u64; 3];
        parts[..depth].copy_from_slice(&self.parts[..depth]);
        parts[depth - 1] += 1;

        Version::new(parts[0], parts[1], parts[2])
    }

    /// Comparators for the half open range covered by the specified parts.
    fn range(&self, depth: usize) -> Vec<Comparator> {
        if depth == 0 {
            return vec![];
        }

        vec![
            Comparator::new(Op::Ge, self.padded()),
            Comparator::new(Op::Lt, self.bump(depth)),
        ]
    }
}

/// A conjunction of version clauses.
///
/// Clauses are separated by commas and every clause must match. The empty
/// constraint matches every version.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Constraint {
    comparators: Vec<Comparator>,
}

impl Constraint {
    /// Parse a constraint string.
    pub fn parse(s: &str) -> Result<Self> {
        let mut comparators = vec![];

        for clause in s.split(',').map(|c| c.trim()).filter(|c| !c.is_empty()) {
            comparators.extend(Self::parse_clause(clause)?);
        }

        Ok(Self { comparators })
    }

    fn parse_clause(clause: &str) -> Result<Vec<Comparator>> {
        const OPERATORS: [&str; 10] = ["!=", ">=", "<=", "~>", "==", "=", ">", "<", "~", "^"];

        let (op, rest) = OPERATORS
            .iter()
            .find_map(|op| clause.strip_prefix(op).map(|rest| (*op, rest.trim())))
            .unwrap_or(("=", clause));

        if rest.is_empty() {
            return Err(RepositoryError::Constraint(clause.to_string()));
        }

        let partial = Partial::parse(clause, rest)?;
        let depth = partial.parts.len();

        Ok(match op {
            "=" | "==" if partial.is_complete() => {
                vec![Comparator::new(Op::Eq, partial.padded())]
            }
            "=" | "==" => partial.range(depth),
            "!=" => vec![Comparator::new(Op::Ne, partial.padded())],
            ">" => vec![Comparator::new(Op::Gt, partial.padded())],
            ">=" => vec![Comparator::new(Op::Ge, partial.padded())],
            "<" => vec![Comparator::new(Op::Lt, partial.padded())],
            "<=" => vec![Comparator::new(Op::Le, partial.padded())],
            "~" => {
                let mut comparators = partial.range(depth.min(2));
                if let Some(lower) = comparators.first_mut() {
                    lower.version = partial.padded();
                }
                comparators
            }
            "~>" => {
                let mut comparators = partial.range(depth.saturating_sub(1).max(1).min(depth));
                if let Some(lower) = comparators.first_mut() {
                    lower.version = partial.padded();
                }
                comparators
            }
            "^" => {
                let significant = partial
                    .parts
                    .iter()
                    .position(|part| *part != 0)
                    .map(|pos| pos + 1)
                    .unwrap_or(depth);
                let mut comparators = partial.range(significant.min(depth).max(depth.min(1)));
                if let Some(lower) = comparators.first_mut() {
                    lower.version = partial.padded();
                }
                comparators
            }
            _ => return Err(RepositoryError::Constraint(clause.to_string())),
        })
    }

    /// Whether a version satisfies every clause.
    pub fn matches(&self, version: &Version) -> bool {
        let version = Version {
            build: BuildMetadata::EMPTY,
            ..version.clone()
        };

        self.comparators.iter().all(|c| c.matches(&version))
    }

    /// Whether a version string satisfies every clause.
    ///
    /// Strings that do not parse as versions never match.
    pub fn matches_str(&self, version: &str) -> bool {
        parse_version(version)
            .map(|v| self.matches(&v))
            .unwrap_or_default()
    }
}

impl FromStr for Constraint {
    type Err = RepositoryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Join constraint strings, skipping empty ones.
pub fn join_constraints<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

/// How a package format's version strings map onto release versions.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VersionScheme {
    /// Debian versions. `1.0.0~rc1` is the release `1.0.0-rc1`.
    Apt,
    /// RPM `ver` attributes. Same mapping as [VersionScheme::Apt].
    Yum,
    /// Arch `epoch:pkgver-pkgrel`. Only `pkgver` identifies the release.
    Arch,
    /// Alpine `pkgver-rN`. `_p1` suffixes map to build metadata.
    Apk,
}

impl VersionScheme {
    /// The release version a package version was built from.
    pub fn normalize(&self, version: &str) -> String {
        match self {
            Self::Apt | Self::Yum => version.replacen('~', "-", 1),
            Self::Arch => {
                let version = split_epoch(version).1;
                let version = version
                    .rsplit_once('-')
                    .map(|(version, _)| version)
                    .unwrap_or(version);

                version.replace('_', "-")
            }
            Self::Apk => {
                let version = match version.rsplit_once("-r") {
                    Some((version, release)) if release.bytes().all(|b| b.is_ascii_digit()) => {
                        version
                    }
                    _ => version,
                };

                version.replace("_p", "+").replace('_', "-")
            }
        }
    }
}

/// Accumulates indexed package versions into an exclusion constraint.
///
/// Every version becomes a `!=` clause. Indices keep only the newest build of
/// each package, so the newest stable version also becomes a `>` floor. Older
/// releases could not displace it and fetching them is wasted work.
#[derive(Clone, Debug)]
pub struct ExclusionBuilder {
    scheme: VersionScheme,
    versions: Vec<String>,
    floor: Option<Version>,
}

impl ExclusionBuilder {
    pub fn new(scheme: VersionScheme) -> Self {
        Self {
            scheme,
            versions: vec![],
            floor: None,
        }
    }

    /// Record a package version present in the index.
    ///
    /// Versions that do not map onto a release version are not excluded.
    pub fn add(&mut self, version: &str) {
        let normalized = self.scheme.normalize(version);

        let parsed = match parse_version(&normalized) {
            Ok(parsed) => parsed,
            Err(_) => {
                log::debug!("not excluding unparsable version {}", version);
                return;
            }
        };

        if parsed.pre.is_empty() && self.floor.as_ref().map(|f| parsed > *f).unwrap_or(true) {
            self.floor = Some(parsed);
        }

        if !self.versions.contains(&normalized) {
            self.versions.push(normalized);
        }
    }

    /// Render the constraint. Empty when nothing was recorded.
    pub fn build(&self) -> String {
        let mut clauses = self
            .versions
            .iter()
            .map(|v| format!("!={}", v))
            .collect::<Vec<_>>();

        if let Some(floor) = &self.floor {
            clauses.push(format!(">{}", floor));
        }

        clauses.join(",")
    }
}

impl Display for ExclusionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.build())
    }
}
