// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Incrementally maintained Linux package repositories.

This crate turns the release artifacts of a project into package repositories
for four package managers:

* APT (`.deb` packages, `dists/` + `pool/` layout). See [apt].
* Arch Linux (`.pkg.tar.*` packages, `<repo>.db` databases). See [arch].
* YUM / DNF (`.rpm` packages, `repodata/repomd.xml`). See [yum].
* Alpine (`.apk` packages, `APKINDEX.tar.gz`). See [apk].

# Build Model

Every format follows the same cycle, driven by [pipeline::build]:

1. Read the index already present at the destination [target::Target].
2. Derive a version exclusion constraint from the versions it contains
   ([version::ExclusionBuilder]).
3. Ask the [source::Source] for releases matching the constraint and
   download only the assets the format recognizes as packages.
4. Extract package metadata, merge it into the index and write the index
   out, compressed and optionally signed, into a [pipeline::Staging]
   directory.
5. Copy the staging directory to the destination in one pass.

A build against a source offering nothing new changes nothing at the
destination.

# Supporting Modules

[control] is a serde codec for the line-oriented key-value formats shared by
Debian control files, Arch `desc` records, `.PKGINFO` files and `APKINDEX`.
[io] defines compression and content digest helpers. [signing] wraps PGP and
RSA signing keys. [config] holds the per-format settings and [error] the
crate's error type.
*/

pub mod apk;
pub mod apt;
pub mod arch;
pub mod config;
pub mod control;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod signing;
pub mod source;
pub mod target;
pub mod version;
pub mod yum;
