// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Reading `.pkg.tar.*` packages and repository databases. */

use {
    super::types::{Package, PkgInfo},
    crate::{
        control::{DESC, PKGINFO},
        error::{RepositoryError, Result},
        io::{Compression, MultiContentDigest},
    },
    std::io::Read,
};

/// Package file extensions accepted by `pacman`.
pub const PACKAGE_EXTENSIONS: [&str; 4] =
    [".pkg.tar.zst", ".pkg.tar.gz", ".pkg.tar.xz", ".pkg.tar.bz2"];

/// The package extension of a filename, if it has one.
pub fn package_extension(filename: &str) -> Option<&'static str> {
    PACKAGE_EXTENSIONS
        .iter()
        .find(|ext| filename.ends_with(**ext))
        .copied()
}

/// Read the `.PKGINFO` file of a package archive.
pub fn read_pkginfo(filename: &str, data: &[u8]) -> Result<PkgInfo> {
    let reader = Compression::from_filename(filename).decompress(data)?;
    let mut archive = tar::Archive::new(reader);

    for entry in archive.entries()? {
        let mut entry = entry?;

        if !entry.header().entry_type().is_file() || entry.path()?.as_os_str() != ".PKGINFO" {
            continue;
        }

        let mut text = String::new();
        entry.read_to_string(&mut text)?;

        return PKGINFO.from_str(&text);
    }

    Err(RepositoryError::MissingMetadata(".PKGINFO"))
}

/// Produce the database entry of a package archive.
///
/// The filename is canonicalized to `<name>-<version>-<arch><extension>`.
pub fn read_package(filename: &str, data: &[u8]) -> Result<Package> {
    let extension = package_extension(filename)
        .ok_or_else(|| RepositoryError::InvalidValue("package filename", filename.to_string()))?;

    let mut package = Package::from(read_pkginfo(filename, data)?);

    if package.name.is_empty() {
        return Err(RepositoryError::MissingRequiredField("pkgname"));
    }
    if package.version.is_empty() {
        return Err(RepositoryError::MissingRequiredField("pkgver"));
    }
    if package.arch.is_empty() {
        return Err(RepositoryError::MissingRequiredField("arch"));
    }

    let digest = MultiContentDigest::digest(data);
    package.filename = format!(
        "{}-{}-{}{}",
        package.name, package.version, package.arch, extension
    );
    package.compressed_size = data.len() as u64;
    package.md5sum = digest.md5;
    package.sha256sum = digest.sha256;

    Ok(package)
}

/// Decode the `desc` records of a repository database.
///
/// The compression is sniffed, so databases written by `repo-add` with any
/// of its compressors are understood.
pub fn read_database(data: &[u8]) -> Result<Vec<Package>> {
    let reader = Compression::detect(data).decompress(data)?;
    let mut archive = tar::Archive::new(reader);
    let mut packages = vec![];

    for entry in archive.entries()? {
        let mut entry = entry?;

        if !entry.header().entry_type().is_file() || !entry.path()?.ends_with("desc") {
            continue;
        }

        let mut text = String::new();
        entry.read_to_string(&mut text)?;

        packages.push(DESC.from_str(&text)?);
    }

    Ok(packages)
}

/// Serialize packages into a repository database.
///
/// The tar stream is reproducible: entries are written in the given order with
/// fixed ownership, permissions and modification time.
pub fn write_database<'a>(packages: impl IntoIterator<Item = &'a Package>) -> Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());

    for package in packages {
        let desc = DESC.to_vec(package)?;

        let mut header = tar::Header::new_gnu();
        header.set_size(desc.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);
        builder.append_data(
            &mut header,
            format!("{}-{}/desc", package.name, package.version),
            desc.as_slice(),
        )?;
    }

    Compression::Gzip.compress(&builder.into_inner()?)
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    /// Build a package archive holding `.PKGINFO` and one binary.
    pub(crate) fn build_package(compression: Compression, pkginfo: &str) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());

        for (path, data) in [
            (".PKGINFO", pkginfo.as_bytes()),
            ("usr/bin/hello", &b"\x7fELF"[..]),
        ] {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            builder.append_data(&mut header, path, data).unwrap();
        }

        compression.compress(&builder.into_inner().unwrap()).unwrap()
    }

    /// A minimal `.PKGINFO`.
    pub(crate) fn pkginfo(name: &str, version: &str, arch: &str) -> String {
        format!(
            "pkgname = {}\npkgver = {}\npkgdesc = Says hello\nsize = 4096\narch = {}\nlicense = MIT\n",
            name, version, arch
        )
    }

    #[test]
    fn package_from_archive() -> Result<()> {
        for (compression, filename) in [
            (Compression::Zstd, "hello.pkg.tar.zst"),
            (Compression::Gzip, "hello-1.0.0-1-x86_64.pkg.tar.gz"),
            (Compression::Xz, "hello-1.0.0-1-x86_64.pkg.tar.xz"),
        ] {
            let data = build_package(compression, &pkginfo("hello", "1.0.0-1", "x86_64"));
            let package = read_package(filename, &data)?;

            assert_eq!(package.name, "hello");
            assert_eq!(package.installed_size, 4096);
            assert_eq!(package.license, vec!["MIT".to_string()]);
            assert_eq!(package.compressed_size, data.len() as u64);
            assert_eq!(
                package.filename,
                format!("hello-1.0.0-1-x86_64{}", package_extension(filename).unwrap())
            );
        }

        Ok(())
    }

    #[test]
    fn missing_pkginfo() {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(0);
        builder.append_data(&mut header, "README", &b""[..]).unwrap();
        let data = Compression::Gzip
            .compress(&builder.into_inner().unwrap())
            .unwrap();

        assert!(matches!(
            read_package("x.pkg.tar.gz", &data),
            Err(RepositoryError::MissingMetadata(".PKGINFO"))
        ));
    }

    #[test]
    fn missing_arch() {
        let data = build_package(Compression::Gzip, "pkgname = hello\npkgver = 1.0.0-1\n");
        assert!(matches!(
            read_package("x.pkg.tar.gz", &data),
            Err(RepositoryError::MissingRequiredField("arch"))
        ));
    }

    #[test]
    fn database_is_reproducible() -> Result<()> {
        let package = read_package(
            "hello.pkg.tar.gz",
            &build_package(Compression::Gzip, &pkginfo("hello", "1.0.0-1", "x86_64")),
        )?;

        let db = write_database([&package])?;
        assert_eq!(Compression::detect(&db), Compression::Gzip);
        assert_eq!(write_database([&package])?, db);
        assert_eq!(read_database(&db)?, vec![package.clone()]);

        // Databases written with other compressors are read too.
        let tar = Compression::Gzip.decompress_all(&db)?;
        assert_eq!(
            read_database(&Compression::Zstd.compress(&tar)?)?,
            vec![package]
        );

        Ok(())
    }
}
