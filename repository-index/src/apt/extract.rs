// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Reading `.deb` packages.

A `.deb` is an `ar` archive holding `debian-binary`, a `control.tar[.<ext>]`
with package metadata and a `data.tar[.<ext>]` with installed files. Only the
`control` file inside the control tarball is of interest here.
*/

use {
    super::types::Package,
    crate::{
        control::DEB,
        error::{RepositoryError, Result},
        io::{Compression, MultiContentDigest},
    },
    std::io::Read,
};

/// Read the `control` file of a `.deb`.
pub fn read_control(data: &[u8]) -> Result<String> {
    let mut archive = ar::Archive::new(data);

    while let Some(entry) = archive.next_entry() {
        let entry = entry?;
        let identifier = String::from_utf8_lossy(entry.header().identifier()).to_string();

        if !identifier.starts_with("control.tar") {
            continue;
        }

        let reader = Compression::from_filename(&identifier).decompress(entry)?;
        let mut control_tar = tar::Archive::new(reader);

        for tar_entry in control_tar.entries()? {
            let mut tar_entry = tar_entry?;

            if tar_entry.path()?.file_name() != Some(std::ffi::OsStr::new("control")) {
                continue;
            }

            let mut control = String::new();
            tar_entry.read_to_string(&mut control)?;

            return Ok(control);
        }

        return Err(RepositoryError::MissingMetadata("control"));
    }

    Err(RepositoryError::MissingMetadata("control.tar"))
}

/// Produce the index entry of a `.deb`.
///
/// Archive level fields (size, digests and pool path) are filled in.
pub fn read_package(data: &[u8]) -> Result<Package> {
    let mut package = DEB.from_str::<Package>(&read_control(data)?)?;

    if package.package.is_empty() {
        return Err(RepositoryError::MissingRequiredField("Package"));
    }
    if package.version.is_empty() {
        return Err(RepositoryError::MissingRequiredField("Version"));
    }
    if package.architecture.is_empty() {
        return Err(RepositoryError::MissingRequiredField("Architecture"));
    }

    let digest = MultiContentDigest::digest(data);
    package.size = data.len() as u64;
    package.md5sum = digest.md5;
    package.sha1 = digest.sha1;
    package.sha256 = digest.sha256;
    package.filename = package.pool_path();

    Ok(package)
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    fn tar_with(path: &str, data: &[u8]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());

        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, path, data).unwrap();

        builder.into_inner().unwrap()
    }

    fn deb_with(control_member: &str, control_tar: &[u8]) -> Vec<u8> {
        let mut ar_builder = ar::Builder::new(Vec::new());

        for (identifier, data) in [
            ("debian-binary", &b"2.0\n"[..]),
            (control_member, control_tar),
            ("data.tar", &tar_with("usr/bin/hello", b"#!/bin/sh\n")[..]),
        ] {
            let header = ar::Header::new(identifier.as_bytes().to_vec(), data.len() as u64);
            ar_builder.append(&header, data).unwrap();
        }

        ar_builder.into_inner().unwrap()
    }

    /// Build a `.deb` whose gzipped control tarball holds `control`.
    pub(crate) fn build_deb(control: &str) -> Vec<u8> {
        let control_tar = Compression::Gzip
            .compress(&tar_with("./control", control.as_bytes()))
            .unwrap();

        deb_with("control.tar.gz", &control_tar)
    }

    /// A minimal `control` file.
    pub(crate) fn control(name: &str, version: &str, arch: &str) -> String {
        format!(
            "Package: {}\nVersion: {}\nArchitecture: {}\nMaintainer: Jane Doe <jane@example.com>\n\
             Installed-Size: 12\nDescription: greeting tool\n Prints a greeting.\n",
            name, version, arch
        )
    }

    #[test]
    fn package_from_deb() -> Result<()> {
        let deb = build_deb(&control("hello", "1.0.0", "amd64"));
        let package = read_package(&deb)?;

        assert_eq!(package.package, "hello");
        assert_eq!(package.version, "1.0.0");
        assert_eq!(package.installed_size, 12);
        assert_eq!(package.description, "greeting tool\nPrints a greeting.");
        assert_eq!(package.size, deb.len() as u64);
        assert_eq!(package.sha256, crate::io::sha256_digest(&deb));
        assert_eq!(package.filename, "pool/main/h/hello/hello_1.0.0_amd64.deb");

        Ok(())
    }

    #[test]
    fn uncompressed_control_tar() -> Result<()> {
        let deb = deb_with(
            "control.tar",
            &tar_with("control", control("hello", "2.0.0", "arm64").as_bytes()),
        );
        assert_eq!(read_package(&deb)?.architecture, "arm64");

        Ok(())
    }

    #[test]
    fn missing_metadata() {
        let deb = deb_with("control.tar", &tar_with("md5sums", b""));
        assert!(matches!(
            read_package(&deb),
            Err(RepositoryError::MissingMetadata("control"))
        ));

        let mut ar_builder = ar::Builder::new(Vec::new());
        let header = ar::Header::new(b"debian-binary".to_vec(), 4);
        ar_builder.append(&header, &b"2.0\n"[..]).unwrap();
        assert!(matches!(
            read_package(&ar_builder.into_inner().unwrap()),
            Err(RepositoryError::MissingMetadata("control.tar"))
        ));
    }

    #[test]
    fn missing_required_fields() {
        let deb = build_deb("Package: hello\nArchitecture: amd64\n");
        assert!(matches!(
            read_package(&deb),
            Err(RepositoryError::MissingRequiredField("Version"))
        ));
    }
}
