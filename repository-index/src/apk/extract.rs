// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Reading and writing Alpine packages and indices.

An `.apk` is a concatenation of gzip members which together decompress to a
single tar stream:

1. An optional signature segment holding a `.SIGN.*` entry.
2. The control segment holding `.PKGINFO` and install scripts.
3. The data segment holding the installed files.

Each segment is a separate gzip member so the control segment can be hashed
and signed on its own. Only the last segment carries the tar end-of-archive
blocks. `APKINDEX.tar.gz` follows the same layout, with the index taking the
place of the control and data segments.
*/

use {
    super::types::{Package, PkgInfo},
    crate::{
        control::{APKINDEX, PKGINFO},
        error::{RepositoryError, Result},
        io::{sha1_digest, Compression},
        signing::RsaSigningKey,
    },
    std::io::Read,
};

const SIGNATURE_PREFIX: &str = ".SIGN.";

/// One gzip member of an archive.
#[derive(Debug)]
pub struct Segment<'a> {
    /// The compressed bytes.
    pub raw: &'a [u8],

    /// The decompressed tar data.
    pub content: Vec<u8>,
}

impl<'a> Segment<'a> {
    /// Decompress the gzip member at the start of `data`.
    ///
    /// Returns the segment and the bytes following it.
    pub fn split(data: &'a [u8]) -> Result<(Self, &'a [u8])> {
        let mut remaining = data;
        let mut content = vec![];
        flate2::bufread::GzDecoder::new(&mut remaining).read_to_end(&mut content)?;

        let consumed = data.len() - remaining.len();

        Ok((
            Self {
                raw: &data[..consumed],
                content,
            },
            &data[consumed..],
        ))
    }

    /// Path of the first tar entry in the segment.
    pub fn first_entry(&self) -> Result<Option<String>> {
        let mut archive = tar::Archive::new(self.content.as_slice());

        match archive.entries()?.next() {
            Some(entry) => Ok(Some(entry?.path()?.to_string_lossy().to_string())),
            None => Ok(None),
        }
    }

    /// Whether this is a signature segment.
    pub fn is_signature(&self) -> Result<bool> {
        Ok(self
            .first_entry()?
            .map(|path| path.starts_with(SIGNATURE_PREFIX))
            .unwrap_or_default())
    }

    /// The content of a file in the segment.
    pub fn read_file(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let mut archive = tar::Archive::new(self.content.as_slice());

        for entry in archive.entries()? {
            let mut entry = entry?;

            if entry.path()?.as_os_str() == path {
                let mut data = vec![];
                entry.read_to_end(&mut data)?;

                return Ok(Some(data));
            }
        }

        Ok(None)
    }
}

/// Locate the control segment of a package, skipping any signature.
pub fn control_segment(data: &[u8]) -> Result<Segment<'_>> {
    let (first, rest) = Segment::split(data)?;

    if first.is_signature()? {
        Ok(Segment::split(rest)?.0)
    } else {
        Ok(first)
    }
}

/// Produce the index record of a package file.
pub fn read_package(data: &[u8]) -> Result<Package> {
    let control = control_segment(data)?;
    let pkginfo = control
        .read_file(".PKGINFO")?
        .ok_or(RepositoryError::MissingMetadata(".PKGINFO"))?;

    let mut package = Package::from(PKGINFO.from_slice::<PkgInfo>(&pkginfo)?);

    if package.name.is_empty() {
        return Err(RepositoryError::MissingRequiredField("pkgname"));
    }
    if package.version.is_empty() {
        return Err(RepositoryError::MissingRequiredField("pkgver"));
    }
    if package.arch.is_empty() {
        return Err(RepositoryError::MissingRequiredField("arch"));
    }

    package.checksum = format!("Q1{}", base64::encode(sha1_digest(control.raw)));
    package.size = data.len() as u64;

    Ok(package)
}

/// Decode the records of an `APKINDEX.tar.gz`, signed or not.
pub fn read_index(data: &[u8]) -> Result<Vec<Package>> {
    let reader = Compression::Gzip.decompress(data)?;
    let mut archive = tar::Archive::new(reader);

    for entry in archive.entries()? {
        let mut entry = entry?;

        if entry.path()?.as_os_str() != "APKINDEX" {
            continue;
        }

        let mut text = String::new();
        entry.read_to_string(&mut text)?;

        return APKINDEX.from_str(&text);
    }

    Err(RepositoryError::MissingMetadata("APKINDEX"))
}

fn file_header(path: &str, size: usize) -> Result<tar::Header> {
    let mut header = tar::Header::new_ustar();
    header.set_path(path)?;
    header.set_size(size as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header.set_entry_type(tar::EntryType::Regular);
    header.set_cksum();

    Ok(header)
}

/// Serialize index records into an unsigned `APKINDEX.tar.gz`.
pub fn write_index<'a>(
    packages: impl IntoIterator<Item = &'a Package>,
    description: &str,
) -> Result<Vec<u8>> {
    let text = APKINDEX.to_vec(&packages.into_iter().collect::<Vec<_>>())?;
    let mut builder = tar::Builder::new(Vec::new());

    if !description.is_empty() {
        let header = file_header("DESCRIPTION", description.len())?;
        builder.append(&header, description.as_bytes())?;
    }

    let header = file_header("APKINDEX", text.len())?;
    builder.append(&header, text.as_slice())?;

    Compression::Gzip.compress(&builder.into_inner()?)
}

/// Prepend a signature segment to a gzipped archive.
///
/// The segment holds a single `.SIGN.RSA.<key_file>` entry without
/// end-of-archive blocks, so the tar stream continues into the archive.
pub fn sign_archive(archive: &[u8], key: &RsaSigningKey, key_file: &str) -> Result<Vec<u8>> {
    let signature = key.sign(archive)?;
    let header = file_header(&format!("{}RSA.{}", SIGNATURE_PREFIX, key_file), signature.len())?;

    let mut tar = header.as_bytes().to_vec();
    tar.extend_from_slice(&signature);
    tar.resize(tar.len() + (512 - signature.len() % 512) % 512, 0);

    let mut signed = Compression::Gzip.compress(&tar)?;
    signed.extend_from_slice(archive);

    Ok(signed)
}

#[cfg(test)]
pub(crate) mod test {
    use {
        super::*,
        crate::signing::{test::RSA_KEY, verify_rsa},
    };

    /// Build a gzip segment from files, with or without end-of-archive blocks.
    fn segment(files: &[(&str, &[u8])], terminated: bool) -> Vec<u8> {
        let mut tar = vec![];

        for (path, data) in files {
            tar.extend_from_slice(file_header(path, data.len()).unwrap().as_bytes());
            tar.extend_from_slice(data);
            tar.resize(tar.len() + (512 - data.len() % 512) % 512, 0);
        }

        if terminated {
            tar.resize(tar.len() + 1024, 0);
        }

        Compression::Gzip.compress(&tar).unwrap()
    }

    /// Build a package from a `.PKGINFO`.
    pub(crate) fn build_apk(pkginfo: &str) -> Vec<u8> {
        let mut data = segment(&[(".PKGINFO", pkginfo.as_bytes())], false);
        data.extend(segment(&[("usr/bin/hello", &b"#!/bin/sh\necho hello\n"[..])], true));

        data
    }

    /// A minimal `.PKGINFO`.
    pub(crate) fn pkginfo(name: &str, version: &str, arch: &str) -> String {
        format!(
            "pkgname = {}\npkgver = {}\npkgdesc = Says hello\nsize = 4096\narch = {}\nlicense = MIT\n",
            name, version, arch
        )
    }

    #[test]
    fn package_from_apk() -> Result<()> {
        let data = build_apk(&pkginfo("hello", "1.0.0-r0", "x86_64"));
        let package = read_package(&data)?;

        let control = segment(
            &[(".PKGINFO", pkginfo("hello", "1.0.0-r0", "x86_64").as_bytes())],
            false,
        );

        assert_eq!(package.name, "hello");
        assert_eq!(package.version, "1.0.0-r0");
        assert_eq!(package.installed_size, 4096);
        assert_eq!(package.size, data.len() as u64);
        assert_eq!(
            package.checksum,
            format!("Q1{}", base64::encode(sha1_digest(&control)))
        );

        Ok(())
    }

    #[test]
    fn signed_package_skips_signature() -> Result<()> {
        let unsigned = build_apk(&pkginfo("hello", "1.0.0-r0", "x86_64"));
        let signed = sign_archive(&unsigned, &RSA_KEY, "packager.rsa.pub")?;

        let (first, _) = Segment::split(&signed)?;
        assert_eq!(
            first.first_entry()?.as_deref(),
            Some(".SIGN.RSA.packager.rsa.pub")
        );

        // The checksum covers the control segment only.
        assert_eq!(read_package(&signed)?.checksum, read_package(&unsigned)?.checksum);

        Ok(())
    }

    #[test]
    fn missing_pkginfo() {
        let data = segment(&[("usr/bin/hello", &b""[..])], true);
        assert!(matches!(
            read_package(&data),
            Err(RepositoryError::MissingMetadata(".PKGINFO"))
        ));
    }

    #[test]
    fn signed_index() -> Result<()> {
        let package = read_package(&build_apk(&pkginfo("hello", "1.0.0-r0", "x86_64")))?;
        let index = write_index([&package], "")?;
        let signed = sign_archive(&index, &RSA_KEY, "repository.rsa.pub")?;

        let (signature, rest) = Segment::split(&signed)?;
        assert_eq!(rest, index.as_slice());

        let signature = signature
            .read_file(".SIGN.RSA.repository.rsa.pub")?
            .expect("signature entry");
        verify_rsa(&RSA_KEY.public_key(), &index, &signature)?;

        assert_eq!(read_index(&signed)?, vec![package.clone()]);
        assert_eq!(read_index(&index)?, vec![package]);

        Ok(())
    }

    #[test]
    fn index_description() -> Result<()> {
        let package = read_package(&build_apk(&pkginfo("hello", "1.0.0-r0", "x86_64")))?;
        let index = write_index([&package], "v1.0.0")?;

        let (segment, _) = Segment::split(&index)?;
        assert_eq!(segment.first_entry()?.as_deref(), Some("DESCRIPTION"));
        assert_eq!(segment.read_file("DESCRIPTION")?, Some(b"v1.0.0".to_vec()));
        assert_eq!(read_index(&index)?.len(), 1);

        Ok(())
    }
}
