// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Signing keys for repository metadata.

APT, YUM and Arch repositories are signed with PGP. Alpine repositories are
signed with a bare RSA key. Both key types are capabilities handed to a build:
when no key is supplied nothing is signed and no signature artifacts are
written.

Signature creation times come from the caller so that rebuilding an unchanged
repository produces identical bytes.
*/

use {
    crate::error::{RepositoryError, Result},
    chrono::{DateTime, SubsecRound, Utc},
    log::debug,
    pgp::{
        armor::BlockType,
        crypto::{HashAlgorithm, SymmetricKeyAlgorithm},
        packet::{Packet, SignatureConfig, SignatureType, Subpacket},
        ser::Serialize,
        types::{CompressionAlgorithm, KeyTrait, KeyVersion, SecretKeyTrait},
        Deserializable, KeyType, SecretKeyParamsBuilder, Signature, SignedPublicKey,
        SignedSecretKey, StandaloneSignature,
    },
    rsa::{
        pkcs1::DecodeRsaPrivateKey,
        pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey, LineEnding},
        Hash, PaddingScheme, PublicKey, RsaPrivateKey, RsaPublicKey,
    },
    pgp_cleartext::CleartextSignatureReader,
    smallvec::{smallvec, SmallVec},
    std::io::{Cursor, Read},
};

const CLEARTEXT_HEADER: &str = "-----BEGIN PGP SIGNED MESSAGE-----";

/// Parameters for generating a repository signing key.
///
/// The key is a 2048 bit RSA key restricted to signing, preferring SHA-2
/// digests. `primary_user_id` has a format like `Name <email>`.
pub fn key_params(primary_user_id: impl ToString) -> SecretKeyParamsBuilder {
    let mut params = SecretKeyParamsBuilder::default();
    params
        .key_type(KeyType::Rsa(2048))
        .can_sign(true)
        .can_create_certificates(false)
        .primary_user_id(primary_user_id.to_string())
        .preferred_hash_algorithms(smallvec![HashAlgorithm::SHA2_256, HashAlgorithm::SHA2_512])
        .preferred_symmetric_algorithms(smallvec![SymmetricKeyAlgorithm::AES256])
        .preferred_compression_algorithms(smallvec![CompressionAlgorithm::ZLIB]);

    params
}

/// A PGP secret key able to sign repository metadata.
#[derive(Clone, Debug)]
pub struct PgpSigningKey {
    secret: SignedSecretKey,
    public: SignedPublicKey,
    passphrase: String,
}

impl PgpSigningKey {
    /// Construct an instance from a secret key and the passphrase unlocking it.
    ///
    /// The public key is derived and self-signed once, here.
    pub fn new(secret: SignedSecretKey, passphrase: impl ToString) -> Result<Self> {
        let passphrase = passphrase.to_string();

        let pw = passphrase.clone();
        let public = secret.public_key().sign(&secret, move || pw)?;

        Ok(Self {
            secret,
            public,
            passphrase,
        })
    }

    /// Construct an instance from an ASCII armored secret key.
    pub fn from_armored(armored: &str, passphrase: impl ToString) -> Result<Self> {
        let (secret, _) = SignedSecretKey::from_armor_single(Cursor::new(armored.as_bytes()))?;

        Self::new(secret, passphrase)
    }

    /// Generate a self-signed signing key from [key_params()].
    pub fn generate(primary_user_id: impl ToString, passphrase: impl ToString) -> Result<Self> {
        let passphrase = passphrase.to_string();

        let params = key_params(primary_user_id)
            .build()
            .map_err(|e| RepositoryError::Signing(e.to_string()))?;

        let pw = passphrase.clone();
        let secret = params.generate()?.sign(move || pw)?;

        Self::new(secret, passphrase)
    }

    /// The self-signed public key.
    pub fn public_key(&self) -> &SignedPublicKey {
        &self.public
    }

    /// The public key as an ASCII armored block.
    pub fn armored_public_key(&self) -> Result<String> {
        Ok(self.public.to_armored_string(None)?)
    }

    fn signature(
        &self,
        typ: SignatureType,
        data: &[u8],
        time: DateTime<Utc>,
    ) -> Result<Signature> {
        let key = &self.secret;

        let config = SignatureConfig::new_v4(
            Default::default(),
            typ,
            key.algorithm(),
            HashAlgorithm::SHA2_256,
            vec![
                Subpacket::IssuerFingerprint(KeyVersion::V4, SmallVec::from_slice(&key.fingerprint())),
                Subpacket::SignatureCreationTime(time.trunc_subsecs(0)),
            ],
            vec![Subpacket::Issuer(key.key_id())],
        );

        let passphrase = self.passphrase.clone();
        Ok(config.sign(key, move || passphrase, Cursor::new(data))?)
    }

    /// Produce an ASCII armored detached signature.
    pub fn sign_armored(&self, data: &[u8], time: DateTime<Utc>) -> Result<String> {
        let packet = Packet::Signature(self.signature(SignatureType::Binary, data, time)?);

        let mut writer = Cursor::new(Vec::<u8>::new());
        pgp::armor::write(&packet, BlockType::Signature, &mut writer, None)?;

        String::from_utf8(writer.into_inner()).map_err(|e| RepositoryError::Signing(e.to_string()))
    }

    /// Produce a binary detached signature.
    pub fn sign_binary(&self, data: &[u8], time: DateTime<Utc>) -> Result<Vec<u8>> {
        let packet = Packet::Signature(self.signature(SignatureType::Binary, data, time)?);

        Ok(packet.to_bytes()?)
    }

    /// Produce a cleartext signed document.
    ///
    /// Trailing whitespace is stripped from every line and lines beginning
    /// with `-` or `From ` are dash-escaped. The digest covers the lines joined
    /// with CRLF.
    pub fn sign_cleartext(&self, text: &str, time: DateTime<Utc>) -> Result<String> {
        let lines = text.lines().map(|line| line.trim_end()).collect::<Vec<_>>();
        let cleartext = lines.join("\r\n");

        let packet = Packet::Signature(self.signature(
            SignatureType::Text,
            cleartext.as_bytes(),
            time,
        )?);
        let mut writer = Cursor::new(Vec::<u8>::new());
        pgp::armor::write(&packet, BlockType::Signature, &mut writer, None)?;
        let armored =
            String::from_utf8(writer.into_inner()).map_err(|e| RepositoryError::Signing(e.to_string()))?;

        let mut out = format!("{}\nHash: SHA256\n\n", CLEARTEXT_HEADER);
        for line in lines {
            if line.starts_with('-') || line.starts_with("From ") {
                out.push_str("- ");
            }
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(&armored);

        Ok(out)
    }
}

/// Parse an ASCII armored public key.
pub fn parse_armored_public_key(armored: &str) -> Result<SignedPublicKey> {
    Ok(SignedPublicKey::from_armor_single(Cursor::new(armored.as_bytes()))?.0)
}

/// Verify a detached signature, ASCII armored or binary.
pub fn verify_detached(key: &SignedPublicKey, data: &[u8], signature: &[u8]) -> Result<()> {
    let signature = if signature.starts_with(b"-----BEGIN") {
        StandaloneSignature::from_armor_single(Cursor::new(signature))?.0
    } else {
        StandaloneSignature::from_bytes(Cursor::new(signature))?
    };

    Ok(signature.verify(key, data)?)
}

/// Verify a cleartext signed document, returning the signed text.
///
/// The text is returned with dash-escaping reversed and line endings as they
/// appear in the document.
pub fn verify_cleartext(key: &SignedPublicKey, document: &str) -> Result<String> {
    let mut reader = CleartextSignatureReader::new(document.as_bytes());

    let mut signed = String::new();
    reader.read_to_string(&mut signed)?;

    let verified = reader.finalize().verify(key)?;
    debug!("verified {} cleartext signature(s)", verified);

    Ok(signed)
}

/// An RSA private key signing Alpine package indices.
#[derive(Clone, Debug)]
pub struct RsaSigningKey {
    private: RsaPrivateKey,
}

impl RsaSigningKey {
    pub fn new(private: RsaPrivateKey) -> Self {
        Self { private }
    }

    /// Parse a PEM private key in PKCS#8 or PKCS#1 form.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let private = match RsaPrivateKey::from_pkcs8_pem(pem) {
            Ok(key) => key,
            Err(_) => RsaPrivateKey::from_pkcs1_pem(pem)
                .map_err(|e| RepositoryError::RsaKey(e.to_string()))?,
        };

        Ok(Self { private })
    }

    /// Generate a 2048 bit key.
    pub fn generate() -> Result<Self> {
        Ok(Self {
            private: RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048)?,
        })
    }

    /// Sign the SHA-1 digest of `data` with PKCS#1 v1.5 padding.
    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        let digest = crate::io::sha1_digest(data);

        Ok(self
            .private
            .sign(PaddingScheme::new_pkcs1v15_sign(Some(Hash::SHA1)), &digest)?)
    }

    /// The public key.
    pub fn public_key(&self) -> RsaPublicKey {
        self.private.to_public_key()
    }

    /// The public key in PEM form, as `apk` expects in `/etc/apk/keys`.
    pub fn public_key_pem(&self) -> Result<String> {
        self.public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| RepositoryError::RsaKey(e.to_string()))
    }
}

/// Parse a PEM public key.
pub fn parse_rsa_public_key(pem: &str) -> Result<RsaPublicKey> {
    RsaPublicKey::from_public_key_pem(pem).map_err(|e| RepositoryError::RsaKey(e.to_string()))
}

/// Verify an RSA PKCS#1 v1.5 SHA-1 signature.
pub fn verify_rsa(key: &RsaPublicKey, data: &[u8], signature: &[u8]) -> Result<()> {
    let digest = crate::io::sha1_digest(data);

    Ok(key.verify(
        PaddingScheme::new_pkcs1v15_sign(Some(Hash::SHA1)),
        &digest,
        signature,
    )?)
}
