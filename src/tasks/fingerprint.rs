// src/tasks/fingerprint.rs

//! SSH public key fingerprints.
//!
//! AWS identifies an imported key pair by the MD5 digest of the key's
//! PKIX `SubjectPublicKeyInfo` DER encoding, printed as colon-separated hex.
//! OpenSSH prints the MD5 digest of the raw key blob in the same format.

use anyhow::{anyhow, bail, Context as _, Result};
use md5::{Digest, Md5};
use rsa::pkcs8::EncodePublicKey;
use ssh_key::public::KeyData;

pub use ssh_key::PublicKey;

/// Parse an `authorized_keys`-style public key line.
pub fn parse_public_key(text: &str) -> Result<PublicKey> {
    PublicKey::from_openssh(text.trim()).context("parsing OpenSSH public key")
}

/// Fingerprint AWS reports for an imported key.
pub fn compute_aws_fingerprint(text: &str) -> Result<String> {
    let key = parse_public_key(text)?;
    let KeyData::Rsa(ssh_rsa) = key.key_data() else {
        bail!(
            "unsupported key type {:?}; only ssh-rsa keys can be imported",
            key.algorithm().as_str()
        );
    };
    let rsa_key = rsa::RsaPublicKey::try_from(ssh_rsa)
        .map_err(|e| anyhow!("invalid RSA public key: {e}"))?;
    let der = rsa_key
        .to_public_key_der()
        .map_err(|e| anyhow!("encoding PKIX public key: {e}"))?;
    Ok(colon_hex(&Md5::digest(der.as_bytes())))
}

/// Fingerprint `ssh-keygen -l -E md5` prints.
pub fn compute_openssh_fingerprint(text: &str) -> Result<String> {
    let key = parse_public_key(text)?;
    let blob = key
        .to_bytes()
        .map_err(|e| anyhow!("encoding public key blob: {e}"))?;
    Ok(colon_hex(&Md5::digest(&blob)))
}

fn colon_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;

    const ED25519_KEY: &str =
        "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8g me@host";

    #[test]
    fn colon_hex_is_lowercase_pairs() {
        assert_eq!(colon_hex(&[0x00, 0xab, 0x0f]), "00:ab:0f");
    }

    #[test]
    fn rejects_non_rsa_keys() {
        let err = compute_aws_fingerprint(ED25519_KEY).unwrap_err();
        assert!(err.to_string().contains("unsupported key type"), "{err}");
    }

    #[test]
    fn openssh_fingerprint_accepts_any_key_type() {
        assert!(compute_openssh_fingerprint(ED25519_KEY).is_ok());
    }

    #[test]
    fn rejects_garbage() {
        assert!(compute_aws_fingerprint("").is_err());
        assert!(compute_aws_fingerprint("ssh-rsa !!!").is_err());
        assert!(compute_aws_fingerprint("ssh-rsa AAAA").is_err());
    }
}
