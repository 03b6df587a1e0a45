//! Master keyfiles on disk.
//!
//! A keyfile holds the 64-character hex master key, either as plain text or
//! wrapped in an age passphrase envelope. The format is detected from the
//! file header, so the config never needs to say which one it is.

use std::io::{Read, Write};
use std::iter;
use std::path::Path;

use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroizing;

/// First line of every age-encrypted file.
const AGE_HEADER: &[u8] = b"age-encryption.org/v1";

pub fn is_age_encrypted(contents: &[u8]) -> bool {
    contents.starts_with(AGE_HEADER)
}

/// Encrypt `data` with an age passphrase (scrypt recipient).
pub fn encrypt(data: &[u8], passphrase: &SecretString) -> anyhow::Result<Vec<u8>> {
    let encryptor = age::Encryptor::with_user_passphrase(age::secrecy::SecretString::from(
        passphrase.expose_secret().to_string(),
    ));

    let mut encrypted = Vec::new();
    let mut writer = encryptor
        .wrap_output(&mut encrypted)
        .map_err(|e| anyhow::anyhow!("Failed to create encryptor: {}", e))?;
    writer
        .write_all(data)
        .map_err(|e| anyhow::anyhow!("Keyfile encryption failed: {}", e))?;
    writer
        .finish()
        .map_err(|e| anyhow::anyhow!("Keyfile encryption failed: {}", e))?;

    Ok(encrypted)
}

/// Decrypt an age passphrase envelope.
pub fn decrypt(encrypted: &[u8], passphrase: &SecretString) -> anyhow::Result<Zeroizing<Vec<u8>>> {
    let decryptor = age::Decryptor::new(encrypted)
        .map_err(|e| anyhow::anyhow!("Keyfile is not a valid age file: {}", e))?;

    let identity = age::scrypt::Identity::new(age::secrecy::SecretString::from(
        passphrase.expose_secret().to_string(),
    ));
    let mut reader = decryptor
        .decrypt(iter::once(&identity as &dyn age::Identity))
        .map_err(|e| match e {
            age::DecryptError::NoMatchingKeys
            | age::DecryptError::DecryptionFailed
            | age::DecryptError::KeyDecryptionFailed => {
                anyhow::anyhow!("Incorrect keyfile passphrase")
            }
            other => anyhow::anyhow!("Keyfile decryption failed: {}", other),
        })?;

    let mut decrypted = Zeroizing::new(Vec::new());
    reader
        .read_to_end(&mut decrypted)
        .map_err(|e| anyhow::anyhow!("Failed to read decrypted keyfile: {}", e))?;
    Ok(decrypted)
}

/// Write a hex master key to `path` (0600), age-encrypting it when a
/// passphrase is given.
pub fn write_keyfile(
    path: &Path,
    hex_key: &str,
    passphrase: Option<&SecretString>,
) -> anyhow::Result<()> {
    let plain = Zeroizing::new(format!("{}\n", hex_key).into_bytes());
    let contents = match passphrase {
        Some(passphrase) => encrypt(&plain, passphrase)?,
        None => plain.to_vec(),
    };
    let contents = Zeroizing::new(contents);

    keeper_core::fs::write_private(path, &contents, false)
        .map_err(|e| anyhow::anyhow!("Failed to write keyfile {}: {}", path.display(), e))
}

/// Read the hex master key out of a keyfile.
///
/// `passphrase` is only called if the file turns out to be age-encrypted.
pub fn read_keyfile<F>(path: &Path, passphrase: F) -> anyhow::Result<Zeroizing<String>>
where
    F: FnOnce() -> anyhow::Result<SecretString>,
{
    let contents = Zeroizing::new(
        std::fs::read(path)
            .map_err(|e| anyhow::anyhow!("Failed to read keyfile {}: {}", path.display(), e))?,
    );

    let plain = if is_age_encrypted(&contents) {
        decrypt(&contents, &passphrase()?)?
    } else {
        contents
    };

    let text = std::str::from_utf8(&plain)
        .map_err(|_| anyhow::anyhow!("Keyfile {} is not valid UTF-8", path.display()))?;
    Ok(Zeroizing::new(text.trim().to_string()))
}
