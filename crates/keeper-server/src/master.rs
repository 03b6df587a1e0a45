//! Master key sourcing.
//!
//! The master key never lives in the store. It comes from one of three
//! places, picked by `[master_key].source`:
//!
//! - `env`: 64 hex characters in an environment variable
//! - `keyfile`: a file holding the hex key, plain or age-encrypted
//! - `passphrase`: an operator passphrase stretched with Argon2id and the
//!   configured salt
//!
//! Passphrases come from `KEEPER_KEYFILE_PASSPHRASE` /
//! `KEEPER_MASTER_PASSPHRASE`, or an interactive prompt when stdin is a TTY.

use std::path::Path;

use dialoguer::Password;
use keeper_core::{KeeperError, MasterKey};
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroizing;

use crate::config::{MasterKeySection, MasterKeySource};
use crate::keyfile::read_keyfile;

pub const KEYFILE_PASSPHRASE_ENV: &str = "KEEPER_KEYFILE_PASSPHRASE";
pub const MASTER_PASSPHRASE_ENV: &str = "KEEPER_MASTER_PASSPHRASE";

/// Where environment lookups and prompts come from.
pub struct KeySourceContext<'a> {
    pub env: &'a dyn Fn(&str) -> Option<String>,
    pub interactive: bool,
}

impl KeySourceContext<'_> {
    fn var(&self, name: &str) -> Option<String> {
        (self.env)(name).filter(|value| !value.trim().is_empty())
    }

    fn passphrase(&self, env_name: &str, prompt: &str) -> anyhow::Result<SecretString> {
        if let Some(value) = self.var(env_name) {
            return Ok(SecretString::from(value));
        }
        if !self.interactive {
            return Err(KeeperError::Configuration(format!(
                "No passphrase provided and no TTY available. Set {}.",
                env_name
            ))
            .into());
        }
        prompt_passphrase(prompt, false)
    }
}

/// Resolve the master key according to `section`.
pub fn load_master_key(
    section: &MasterKeySection,
    ctx: &KeySourceContext<'_>,
) -> anyhow::Result<MasterKey> {
    match section.source {
        MasterKeySource::Env => {
            let value = Zeroizing::new(ctx.var(&section.env).ok_or_else(|| {
                KeeperError::Configuration(format!(
                    "Master key environment variable {} is not set",
                    section.env
                ))
            })?);
            Ok(MasterKey::from_hex(&value)?)
        }
        MasterKeySource::Keyfile => {
            let path = section.keyfile.as_deref().ok_or_else(|| {
                KeeperError::Configuration(
                    "master_key.keyfile is required for the keyfile source".to_string(),
                )
            })?;
            let hex_key = read_keyfile(Path::new(path), || {
                ctx.passphrase(KEYFILE_PASSPHRASE_ENV, "Keyfile passphrase")
            })?;
            Ok(MasterKey::from_hex(&hex_key)?)
        }
        MasterKeySource::Passphrase => {
            let salt_hex = section.salt.as_deref().ok_or_else(|| {
                KeeperError::Configuration(
                    "master_key.salt is required for the passphrase source".to_string(),
                )
            })?;
            let salt = hex::decode(salt_hex.trim()).map_err(|_| {
                KeeperError::Configuration("master_key.salt is not valid hex".to_string())
            })?;
            let passphrase = ctx.passphrase(MASTER_PASSPHRASE_ENV, "Master passphrase")?;
            Ok(MasterKey::derive(passphrase.expose_secret(), &salt)?)
        }
    }
}

/// Prompt for a passphrase, optionally asking for confirmation.
pub fn prompt_passphrase(prompt: &str, confirm: bool) -> anyhow::Result<SecretString> {
    let mut input = Password::new().with_prompt(prompt);
    if confirm {
        input = input.with_confirmation("Confirm passphrase", "Passphrases do not match");
    }
    input
        .interact()
        .map(SecretString::from)
        .map_err(|e| anyhow::anyhow!("Failed to read passphrase: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyfile::write_keyfile;
    use std::collections::HashMap;
    use tempfile::tempdir;

    const HEX: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";
    const SALT: &str = "6b65657065722d746573742d73616c74";

    fn section(source: MasterKeySource) -> MasterKeySection {
        MasterKeySection {
            source,
            ..MasterKeySection::default()
        }
    }

    fn load(section: &MasterKeySection, vars: &[(&str, &str)]) -> anyhow::Result<MasterKey> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let lookup = move |name: &str| vars.get(name).cloned();
        let ctx = KeySourceContext {
            env: &lookup,
            interactive: false,
        };
        load_master_key(section, &ctx)
    }

    #[test]
    fn test_env_source() {
        let key = load(&section(MasterKeySource::Env), &[("KEEPER_MASTER_KEY", HEX)]).unwrap();
        assert_eq!(key.to_hex().as_str(), HEX);
    }

    #[test]
    fn test_env_source_custom_variable() {
        let mut section = section(MasterKeySource::Env);
        section.env = "MY_KEY".to_string();

        let key = load(&section, &[("MY_KEY", HEX)]).unwrap();
        assert_eq!(key.to_hex().as_str(), HEX);
    }

    #[test]
    fn test_env_source_missing_or_malformed() {
        let missing = load(&section(MasterKeySource::Env), &[]).unwrap_err();
        assert!(missing.to_string().contains("KEEPER_MASTER_KEY"));

        let short = load(&section(MasterKeySource::Env), &[("KEEPER_MASTER_KEY", "abcd")]);
        assert!(matches!(
            short.unwrap_err().downcast_ref::<KeeperError>(),
            Some(KeeperError::Configuration(_))
        ));
    }

    #[test]
    fn test_plain_keyfile_source() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("master.key");
        write_keyfile(&path, HEX, None).unwrap();

        let mut section = section(MasterKeySource::Keyfile);
        section.keyfile = Some(path.to_string_lossy().to_string());

        let key = load(&section, &[]).unwrap();
        assert_eq!(key.to_hex().as_str(), HEX);
    }

    #[test]
    fn test_encrypted_keyfile_source_needs_passphrase() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("master.key.age");
        let pass = SecretString::from("keyfile-pass-123".to_string());
        write_keyfile(&path, HEX, Some(&pass)).unwrap();

        let mut section = section(MasterKeySource::Keyfile);
        section.keyfile = Some(path.to_string_lossy().to_string());

        let without = load(&section, &[]).unwrap_err();
        assert!(without.to_string().contains(KEYFILE_PASSPHRASE_ENV));

        let key = load(&section, &[(KEYFILE_PASSPHRASE_ENV, "keyfile-pass-123")]).unwrap();
        assert_eq!(key.to_hex().as_str(), HEX);
    }

    #[test]
    fn test_keyfile_source_requires_path() {
        assert!(load(&section(MasterKeySource::Keyfile), &[]).is_err());
    }

    #[test]
    fn test_passphrase_source_is_deterministic() {
        let mut section = section(MasterKeySource::Passphrase);
        section.salt = Some(SALT.to_string());

        let a = load(&section, &[(MASTER_PASSPHRASE_ENV, "correct horse")]).unwrap();
        let b = load(&section, &[(MASTER_PASSPHRASE_ENV, "correct horse")]).unwrap();
        let c = load(&section, &[(MASTER_PASSPHRASE_ENV, "battery staple")]).unwrap();

        assert_eq!(a.to_hex().as_str(), b.to_hex().as_str());
        assert_ne!(a.to_hex().as_str(), c.to_hex().as_str());
    }

    #[test]
    fn test_passphrase_source_requires_salt() {
        let section = section(MasterKeySource::Passphrase);
        assert!(load(&section, &[(MASTER_PASSPHRASE_ENV, "pass")]).is_err());
    }
}
