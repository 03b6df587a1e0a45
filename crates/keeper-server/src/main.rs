//! keeperd - envelope-encryption engine and key rotation for a secrets store
//!
//! Bootstraps the key ledger from the SQLite store, keeps the active key
//! version fresh, and offers local administration of stored secrets.

mod app;
mod cli;
mod config;
mod keyfile;
mod logging;
mod master;

use std::io::{self, IsTerminal, Read, Write};
use std::path::Path;
use std::thread;

use chrono::SecondsFormat;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use keeper_core::storage::{NewSecret, SecretKind};
use keeper_core::{MasterKey, RotationStatus};
use secrecy::SecretString;
use zeroize::Zeroizing;

use crate::app::App;
use crate::cli::{Cli, Commands};
use crate::master::{prompt_passphrase, KEYFILE_PASSPHRASE_ENV};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        generate(*shell, &mut cmd, "keeperd", &mut io::stdout());
        return Ok(());
    }

    let app = App::from_cli(&cli)?;
    logging::init(&app.config.log.level, cli.quiet);

    match cli.command {
        Commands::Keygen { out, encrypt } => keygen(out.as_deref(), encrypt, cli.quiet)?,
        Commands::Rotate { force } => {
            let (controller, _store) = app.bootstrap()?;
            let rotated = if force {
                Some(controller.force_rotate()?)
            } else {
                None
            };
            if !cli.quiet {
                match rotated {
                    Some(version) => println!(
                        "Rotated: new key version active since {}",
                        version.activated_at().to_rfc3339_opts(SecondsFormat::Secs, true)
                    ),
                    None => println!("{}", describe_status(controller.status()?)),
                }
            }
        }
        Commands::Status => {
            let ledger = app.load_ledger()?;
            let versions = ledger.versions()?;
            let status = ledger.rotation_status(app.policy().interval)?;

            if !versions.is_empty() {
                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(vec!["#", "Activated", "Active"]);
                for info in &versions {
                    table.add_row(vec![
                        info.index.to_string(),
                        info.activated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
                        if info.active { "*".to_string() } else { String::new() },
                    ]);
                }
                println!("{}", table);
            }
            println!("{}", describe_status(status));
        }
        Commands::Watch { max_checks } => {
            let (controller, _store) = app.bootstrap()?;
            let every = std::time::Duration::from_secs(app.config.rotation.check_interval_seconds);
            tracing::info!(
                check_interval_seconds = every.as_secs(),
                "Watching key rotation"
            );

            let mut checks = 0u64;
            while max_checks.map_or(true, |max| checks < max) {
                thread::sleep(every);
                checks += 1;
                match controller.rotate_if_due() {
                    Ok(Some(version)) => {
                        tracing::info!(activation = %version.activated_at(), "Rotation complete")
                    }
                    Ok(None) => tracing::debug!("Active key version is current"),
                    // Retried on the next tick
                    Err(e) => tracing::error!(error = %e, "Rotation check failed"),
                }
            }
        }
        Commands::Put {
            owner,
            name,
            kind,
            value,
            file,
        } => {
            let kind: SecretKind = kind.parse()?;
            let data = read_secret_value(value, file.as_deref())?;
            let service = app.secret_service()?;
            service.write(NewSecret::new(owner, name.clone(), kind, data.to_vec()))?;
            if !cli.quiet {
                eprintln!("Stored secret '{}'", name);
            }
        }
        Commands::Get { owner, name } => {
            let service = app.secret_service()?;
            let secret = service.read(owner, &name)?;
            let mut stdout = io::stdout();
            stdout.write_all(&secret.data)?;
            if stdout.is_terminal() && !secret.data.ends_with(b"\n") {
                stdout.write_all(b"\n")?;
            }
            stdout.flush()?;
        }
        Commands::List { owner } => {
            let service = app.secret_service()?;
            for name in service.list(owner)? {
                println!("{}", name);
            }
        }
        Commands::Delete { owner, name } => {
            let service = app.secret_service()?;
            service.delete(owner, &name)?;
            if !cli.quiet {
                eprintln!("Deleted secret '{}'", name);
            }
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}

fn keygen(out: Option<&str>, encrypt: bool, quiet: bool) -> anyhow::Result<()> {
    let master = MasterKey::generate()?;
    let hex_key = master.to_hex();

    let Some(out) = out else {
        println!("{}", hex_key.as_str());
        return Ok(());
    };

    let passphrase = if encrypt {
        Some(keyfile_passphrase()?)
    } else {
        None
    };
    keyfile::write_keyfile(Path::new(out), &hex_key, passphrase.as_ref())?;

    if !quiet {
        eprintln!(
            "Wrote {}master key to {}",
            if encrypt { "encrypted " } else { "" },
            out
        );
    }
    Ok(())
}

fn keyfile_passphrase() -> anyhow::Result<SecretString> {
    if let Ok(value) = std::env::var(KEYFILE_PASSPHRASE_ENV) {
        if !value.trim().is_empty() {
            return Ok(SecretString::from(value));
        }
    }
    if !io::stdin().is_terminal() {
        return Err(anyhow::anyhow!(
            "No passphrase provided and no TTY available. Set {}.",
            KEYFILE_PASSPHRASE_ENV
        ));
    }
    prompt_passphrase("Keyfile passphrase", true)
}

fn read_secret_value(
    value: Option<String>,
    file: Option<&str>,
) -> anyhow::Result<Zeroizing<Vec<u8>>> {
    if let Some(value) = value {
        return Ok(Zeroizing::new(value.into_bytes()));
    }
    if let Some(path) = file {
        let bytes = std::fs::read(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path, e))?;
        return Ok(Zeroizing::new(bytes));
    }
    if io::stdin().is_terminal() {
        return Err(anyhow::anyhow!(
            "No value provided. Use --value, --file, or pipe the value on stdin."
        ));
    }
    let mut buffer = Zeroizing::new(Vec::new());
    io::stdin().read_to_end(&mut buffer)?;
    Ok(buffer)
}

fn describe_status(status: RotationStatus) -> String {
    match status {
        RotationStatus::Missing => "No key version yet; run `keeperd rotate`".to_string(),
        RotationStatus::Current { expires_at } => format!(
            "Active key version is current (rotation due {})",
            expires_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        ),
        RotationStatus::Stale { since } => format!(
            "Active key version is stale since {}",
            since.to_rfc3339_opts(SecondsFormat::Secs, true)
        ),
    }
}
