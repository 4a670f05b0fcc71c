// src/main.rs

mod cli;
mod commands;

use anyhow::Result;
use art::config::{HOME_DIR_NAME, HOME_ENV};
use clap::Parser;
use cli::{Cli, Commands, KeyCommands};
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let home = resolve_home(cli.home)?;

    match cli.command {
        Some(Commands::Build {
            source,
            name,
            token,
            path,
            profile,
            no_copy,
            interactive,
            passphrase,
        }) => commands::cmd_build(
            &home,
            &source,
            &name,
            token,
            path,
            profile,
            no_copy,
            interactive,
            passphrase,
        ),
        Some(Commands::Run {
            function,
            path,
            interactive,
        }) => commands::cmd_run(&function, &path, interactive),
        Some(Commands::Ls) => commands::cmd_list(&home),
        Some(Commands::Tag { source, target }) => commands::cmd_tag(&home, &source, &target),
        Some(Commands::Rm { names }) => commands::cmd_remove(&home, &names),
        Some(Commands::Open { name, dest, pem }) => {
            commands::cmd_open(&home, &name, &dest, pem.as_deref())
        }
        Some(Commands::Verify { name, pem }) => commands::cmd_verify(&home, &name, pem.as_deref()),
        Some(Commands::Key(key_cmd)) => match key_cmd {
            KeyCommands::Gen {
                group,
                name,
                bits,
                passphrase,
            } => commands::cmd_key_gen(
                &home,
                group.as_deref(),
                name.as_deref(),
                bits,
                passphrase.as_deref(),
            ),
            KeyCommands::Import {
                file,
                group,
                name,
                private,
            } => commands::cmd_key_import(&home, &file, group.as_deref(), name.as_deref(), private),
            KeyCommands::Export { dest, group, name } => {
                commands::cmd_key_export(&home, &dest, group.as_deref(), name.as_deref())
            }
            KeyCommands::LegacyGen { dir, bits } => commands::cmd_legacy_key_gen(&home, &dir, bits),
        },
        Some(Commands::Encrypt {
            text,
            group,
            name,
            aes_key,
            mode,
        }) => match aes_key {
            Some(key) => commands::cmd_aes_encrypt(&text, &key, &mode),
            None => commands::cmd_encrypt(&home, &text, group.as_deref(), name.as_deref()),
        },
        Some(Commands::Decrypt {
            group,
            name,
            passphrase,
            aes_key,
            mode,
        }) => match aes_key {
            Some(key) => commands::cmd_aes_decrypt(&key, &mode),
            None => commands::cmd_decrypt(
                &home,
                group.as_deref(),
                name.as_deref(),
                passphrase.as_deref(),
            ),
        },
        Some(Commands::AesKey) => commands::cmd_aes_key(),
        None => {
            println!("art v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'art --help' for usage information");
            Ok(())
        }
    }
}

/// `--home`, then `$ART_HOME`, then `~/.art`
fn resolve_home(flag: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(home) = flag {
        return Ok(home);
    }
    if let Some(home) = std::env::var_os(HOME_ENV).filter(|h| !h.is_empty()) {
        return Ok(PathBuf::from(home));
    }
    dirs::home_dir()
        .map(|dir| dir.join(HOME_DIR_NAME))
        .ok_or_else(|| anyhow::anyhow!("Cannot determine the home directory; set {}", HOME_ENV))
}

/// Exit code of the first library error in the chain
fn exit_code(error: &anyhow::Error) -> u8 {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<art::Error>())
        .map(|e| e.kind().exit_code() as u8)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_exit_code_from_library_error() {
        let err: anyhow::Error = Err::<(), _>(art::Error::Staging("clone failed".into()))
            .context("Failed to build")
            .unwrap_err();
        assert_eq!(exit_code(&err), 2);

        let err = anyhow::anyhow!("plain failure");
        assert_eq!(exit_code(&err), 1);
    }

    #[test]
    fn test_resolve_home_flag_wins() {
        let home = resolve_home(Some(PathBuf::from("/srv/art"))).unwrap();
        assert_eq!(home, PathBuf::from("/srv/art"));
    }
}
