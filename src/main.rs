use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use envelope_vault::cli::{
    handle_config_command, handle_decrypt_command, handle_encrypt_command, handle_hash_command,
    handle_lock_command, handle_numeric_command, handle_status_command, handle_unlock_command,
    CliContext, DecryptArgs, EncryptArgs, HashArgs, NumericCommands, UnlockArgs,
};
use envelope_vault::config::{paths::VaultPaths, settings::Settings};

#[derive(Parser)]
#[command(
    name = "envelope-vault",
    version,
    about = "Client-side field encryption for budget records",
    long_about = "envelope-vault encrypts budget documents field by field, keeping their \
                  shape, and re-encrypts local record stores when a password is first set."
)]
struct Cli {
    /// Base directory for settings, record stores and caches
    #[arg(long, global = true, env = "ENVELOPE_VAULT_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the secret hash of a password
    Hash(HashArgs),

    /// Encrypt a JSON document
    #[command(alias = "enc")]
    Encrypt(EncryptArgs),

    /// Decrypt a JSON document
    #[command(alias = "dec")]
    Decrypt(DecryptArgs),

    /// Numeric cipher commands
    #[command(subcommand)]
    Numeric(NumericCommands),

    /// Unlock with a password, migrating the stores on first use
    Unlock(UnlockArgs),

    /// Show session and migration state
    Status,

    /// Forget the session secret
    Lock,

    /// Show current configuration and paths
    Config,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("ENVELOPE_VAULT_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let paths = match cli.data_dir {
        Some(dir) => VaultPaths::with_base_dir(dir),
        None => VaultPaths::new()?,
    };
    let settings = Settings::load_or_create(&paths)?;
    let ctx = CliContext { paths, settings };

    match cli.command {
        Commands::Hash(args) => handle_hash_command(args)?,
        Commands::Encrypt(args) => handle_encrypt_command(&ctx, args)?,
        Commands::Decrypt(args) => handle_decrypt_command(&ctx, args)?,
        Commands::Numeric(cmd) => handle_numeric_command(&ctx, cmd)?,
        Commands::Unlock(args) => handle_unlock_command(&ctx, args).await?,
        Commands::Status => handle_status_command(&ctx).await?,
        Commands::Lock => handle_lock_command(&ctx)?,
        Commands::Config => handle_config_command(&ctx)?,
    }

    Ok(())
}
