//! secretbatch-demo - smoke-tests the provider registry and batching core
//! end to end. Not part of the tested contract.

use std::process;

use clap::{Parser, Subcommand};
use secretbatch::config::Config;
use secretbatch::identity::{SecretHandle, SerializedSecret};
use secretbatch::provider;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "secretbatch-demo")]
#[command(version)]
#[command(about = "Batch-encrypt or batch-decrypt a handful of values against a provider backend")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt a list of plaintext values through the passphrase backend.
    Encrypt {
        /// Values to encrypt.
        values: Vec<String>,
    },
    /// Decrypt a list of base64 ciphertexts through the passphrase backend.
    Decrypt {
        /// Values to decrypt.
        values: Vec<String>,
    },
}

fn main() {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

    if let Err(err) = run(Cli::parse()) {
        eprintln!("Error: {err:?}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::from_env();

    match cli.command {
        Commands::Encrypt { values } => encrypt(&values, &config),
        Commands::Decrypt { values } => decrypt(&values, &config),
    }
}

fn encrypt(values: &[String], config: &Config) -> anyhow::Result<()> {
    let manager = provider::of_type("passphrase", serde_json::json!({}), config)?;
    let ctx = secretbatch::CancelToken::new();
    let batcher = manager.begin_batch_encryption();

    let targets: Vec<SerializedSecret> = values.iter().map(|_| SerializedSecret::new()).collect();
    for (value, target) in values.iter().zip(targets.iter()) {
        let secret = SecretHandle::with_element(serde_json::Value::String(value.clone()));
        batcher.enqueue(&ctx, &secret, value.clone(), target)?;
    }
    batcher.complete(&ctx)?;

    for ciphertext in targets.iter().filter_map(SerializedSecret::ciphertext) {
        println!("{ciphertext}");
    }
    info!(count = values.len(), "encrypted batch");
    Ok(())
}

fn decrypt(values: &[String], config: &Config) -> anyhow::Result<()> {
    let manager = provider::of_type("passphrase", serde_json::json!({}), config)?;
    let ctx = secretbatch::CancelToken::new();
    let batcher = manager.begin_batch_decryption(Box::new(|plaintext: &str| Ok(serde_json::Value::String(plaintext.to_string()))));

    let targets: Vec<SecretHandle> = values.iter().map(|_| SecretHandle::new()).collect();
    for (value, target) in values.iter().zip(targets.iter()) {
        batcher.enqueue(&ctx, target, value.clone())?;
    }
    batcher.complete(&ctx)?;

    for element in targets.iter().filter_map(SecretHandle::element) {
        println!("{element}");
    }
    info!(count = values.len(), "decrypted batch");
    Ok(())
}
