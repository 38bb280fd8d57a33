//! Ed25519 key management utility for cas-node clients.
//!
//! This utility provides:
//! - Keypair generation (the address is the hex verifying key)
//! - Signing a content hash, as sent with upload/download/audit requests
//! - Signature verification
//!
//! Usage:
//!   cas-keygen generate [output-dir]
//!   cas-keygen sign --key <secret-file> <message>
//!   cas-keygen verify --address <address> --signature <sig> <message>

// This is a standalone CLI tool that exits on any error, so expect/unwrap is acceptable
#![allow(clippy::unwrap_used, clippy::expect_used)]

use cas_node::crypto::{Ed25519Verifier, SignatureVerifier, Signer};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

const SECRET_FILE: &str = "cas-key.secret";
const ADDRESS_FILE: &str = "cas-key.address";

#[derive(Parser)]
#[command(name = "cas-keygen")]
#[command(about = "Ed25519 key management for cas-node clients")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new Ed25519 keypair
    Generate {
        /// Output directory for keys
        #[arg(default_value = ".")]
        output_dir: PathBuf,
    },
    /// Sign a message (usually a content hash)
    Sign {
        /// Path to the secret key file
        #[arg(short, long)]
        key: PathBuf,
        /// Message to sign
        message: String,
    },
    /// Verify a signature
    Verify {
        /// Hex-encoded address (verifying key)
        #[arg(short, long)]
        address: String,
        /// Hex-encoded signature
        #[arg(short, long)]
        signature: String,
        /// Message that was signed
        message: String,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Generate { output_dir } => generate_keypair(&output_dir),
        Commands::Sign { key, message } => sign_message(&key, &message),
        Commands::Verify {
            address,
            signature,
            message,
        } => verify_signature(&address, &signature, &message),
    }
}

fn generate_keypair(output_dir: &Path) {
    fs::create_dir_all(output_dir).expect("Failed to create output directory");

    let signer = Signer::generate();

    let sk_path = output_dir.join(SECRET_FILE);
    fs::write(&sk_path, signer.secret_hex()).expect("Failed to write secret key");
    eprintln!("Secret key saved to: {}", sk_path.display());
    eprintln!("  WARNING: Keep this file secure! It proves ownership of your files.");

    let address_path = output_dir.join(ADDRESS_FILE);
    fs::write(&address_path, signer.address()).expect("Failed to write address");
    eprintln!("Address saved to: {}", address_path.display());

    println!("{}", signer.address());
}

fn sign_message(key_path: &Path, message: &str) {
    let secret = fs::read_to_string(key_path).expect("Failed to read secret key");
    let signer = Signer::from_secret_hex(&secret).expect("Failed to parse secret key");
    println!("{}", signer.sign(message));
}

fn verify_signature(address: &str, signature: &str, message: &str) {
    if Ed25519Verifier.verify(address, signature, message) {
        println!("Signature is VALID");
    } else {
        eprintln!("Signature is INVALID");
        process::exit(1);
    }
}
