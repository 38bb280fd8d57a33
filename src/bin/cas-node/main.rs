//! cas-node CLI entry point.

mod cli;

use cas_node::crypto::{ConvergentCodec, Signer};
use cas_node::protocol::{AuditRequest, DownloadRequest, LostFileBody, Role, UploadRequest};
use cas_node::{compute_hash, Node, NodeBuilder, RequestError};
use clap::Parser;
use cli::{Cli, NodeCommand};
use color_eyre::eyre::{eyre, WrapErr};
use futures::TryStreamExt;
use std::io::Read;
use std::path::PathBuf;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let config = cli.node_config()?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    info!("cas-node v{}", env!("CARGO_PKG_VERSION"));

    let node = NodeBuilder::new(config).build().await?;

    match cli.command {
        NodeCommand::Status => print_json(&node.status().await?)?,
        NodeCommand::List => {
            for hash in node.list_files().await? {
                println!("{hash}");
            }
        }
        NodeCommand::SetLimits { incoming, outgoing } => {
            node.set_limits(incoming, outgoing).await?;
            print_json(&node.status().await?.bandwidth)?;
        }
        NodeCommand::SetCapacity { bytes } => {
            node.set_capacity(bytes).await?;
            print_json(&node.status().await?.storage)?;
        }
        NodeCommand::ResetBandwidth => node.reset_bandwidth().await?,
        NodeCommand::Upload {
            file,
            role,
            encrypt,
            secret_key,
        } => upload(&node, file, &role, encrypt, &secret_key).await?,
        NodeCommand::Download {
            hash,
            out,
            key,
            secret_key,
        } => download(&node, hash, out, key, secret_key.as_deref()).await?,
        NodeCommand::Audit {
            hash,
            seed,
            secret_key,
        } => {
            let signer = Signer::from_secret_hex(&secret_key)?;
            let seed = seed.unwrap_or_else(|| hex::encode(rand::random::<[u8; 32]>()));
            let request = AuditRequest {
                signature: Some(signer.sign(&hash)),
                sender_address: Some(signer.address()),
                data_hash: hash,
                challenge_seed: seed,
            };
            let proof = node.audit(&request).await.map_err(report)?;
            print_json(&proof)?;
        }
        NodeCommand::Lost => {
            for file in node.find_lost_files().await? {
                println!("{} {} {}", file.hash, file.role, file.size);
            }
        }
        NodeCommand::Remove { hash } => {
            if !node.remove_file(&hash).await? {
                return Err(eyre!("No file stored under {hash}"));
            }
        }
    }

    Ok(())
}

async fn upload(
    node: &Node,
    file: Option<PathBuf>,
    role: &str,
    encrypt: bool,
    secret_key: &str,
) -> color_eyre::Result<()> {
    let signer = Signer::from_secret_hex(secret_key)?;
    let role: Role = role.parse()?;
    let mut data = read_input(file)?;

    if encrypt {
        let (key, blob) = ConvergentCodec::encrypt(&data)?;
        eprintln!("decryption key: {}", hex::encode(key));
        data = blob;
    }

    let hash = compute_hash(&data);
    let request = UploadRequest {
        data_hash: hash.clone(),
        file_role: role,
        sender_address: Some(signer.address()),
        signature: Some(signer.sign(&hash)),
    };
    let receipt = node.upload(&request, &data[..]).await.map_err(report)?;
    if !receipt.stored {
        eprintln!("already stored with role {}", receipt.file_role);
    }
    print_json(&receipt)
}

async fn download(
    node: &Node,
    hash: String,
    out: Option<PathBuf>,
    key: Option<String>,
    secret_key: Option<&str>,
) -> color_eyre::Result<()> {
    let mut request = DownloadRequest::anonymous(hash);
    request.decryption_key = key;
    if let Some(secret_key) = secret_key {
        let signer = Signer::from_secret_hex(secret_key)?;
        request.signature = Some(signer.sign(&request.data_hash));
        request.sender_address = Some(signer.address());
    }

    let mut download = node.download(&request).await.map_err(report)?;

    let mut writer: Box<dyn AsyncWrite + Unpin + Send> = match out {
        Some(path) => Box::new(
            tokio::fs::File::create(&path)
                .await
                .wrap_err_with(|| format!("Failed to create {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdout()),
    };
    while let Some(chunk) = download.stream.try_next().await? {
        writer.write_all(&chunk).await?;
    }
    writer.flush().await?;
    Ok(())
}

fn report(err: RequestError) -> color_eyre::Report {
    match err {
        RequestError::LostFile { peers } => {
            let body = serde_json::to_string(&LostFileBody { peers }).unwrap_or_default();
            eyre!("File is lost on this node (HTTP 404); try peers: {body}")
        }
        other => eyre!("{other} (HTTP {})", other.http_status()),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> color_eyre::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_input(file: Option<PathBuf>) -> color_eyre::Result<Vec<u8>> {
    if let Some(path) = file {
        return Ok(std::fs::read(path)?);
    }

    let mut buf = Vec::new();
    std::io::stdin().read_to_end(&mut buf)?;
    Ok(buf)
}
