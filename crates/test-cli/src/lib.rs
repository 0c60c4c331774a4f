// Copyright (C) 2023 Entropy Cryptography Inc.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Simple CLI to test computing pre-signing hashes, signing and broadcasting
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{anyhow, ensure};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use colored::Colorize;
use futures::StreamExt;
use keysign_client::{
    logger::Instrumentation, pre_signed_image_hashes, start_keysign, BroadcastDispatcher,
    BroadcastError, ChainApi, Configuration, HttpChainApi, KeysignEvent, KeysignOptions,
    KeysignParams, PeerDiscovery,
};
use keysign_protocol::RelayClient;
use keysign_shared::{Chain, KeysignPayload, SigningSession, Vault};
use keysign_testing_utils::{constants::TEST_PARTIES, test_vault, LocalEngineFactory};
use tokio::sync::watch;

#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about = "CLI tool for testing threshold keysign",
    long_about = "This is a CLI test client.\nSigning needs a relay and enough other devices running this tool with the same vault."
)]
struct Cli {
    #[clap(subcommand)]
    command: CliCommand,
    /// The relay to use, in the form `scheme://hostname:port/path`.
    ///
    /// If a value exists for `KEYSIGN_RELAY`, that takes priority over the configuration file.
    #[arg(short, long)]
    relay_url: Option<String>,
    /// A JSON configuration file. Missing fields take their defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[clap(flatten)]
    instrumentation: Instrumentation,
}

#[derive(Subcommand, Debug, Clone)]
enum CliCommand {
    /// Print the messages a payload needs signed, in signing order
    PreSignHashes {
        /// Path to the keysign payload, as JSON
        payload: PathBuf,
        /// Path to the vault, as JSON. Defaults to the test vault
        #[arg(long)]
        vault: Option<PathBuf>,
    },
    /// Take part in a keysign session for a payload, using the local test engine
    Sign {
        /// Path to the keysign payload, as JSON
        payload: PathBuf,
        /// Path to the vault, as JSON. Defaults to the test vault
        #[arg(long)]
        vault: Option<PathBuf>,
        /// Party to sign as with the test vault. Ignored when a vault file is given
        #[arg(long)]
        party: Option<String>,
        /// The session to join. A new one is created if this device initiates
        #[arg(long, env = "KEYSIGN_SESSION_ID")]
        session_id: Option<String>,
        /// Hex encoded 32 byte key shared by every device in the session
        #[arg(long, env = "KEYSIGN_ENCRYPTION_KEY")]
        encryption_key: String,
        /// Start the session once enough parties have joined
        #[arg(long)]
        initiate: bool,
        /// Submit the signed transactions instead of printing them
        #[arg(long)]
        broadcast: bool,
    },
    /// Submit a signed transaction to its chain
    Broadcast {
        /// The chain, eg: `bitcoin`, `ethereum`, `thorChain`
        chain: Chain,
        /// The raw transaction as a builder encodes it
        raw_transaction: String,
    },
}

/// Prints transactions rather than submitting them
struct DryRun;

#[async_trait]
impl ChainApi for DryRun {
    async fn broadcast_transaction(
        &self,
        chain: Chain,
        raw_transaction: &str,
    ) -> Result<String, BroadcastError> {
        println!("Signed {} transaction: {}", chain.to_string().green(), raw_transaction);
        Ok("not broadcast".to_string())
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let contents = fs::read_to_string(path)
        .map_err(|err| anyhow!("Could not read {}: {err}", path.display()))?;
    Ok(serde_json::from_str(&contents)?)
}

fn load_vault(path: Option<&Path>, party: Option<String>) -> anyhow::Result<Vault> {
    match path {
        Some(path) => read_json(path),
        None => Ok(test_vault(&party.unwrap_or_else(|| TEST_PARTIES[0].clone()))),
    }
}

pub async fn run_command() -> anyhow::Result<String> {
    let cli = Cli::parse();
    cli.instrumentation.setup();

    let config = match &cli.config {
        Some(path) => Configuration::from_file(path)?,
        None => Configuration::default(),
    };
    let relay_url = cli.relay_url.unwrap_or_else(|| {
        std::env::var("KEYSIGN_RELAY").unwrap_or_else(|_| config.relay_url.clone())
    });

    match cli.command {
        CliCommand::PreSignHashes { payload, vault } => {
            let payload: KeysignPayload = read_json(&payload)?;
            let vault = load_vault(vault.as_deref(), None)?;
            let hashes = pre_signed_image_hashes(&vault, &payload)?;
            Ok(hashes.join("\n"))
        },
        CliCommand::Sign {
            payload,
            vault,
            party,
            session_id,
            encryption_key,
            initiate,
            broadcast,
        } => {
            let payload: KeysignPayload = read_json(&payload)?;
            let vault = load_vault(vault.as_deref(), party)?;
            ensure!(
                initiate || session_id.is_some(),
                "Joining devices need the session id of the initiating device"
            );
            let session_id = session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            println!("Session {} as {}", session_id.green(), vault.local_party_id.purple());

            let discovery = PeerDiscovery::new(RelayClient::new(&relay_url)?, &session_id, &vault);
            let committee = if initiate {
                // Nothing closes discovery early, so the sender only has to outlive it
                let (_shutdown_tx, shutdown_rx) = watch::channel(false);
                discovery
                    .start_when_ready(shutdown_rx, |admitted| {
                        println!("Parties ready: {}", admitted.join(", ").yellow())
                    })
                    .await?
            } else {
                discovery.wait_for_start().await?
            };

            let session = SigningSession {
                session_id,
                encryption_key_hex: encryption_key,
                server_address: relay_url,
                committee,
            };
            let api: Arc<dyn ChainApi> =
                if broadcast { Arc::new(HttpChainApi::new(&config)?) } else { Arc::new(DryRun) };
            let mut handle = start_keysign(
                KeysignParams::for_payload(&vault, &session, &payload)?,
                Arc::new(LocalEngineFactory::default()),
                Arc::new(BroadcastDispatcher::new(api)),
                KeysignOptions::from(&config),
            );
            while let Some(event) = handle.next().await {
                match event {
                    KeysignEvent::CreatingInstance => println!("Creating signing instance"),
                    KeysignEvent::SigningRound { index, total } => {
                        println!("Signing message {} of {total}", index + 1)
                    },
                    KeysignEvent::Finished(_) => {},
                    KeysignEvent::Error(message) => println!("{}", message.red()),
                }
            }
            let tx_ids = handle.join().await?;
            Ok(format!("Transactions: {}", tx_ids.join(", ")))
        },
        CliCommand::Broadcast { chain, raw_transaction } => {
            let api = HttpChainApi::new(&config)?;
            let tx_id = api.broadcast_transaction(chain, &raw_transaction).await?;
            Ok(format!("Transaction id: {tx_id}"))
        },
    }
}
