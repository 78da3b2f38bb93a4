use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "hashledger-cli")]
#[command(about = "CLI client for the hashledger node")]
struct Cli {
    /// Node base URL (e.g. http://127.0.0.1:8080)
    #[arg(long, global = true, env = "HASHLEDGER_NODE", default_value = "http://127.0.0.1:8080")]
    node: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a transaction
    Submit {
        /// Sender
        #[arg(long)]
        from: String,
        /// Recipient
        #[arg(long)]
        to: String,
        /// Amount
        #[arg(long)]
        amount: f64,
        /// Metadata entries as key=value; values that parse as JSON are kept typed
        #[arg(long = "meta", value_parser = parse_meta)]
        metadata: Vec<(String, Value)>,
    },
    /// Mine pending transactions into a block
    Mine {
        /// Reward address; the node's own miner id when omitted
        #[arg(long)]
        miner: Option<String>,
    },
    /// Show an address balance
    Balance { address: String },
    /// List every transaction touching an address
    History { address: String },
    /// Show the last blocks of the chain
    Tail {
        #[arg(short, long, default_value_t = 10)]
        n: usize,
    },
    /// Ask the node to validate its chain
    Validate,
    /// Chain statistics
    Stats,
    /// Pending transactions
    Mempool,
}

#[derive(Serialize)]
struct TxRecord {
    sender: String,
    recipient: String,
    amount: f64,
    metadata: Map<String, Value>,
}

#[derive(Serialize)]
struct MineRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    miner: Option<String>,
}

fn parse_meta(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))?;
    if key.is_empty() {
        return Err("metadata key must not be empty".into());
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let node = cli.node.trim_end_matches('/').to_string();
    let client = reqwest::Client::new();

    let request = match cli.cmd {
        Command::Submit {
            from,
            to,
            amount,
            metadata,
        } => {
            let tx = TxRecord {
                sender: from,
                recipient: to,
                amount,
                metadata: metadata.into_iter().collect(),
            };
            client.post(format!("{node}/transactions")).json(&tx)
        }
        Command::Mine { miner } => client
            .post(format!("{node}/mine"))
            .json(&MineRequest { miner }),
        Command::Balance { address } => client.get(format!("{node}/balance/{address}")),
        Command::History { address } => client.get(format!("{node}/history/{address}")),
        Command::Tail { n } => client.get(format!("{node}/chain/tail")).query(&[("n", n)]),
        Command::Validate => client.get(format!("{node}/chain/valid")),
        Command::Stats => client.get(format!("{node}/stats")),
        Command::Mempool => client.get(format!("{node}/mempool")),
    };

    debug!(?request, "sending request");
    let res = request
        .send()
        .await
        .with_context(|| format!("request to {node} failed"))?;
    let status = res.status();
    let body = res.text().await?;
    println!("status: {status}");
    match serde_json::from_str::<Value>(&body) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{body}"),
    }
    if !status.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
