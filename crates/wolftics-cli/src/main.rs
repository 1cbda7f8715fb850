//! wolftics - 標準入力の NDJSON コマンドを配送エージェントに流すデモ CLI
//!
//! 1 行 1 コマンド:
//! ```text
//! {"type":"track","event":"add_to_cart","payload":{"productId":"sku-1","quantity":2}}
//! {"type":"page","route":"/cart"}
//! {"type":"identify","userId":"u-42","email":"a@example.com"}
//! {"type":"flush"}
//! {"type":"online"}
//! {"type":"status"}
//! {"type":"exit","reason":"hidden"}
//! ```
//! EOF または Ctrl-C でページ離脱として扱い、残りを送ってから終了します。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use wolftics_core::app::{AgentHandle, IdentifyTraits};
use wolftics_core::impls::FileStorage;
use wolftics_core::{AgentBuilder, AgentConfig};

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON config file (camelCase AgentConfig)
    #[arg(short, long, env = "WOLFTICS_CONFIG")]
    config: Option<PathBuf>,

    /// Property key; overrides the config file
    #[arg(short, long, env = "WOLFTICS_KEY")]
    key: Option<String>,

    #[arg(long, env = "WOLFTICS_ENDPOINT")]
    endpoint: Option<String>,

    /// Page URL used for context and the same-origin check
    #[arg(long)]
    page_url: Option<String>,

    #[arg(long)]
    batch_size: Option<usize>,

    /// Persist the queue and identity under this directory
    #[arg(long, env = "WOLFTICS_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Line {
    Track {
        event: String,
        #[serde(default)]
        payload: Value,
    },
    Page {
        route: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Identify {
        user_id: String,
        #[serde(flatten)]
        traits: IdentifyTraits,
    },
    Flush,
    Online,
    Status,
    Exit {
        reason: Option<String>,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

fn load_config(cli: &Cli) -> Result<AgentConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            AgentConfig::from_json(&raw)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => AgentConfig::default(),
    };
    if let Some(key) = &cli.key {
        config.property_key = key.clone();
    }
    if let Some(endpoint) = &cli.endpoint {
        config.endpoint = endpoint.clone();
    }
    if let Some(page_url) = &cli.page_url {
        config.page_url = Some(page_url.clone());
    }
    if let Some(batch_size) = cli.batch_size {
        config.batch_size = batch_size;
    }
    Ok(config)
}

/// 1 行を解釈してハンドルに渡す。`false` ならページ離脱済み
async fn dispatch(handle: &AgentHandle, line: Line) -> Result<bool> {
    match line {
        Line::Track { event, payload } => {
            handle.track_named(&event, payload);
        }
        Line::Page { route } => {
            handle.page(route.as_deref());
        }
        Line::Identify { user_id, traits } => {
            handle.identify(&user_id, traits);
        }
        Line::Flush => handle.flush(),
        Line::Online => handle.network_online(),
        Line::Status => {
            if let Some(status) = handle.status().await {
                println!("{}", serde_json::to_string(&status)?);
            }
        }
        Line::Exit { reason } => {
            handle.page_exit(reason.as_deref());
            return Ok(false);
        }
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    // (A) 設定を読み、storage を選ぶ
    let config = load_config(&cli)?;
    let mut builder = AgentBuilder::new(config);
    if let Some(dir) = &cli.storage_dir {
        let storage = FileStorage::open(dir)
            .with_context(|| format!("opening storage dir {}", dir.display()))?;
        builder = builder.storage(Arc::new(storage));
    }

    // (B) エージェントを起動
    let running = builder.build().context("building delivery agent")?.spawn();
    let handle = running.handle();
    handle.page(None);

    // (C) 標準入力を読み続ける（EOF / exit / Ctrl-C まで）
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut exited = false;
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("reading stdin")? else {
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<Line>(line) {
                    Ok(parsed) => {
                        if !dispatch(&handle, parsed).await? {
                            exited = true;
                            break;
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "skipping malformed line"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
        }
    }

    // (D) ページ離脱として残りを送り、エージェントを止める
    if !exited {
        handle.page_exit(Some("unload"));
    }
    running.shutdown_and_join().await;
    Ok(())
}
