//! `nw`: command-line publisher/subscriber for NATS over WebSocket.
//!
//! Usage:
//!   nw --url ws://localhost:8080 pub orders.created '{"id":42}'
//!   nw --url ws://localhost:8080 sub 'orders.>' --queue workers --count 10
//!
//! Env vars:
//!   NATS_URL  : server URL (default: ws://localhost:4222)
//!   NW_CONFIG : TOML config file
//!   RUST_LOG  : log filter (default: warn)

mod cli;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use clap::Parser;
use nw_client::{ClientEvent, Session, SubscribeOptions};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, CliConfig, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();
    let config = CliConfig::load(cli.config.as_deref())?;
    let options = cli.connect_options(&config);

    let nc = Session::connect(options).await?;
    nc.add_event_listener(ClientEvent::error(|e| {
        tracing::error!(error = %e, kind = e.kind(), "nats error");
    }));

    match cli.command {
        Command::Pub { subject, data } => {
            nc.publish(&subject, &data);
            nc.flush_and_wait().await?;
            tracing::info!(subject = %subject, bytes = data.len(), "published");
        }
        Command::Sub {
            subject,
            queue,
            count,
        } => {
            let mut sub_opts = SubscribeOptions {
                max: count,
                ..config.subscribe.clone()
            };
            if queue.is_some() {
                sub_opts.queue = queue;
            }
            run_subscriber(&nc, &subject, sub_opts, count).await?;
        }
    }

    nc.close();
    Ok(())
}

/// Print messages until `count` arrive, the connection closes, or Ctrl-C.
async fn run_subscriber(
    nc: &Session,
    subject: &str,
    options: SubscribeOptions,
    count: Option<u64>,
) -> anyhow::Result<()> {
    let done = CancellationToken::new();

    let on_close = done.clone();
    nc.add_event_listener(ClientEvent::close(move || on_close.cancel()));

    let received = Arc::new(AtomicU64::new(0));
    let seen = received.clone();
    let on_msg = done.clone();
    let sub = nc
        .subscribe(
            subject,
            move |msg| {
                println!("[{}] {}", msg.subject, msg.data);
                let n = seen.fetch_add(1, Ordering::SeqCst) + 1;
                if count.is_some_and(|limit| n >= limit) {
                    on_msg.cancel();
                }
            },
            options,
        )
        .await?;
    nc.flush_and_wait().await?;
    tracing::info!(sid = sub.sid(), subject = %sub.subject(), "listening");

    tokio::select! {
        _ = done.cancelled() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted");
        }
    }

    tracing::info!(received = received.load(Ordering::SeqCst), "subscriber exiting");
    Ok(())
}
