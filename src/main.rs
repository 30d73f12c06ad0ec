//! robolink - robot controller client
//!
//! Usage:
//!   robolink monitor [--verify]     Stream connection events and add-on statuses
//!   robolink ota-check              Report whether a firmware update is available
//!   robolink ota-update [--yes]     Download and install the latest firmware

use anyhow::{bail, Context, Result};
use clap::Parser;
use robolink::cli::{Cli, Command};
use robolink::client::{Client, ClientHandle};
use robolink::config::{self, Config};
use robolink::connection::ConnectionState;
use robolink::events::{ChannelListener, Event};
use robolink::logging;
use robolink::ota::{HttpDownloader, UpdateCheck, UpdateState};
use robolink::scheduler::SystemClock;
use robolink::transport::DefaultOpener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::warn;

const EVENT_CAPACITY: usize = 256;
const STATUS_PRINT_INTERVAL: Duration = Duration::from_secs(1);
const UPDATE_POLL_INTERVAL: Duration = Duration::from_millis(200);

fn main() -> Result<()> {
    let cli = Cli::parse();

    let path = cli.config.clone().unwrap_or_else(config::default_path);
    // Peek at the file for the log level; errors are reported by load below
    let verbose = cli.verbose || config::read(&path).is_ok_and(|c| c.logs.verbose);
    logging::init_tracing(verbose);

    let mut config = config::load(&path);
    cli.command.target().apply(&mut config);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(cli.command, config))
}

async fn run(command: Command, mut config: Config) -> Result<()> {
    if let Command::Monitor { verify: true, .. } = command {
        config.connection.verify_identity = true;
    }

    let (listener, events) = ChannelListener::channel(EVENT_CAPACITY);
    let downloader = HttpDownloader::new().context("HTTP client setup failed")?;
    let (client, handle) = Client::new(
        config,
        Arc::new(DefaultOpener::new()),
        Arc::new(downloader),
        Arc::new(listener),
        Arc::new(SystemClock),
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    let client_task = client.spawn(shutdown.clone());
    tokio::spawn(print_events(events));

    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_clone = interrupted.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        interrupted_clone.store(true, Ordering::SeqCst);
    });

    let result = match command {
        Command::Monitor { .. } => monitor(&handle, &interrupted).await,
        Command::OtaCheck { .. } => ota_check(&handle).await.map(|_| ()),
        Command::OtaUpdate { yes, .. } => ota_update(&handle, yes, &interrupted).await,
    };

    let _ = handle.disconnect().await;
    shutdown.store(true, Ordering::SeqCst);
    let _ = client_task.await;
    result
}

async fn print_events(mut events: mpsc::Receiver<Event>) {
    while let Some(event) = events.recv().await {
        let detail = serde_json::to_string(&event).unwrap_or_default();
        eprintln!(
            "[{}] {}/{} {}",
            logging::timestamp(),
            event.category(),
            event.name(),
            detail
        );
    }
}

async fn connect(handle: &ClientHandle) -> Result<()> {
    let state = handle.connect_default().await.context("Connection failed")?;
    if state != ConnectionState::VerifyingIdentity {
        return Ok(());
    }

    let colours = handle.identity_colours().await?;
    let names: Vec<String> = colours.iter().map(|c| c.to_string()).collect();
    if confirm(&format!(
        "Is the robot flashing {}? [y/N] ",
        names.join(", ")
    ))
    .await?
    {
        handle.accept_identity().await?;
        Ok(())
    } else {
        handle.reject_identity().await?;
        bail!("Device rejected");
    }
}

async fn monitor(handle: &ClientHandle, interrupted: &AtomicBool) -> Result<()> {
    connect(handle).await?;

    let mut ticker = tokio::time::interval(STATUS_PRINT_INTERVAL);
    while !interrupted.load(Ordering::SeqCst) {
        ticker.tick().await;

        let snapshot = handle.snapshot();
        if snapshot.connection != ConnectionState::Connected {
            continue;
        }
        let stats = handle.stats().snapshot();
        println!(
            "[{}] rx {:.1} KB/s tx {:.1} KB/s dropped {}",
            logging::timestamp(),
            stats.rx_rate,
            stats.tx_rate,
            stats.frames_dropped
        );
        for status in snapshot.addons.values() {
            println!("  {}", serde_json::to_string(status)?);
        }
    }
    Ok(())
}

async fn ota_check(handle: &ClientHandle) -> Result<UpdateCheck> {
    connect(handle).await?;
    let outcome = handle.ota_update_check().await?;
    match &outcome {
        UpdateCheck::NoUpdateNeeded { current } => {
            println!("Firmware {} is up to date", current);
        }
        UpdateCheck::UpdateAvailable {
            current,
            version,
            release_notes,
        } => {
            println!("Update available: {} -> {}", current, version);
            if let Some(notes) = release_notes {
                println!("{}", notes);
            }
        }
    }
    Ok(outcome)
}

async fn ota_update(handle: &ClientHandle, yes: bool, interrupted: &AtomicBool) -> Result<()> {
    let UpdateCheck::UpdateAvailable { version, .. } = ota_check(handle).await? else {
        return Ok(());
    };
    if !yes && !confirm(&format!("Install firmware {}? [y/N] ", version)).await? {
        return Ok(());
    }

    handle.ota_update_start().await?;

    let mut cancel_sent = false;
    loop {
        tokio::time::sleep(UPDATE_POLL_INTERVAL).await;
        if interrupted.load(Ordering::SeqCst) && !cancel_sent {
            cancel_sent = true;
            if let Err(e) = handle.ota_update_cancel().await {
                warn!("Cancel not possible: {}", e);
            }
        }
        match handle.update_state().await? {
            UpdateState::Complete => {
                println!("Firmware {} installed", version);
                return Ok(());
            }
            UpdateState::Failed => bail!("Firmware update failed"),
            UpdateState::Idle => bail!("Firmware update cancelled"),
            _ => {}
        }
    }
}

/// Ask a yes/no question on stdin
async fn confirm(prompt: &str) -> Result<bool> {
    eprint!("{}", prompt);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let answer = lines.next_line().await?.unwrap_or_default();
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
