// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! CFS Programmer command-line application

use anyhow::Result;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cfs_programmer::bluetooth::{BleCentral, LinkCommand, LinkEvent, TransportSession};
use cfs_programmer::config::Config;
use cfs_programmer::console;
use cfs_programmer::engine::ProtocolEngine;
use cfs_programmer::events::{EventProcessor, Input, UiEvent, UserAction};
use cfs_programmer::state::AppState;
use cfs_programmer::storage::{MaterialStore, SpoolHistory};
use cfs_programmer::update::{GitHubReleases, UpdateChecker};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cfs_programmer=info".parse()?),
        )
        .init();

    info!("Starting CFS Programmer v{}...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::load()?;
    info!("Configuration loaded");

    // Initialize storage
    let materials = MaterialStore::open(&config.data_dir)?;
    info!(
        "Material database loaded ({} materials)",
        materials.materials().len()
    );

    let history = if config.history.enabled {
        let mut history = SpoolHistory::new(&config.data_dir)?;
        history.set_max_entries(config.history.max_entries);
        info!("Spool history initialized");
        Some(history)
    } else {
        None
    };

    let state = AppState::new();

    let (link_tx, link_rx) = mpsc::unbounded_channel::<LinkCommand>();
    let (link_event_tx, mut link_event_rx) = mpsc::channel::<LinkEvent>(32);
    let (input_tx, input_rx) = mpsc::channel::<Input>(64);
    let (ui_tx, ui_rx) = mpsc::unbounded_channel::<UiEvent>();

    // Initialize BLE central
    let central = BleCentral::new(link_event_tx).await?;
    tokio::spawn(async move {
        if let Err(e) = central.run(link_rx).await {
            error!("BLE central stopped: {:#}", e);
        }
    });

    let forward_tx = input_tx.clone();
    tokio::spawn(async move {
        while let Some(event) = link_event_rx.recv().await {
            if forward_tx.send(Input::Link(event)).await.is_err() {
                break;
            }
        }
    });

    let session = TransportSession::new(link_tx, config.bluetooth.device_name.clone());
    let engine =
        ProtocolEngine::new(session).with_wipe_timeout(config.operations.wipe_timeout());

    let releases = GitHubReleases::new(
        &config.update.api_base,
        &config.update.user_agent,
        config.update.timeout(),
    )?;
    let checker = UpdateChecker::new(releases, config.update.repo.clone());

    let processor = EventProcessor::new(
        engine,
        materials,
        history,
        state.clone(),
        checker,
        input_tx.clone(),
        ui_tx,
        config.tag.batch.clone(),
    );

    // Operation timeouts are checked once per second
    let tick_tx = input_tx.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            interval.tick().await;
            if tick_tx.send(Input::Tick).await.is_err() {
                break;
            }
        }
    });

    let console_tx = input_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = console::read_stdin(console_tx).await {
            warn!("Console input failed: {:#}", e);
        }
    });
    tokio::spawn(console::print_events(ui_rx));

    println!("{}", console::HELP);
    input_tx.send(Input::Action(UserAction::Connect)).await?;

    info!("Ready. Looking for '{}'", config.bluetooth.device_name);

    tokio::select! {
        _ = processor.run(input_rx) => {
            info!("Quit requested");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
        }
    }

    info!("Status at exit: {}", state.summary());
    info!("Shutting down...");
    Ok(())
}
