//! Crosspoint CLI Application

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use crosspoint_core::{ConfigManager, CrosspointConfig, DeviceSource, DeviceUid, RoutingEngine};
use crosspoint_infra::audio::{ControlThread, CpalDeviceSource};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "crosspoint")]
#[command(about = "Device-aware channel routing for multi-output audio", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to the per-user config)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List output devices and their offsets in the output channel space
    Devices {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show the channel map and gain matrix for a device selection
    Route {
        /// Device uid to select (defaults to the system default output)
        #[arg(short, long)]
        device: Option<String>,

        /// Number of logical input channels
        #[arg(short, long, default_value_t = 2)]
        inputs: usize,

        /// Physical output channels exposed (defaults to the topology total)
        #[arg(short, long)]
        outputs: Option<usize>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[derive(Serialize)]
struct DeviceRow {
    offset: usize,
    uid: String,
    name: String,
    channels: usize,
}

#[derive(Serialize)]
struct RoutePreview {
    device: Option<String>,
    inputs: usize,
    outputs: usize,
    channel_map: Vec<i32>,
    gains: Vec<Vec<f32>>,
}

async fn load_config(path: Option<PathBuf>) -> anyhow::Result<CrosspointConfig> {
    match path {
        Some(path) => CrosspointConfig::load_from_file(&path)
            .await
            .with_context(|| format!("loading {}", path.display())),
        None => {
            let manager = ConfigManager::new(ConfigManager::default_config_dir()?);
            Ok(manager.load().await)
        }
    }
}

fn list_devices(source: &CpalDeviceSource, json: bool) -> anyhow::Result<()> {
    let topology = crosspoint_core::DeviceTopology::rebuild(source.output_devices()?);
    let rows: Vec<DeviceRow> = topology
        .iter()
        .map(|(offset, device)| DeviceRow {
            offset,
            uid: device.uid.to_string(),
            name: device.name.clone(),
            channels: device.channel_count,
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("{:>6}  {:>8}  {}", "OFFSET", "CHANNELS", "UID");
    for row in &rows {
        println!("{:>6}  {:>8}  {}", row.offset, row.channels, row.uid);
    }
    println!("{} device(s), {} channel(s)", rows.len(), topology.total_channels());
    Ok(())
}

fn preview_route(
    config: &CrosspointConfig,
    source: &CpalDeviceSource,
    device: Option<String>,
    inputs: usize,
    outputs: Option<usize>,
    json: bool,
) -> anyhow::Result<()> {
    let uid = match device {
        Some(uid) => DeviceUid::new(uid),
        None => match source.default_output_uid()? {
            Some(uid) => uid,
            None => bail!("default output device not found or ambiguous; pass --device"),
        },
    };

    let control = ControlThread::spawn(RoutingEngine::new(&config.routing)?)?;
    let handle = control.handle();
    handle.refresh_from(source)?;

    let outputs = match outputs {
        Some(outputs) => outputs,
        None => handle.topology()?.total_channels(),
    };
    handle.set_channel_counts(inputs, outputs)?;
    handle
        .select(uid.clone())
        .with_context(|| format!("selecting {}", uid))?;

    let snapshot = control.reader().load_full();
    let preview = RoutePreview {
        device: snapshot.selected().map(|uid| uid.to_string()),
        inputs: snapshot.input_channel_count(),
        outputs: snapshot.output_channel_count(),
        channel_map: snapshot.channel_map().to_raw(),
        gains: (0..snapshot.input_channel_count())
            .map(|i| {
                (0..snapshot.output_channel_count())
                    .map(|j| snapshot.gain_at(i, j))
                    .collect()
            })
            .collect(),
    };
    control.shutdown()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&preview)?);
        return Ok(());
    }

    println!("Device:      {}", preview.device.as_deref().unwrap_or("-"));
    println!("Channel map: {:?}", preview.channel_map);
    for (i, row) in preview.gains.iter().enumerate() {
        let cells: Vec<String> = row.iter().map(|gain| format!("{:.2}", gain)).collect();
        println!("in {:>2}:      {}", i, cells.join(" "));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Crosspoint starting...");

    let config = load_config(cli.config).await?;
    let source = CpalDeviceSource::new();

    match cli.command {
        Commands::Devices { json } => list_devices(&source, json),
        Commands::Route {
            device,
            inputs,
            outputs,
            json,
        } => preview_route(&config, &source, device, inputs, outputs, json),
    }
}
