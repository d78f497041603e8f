//! TimeTravel companion CLI: course sync, the mission detection loop, the
//! completion handshake, and the travel-guide chat, all against a running
//! backend.
use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use colored::Colorize;
use std::fs::File;
use std::io::{BufWriter, Write as IoWrite};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;

use timetravel_client::api::ApiClient;
use timetravel_client::auth::AuthSession;
use timetravel_client::controller::{FixedLocation, MissionService};
use timetravel_client::storage::JsonFileStore;
use timetravel_core::{Coordinate, DetectionConfig, MissionNotice};

/// Incheon city center, the app's default map position.
const DEFAULT_LOCATION: Coordinate = Coordinate::new(37.4563, 126.7052);

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RunMode {
    /// One-shot course sync and mission report.
    Sync,
    /// Run the detection loop until Ctrl-C (or `--ticks`).
    Watch,
    /// Drive the unlock handshake for one mission.
    Complete,
    /// One chat turn with the travel guide.
    Chat,
}

#[derive(Debug, Parser)]
#[command(name = "timetravel", version)]
#[command(about = "TimeTravel companion client - course sync, mission detection, and chat")]
struct Args {
    /// What to run.
    #[arg(long, value_enum, default_value_t = RunMode::Sync)]
    mode: RunMode,

    /// Backend base URL.
    #[arg(long, default_value = "http://localhost:8000")]
    base_url: String,

    /// Bearer access token. Falls back to the session store when omitted.
    #[arg(long)]
    token: Option<String>,

    /// Path of the local key-value store file.
    #[arg(long)]
    store: Option<PathBuf>,

    /// Mission (spot) id, required with `--mode complete`.
    #[arg(long)]
    mission_id: Option<u64>,

    /// Photo selected in the challenge, passed along with completion.
    #[arg(long)]
    photo_id: Option<u64>,

    /// Question for `--mode chat`.
    #[arg(long)]
    question: Option<String>,

    /// Report this fixed position instead of the default: "lat,lng".
    #[arg(long)]
    at: Option<String>,

    /// Override the poll interval in seconds.
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Override the mission trigger radius in meters.
    #[arg(long)]
    radius_m: Option<f64>,

    /// Stop the watch loop after this many ticks instead of Ctrl-C.
    #[arg(long)]
    ticks: Option<u32>,

    /// Write the report to a file instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Verbose progress on stderr.
    #[arg(short, long)]
    verbose: bool,
}

/// Where report output goes.
enum OutputTarget {
    Stdout,
    File(BufWriter<File>),
}

impl OutputTarget {
    fn create(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => {
                let file = File::create(path)
                    .with_context(|| format!("cannot create output file {}", path.display()))?;
                Ok(Self::File(BufWriter::new(file)))
            }
            None => Ok(Self::Stdout),
        }
    }

    fn line(&mut self, text: &str) -> Result<()> {
        match self {
            Self::Stdout => println!("{text}"),
            Self::File(writer) => writeln!(writer, "{text}")?,
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Self::File(writer) = self {
            writer.flush()?;
        }
        Ok(())
    }
}

fn parse_coordinate(raw: &str) -> Result<Coordinate> {
    let Some((lat, lng)) = raw.split_once(',') else {
        bail!("expected \"lat,lng\", got {raw:?}");
    };
    let lat: f64 = lat.trim().parse().context("latitude is not a number")?;
    let lng: f64 = lng.trim().parse().context("longitude is not a number")?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
        bail!("coordinate out of range: {lat},{lng}");
    }
    Ok(Coordinate::new(lat, lng))
}

fn build_config(args: &Args) -> DetectionConfig {
    let mut cfg = DetectionConfig::default();
    if let Some(secs) = args.interval_secs {
        cfg.poll_interval_secs = secs;
    }
    if let Some(radius) = args.radius_m {
        cfg.trigger_radius_m = radius;
    }
    cfg
}

fn resolve_token(args: &Args) -> Result<Option<String>> {
    if let Some(token) = &args.token {
        return Ok(Some(token.clone()));
    }
    let Some(path) = &args.store else {
        return Ok(None);
    };
    let store = JsonFileStore::open(path)
        .with_context(|| format!("cannot open session store {}", path.display()))?;
    let session = AuthSession::new(store);
    Ok(session.access_token()?)
}

fn announce(notice: &MissionNotice) {
    if let MissionNotice::Arrival {
        mission_id,
        location_name,
    } = notice
    {
        println!(
            "{} {} {}",
            "📍 Arrived:".bright_green().bold(),
            location_name.bold(),
            format!("(mission {mission_id})").dimmed()
        );
    }
}

async fn run_sync(
    service: &mut MissionService,
    location: Option<Coordinate>,
    out: &mut OutputTarget,
) -> Result<()> {
    let missions = service.refresh_missions().await;
    out.line(&format!("Active missions: {}", missions.len()))?;
    for mission in &missions {
        out.line(&format!(
            "  #{} {} (order {}, radius {:.0} m)",
            mission.id, mission.location.name, mission.location.order, mission.location.radius_m
        ))?;
    }
    if let Some(coord) = location {
        match service.tick(Some(coord)).await {
            Some(MissionNotice::Arrival { location_name, .. }) => {
                out.line(&format!("At {},{}: arrived at {location_name}", coord.lat, coord.lng))?;
            }
            _ => out.line(&format!("At {},{}: no mission in range", coord.lat, coord.lng))?,
        }
    }
    Ok(())
}

async fn run_watch(
    service: &mut MissionService,
    location: Coordinate,
    ticks: Option<u32>,
    out: &mut OutputTarget,
) -> Result<()> {
    let (tx, mut rx) = watch::channel(false);
    if let Some(ticks) = ticks {
        let deadline = service.config().poll_interval() * ticks.max(1)
            + Duration::from_millis(200);
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            let _ = tx.send(true);
        });
    } else {
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            let _ = tx.send(true);
        });
    }

    let mut arrivals = 0u32;
    service
        .run_detection(&FixedLocation(location), &mut rx, |notice| {
            announce(notice);
            arrivals += 1;
        })
        .await;
    out.line(&format!("Arrivals: {arrivals}"))?;
    Ok(())
}

async fn run_complete(
    service: &mut MissionService,
    mission_id: u64,
    photo_id: Option<u64>,
    out: &mut OutputTarget,
) -> Result<()> {
    service.refresh_missions().await;
    if service.complete_mission(mission_id, photo_id).await {
        println!("{}", "✅ Mission completed".bright_green().bold());
        out.line(&format!("Mission {mission_id}: completed"))?;
    } else {
        println!("{}", "❌ Mission not completed".bright_red().bold());
        out.line(&format!("Mission {mission_id}: not completed"))?;
    }
    Ok(())
}

async fn run_chat(
    service: &MissionService,
    question: &str,
    location: Option<Coordinate>,
    out: &mut OutputTarget,
) -> Result<()> {
    let answer = service.chat(question, location).await;
    println!("{} {}", "💬".bright_cyan(), answer);
    out.line(&format!("Q: {question}"))?;
    out.line(&format!("A: {answer}"))?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    println!(
        "{}",
        "🕰️  TimeTravel: walk the city, unlock its past"
            .bright_cyan()
            .bold()
    );
    if args.verbose {
        eprintln!("backend: {}", args.base_url);
    }

    let cfg = build_config(&args);
    let mut api = ApiClient::new(args.base_url.clone());
    if let Some(token) = resolve_token(&args)? {
        api.set_token(Some(token));
    }
    let mut service =
        MissionService::new(api, cfg).context("invalid detection configuration")?;

    let location = args.at.as_deref().map(parse_coordinate).transpose()?;
    let mut out = OutputTarget::create(args.output.as_ref())?;

    match args.mode {
        RunMode::Sync => run_sync(&mut service, location, &mut out).await?,
        RunMode::Watch => {
            run_watch(
                &mut service,
                location.unwrap_or(DEFAULT_LOCATION),
                args.ticks,
                &mut out,
            )
            .await?;
        }
        RunMode::Complete => {
            let mission_id = args
                .mission_id
                .context("--mission-id is required with --mode complete")?;
            run_complete(&mut service, mission_id, args.photo_id, &mut out).await?;
        }
        RunMode::Chat => {
            let question = args
                .question
                .clone()
                .context("--question is required with --mode chat")?;
            run_chat(&service, &question, location, &mut out).await?;
        }
    }

    out.finish()
}
