use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use packer_api::{CreateItemRequest, CreateTripRequest, PackerApi};
use packer_core::{
    baseline_list, item_importance, DecisionReason, DecisionStatus, Item, PackingLimits,
    RecommendedItem, Trip, DEFAULT_VOLUME_LIMIT_CM3, DEFAULT_WEIGHT_LIMIT_KG,
};
use serde::{Deserialize, Serialize};

const CLI_CONTRACT_VERSION: &str = "cli.v1";

#[derive(Debug, Parser)]
#[command(name = "tp")]
#[command(about = "Travel packer planning CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the baseline packing checklist for a trip.
    Baseline(TripArgs),
    /// Score one item name against a trip context.
    Score(ScoreArgs),
    /// Simulate packing a manifest of items in order against fixed budgets.
    Plan(PlanArgs),
}

#[derive(Debug, Args)]
struct TripArgs {
    #[arg(long)]
    destination: String,
    #[arg(long, default_value_t = 3)]
    duration_days: i64,
    #[arg(long)]
    doing_laundry: bool,
    #[arg(long)]
    activities: Option<String>,
    #[arg(long)]
    lowest_temp: Option<f64>,
    #[arg(long)]
    highest_temp: Option<f64>,
}

#[derive(Debug, Args)]
struct ScoreArgs {
    #[arg(long)]
    name: String,
    #[command(flatten)]
    trip: TripArgs,
}

#[derive(Debug, Args)]
struct PlanArgs {
    /// JSON manifest: an array of {name, weight_kg?, estimated_volume_cm3?}.
    #[arg(long)]
    items: PathBuf,
    #[command(flatten)]
    trip: TripArgs,
    #[arg(long, default_value_t = DEFAULT_WEIGHT_LIMIT_KG)]
    weight_limit_kg: f64,
    #[arg(long, default_value_t = DEFAULT_VOLUME_LIMIT_CM3)]
    volume_limit_cm3: f64,
}

#[derive(Debug, Clone, Serialize)]
struct CliEnvelope<T>
where
    T: Serialize,
{
    cli_contract_version: &'static str,
    data: T,
}

#[derive(Debug, Clone, Serialize)]
struct ScoreReport {
    item_name: String,
    importance: i64,
}

#[derive(Debug, Clone, Deserialize)]
struct ManifestItem {
    name: String,
    weight_kg: Option<f64>,
    estimated_volume_cm3: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
struct PlanEntry {
    item_name: String,
    status: DecisionStatus,
    reason: Option<DecisionReason>,
    swap_candidates: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
struct PlanReport {
    destination: String,
    weight_limit_kg: f64,
    volume_limit_cm3: f64,
    decisions: Vec<PlanEntry>,
    packed_count: usize,
    total_items_weight: f64,
    total_items_volume: f64,
}

impl TripArgs {
    fn to_request(&self) -> CreateTripRequest {
        CreateTripRequest {
            destination: self.destination.clone(),
            duration_days: self.duration_days,
            doing_laundry: self.doing_laundry,
            activities: self.activities.clone(),
            lowest_temp: self.lowest_temp,
            highest_temp: self.highest_temp,
        }
    }

    fn to_trip(&self) -> Trip {
        let mut trip = Trip::new(self.destination.clone(), self.duration_days, self.doing_laundry);
        trip.activities = self.activities.clone();
        trip.lowest_temp = self.lowest_temp;
        trip.highest_temp = self.highest_temp;
        trip
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Baseline(args) => run_baseline(&args),
        Command::Score(args) => run_score(&args),
        Command::Plan(args) => run_plan(&args),
    }
}

fn print_envelope<T>(data: T) -> Result<()>
where
    T: Serialize,
{
    let envelope = CliEnvelope { cli_contract_version: CLI_CONTRACT_VERSION, data };
    let rendered =
        serde_json::to_string_pretty(&envelope).context("failed to render JSON output")?;
    println!("{rendered}");
    Ok(())
}

fn run_baseline(args: &TripArgs) -> Result<()> {
    let trip = args.to_trip();
    trip.validate()?;
    let recommendations: Vec<RecommendedItem> = baseline_list(&trip);
    print_envelope(recommendations)
}

fn run_score(args: &ScoreArgs) -> Result<()> {
    let trip = args.trip.to_trip();
    trip.validate()?;

    let mut item = Item::new();
    item.name = Some(args.name.clone());
    let importance = item_importance(&mut item, &trip);

    print_envelope(ScoreReport { item_name: args.name.clone(), importance })
}

fn run_plan(args: &PlanArgs) -> Result<()> {
    let manifest_raw = fs::read_to_string(&args.items)
        .with_context(|| format!("failed to read manifest {}", args.items.display()))?;
    let manifest: Vec<ManifestItem> = serde_json::from_str(&manifest_raw)
        .with_context(|| format!("invalid manifest JSON in {}", args.items.display()))?;

    let limits = PackingLimits {
        weight_limit_kg: args.weight_limit_kg,
        volume_limit_cm3: args.volume_limit_cm3,
    };
    let api = PackerApi::in_memory(limits)?;
    let trip = api.create_trip(args.trip.to_request())?;

    let mut decisions = Vec::new();
    for entry in manifest {
        let item = api.create_item(CreateItemRequest {
            name: Some(entry.name.clone()),
            weight_kg: entry.weight_kg,
            estimated_volume_cm3: entry.estimated_volume_cm3,
            detection: None,
            trip_id: None,
        })?;
        let decision = api.decide(trip.trip_id, item.item_id)?;
        let swap_candidates = decision
            .swap_candidates
            .unwrap_or_default()
            .into_iter()
            .map(|candidate| {
                candidate.name.clone().unwrap_or_else(|| candidate.item_id.to_string())
            })
            .collect();
        decisions.push(PlanEntry {
            item_name: entry.name,
            status: decision.status,
            reason: decision.reason,
            swap_candidates,
        });
    }

    let final_trip = api.get_trip(trip.trip_id)?;
    print_envelope(PlanReport {
        destination: final_trip.destination,
        weight_limit_kg: limits.weight_limit_kg,
        volume_limit_cm3: limits.volume_limit_cm3,
        packed_count: final_trip.items.len(),
        total_items_weight: final_trip.total_items_weight,
        total_items_volume: final_trip.total_items_volume,
        decisions,
    })
}
