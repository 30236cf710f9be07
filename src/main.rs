use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::Local;
use clap::{Parser, Subcommand};

use event_harvest::analysis;
use event_harvest::config::{HarvestConfig, StoreCredentials};
use event_harvest::export;
use event_harvest::scraping::browser::ChromeLauncher;
use event_harvest::scraping::Pacing;
use event_harvest::store::airtable::AirtableStore;
use event_harvest::store::sqlite::SqliteStore;
use event_harvest::utils;
use event_harvest::{HarvestRequest, RunSummary};

#[derive(Parser)]
#[command(name = "event-harvest", about = "Event listing harvester and record store sync")]
struct Cli {
    /// Config file (default: <data dir>/event-harvest/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory for harvest artifacts and the run report
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Full scrape into a harvest artifact, without touching the store
    Harvest {
        /// Days ahead to crawl (default: full_horizon_days)
        #[arg(short, long)]
        days: Option<i64>,
        /// Only crawl these cities (repeatable)
        #[arg(short, long = "city")]
        cities: Vec<String>,
    },
    /// Scrape the near term and sync it into the record store
    Update {
        /// Days ahead to crawl (default: update_horizon_days)
        #[arg(short, long)]
        days: Option<i64>,
        /// Sync into a local SQLite file instead of the hosted store
        /// (default file: <data dir>/event-harvest/records.sqlite)
        #[arg(long, num_args = 0..=1, value_name = "PATH")]
        local_store: Option<Option<PathBuf>>,
    },
    /// Write the effective configuration to the config file
    Init {
        /// Replace an existing config file
        #[arg(long)]
        force: bool,
    },
    /// Per-city counts and top genres of a harvest artifact
    Stats {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short = 'n', long, default_value = "10")]
        top: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(utils::config_path);
    let mut config = HarvestConfig::load(Some(&config_path)).context("loading config")?;
    if cli.output_dir.is_some() {
        config.output_dir = cli.output_dir;
    }

    match cli.command {
        Commands::Harvest { days, cities } => {
            let request = HarvestRequest {
                days: days.unwrap_or(config.full_horizon_days),
                cities,
            };
            let launcher = launcher(&config);
            let summary = event_harvest::harvest(
                &launcher,
                &config,
                &request,
                &Pacing::from_config(&config),
                Local::now().naive_local(),
            )
            .await?;
            print_summary(&summary);
        }
        Commands::Update { days, local_store } => {
            let request = HarvestRequest {
                days: days.unwrap_or(config.update_horizon_days),
                cities: Vec::new(),
            };
            let launcher = launcher(&config);
            let pacing = Pacing::from_config(&config);
            let run_at = Local::now().naive_local();
            let summary = match local_store {
                Some(path) => {
                    let path = path.unwrap_or_else(utils::local_store_path);
                    let store = SqliteStore::open(&path)
                        .with_context(|| format!("opening {}", path.display()))?;
                    event_harvest::update(&launcher, &store, &config, &request, &pacing, run_at)
                        .await?
                }
                None => {
                    let credentials = StoreCredentials::from_env()?;
                    let store = AirtableStore::new(&credentials, config.store_view.clone())?;
                    event_harvest::update(&launcher, &store, &config, &request, &pacing, run_at)
                        .await?
                }
            };
            print_summary(&summary);
        }
        Commands::Init { force } => {
            if config_path.exists() && !force {
                anyhow::bail!(
                    "{} already exists, pass --force to replace it",
                    config_path.display()
                );
            }
            config
                .save(&config_path)
                .with_context(|| format!("writing {}", config_path.display()))?;
            println!("Wrote {}", config_path.display());
        }
        Commands::Stats { input, top } => {
            let records = export::read_artifact(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let rows = analysis::dashboard_rows(records, &config.cities);
            println!("{} events", rows.len());
            for city in analysis::city_summaries(&rows) {
                println!(
                    "  {:<12} {:>5} events, {:>4} free entrance",
                    city.city, city.events, city.free_events
                );
            }
            let mut current = String::new();
            for genre in analysis::top_genres(&rows, top) {
                if genre.city != current {
                    println!("Top genres in {}:", genre.city);
                    current = genre.city.clone();
                }
                println!("  {:<24} {}", genre.genre, genre.count);
            }
        }
    }

    println!("Total time: {:.1}s", t0.elapsed().as_secs_f64());
    Ok(())
}

fn launcher(config: &HarvestConfig) -> ChromeLauncher {
    ChromeLauncher::new(Duration::from_secs(config.page_load_timeout_secs))
}

fn print_summary(summary: &RunSummary) {
    println!(
        "Discovered {} urls, harvested {} records",
        summary.discovered, summary.harvested
    );
    if summary.updates + summary.inserts + summary.failed_updates + summary.failed_inserts > 0 {
        println!(
            "Updated {} ({} failed), inserted {} ({} failed)",
            summary.updates, summary.failed_updates, summary.inserts, summary.failed_inserts
        );
    }
    if !summary.failed_batches.is_empty() {
        println!("Refused insert batches: {:?}", summary.failed_batches);
    }
    if let Some(path) = &summary.artifact {
        println!("Artifact: {}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_local_store_flag_means_default_file() {
        let cli = Cli::try_parse_from(["event-harvest", "update", "--local-store", "--days", "3"])
            .expect("parse");
        match cli.command {
            Commands::Update { days, local_store } => {
                assert_eq!(days, Some(3));
                assert_eq!(local_store, Some(None));
                let path = local_store.flatten().unwrap_or_else(utils::local_store_path);
                assert!(path.ends_with("event-harvest/records.sqlite"));
            }
            _ => panic!("expected update"),
        }
    }

    #[test]
    fn local_store_accepts_an_explicit_path() {
        let cli = Cli::try_parse_from(["event-harvest", "update", "--local-store", "/tmp/r.sqlite"])
            .expect("parse");
        assert!(matches!(
            cli.command,
            Commands::Update { local_store: Some(Some(ref path)), .. } if path == &PathBuf::from("/tmp/r.sqlite")
        ));
        let hosted = Cli::try_parse_from(["event-harvest", "update"]).expect("parse");
        assert!(matches!(hosted.command, Commands::Update { local_store: None, .. }));
    }

    #[test]
    fn init_takes_the_global_config_path() {
        let cli = Cli::try_parse_from(["event-harvest", "init", "--force", "--config", "/tmp/c.json"])
            .expect("parse");
        assert!(matches!(cli.command, Commands::Init { force: true }));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.json")));
    }
}
