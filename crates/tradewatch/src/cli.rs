//! Command-line interface for the ingestion pipeline and scheduler.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use tradewatch_db::TradewatchDb;
use tradewatch_pipeline::transformers::{PoliticianNormalizer, TickerAutoCorrector};
use tradewatch_pipeline::Orchestrator;
use tradewatch_protocol::AppConfig;
use tradewatch_scheduler::{JobRunner, Scheduler};
use tradewatch_sources::SourceKind;
use tradewatch_storage::{FsBlobStore, StorageManager};

#[derive(Parser)]
#[command(name = "tradewatch", about = "Politician trading-disclosure ingestion", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose console logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline once for a source
    Run {
        /// Source type (us_house, us_senate, quiverquant, ...)
        source: String,
        /// Lookback window in days
        #[arg(long, default_value_t = 30)]
        lookback_days: u32,
        /// Extra source parameters as key=value pairs
        #[arg(long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,
    },
    /// Start the scheduler daemon with the default job set
    Schedule,
    /// List registered source types
    Sources,
    /// List scheduled jobs and their next run times
    Jobs,
    /// Trigger a scheduled job immediately
    RunJob { job_id: String },
    /// Run a registered ETL service once
    Etl {
        /// Source id (quiverquant, us_senate)
        source: String,
        /// Limit records processed
        #[arg(long)]
        limit: Option<usize>,
        /// Upsert instead of insert-only
        #[arg(long)]
        update: bool,
    },
    /// Run the politician normalizer and ticker auto-correction
    Normalize {
        /// Preview without applying
        #[arg(long)]
        dry_run: bool,
        #[arg(long, default_value_t = 500)]
        limit: usize,
    },
    /// Initialize the database schema and exit
    DbInit,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::from_env().context("Configuration error")?;

    let db = TradewatchDb::connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    let storage = StorageManager::new(db.clone(), Arc::new(FsBlobStore::default_root()));

    match cli.command {
        Command::Run {
            source,
            lookback_days,
            params,
        } => {
            init_logging(&config, cli.verbose, None)?;
            let mut overrides = parse_params(&params)?;
            if let Some(api_key) = &config.quiverquant_api_key {
                overrides
                    .entry("api_key".to_string())
                    .or_insert_with(|| serde_json::json!(api_key));
            }

            let orchestrator = Orchestrator::new(Some(db))
                .with_storage(Some(storage))
                .with_lookback_days(lookback_days);
            let summary = orchestrator.run(&source, overrides).await;

            println!("{}", serde_json::to_string_pretty(&summary)?);
            if !summary.is_success() {
                std::process::exit(1);
            }
        }

        Command::Schedule => {
            let scheduler = Scheduler::new(db.clone()).await;
            init_logging(&config, cli.verbose, Some(scheduler.log_layer()))?;
            register_default_jobs(&scheduler, &db, &storage, &config).await?;
            scheduler.start().await.context("Failed to start scheduler")?;

            info!("Scheduler running; press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
            scheduler.shutdown();
        }

        Command::Sources => {
            init_logging(&config, cli.verbose, None)?;
            for kind in SourceKind::all() {
                println!("{kind}");
            }
        }

        Command::Jobs => {
            init_logging(&config, cli.verbose, None)?;
            let scheduler = Scheduler::new(db.clone()).await;
            register_default_jobs(&scheduler, &db, &storage, &config).await?;
            for job in scheduler.get_jobs().await {
                println!(
                    "{}\t{}\t{}\tnext={}",
                    job.job_id,
                    job.schedule_type.as_str(),
                    job.schedule_value,
                    job.next_run
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "-".to_string()),
                );
            }
        }

        Command::RunJob { job_id } => {
            let scheduler = Scheduler::new(db.clone()).await;
            init_logging(&config, cli.verbose, Some(scheduler.log_layer()))?;
            register_default_jobs(&scheduler, &db, &storage, &config).await?;
            scheduler.start().await.context("Failed to start scheduler")?;
            scheduler.run_job_now(&job_id).await?;
            // Give the firing a moment, then let executions drain.
            tokio::time::sleep(std::time::Duration::from_secs(2)).await;
            while scheduler
                .get_job_info(&job_id)
                .await
                .map(|info| info.is_running)
                .unwrap_or(false)
            {
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            }
            scheduler.shutdown();
        }

        Command::Etl {
            source,
            limit,
            update,
        } => {
            init_logging(&config, cli.verbose, None)?;
            let mut registry = tradewatch_etl::EtlRegistry::new();
            registry.register(Arc::new(tradewatch_etl::QuiverQuantEtl::new(db.clone())))?;
            registry.register(Arc::new(tradewatch_etl::SenateEtl::new(db.clone())))?;

            let service = registry.get(&source)?;
            let mut params = serde_json::Map::new();
            if source == "quiverquant" {
                if let Some(api_key) = &config.quiverquant_api_key {
                    params.insert("api_key".to_string(), serde_json::json!(api_key));
                }
            }

            let job_id = format!("etl_{source}_{}", unix_timestamp());
            let result = service.run(&job_id, limit, update, &params).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.is_success() {
                std::process::exit(1);
            }
        }

        Command::Normalize { dry_run, limit } => {
            init_logging(&config, cli.verbose, None)?;
            let normalizer = if dry_run {
                PoliticianNormalizer::new(db.clone()).dry_run()
            } else {
                PoliticianNormalizer::new(db.clone())
            };
            let report = normalizer.normalize_all(limit).await?;
            println!(
                "politicians: {} scanned, {} corrections",
                report.scanned, report.corrections
            );

            if !dry_run {
                let tickers = TickerAutoCorrector::new(db).run().await?;
                println!("tickers: {} corrections", tickers.corrections);
            }
        }

        Command::DbInit => {
            init_logging(&config, cli.verbose, None)?;
            // Connecting already ensured the schema.
            println!("Database schema verified");
        }
    }

    Ok(())
}

fn init_logging(
    config: &AppConfig,
    verbose: bool,
    job_layer: Option<tradewatch_scheduler::JobLogLayer>,
) -> Result<()> {
    tradewatch_logging::init_logging(
        tradewatch_logging::LogConfig {
            app_name: "tradewatch",
            log_level: if verbose {
                Some("DEBUG")
            } else {
                config.log_level.as_deref()
            },
            quiet_console: false,
        },
        job_layer,
    )
}

fn unix_timestamp() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

fn parse_params(params: &[String]) -> Result<BTreeMap<String, serde_json::Value>> {
    let mut map = BTreeMap::new();
    for pair in params {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("Invalid --param '{pair}', expected KEY=VALUE"))?;
        // Numbers and booleans parse as themselves, everything else is a
        // string.
        let value = serde_json::from_str(value)
            .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
        map.insert(key.to_string(), value);
    }
    Ok(map)
}

/// A scheduled job that runs the full pipeline for one source.
struct PipelineJobRunner {
    db: TradewatchDb,
    storage: StorageManager,
    source_type: String,
    config: BTreeMap<String, serde_json::Value>,
}

#[async_trait::async_trait]
impl JobRunner for PipelineJobRunner {
    async fn run(&self) -> std::result::Result<(), String> {
        let orchestrator =
            Orchestrator::new(Some(self.db.clone())).with_storage(Some(self.storage.clone()));
        let summary = orchestrator.run(&self.source_type, self.config.clone()).await;
        if summary.is_success() {
            Ok(())
        } else {
            Err(format!(
                "pipeline run failed: status={}, errors={:?}",
                summary.status, summary.totals.errors
            ))
        }
    }
}

/// The default job set: staggered daily ingestion per federal source plus
/// a nightly data-quality pass.
async fn register_default_jobs(
    scheduler: &Arc<Scheduler>,
    db: &TradewatchDb,
    storage: &StorageManager,
    config: &AppConfig,
) -> Result<()> {
    let daily_sources: &[(&str, &str)] = &[
        ("us_house", "0 2 * * *"),
        ("us_senate", "30 2 * * *"),
        ("quiverquant", "0 3 * * *"),
        ("eu_parliament", "0 4 * * 1"),
        ("uk_parliament", "30 4 * * 1"),
    ];

    for (source_type, cron) in daily_sources {
        let mut job_config = BTreeMap::new();
        if *source_type == "quiverquant" {
            if let Some(api_key) = &config.quiverquant_api_key {
                job_config.insert("api_key".to_string(), serde_json::json!(api_key));
            }
        }

        let function = format!("ingest_{source_type}");
        scheduler
            .register_function(
                &function,
                Arc::new(PipelineJobRunner {
                    db: db.clone(),
                    storage: storage.clone(),
                    source_type: source_type.to_string(),
                    config: job_config,
                }),
            )
            .await;
        scheduler
            .add_cron_job(
                &format!("{source_type}_daily"),
                &format!("Daily {source_type} ingestion"),
                &function,
                cron,
                true,
            )
            .await?;
    }

    // Nightly normalizer + ticker corrections.
    struct QualityRunner {
        db: TradewatchDb,
    }
    #[async_trait::async_trait]
    impl JobRunner for QualityRunner {
        async fn run(&self) -> std::result::Result<(), String> {
            PoliticianNormalizer::new(self.db.clone())
                .normalize_all(500)
                .await
                .map_err(|e| e.to_string())?;
            TickerAutoCorrector::new(self.db.clone())
                .run()
                .await
                .map_err(|e| e.to_string())?;
            Ok(())
        }
    }

    scheduler
        .register_function(
            "data_quality",
            Arc::new(QualityRunner { db: db.clone() }),
        )
        .await;
    scheduler
        .add_cron_job(
            "data_quality_nightly",
            "Nightly data-quality pass",
            "data_quality",
            "0 5 * * *",
            true,
        )
        .await?;

    Ok(())
}
