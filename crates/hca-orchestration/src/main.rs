//! HCA Orchestration - metadata loading tool

use anyhow::{Context, Result};
use clap::Parser;
use hca_common::logging::{init_logging, LogConfig, LogLevel};
use hca_common::types::short_run_id;
use hca_orchestration::bigquery::BigQueryClient;
use hca_orchestration::config::{access_token, storage_config, OrchestrationConfig};
use hca_orchestration::data_repo::DataRepoClient;
use hca_orchestration::load::{fanout, load_all, Resources, DEFAULT_METADATA_PATH};
use hca_orchestration::storage::GcsStorage;
use hca_orchestration::{partitions, staging, validate};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "hca-orchestration")]
#[command(author, version, about = "HCA metadata loading tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Load every metadata table from the scratch area into the target dataset
    Load {
        /// Tag naming the scratch dataset (defaults to a fresh short run id)
        #[arg(long)]
        load_tag: Option<String>,

        /// Directory under the scratch area holding staged metadata
        #[arg(long, default_value = DEFAULT_METADATA_PATH)]
        metadata_path: String,

        /// Tables loaded at once (overrides LOAD_CONCURRENCY)
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Delete every object under the scratch prefix
    ClearScratch,

    /// Remove outdated entity files from a staging area
    DedupeStaging {
        /// Full gs:// path of the staging area
        #[arg(short, long)]
        staging_area: String,

        /// Print the files that would be removed
        #[arg(short, long)]
        print_files: bool,

        /// Only report, do not delete
        #[arg(short = 'n', long)]
        skip_deletion: bool,
    },

    /// List partition keys published for a pipeline
    Partitions {
        /// Bucket holding the partition CSV files
        #[arg(long, env = "PARTITIONS_BUCKET")]
        bucket: String,

        /// Pipeline whose partitions to list
        #[arg(long)]
        pipeline: String,
    },

    /// Check that every entity referenced by the dataset's links is loaded
    VerifySubgraphs {
        /// The only HCA project the dataset may contain
        #[arg(short, long)]
        project_id: String,
    },
}

fn bigquery_client(config: &OrchestrationConfig, token: &str) -> Result<BigQueryClient> {
    Ok(BigQueryClient::new(&config.bigquery.api_url, token)?
        .with_poll_interval(Duration::from_millis(config.bigquery.job_poll_interval_ms)))
}

fn resources(config: &OrchestrationConfig) -> Result<Resources> {
    let token = access_token()?;
    let data_repo = DataRepoClient::new(
        &config.data_repo.url,
        &token,
        Duration::from_secs(config.data_repo.timeout_secs),
    )?;

    Ok(Resources {
        storage: Arc::new(GcsStorage::new(storage_config()?)),
        bigquery: Arc::new(bigquery_client(config, &token)?),
        data_repo: Arc::new(data_repo),
        scratch: config.scratch.clone(),
        target: config.target.clone(),
        wait: config.wait.wait_config(),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging based on verbose flag
    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("hca-orchestration")
        .build();

    // Environment variables take precedence
    let log_config = log_config.merge_env()?;

    let _guard = init_logging(&log_config)?;

    match cli.command {
        Command::Load {
            load_tag,
            metadata_path,
            concurrency,
        } => {
            let config = OrchestrationConfig::load().context("Failed to load configuration")?;
            let resources = resources(&config)?;
            let load_tag = load_tag.unwrap_or_else(|| short_run_id(None));

            let dataset = staging::create_scratch_dataset(
                resources.bigquery.as_ref(),
                &resources.scratch,
                &load_tag,
                &resources.target.bq_location,
            )
            .await
            .context("Failed to create scratch dataset")?;

            let summary = load_all(
                &resources,
                fanout(&dataset, &metadata_path),
                concurrency.unwrap_or(config.load_concurrency),
            )
            .await;
            println!("{}", serde_json::to_string_pretty(&summary)?);

            if !summary.is_success() {
                anyhow::bail!("{} metadata tables failed to load", summary.failures.len());
            }
        },
        Command::ClearScratch => {
            let config = OrchestrationConfig::load().context("Failed to load configuration")?;
            let storage = GcsStorage::new(storage_config()?);
            let deleted = staging::clear_scratch_dir(&storage, &config.scratch).await?;
            println!("Deleted {} objects", deleted);
        },
        Command::DedupeStaging {
            staging_area,
            print_files,
            skip_deletion,
        } => {
            let storage = GcsStorage::new(storage_config()?);
            info!("Evaluating outdated files in staging area: {}", staging_area);

            let report =
                staging::deduplicate_staging_area(&storage, &staging_area, skip_deletion).await?;
            println!("Total objects found: {}", report.total_objects);
            println!("Outdated objects found: {}", report.outdated.len());
            if print_files {
                for key in &report.outdated {
                    println!("  {}", key);
                }
            }
            if !skip_deletion {
                println!("Deleted {} objects", report.deleted);
            }
        },
        Command::Partitions { bucket, pipeline } => {
            let storage = GcsStorage::new(storage_config()?);
            for key in partitions::partition_keys(&storage, &bucket, &pipeline).await? {
                println!("{}", key);
            }
        },
        Command::VerifySubgraphs { project_id } => {
            let config = OrchestrationConfig::load().context("Failed to load configuration")?;
            let bigquery = bigquery_client(&config, &access_token()?)?;
            validate::verify_subgraphs(&bigquery, &config.target, &project_id).await?;
            println!("Subgraphs verified for project {}", project_id);
        },
    }

    info!("Done");
    Ok(())
}
