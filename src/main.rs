use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{ArgGroup, Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

mod classifier;
mod config;
mod db;
mod error;
mod features;
mod logging;
mod models;
mod report;
mod stats;

use classifier::ClassifierClient;
use config::Config;
use features::ExtractOptions;
use models::{Learner, LearnerFeatures};

#[derive(Parser)]
#[command(name = "learner-insight")]
#[command(about = "Study-behavior feature extraction for learner insights", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
#[command(group(
    ArgGroup::new("scope")
        .args(["learner", "email"])
        .required(true)
        .multiple(false)
))]
struct LearnerArgs {
    #[arg(long)]
    learner: Option<Uuid>,
    #[arg(long)]
    email: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import module activity from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Compute persona and pace feature vectors for a learner
    Extract {
        #[command(flatten)]
        target: LearnerArgs,
        #[arg(long)]
        json: bool,
    },
    /// Send a learner's feature vectors to the persona and pace classifiers
    Classify {
        #[command(flatten)]
        target: LearnerArgs,
    },
    /// Generate a markdown insight report
    Report {
        #[command(flatten)]
        target: LearnerArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
        #[arg(long)]
        classify: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let config = Config::from_env()?;
    logging::init_tracing(&config.log_level);

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.query_timeout)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} activity events from {}.", csv.display());
        }
        Commands::Extract { target, json } => {
            let learner = resolve_learner(&pool, &target).await?;
            let features = extract(&pool, &config, &learner).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&features)?);
            } else {
                print_features(&learner, &features);
            }
        }
        Commands::Classify { target } => {
            let client =
                ClassifierClient::new(config.classifier_endpoint.as_deref(), config.classifier_timeout)?;
            let learner = resolve_learner(&pool, &target).await?;
            let features = extract(&pool, &config, &learner).await?;
            let result = client
                .classify(&features)
                .await
                .context("classifier request failed")?;

            println!("Insight for {} ({}):", learner.full_name, learner.email);
            println!(
                "- persona {} ({:.2} confidence)",
                result.persona.label, result.persona.confidence
            );
            println!(
                "- pace {} ({:.2} confidence)",
                result.pace.label, result.pace.confidence
            );
        }
        Commands::Report {
            target,
            out,
            classify,
        } => {
            let client = if classify {
                Some(ClassifierClient::new(
                    config.classifier_endpoint.as_deref(),
                    config.classifier_timeout,
                )?)
            } else {
                None
            };
            let learner = resolve_learner(&pool, &target).await?;
            let features = extract(&pool, &config, &learner).await?;
            let classification = match client {
                Some(client) => Some(
                    client
                        .classify(&features)
                        .await
                        .context("classifier request failed")?,
                ),
                None => None,
            };

            let report =
                report::build_report(&learner, Utc::now(), &features, classification.as_ref());
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

async fn resolve_learner(pool: &PgPool, target: &LearnerArgs) -> anyhow::Result<Learner> {
    let learner = match (target.learner, target.email.as_deref()) {
        (Some(id), _) => db::find_learner_by_id(pool, id).await?,
        (None, Some(email)) => db::find_learner_by_email(pool, email).await?,
        (None, None) => anyhow::bail!("pass --learner or --email"),
    };
    learner.context("no learner matches the given --learner/--email")
}

async fn extract(
    pool: &PgPool,
    config: &Config,
    learner: &Learner,
) -> anyhow::Result<LearnerFeatures> {
    let store = db::PgStore::new(pool.clone(), config.query_timeout);
    let options = ExtractOptions {
        utc_offset: config.utc_offset,
    };
    let features = features::extract_features(&store, learner.id, &options)
        .await
        .with_context(|| format!("failed to load history for learner {}", learner.id))?;
    info!(learner_id = %learner.id, "features extracted");
    Ok(features)
}

fn print_features(learner: &Learner, features: &LearnerFeatures) {
    let persona = &features.persona_features;
    let pace = &features.pace_features;

    println!("Features for {} ({}):", learner.full_name, learner.email);
    println!(
        "- avg study hour {} (std {:.2}h)",
        report::format_hour(persona.avg_study_hour),
        persona.study_consistency_std
    );
    println!("- completion speed {:.2}", persona.completion_speed);
    println!("- avg exam score {:.1}", persona.avg_exam_score);
    println!(
        "- submission fail rate {:.2} ({} retries)",
        persona.submission_fail_rate, persona.retry_count
    );
    println!(
        "- modules viewed {} of {} opened",
        pace.completed_modules, pace.total_modules_viewed
    );
    println!(
        "- materials per day {:.2}, weekly cv {:.2}",
        features.activity.materials_per_day, features.activity.weekly_cv
    );
}
