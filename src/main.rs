use clap::{Args, Parser, Subcommand};
use marketing_ads::config::Config;
use marketing_ads::db::Database;
use marketing_ads::models::Segmentation;
use marketing_ads::{
    telemetry, AdProvisioner, AdStore, FacebookAPI, GraphApi, MetricsReconciler, PublishRequest,
    ReconcileOutcome,
};
use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "marketing-ads", about = "Ad campaign provisioning and post metrics sync")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply the database schema
    Migrate,
    /// Create or update the draft ad campaign of a campaign
    Configure {
        #[arg(long)]
        campaign_id: i32,
        /// Daily budget in major currency units
        #[arg(long)]
        budget: f64,
        /// Audience segmentation as JSON
        #[arg(long)]
        segmentation: Option<String>,
        #[arg(long)]
        brief: Option<String>,
    },
    /// Create the campaign, ad set, creative and ad on the ad platform
    Publish {
        #[arg(long)]
        ad_campaign_id: i32,
        #[arg(long)]
        ad_account_id: String,
        #[arg(long)]
        page_id: String,
    },
    /// Pull post insights into stored metrics
    SyncMetrics(SyncTarget),
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct SyncTarget {
    #[arg(long)]
    post_id: Option<i32>,
    #[arg(long)]
    campaign_id: Option<i32>,
}

fn services(
    db: Database,
    config: &Config,
) -> Result<(Arc<dyn GraphApi>, Arc<dyn AdStore>), Box<dyn Error>> {
    let graph: Arc<dyn GraphApi> = Arc::new(FacebookAPI::new(
        &config.facebook_base_url,
        &config.facebook_api_version,
        config.request_timeout,
    )?);
    let store: Arc<dyn AdStore> = Arc::new(db);
    Ok((graph, store))
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn Error>> {
    telemetry::init();
    let cli = Cli::parse();

    // Load configuration
    let config = Config::from_env()?;

    let db = Database::new(&config.database_url).await?;

    match cli.command {
        Command::Migrate => {
            db.migrate().await?;
            info!("schema applied");
        }
        Command::Configure {
            campaign_id,
            budget,
            segmentation,
            brief,
        } => {
            let segmentation: Segmentation = match segmentation {
                Some(raw) => serde_json::from_str(&raw)?,
                None => Segmentation::default(),
            };
            let (graph, store) = services(db, &config)?;
            let provisioner = AdProvisioner::from_config(graph, store, &config);
            match provisioner
                .configure(campaign_id, budget, segmentation, brief)
                .await
            {
                Ok(ad_campaign) => {
                    println!("ad campaign {} is {}", ad_campaign.id, ad_campaign.status);
                }
                Err(e) => {
                    eprintln!("[{}] {}", e.code(), e.user_message());
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Command::Publish {
            ad_campaign_id,
            ad_account_id,
            page_id,
        } => {
            let (graph, store) = services(db, &config)?;
            let provisioner = AdProvisioner::from_config(graph, store, &config);
            let request = PublishRequest {
                ad_account_id,
                page_id,
            };
            match provisioner.publish(ad_campaign_id, &request).await {
                Ok(result) => println!("{}", serde_json::to_string_pretty(&result)?),
                Err(e) => {
                    eprintln!("[{}] {}", e.code(), e.user_message());
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Command::SyncMetrics(target) => {
            let (graph, store) = services(db, &config)?;
            let reconciler = MetricsReconciler::new(graph, store);
            let outcomes = match (target.post_id, target.campaign_id) {
                (Some(post_id), _) => vec![(post_id, reconciler.reconcile_post(post_id).await)],
                (None, Some(campaign_id)) => reconciler.reconcile_campaign(campaign_id).await?,
                (None, None) => Vec::new(),
            };

            for (post_id, outcome) in outcomes {
                match outcome {
                    ReconcileOutcome::Reconciled(metrics) => println!(
                        "post {post_id}: impressions={} clicks={} reactions={}",
                        metrics.impressions, metrics.clicks, metrics.reactions
                    ),
                    ReconcileOutcome::Skipped(reason) => println!("post {post_id}: skipped ({reason})"),
                    ReconcileOutcome::Failed(error) => println!("post {post_id}: failed ({error})"),
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
