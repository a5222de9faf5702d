use crate::models::{
    AdCampaign, AdCampaignMetadata, AdCampaignStatus, Campaign, CampaignPost, ConnectedAccount,
    PostMetrics, PostStatus, ProvisioningLedger, ProvisioningStep,
};
use crate::store::{AdStore, ExternalIds};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use openssl::ssl::{SslConnector, SslMethod};
use postgres_openssl::MakeTlsConnector;
use serde_json::Value;
use std::str::FromStr;
use thiserror::Error;
use tokio_postgres::{Client, Config, Row};
use tracing::error;

const MIGRATION_0001: &str = include_str!("../migrations/0001_init.sql");

const AD_CAMPAIGN_COLUMNS: &str = "id, campaign_id, status, budget::float8 AS budget, \
     external_campaign_id, external_adset_id, external_ad_id, metadata, provisioning_started_at";

const POST_COLUMNS: &str =
    "id, campaign_id, platform, content, image_url, status, metadata, metrics, created_at";

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] tokio_postgres::Error),
    #[error("SSL error: {0}")]
    SslError(#[from] openssl::error::ErrorStack),
    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),
    #[error("Invalid stored data: {0}")]
    InvalidData(String),
}

pub struct Database {
    client: Client,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, DatabaseError> {
        let connector = MakeTlsConnector::new(SslConnector::builder(SslMethod::tls())?.build());

        // Parse the connection config from URL
        let mut config = Config::from_str(database_url)
            .map_err(|e| DatabaseError::InvalidConnectionString(e.to_string()))?;

        let (client, connection) = config
            .connect_timeout(std::time::Duration::from_secs(5))
            .connect(connector)
            .await
            .map_err(DatabaseError::ConnectionError)?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "database connection error");
            }
        });

        Ok(Self { client })
    }

    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        self.client.batch_execute(MIGRATION_0001).await?;
        Ok(())
    }
}

fn ad_campaign_from_row(row: &Row) -> Result<AdCampaign, DatabaseError> {
    let status: String = row.get("status");
    let metadata: Value = row.get("metadata");

    Ok(AdCampaign {
        id: row.get("id"),
        campaign_id: row.get("campaign_id"),
        status: AdCampaignStatus::from_str(&status).map_err(DatabaseError::InvalidData)?,
        budget: row.get("budget"),
        external_campaign_id: row.get("external_campaign_id"),
        external_adset_id: row.get("external_adset_id"),
        external_ad_id: row.get("external_ad_id"),
        metadata: AdCampaignMetadata::from(metadata),
        provisioning_started_at: row.get("provisioning_started_at"),
    })
}

fn post_from_row(row: &Row) -> Result<CampaignPost, DatabaseError> {
    let status: String = row.get("status");
    let metrics: Value = row.get("metrics");

    Ok(CampaignPost {
        id: row.get("id"),
        campaign_id: row.get("campaign_id"),
        platform: row.get("platform"),
        content: row.get("content"),
        image_url: row.get("image_url"),
        status: PostStatus::from_str(&status).map_err(DatabaseError::InvalidData)?,
        metadata: row.get("metadata"),
        metrics: PostMetrics::from(metrics),
        created_at: row.get("created_at"),
    })
}

#[async_trait]
impl AdStore for Database {
    async fn get_campaign(&self, campaign_id: i32) -> Result<Option<Campaign>, DatabaseError> {
        let row = self
            .client
            .query_opt(
                "SELECT id, user_id, name FROM campaigns WHERE id = $1",
                &[&campaign_id],
            )
            .await?;

        Ok(row.map(|row| Campaign {
            id: row.get(0),
            user_id: row.get(1),
            name: row.get(2),
        }))
    }

    async fn get_ad_campaign(
        &self,
        ad_campaign_id: i32,
    ) -> Result<Option<AdCampaign>, DatabaseError> {
        let query = format!("SELECT {AD_CAMPAIGN_COLUMNS} FROM ad_campaigns WHERE id = $1");
        self.client
            .query_opt(query.as_str(), &[&ad_campaign_id])
            .await?
            .as_ref()
            .map(ad_campaign_from_row)
            .transpose()
    }

    async fn upsert_draft_ad_campaign(
        &self,
        campaign_id: i32,
        budget: f64,
        metadata: &AdCampaignMetadata,
    ) -> Result<Option<AdCampaign>, DatabaseError> {
        let metadata = serde_json::to_value(metadata)
            .map_err(|e| DatabaseError::InvalidData(e.to_string()))?;
        // Steps built from budget or targeting are dropped from the ledger
        // when either changes, so a retry recreates them with the new values.
        let stale_steps: Vec<&str> = ProvisioningStep::AdSet
            .and_later()
            .iter()
            .map(|step| step.as_str())
            .collect();
        let query = format!(
            "WITH previous AS (
                SELECT id, budget::float8 AS budget, metadata
                FROM ad_campaigns
                WHERE campaign_id = $1 AND status = 'draft'
             ), upserted AS (
                INSERT INTO ad_campaigns (campaign_id, status, budget, metadata)
                VALUES ($1, 'draft', $2::float8, $3)
                ON CONFLICT (campaign_id) DO UPDATE
                   SET budget = EXCLUDED.budget, metadata = EXCLUDED.metadata, updated_at = NOW()
                   WHERE ad_campaigns.status = 'draft'
                RETURNING *
             ), reset AS (
                DELETE FROM ad_provisioning_steps s
                USING previous p
                WHERE s.ad_campaign_id = p.id
                  AND s.step = ANY($4)
                  AND (p.budget IS DISTINCT FROM $2::float8 OR p.metadata IS DISTINCT FROM $3)
                  AND EXISTS (SELECT 1 FROM upserted)
             )
             SELECT {AD_CAMPAIGN_COLUMNS} FROM upserted"
        );

        self.client
            .query_opt(
                query.as_str(),
                &[&campaign_id, &budget, &metadata, &stale_steps],
            )
            .await?
            .as_ref()
            .map(ad_campaign_from_row)
            .transpose()
    }

    async fn list_posts(&self, campaign_id: i32) -> Result<Vec<CampaignPost>, DatabaseError> {
        let query = format!(
            "SELECT {POST_COLUMNS} FROM campaign_posts
             WHERE campaign_id = $1
             ORDER BY created_at, id"
        );
        let rows = self.client.query(query.as_str(), &[&campaign_id]).await?;
        rows.iter().map(post_from_row).collect()
    }

    async fn get_post(&self, post_id: i32) -> Result<Option<CampaignPost>, DatabaseError> {
        let query = format!("SELECT {POST_COLUMNS} FROM campaign_posts WHERE id = $1");
        self.client
            .query_opt(query.as_str(), &[&post_id])
            .await?
            .as_ref()
            .map(post_from_row)
            .transpose()
    }

    async fn find_credential(
        &self,
        user_id: i32,
        provider: &str,
    ) -> Result<Option<ConnectedAccount>, DatabaseError> {
        let row = self
            .client
            .query_opt(
                "SELECT id, user_id, provider, access_token, expires_at
                 FROM connected_accounts
                 WHERE user_id = $1 AND provider = $2
                 ORDER BY created_at, id
                 LIMIT 1",
                &[&user_id, &provider],
            )
            .await?;

        Ok(row.map(|row| ConnectedAccount {
            id: row.get(0),
            user_id: row.get(1),
            provider: row.get(2),
            access_token: row.get(3),
            expires_at: row.get(4),
        }))
    }

    async fn try_acquire_provisioning(
        &self,
        ad_campaign_id: i32,
        lease: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let updated = self
            .client
            .execute(
                "UPDATE ad_campaigns
                 SET status = 'provisioning', provisioning_started_at = $2, updated_at = NOW()
                 WHERE id = $1
                   AND (status = 'draft'
                        OR (status = 'provisioning'
                            AND (provisioning_started_at IS NULL OR provisioning_started_at < $3)))",
                &[&ad_campaign_id, &lease, &stale_before],
            )
            .await?;

        Ok(updated == 1)
    }

    async fn release_provisioning(
        &self,
        ad_campaign_id: i32,
        lease: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.client
            .execute(
                "UPDATE ad_campaigns
                 SET status = 'draft', provisioning_started_at = NULL, updated_at = NOW()
                 WHERE id = $1 AND status = 'provisioning' AND provisioning_started_at = $2",
                &[&ad_campaign_id, &lease],
            )
            .await?;
        Ok(())
    }

    async fn load_ledger(&self, ad_campaign_id: i32) -> Result<ProvisioningLedger, DatabaseError> {
        let rows = self
            .client
            .query(
                "SELECT step, external_id FROM ad_provisioning_steps WHERE ad_campaign_id = $1",
                &[&ad_campaign_id],
            )
            .await?;

        let mut ledger = ProvisioningLedger::default();
        for row in rows {
            let step: String = row.get(0);
            let step = ProvisioningStep::from_str(&step).map_err(DatabaseError::InvalidData)?;
            ledger.set(step, row.get(1));
        }
        Ok(ledger)
    }

    async fn record_step(
        &self,
        ad_campaign_id: i32,
        step: ProvisioningStep,
        external_id: &str,
    ) -> Result<(), DatabaseError> {
        self.client
            .execute(
                "INSERT INTO ad_provisioning_steps (ad_campaign_id, step, external_id)
                 VALUES ($1, $2, $3)
                 ON CONFLICT (ad_campaign_id, step) DO UPDATE SET external_id = EXCLUDED.external_id",
                &[&ad_campaign_id, &step.as_str(), &external_id],
            )
            .await?;
        Ok(())
    }

    async fn complete_provisioning(
        &self,
        ad_campaign_id: i32,
        lease: DateTime<Utc>,
        ids: &ExternalIds,
    ) -> Result<bool, DatabaseError> {
        let row = self
            .client
            .query_one(
                "WITH done AS (
                    UPDATE ad_campaigns
                    SET external_campaign_id = $2,
                        external_adset_id = $3,
                        external_ad_id = $4,
                        status = 'active',
                        provisioning_started_at = NULL,
                        updated_at = NOW()
                    WHERE id = $1 AND status = 'provisioning' AND provisioning_started_at = $5
                    RETURNING id
                 ), cleared AS (
                    DELETE FROM ad_provisioning_steps
                    WHERE ad_campaign_id IN (SELECT id FROM done)
                 )
                 SELECT COUNT(*) FROM done",
                &[&ad_campaign_id, &ids.campaign_id, &ids.adset_id, &ids.ad_id, &lease],
            )
            .await?;

        let completed: i64 = row.get(0);
        Ok(completed == 1)
    }

    async fn update_post_metrics(
        &self,
        post_id: i32,
        metrics: &PostMetrics,
    ) -> Result<(), DatabaseError> {
        let metrics = serde_json::to_value(metrics)
            .map_err(|e| DatabaseError::InvalidData(e.to_string()))?;
        self.client
            .execute(
                "UPDATE campaign_posts SET metrics = $2 WHERE id = $1",
                &[&post_id, &metrics],
            )
            .await?;
        Ok(())
    }
}
