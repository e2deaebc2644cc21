//! Low-stock alert recording and webhook delivery
//!
//! Alerts are fire-and-forget: the stock adjustment that triggered one has
//! already committed by the time dispatch runs, and a delivery failure is
//! logged and swallowed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use shared::StockableRef;

use crate::config::AlertConfig;
use crate::error::AppResult;

/// Alert service for low-stock notifications
#[derive(Clone)]
pub struct AlertService {
    db: PgPool,
    http_client: reqwest::Client,
    enabled: bool,
    webhook_url: Option<String>,
}

/// A stockable crossing its low-stock threshold
#[derive(Debug, Clone, Serialize)]
pub struct LowStockEvent {
    pub stockable: StockableRef,
    pub name: String,
    pub quantity: i64,
    pub threshold: i64,
}

/// Persisted low-stock alert record
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct LowStockAlert {
    pub id: Uuid,
    pub stockable_type: String,
    pub stockable_id: Uuid,
    pub name: String,
    pub quantity: i64,
    pub threshold: i64,
    pub created_at: DateTime<Utc>,
}

impl AlertService {
    /// Create a new AlertService instance
    pub fn new(db: PgPool, config: &AlertConfig) -> Self {
        Self {
            db,
            http_client: reqwest::Client::new(),
            enabled: config.enabled,
            webhook_url: config.webhook_url.clone(),
        }
    }

    /// Record a low-stock event and notify the configured webhook.
    ///
    /// Never returns an error: the triggering stock adjustment must not be
    /// affected by alert delivery.
    pub async fn notify_low_stock(&self, event: LowStockEvent) {
        if !self.enabled {
            return;
        }

        if let Err(e) = self.record(&event).await {
            tracing::warn!("Failed to record low-stock alert for {}: {}", event.stockable, e);
        }

        if let Some(url) = &self.webhook_url {
            let result = self
                .http_client
                .post(url)
                .json(&event)
                .send()
                .await
                .and_then(|resp| resp.error_for_status());
            if let Err(e) = result {
                tracing::warn!(
                    "Low-stock webhook delivery failed for {}: {}",
                    event.stockable,
                    e
                );
            }
        }

        tracing::info!(
            "Low stock: {} ({}) at {} (threshold {})",
            event.name,
            event.stockable,
            event.quantity,
            event.threshold
        );
    }

    async fn record(&self, event: &LowStockEvent) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO low_stock_alerts (stockable_type, stockable_id, name, quantity, threshold)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(event.stockable.kind.as_str())
        .bind(event.stockable.id)
        .bind(&event.name)
        .bind(event.quantity)
        .bind(event.threshold)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    /// List recent low-stock alerts, newest first
    pub async fn list_recent(&self, limit: i64) -> AppResult<Vec<LowStockAlert>> {
        let alerts = sqlx::query_as::<_, LowStockAlert>(
            r#"
            SELECT id, stockable_type, stockable_id, name, quantity, threshold, created_at
            FROM low_stock_alerts
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.db)
        .await?;
        Ok(alerts)
    }
}
