//! Saved address repository

use crate::db::DynDatabasePool;
use crate::models::{Address, AddressType, CreateAddressInput};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use std::collections::HashMap;
use std::sync::Arc;

/// Outcome of one entry of a batch upsert
#[derive(Debug, Clone)]
pub enum BatchOutcome {
    Created(Address),
    Updated(Address),
    Failed(String),
}

#[async_trait]
pub trait AddressRepository: Send + Sync {
    /// Primary addresses first, then by type and label
    async fn list(&self, user_id: i64) -> Result<Vec<Address>>;

    /// Primary address per type
    async fn primary_by_type(&self, user_id: i64) -> Result<HashMap<AddressType, Address>>;

    async fn get(&self, user_id: i64, id: i64) -> Result<Option<Address>>;

    /// Insert an address; a primary one demotes the other primaries of its type
    async fn create(&self, user_id: i64, input: &CreateAddressInput) -> Result<Address>;

    /// Overwrite every field of `address`, with the same primary rule as `create`
    async fn update(&self, address: &Address) -> Result<()>;

    async fn delete(&self, user_id: i64, id: i64) -> Result<bool>;

    /// Upsert by label inside one transaction
    async fn upsert_batch(
        &self,
        user_id: i64,
        inputs: &[CreateAddressInput],
    ) -> Result<Vec<BatchOutcome>>;
}

pub struct SqlxAddressRepository {
    pool: DynDatabasePool,
}

impl SqlxAddressRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn AddressRepository> {
        Arc::new(Self::new(pool))
    }
}

async fn demote_primaries(
    conn: &mut SqliteConnection,
    user_id: i64,
    address_type: AddressType,
) -> Result<()> {
    sqlx::query("UPDATE family_addresses SET is_primary = 0 WHERE user_id = ? AND type = ?")
        .bind(user_id)
        .bind(address_type.as_str())
        .execute(conn)
        .await
        .context("Failed to clear primary addresses")?;
    Ok(())
}

async fn fetch_one(conn: &mut SqliteConnection, id: i64) -> Result<Address> {
    let row = sqlx::query("SELECT * FROM family_addresses WHERE id = ?")
        .bind(id)
        .fetch_one(conn)
        .await
        .context("Failed to reload address")?;
    Ok(row_to_address(&row))
}

async fn insert(conn: &mut SqliteConnection, user_id: i64, input: &CreateAddressInput) -> Result<i64> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO family_addresses (user_id, label, address, type, is_primary, notes,
                                      created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(&input.label)
    .bind(&input.address)
    .bind(input.address_type.unwrap_or_default().as_str())
    .bind(input.is_primary)
    .bind(&input.notes)
    .bind(now)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(result.last_insert_rowid())
}

#[async_trait]
impl AddressRepository for SqlxAddressRepository {
    async fn list(&self, user_id: i64) -> Result<Vec<Address>> {
        let rows = sqlx::query(
            "SELECT * FROM family_addresses WHERE user_id = ? ORDER BY is_primary DESC, type, label",
        )
        .bind(user_id)
        .fetch_all(self.pool.sqlite())
        .await
        .context("Failed to list addresses")?;

        Ok(rows.iter().map(row_to_address).collect())
    }

    async fn primary_by_type(&self, user_id: i64) -> Result<HashMap<AddressType, Address>> {
        let rows = sqlx::query("SELECT * FROM family_addresses WHERE user_id = ? AND is_primary = 1")
            .bind(user_id)
            .fetch_all(self.pool.sqlite())
            .await
            .context("Failed to list primary addresses")?;

        Ok(rows
            .iter()
            .map(row_to_address)
            .map(|a| (a.address_type, a))
            .collect())
    }

    async fn get(&self, user_id: i64, id: i64) -> Result<Option<Address>> {
        let row = sqlx::query("SELECT * FROM family_addresses WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .fetch_optional(self.pool.sqlite())
            .await
            .context("Failed to get address")?;

        Ok(row.as_ref().map(row_to_address))
    }

    async fn create(&self, user_id: i64, input: &CreateAddressInput) -> Result<Address> {
        let mut tx = self.pool.sqlite().begin().await?;
        if input.is_primary {
            demote_primaries(&mut tx, user_id, input.address_type.unwrap_or_default()).await?;
        }
        // Raw sqlx error is kept so callers can detect the label conflict.
        let id = insert(&mut tx, user_id, input).await?;
        let address = fetch_one(&mut tx, id).await?;
        tx.commit().await?;
        Ok(address)
    }

    async fn update(&self, address: &Address) -> Result<()> {
        let mut tx = self.pool.sqlite().begin().await?;
        if address.is_primary {
            demote_primaries(&mut tx, address.user_id, address.address_type).await?;
        }
        sqlx::query(
            r#"
            UPDATE family_addresses
            SET label = ?, address = ?, type = ?, is_primary = ?, notes = ?, updated_at = ?
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(&address.label)
        .bind(&address.address)
        .bind(address.address_type.as_str())
        .bind(address.is_primary)
        .bind(&address.notes)
        .bind(Utc::now())
        .bind(address.id)
        .bind(address.user_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, user_id: i64, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM family_addresses WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(self.pool.sqlite())
            .await
            .context("Failed to delete address")?;

        Ok(result.rows_affected() > 0)
    }

    async fn upsert_batch(
        &self,
        user_id: i64,
        inputs: &[CreateAddressInput],
    ) -> Result<Vec<BatchOutcome>> {
        let mut tx = self.pool.sqlite().begin().await?;
        let mut outcomes = Vec::with_capacity(inputs.len());

        for input in inputs {
            if input.label.trim().is_empty() || input.address.trim().is_empty() {
                outcomes.push(BatchOutcome::Failed(
                    "Label and address are required".to_string(),
                ));
                continue;
            }

            let address_type = input.address_type.unwrap_or_default();
            if input.is_primary {
                demote_primaries(&mut tx, user_id, address_type).await?;
            }

            let existing: Option<i64> =
                sqlx::query_scalar("SELECT id FROM family_addresses WHERE user_id = ? AND label = ?")
                    .bind(user_id)
                    .bind(&input.label)
                    .fetch_optional(&mut *tx)
                    .await?;

            let outcome = match existing {
                Some(id) => {
                    let updated = sqlx::query(
                        r#"
                        UPDATE family_addresses
                        SET address = ?, type = ?, is_primary = ?, notes = ?, updated_at = ?
                        WHERE id = ?
                        "#,
                    )
                    .bind(&input.address)
                    .bind(address_type.as_str())
                    .bind(input.is_primary)
                    .bind(&input.notes)
                    .bind(Utc::now())
                    .bind(id)
                    .execute(&mut *tx)
                    .await;
                    match updated {
                        Ok(_) => BatchOutcome::Updated(fetch_one(&mut tx, id).await?),
                        Err(e) => BatchOutcome::Failed(e.to_string()),
                    }
                }
                None => match insert(&mut tx, user_id, input).await {
                    Ok(id) => BatchOutcome::Created(fetch_one(&mut tx, id).await?),
                    Err(e) => BatchOutcome::Failed(e.to_string()),
                },
            };
            outcomes.push(outcome);
        }

        tx.commit().await.context("Failed to commit address batch")?;
        Ok(outcomes)
    }
}

fn row_to_address(row: &SqliteRow) -> Address {
    let address_type: String = row.get("type");

    Address {
        id: row.get("id"),
        user_id: row.get("user_id"),
        label: row.get("label"),
        address: row.get("address"),
        address_type: address_type.parse().unwrap_or_default(),
        is_primary: row.get("is_primary"),
        notes: row.get("notes"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
