//! Saved addresses per user

use crate::db::repositories::{is_unique_violation, AddressRepository, BatchOutcome};
use crate::models::{Address, AddressType, CreateAddressInput, UpdateAddressInput};
use crate::services::error::{ServiceError, ServiceResult};
use anyhow::Context;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

const DUPLICATE_LABEL: &str = "An address with this label already exists";

#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub index: usize,
    pub action: &'static str,
    pub address: Address,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchError {
    pub index: usize,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub results: Vec<BatchResult>,
    pub errors: Vec<BatchError>,
}

pub struct AddressService {
    repo: Arc<dyn AddressRepository>,
}

fn map_write_error(err: anyhow::Error, what: &str) -> ServiceError {
    if is_unique_violation(&err) {
        ServiceError::validation(DUPLICATE_LABEL)
    } else {
        ServiceError::InternalError(err.context(format!("Failed to {} address", what)))
    }
}

impl AddressService {
    pub fn new(repo: Arc<dyn AddressRepository>) -> Self {
        Self { repo }
    }

    pub async fn list(&self, user_id: i64) -> ServiceResult<Vec<Address>> {
        Ok(self.repo.list(user_id).await.context("Failed to list addresses")?)
    }

    pub async fn primary(&self, user_id: i64) -> ServiceResult<HashMap<AddressType, Address>> {
        Ok(self
            .repo
            .primary_by_type(user_id)
            .await
            .context("Failed to load primary addresses")?)
    }

    pub async fn get(&self, user_id: i64, id: i64) -> ServiceResult<Address> {
        self.repo
            .get(user_id, id)
            .await
            .context("Failed to get address")?
            .ok_or_else(|| ServiceError::not_found("Address"))
    }

    pub async fn create(&self, user_id: i64, input: CreateAddressInput) -> ServiceResult<Address> {
        if input.label.trim().is_empty() || input.address.trim().is_empty() {
            return Err(ServiceError::validation("Label and address are required"));
        }
        self.repo
            .create(user_id, &input)
            .await
            .map_err(|e| map_write_error(e, "create"))
    }

    /// Omitted fields keep their stored values
    pub async fn update(&self, user_id: i64, id: i64, input: UpdateAddressInput) -> ServiceResult<Address> {
        let mut address = self.get(user_id, id).await?;

        if let Some(label) = input.label.filter(|l| !l.trim().is_empty()) {
            address.label = label;
        }
        if let Some(text) = input.address.filter(|a| !a.trim().is_empty()) {
            address.address = text;
        }
        if let Some(address_type) = input.address_type {
            address.address_type = address_type;
        }
        if let Some(is_primary) = input.is_primary {
            address.is_primary = is_primary;
        }
        if input.notes.is_some() {
            address.notes = input.notes;
        }
        address.updated_at = Utc::now();

        self.repo
            .update(&address)
            .await
            .map_err(|e| map_write_error(e, "update"))?;
        Ok(address)
    }

    pub async fn delete(&self, user_id: i64, id: i64) -> ServiceResult<()> {
        if !self
            .repo
            .delete(user_id, id)
            .await
            .context("Failed to delete address")?
        {
            return Err(ServiceError::not_found("Address"));
        }
        Ok(())
    }

    pub async fn batch(&self, user_id: i64, inputs: Vec<CreateAddressInput>) -> ServiceResult<BatchReport> {
        if inputs.is_empty() {
            return Err(ServiceError::validation("Addresses array is required"));
        }
        let outcomes = self
            .repo
            .upsert_batch(user_id, &inputs)
            .await
            .context("Failed to save addresses")?;

        let mut report = BatchReport::default();
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                BatchOutcome::Created(address) => report.results.push(BatchResult {
                    index,
                    action: "created",
                    address,
                }),
                BatchOutcome::Updated(address) => report.results.push(BatchResult {
                    index,
                    action: "updated",
                    address,
                }),
                BatchOutcome::Failed(error) => report.errors.push(BatchError { index, error }),
            }
        }
        tracing::info!(
            user_id,
            saved = report.results.len(),
            failed = report.errors.len(),
            "Address batch saved"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::user::tests::new_user;
    use crate::db::repositories::{SqlxAddressRepository, SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_service() -> (AddressService, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let user = SqlxUserRepository::new(pool.clone())
            .create(&new_user("homebody"))
            .await
            .unwrap();
        (AddressService::new(SqlxAddressRepository::boxed(pool)), user.id)
    }

    fn input(label: &str, address_type: AddressType, primary: bool) -> CreateAddressInput {
        CreateAddressInput {
            label: label.to_string(),
            address: format!("{} street 1", label),
            address_type: Some(address_type),
            is_primary: primary,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_duplicate_label_rejected() {
        let (service, user) = setup_test_service().await;
        service.create(user, input("Home", AddressType::Home, true)).await.unwrap();

        match service.create(user, input("Home", AddressType::Home, false)).await {
            Err(ServiceError::ValidationError(msg)) => assert_eq!(msg, DUPLICATE_LABEL),
            other => panic!("expected validation error, got {:?}", other.map(|a| a.id)),
        }
    }

    #[tokio::test]
    async fn test_update_keeps_omitted_fields_and_moves_primary() {
        let (service, user) = setup_test_service().await;
        let first = service.create(user, input("Office", AddressType::Work, true)).await.unwrap();
        let second = service.create(user, input("Cowork", AddressType::Work, false)).await.unwrap();

        let updated = service
            .update(
                user,
                second.id,
                UpdateAddressInput {
                    is_primary: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.label, "Cowork");
        assert_eq!(updated.address, second.address);

        let primaries = service.primary(user).await.unwrap();
        assert_eq!(primaries[&AddressType::Work].id, second.id);
        assert!(!service.get(user, first.id).await.unwrap().is_primary);
    }

    #[tokio::test]
    async fn test_batch_reports_errors_by_index() {
        let (service, user) = setup_test_service().await;
        service.create(user, input("School", AddressType::School, false)).await.unwrap();

        let mut blank = input("", AddressType::Other, false);
        blank.address = String::new();
        let report = service
            .batch(
                user,
                vec![input("School", AddressType::School, true), blank, input("Gym", AddressType::Other, false)],
            )
            .await
            .unwrap();

        assert_eq!(report.results.len(), 2);
        assert_eq!(report.results[0].action, "updated");
        assert_eq!(report.results[1].action, "created");
        assert_eq!(report.errors[0].index, 1);
        assert_eq!(service.list(user).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let (service, user) = setup_test_service().await;
        assert!(matches!(service.delete(user, 1).await, Err(ServiceError::NotFound(_))));
    }
}
