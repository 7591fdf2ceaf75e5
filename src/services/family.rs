//! Family member service

use crate::db::repositories::FamilyMemberRepository;
use crate::models::{CreateFamilyMemberInput, FamilyMember, UpdateFamilyMemberInput};
use crate::services::error::{ServiceError, ServiceResult};
use anyhow::Context;
use std::sync::Arc;

pub struct FamilyService {
    repo: Arc<dyn FamilyMemberRepository>,
}

impl FamilyService {
    pub fn new(repo: Arc<dyn FamilyMemberRepository>) -> Self {
        Self { repo }
    }

    pub async fn list(&self) -> ServiceResult<Vec<FamilyMember>> {
        Ok(self.repo.list().await.context("Failed to list family members")?)
    }

    pub async fn create(&self, input: CreateFamilyMemberInput) -> ServiceResult<FamilyMember> {
        if input.name.trim().is_empty() {
            return Err(ServiceError::validation("Name is required"));
        }
        Ok(self
            .repo
            .create(&input)
            .await
            .context("Failed to create family member")?)
    }

    pub async fn update(
        &self,
        id: i64,
        input: UpdateFamilyMemberInput,
    ) -> ServiceResult<FamilyMember> {
        if input.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(ServiceError::validation("Name is required"));
        }
        self.repo
            .update(id, &input)
            .await
            .context("Failed to update family member")?
            .ok_or_else(|| ServiceError::not_found("Family member"))
    }

    pub async fn delete(&self, id: i64) -> ServiceResult<()> {
        if !self
            .repo
            .delete(id)
            .await
            .context("Failed to delete family member")?
        {
            return Err(ServiceError::not_found("Family member"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::SqlxFamilyMemberRepository;
    use crate::db::{create_test_pool, migrations};
    use crate::models::MemberType;

    async fn setup_test_service() -> FamilyService {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        FamilyService::new(SqlxFamilyMemberRepository::boxed(pool))
    }

    fn member(name: &str) -> CreateFamilyMemberInput {
        CreateFamilyMemberInput {
            name: name.to_string(),
            member_type: Some(MemberType::Child),
            birth_date: None,
            age: Some(8),
            avatar: None,
            color: None,
            dietary_preferences: None,
            health_goals: None,
        }
    }

    #[tokio::test]
    async fn test_name_is_required() {
        let service = setup_test_service().await;
        assert!(matches!(
            service.create(member(" ")).await,
            Err(ServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_member_lifecycle() {
        let service = setup_test_service().await;
        let mia = service.create(member("Mia")).await.unwrap();
        assert_eq!(mia.color, "#3B82F6");

        let renamed = service
            .update(
                mia.id,
                UpdateFamilyMemberInput {
                    name: Some("Mia Rose".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.name, "Mia Rose");

        service.delete(mia.id).await.unwrap();
        assert!(service.list().await.unwrap().is_empty());
        assert!(matches!(service.delete(mia.id).await, Err(ServiceError::NotFound(_))));
    }
}
