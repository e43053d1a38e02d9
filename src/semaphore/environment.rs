//! Project environment resource handler.
//!
//! Each operation is one write (or none), one read-back, and a merge that puts
//! the locally known secret values back into the server's view.

use tracing::{debug, info};

use crate::error::{ImportError, PlanError, ReconcileError, ResourceOperation, Result};
use crate::model::{EnvironmentRecord, merge_response, parse_import_id};
use crate::planner::SecretDiffEngine;

use super::api::EnvironmentApi;
use super::types::EnvironmentRequest;

/// Resource kind used in error context.
pub const RESOURCE_KIND: &str = "project environment";

/// Fields of an environment import identifier, in order.
pub const IMPORT_LABELS: &[&str] = &["project", "environment"];

/// Create, read, update, delete and import for project environments.
#[derive(Debug)]
pub struct EnvironmentResource<A> {
    api: A,
    differ: SecretDiffEngine,
}

impl<A: EnvironmentApi> EnvironmentResource<A> {
    /// Creates a handler backed by the given API.
    #[must_use]
    pub const fn new(api: A) -> Self {
        Self {
            api,
            differ: SecretDiffEngine::new(),
        }
    }

    /// Creates the environment and all its secrets.
    ///
    /// # Errors
    ///
    /// Returns an error if the secret list is invalid or an API call fails.
    pub async fn create(&self, desired: &EnvironmentRecord) -> Result<EnvironmentRecord> {
        let wrap = |e| ReconcileError::operation(RESOURCE_KIND, ResourceOperation::Create, e);

        let operations = self.differ.diff(desired.secret_list(), &[])?;
        let mut request = EnvironmentRequest::from_record(desired, &operations);
        request.id = None;

        info!(
            "Creating environment '{}' in project {} with {} secrets",
            desired.name,
            desired.project_identity,
            operations.len()
        );
        let created = self.api.create_environment(&request).await.map_err(wrap)?;
        let fetched = self
            .api
            .get_environment(created.project_id, created.id)
            .await
            .map_err(wrap)?;

        debug!("Environment '{}' created with id {}", fetched.name, fetched.id);
        Ok(merge_response(&fetched, desired))
    }

    /// Reads the environment and merges it with the persisted record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record has no identity or the API call fails.
    pub async fn read(&self, current: &EnvironmentRecord) -> Result<EnvironmentRecord> {
        let wrap = |e| ReconcileError::operation(RESOURCE_KIND, ResourceOperation::Read, e);

        let identity = require_identity(current)?;
        debug!("Reading environment {identity} in project {}", current.project_identity);

        let fetched = self
            .api
            .get_environment(current.project_identity, identity)
            .await
            .map_err(wrap)?;
        Ok(merge_response(&fetched, current))
    }

    /// Applies the desired record over the current one.
    ///
    /// Secrets are patched: only the operations computed against
    /// `current` are sent.
    ///
    /// # Errors
    ///
    /// Returns an error if the current record has no identity, the secret list
    /// is invalid, or an API call fails.
    pub async fn update(
        &self,
        desired: &EnvironmentRecord,
        current: &EnvironmentRecord,
    ) -> Result<EnvironmentRecord> {
        let wrap = |e| ReconcileError::operation(RESOURCE_KIND, ResourceOperation::Update, e);

        let identity = require_identity(current)?;
        let operations = self.differ.diff(desired.secret_list(), current.secret_list())?;
        let mut request = EnvironmentRequest::from_record(desired, &operations);
        request.id = Some(identity);

        info!(
            "Updating environment '{}' ({identity}) with {} secret operations",
            desired.name,
            operations.len()
        );
        self.api
            .update_environment(identity, &request)
            .await
            .map_err(wrap)?;
        let fetched = self
            .api
            .get_environment(request.project_id, identity)
            .await
            .map_err(wrap)?;

        Ok(merge_response(&fetched, desired))
    }

    /// Deletes the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the record has no identity or the API call fails.
    pub async fn delete(&self, current: &EnvironmentRecord) -> Result<()> {
        let identity = require_identity(current)?;

        info!("Deleting environment '{}' ({identity})", current.name);
        self.api
            .delete_environment(current.project_identity, identity)
            .await
            .map_err(|e| ReconcileError::operation(RESOURCE_KIND, ResourceOperation::Delete, e))?;
        Ok(())
    }

    /// Adopts an existing environment given a `project/environment` identifier.
    ///
    /// Secret values cannot be read back and are imported as empty strings.
    ///
    /// # Errors
    ///
    /// Returns an error if the identifier is malformed or the API call fails.
    pub async fn import(&self, raw_id: &str) -> Result<EnvironmentRecord> {
        let fields = parse_import_id(raw_id, IMPORT_LABELS)?;
        let (Some(project_id), Some(environment_id)) =
            (fields.get(IMPORT_LABELS[0]), fields.get(IMPORT_LABELS[1]))
        else {
            return Err(ImportError::malformed(raw_id, "", IMPORT_LABELS).into());
        };

        info!("Importing environment {environment_id} from project {project_id}");
        let fetched = self
            .api
            .get_environment(project_id, environment_id)
            .await
            .map_err(|e| ReconcileError::operation(RESOURCE_KIND, ResourceOperation::Import, e))?;

        Ok(merge_response(&fetched, &EnvironmentRecord::empty()))
    }
}

fn require_identity(record: &EnvironmentRecord) -> std::result::Result<i64, PlanError> {
    record.identity.ok_or_else(|| PlanError::MissingIdentity {
        name: record.name.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ApiError, ProviderError};
    use crate::model::{Attr, SecretEntry, SecretKind, VarMap};
    use crate::planner::SecretAction;
    use crate::semaphore::api::MockEnvironmentApi;
    use crate::semaphore::types::{Environment, EnvironmentSecret};
    use mockall::predicate::eq;

    fn server_env(secrets: Vec<EnvironmentSecret>) -> Environment {
        Environment {
            id: 7,
            project_id: 1,
            name: String::from("staging"),
            json: String::from(r#"{"region":"eu"}"#),
            env: String::from("{}"),
            secrets,
        }
    }

    fn wire(id: i64, name: &str) -> EnvironmentSecret {
        EnvironmentSecret {
            id,
            name: name.to_string(),
            kind: SecretKind::EnvVar,
        }
    }

    fn desired() -> EnvironmentRecord {
        let mut record = EnvironmentRecord::new(1, "staging");
        record.generic_variables = Attr::Value(VarMap::from([(
            String::from("region"),
            String::from("eu"),
        )]));
        record.secrets = Attr::Value(vec![SecretEntry::new("TOKEN", SecretKind::EnvVar, "abc")]);
        record
    }

    #[tokio::test]
    async fn test_create_reads_back_and_keeps_values() {
        let mut api = MockEnvironmentApi::new();
        api.expect_create_environment()
            .withf(|req| {
                req.id.is_none()
                    && req.secrets.len() == 1
                    && req.secrets[0].operation == SecretAction::Create
                    && req.secrets[0].secret.as_deref() == Some("abc")
            })
            .times(1)
            .returning(|_| Ok(server_env(vec![])));
        api.expect_get_environment()
            .with(eq(1), eq(7))
            .times(1)
            .returning(|_, _| Ok(server_env(vec![wire(3, "TOKEN")])));

        let record = EnvironmentResource::new(api).create(&desired()).await.unwrap();

        assert_eq!(record.identity, Some(7));
        let secret = record.secret(3).unwrap();
        assert_eq!(secret.value, "abc");
        assert_eq!(record.runtime_variables, Attr::Null);
        assert!(matches!(record.generic_variables, Attr::Value(ref m) if m["region"] == "eu"));
    }

    #[tokio::test]
    async fn test_failed_read_back_is_an_error() {
        let mut api = MockEnvironmentApi::new();
        api.expect_create_environment()
            .returning(|_| Ok(server_env(vec![])));
        api.expect_get_environment().returning(|_, _| {
            Err(ApiError::NetworkError {
                message: String::from("reset"),
            }
            .into())
        });

        let err = EnvironmentResource::new(api).create(&desired()).await.unwrap_err();
        assert!(err.to_string().starts_with("Reconciliation error: Could not create project environment"));
    }

    #[tokio::test]
    async fn test_update_sends_only_changes() {
        let mut current = desired();
        current.identity = Some(7);
        current.secrets = Attr::Value(vec![
            SecretEntry::new("TOKEN", SecretKind::EnvVar, "abc").with_identity(3),
            SecretEntry::new("OLD", SecretKind::EnvVar, "x").with_identity(4),
        ]);

        let mut wanted = current.clone();
        wanted.secrets = Attr::Value(vec![
            SecretEntry::new("TOKEN", SecretKind::EnvVar, "rotated").with_identity(3),
        ]);

        let mut api = MockEnvironmentApi::new();
        api.expect_update_environment()
            .withf(|id, req| {
                *id == 7
                    && req.id == Some(7)
                    && req.secrets.len() == 2
                    && req.secrets[0].operation == SecretAction::Update
                    && req.secrets[0].name.is_none()
                    && req.secrets[1].operation == SecretAction::Delete
                    && req.secrets[1].id == Some(4)
            })
            .times(1)
            .returning(|_, _| Ok(()));
        api.expect_get_environment()
            .returning(|_, _| Ok(server_env(vec![wire(3, "TOKEN")])));

        let record = EnvironmentResource::new(api)
            .update(&wanted, &current)
            .await
            .unwrap();

        assert_eq!(record.secret_list().len(), 1);
        assert_eq!(record.secret(3).unwrap().value, "rotated");
    }

    #[tokio::test]
    async fn test_update_without_identity_is_rejected() {
        let api = MockEnvironmentApi::new();
        let err = EnvironmentResource::new(api)
            .update(&desired(), &desired())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Plan(PlanError::MissingIdentity { .. })
        ));
    }

    #[tokio::test]
    async fn test_read_merges_with_state() {
        let mut current = desired();
        current.identity = Some(7);
        current.secrets = Attr::Value(vec![
            SecretEntry::new("TOKEN", SecretKind::EnvVar, "abc").with_identity(3),
        ]);

        let mut api = MockEnvironmentApi::new();
        api.expect_get_environment()
            .with(eq(1), eq(7))
            .returning(|_, _| Ok(server_env(vec![wire(3, "TOKEN")])));

        let record = EnvironmentResource::new(api).read(&current).await.unwrap();
        assert_eq!(record, current);
    }

    #[tokio::test]
    async fn test_read_not_found_keeps_classification() {
        let mut current = desired();
        current.identity = Some(7);

        let mut api = MockEnvironmentApi::new();
        api.expect_get_environment().returning(|_, _| {
            Err(ApiError::NotFound {
                path: String::from("/project/1/environment/7"),
            }
            .into())
        });

        let err = EnvironmentResource::new(api).read(&current).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete() {
        let mut current = desired();
        current.identity = Some(7);

        let mut api = MockEnvironmentApi::new();
        api.expect_delete_environment()
            .with(eq(1), eq(7))
            .times(1)
            .returning(|_, _| Ok(()));

        EnvironmentResource::new(api).delete(&current).await.unwrap();
    }

    #[tokio::test]
    async fn test_import_has_empty_secret_values() {
        let mut api = MockEnvironmentApi::new();
        api.expect_get_environment()
            .with(eq(1), eq(7))
            .times(1)
            .returning(|_, _| Ok(server_env(vec![wire(3, "TOKEN")])));

        let record = EnvironmentResource::new(api).import("1/7").await.unwrap();
        assert_eq!(record.identity, Some(7));
        assert_eq!(record.secret(3).unwrap().value, "");
        assert_eq!(record.runtime_variables, Attr::Null);
    }

    #[tokio::test]
    async fn test_import_rejects_malformed_id_before_calling_api() {
        let api = MockEnvironmentApi::new();
        let err = EnvironmentResource::new(api).import("abc/7").await.unwrap_err();
        assert!(matches!(err, ProviderError::Import(_)));
    }
}
