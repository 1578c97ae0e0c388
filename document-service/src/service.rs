use crate::{
    error::{Result, ServiceError},
    models::*,
    store::{DocumentStore, UserDirectory},
};
use chrono::Utc;
use document_authz::{AuthzError, ObjectRef, PermissionFacade, PermissionKind, Subject};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Document operations, each gated by the permission facade.
///
/// Permission is checked before the record is looked up, so a caller without
/// access cannot tell a missing document from a forbidden one.
pub struct DocumentService {
    documents: DocumentStore,
    users: UserDirectory,
    permissions: PermissionFacade,
}

impl DocumentService {
    pub fn new(permissions: PermissionFacade) -> Self {
        Self {
            documents: DocumentStore::new(),
            users: UserDirectory::new(),
            permissions,
        }
    }

    pub fn permissions(&self) -> &PermissionFacade {
        &self.permissions
    }

    /// # Errors
    ///
    /// `BadRequest` for blank usernames or emails, or a taken username.
    pub fn register_user(&self, username: &str, email: &str) -> Result<User> {
        let username = username.trim();
        let email = email.trim();
        if username.is_empty() || email.is_empty() {
            return Err(ServiceError::bad_request("username and email are required"));
        }
        if self.users.find_by_username(username).is_some() {
            return Err(ServiceError::bad_request(format!("username '{}' is taken", username)));
        }

        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: email.to_string(),
        };
        self.users.insert(user.clone());
        info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    /// Create a document owned by `caller`.
    ///
    /// Ownership is granted before the record is stored, so the document is
    /// never visible without an owner.
    ///
    /// # Errors
    ///
    /// `Unauthorized` for unknown callers, `BadRequest` for a blank name,
    /// `Authorization` if the owner tuple could not be written.
    pub async fn create_document(&self, caller: Uuid, draft: NewDocument) -> Result<Document> {
        self.require_user(caller)?;
        if draft.name.trim().is_empty() {
            return Err(ServiceError::bad_request("document name is required"));
        }

        let document = Document::new(caller, draft);
        self.permissions
            .grant_ownership(&Subject::from(caller), &ObjectRef::from(document.id))
            .await?;
        self.documents.insert(document.clone());

        info!(document_id = %document.id, owner = %caller, "Document created");
        Ok(document)
    }

    /// # Errors
    ///
    /// `Forbidden` without Read, `NotFound` if the record is gone.
    pub async fn get_document(&self, caller: Uuid, id: Uuid) -> Result<Document> {
        self.authorize(caller, id, PermissionKind::Read).await?;
        self.documents
            .get(id)
            .ok_or_else(|| ServiceError::not_found("document"))
    }

    /// Documents the caller can read, ordered by id.
    ///
    /// # Errors
    ///
    /// `Unauthorized` for unknown callers. A failing permission lookup yields
    /// an empty list rather than an error.
    pub async fn list_documents(&self, caller: Uuid) -> Result<Vec<Document>> {
        self.require_user(caller)?;

        let objects = self
            .permissions
            .accessible_objects(&Subject::from(caller), PermissionKind::Read)
            .await;

        Ok(objects
            .iter()
            .filter_map(|object| Uuid::parse_str(object.id()).ok())
            .filter_map(|id| self.documents.get(id))
            .collect())
    }

    /// # Errors
    ///
    /// `Forbidden` without Write, `BadRequest` for a blank name, `NotFound` if
    /// the record is gone.
    pub async fn update_document(
        &self,
        caller: Uuid,
        id: Uuid,
        update: DocumentUpdate,
    ) -> Result<Document> {
        self.authorize(caller, id, PermissionKind::Write).await?;
        if update.name.trim().is_empty() {
            return Err(ServiceError::bad_request("document name is required"));
        }

        let document = self
            .documents
            .update(id, |document| {
                document.name = update.name;
                document.content = update.content;
                document.modified_at = Utc::now();
            })
            .ok_or_else(|| ServiceError::not_found("document"))?;

        info!(document_id = %id, editor = %caller, "Document updated");
        Ok(document)
    }

    /// Delete a document and every grant on it.
    ///
    /// Grants are revoked first; if that fails nothing is removed and the
    /// call can be repeated. A second sweep after the record is gone catches
    /// grants written by a share that raced the first one.
    ///
    /// # Errors
    ///
    /// `Forbidden` without Delete, `Authorization` if the grants could not be
    /// removed, `NotFound` if the record is already gone.
    pub async fn delete_document(&self, caller: Uuid, id: Uuid) -> Result<()> {
        self.authorize(caller, id, PermissionKind::Delete).await?;
        if !self.documents.contains(id) {
            return Err(ServiceError::not_found("document"));
        }

        let object = ObjectRef::from(id);
        self.permissions.revoke_all(&object).await?;
        self.documents.remove(id);
        self.permissions.revoke_all(&object).await?;

        info!(document_id = %id, deleted_by = %caller, "Document deleted");
        Ok(())
    }

    /// # Errors
    ///
    /// `Forbidden` without Share, `NotFound` for a missing document,
    /// `BadRequest` for an unknown target or a kind that cannot be shared.
    pub async fn share_document(
        &self,
        caller: Uuid,
        id: Uuid,
        request: ShareRequest,
    ) -> Result<()> {
        self.authorize(caller, id, PermissionKind::Share).await?;
        if !self.documents.contains(id) {
            return Err(ServiceError::not_found("document"));
        }
        if !self.users.contains(request.target_user_id) {
            return Err(ServiceError::bad_request("Target user not found"));
        }

        let target = Subject::from(request.target_user_id);
        let object = ObjectRef::from(id);
        self.permissions
            .share_with(&target, &object, request.permission)
            .await
            .map_err(Self::grant_error)?;

        // The document may have been deleted while the grant was in flight
        if !self.documents.contains(id) {
            warn!(
                document_id = %id,
                target = %target,
                "Document deleted during share, withdrawing grant"
            );
            self.permissions.revoke(&target, &object, request.permission).await?;
            return Err(ServiceError::not_found("document"));
        }

        info!(
            document_id = %id,
            target = %request.target_user_id,
            permission = %request.permission,
            "Document shared"
        );
        Ok(())
    }

    /// # Errors
    ///
    /// `Forbidden` without Share, `BadRequest` for a kind that cannot be shared.
    pub async fn revoke_share(
        &self,
        caller: Uuid,
        id: Uuid,
        target: Uuid,
        permission: PermissionKind,
    ) -> Result<()> {
        self.authorize(caller, id, PermissionKind::Share).await?;

        self.permissions
            .revoke(&Subject::from(target), &ObjectRef::from(id), permission)
            .await
            .map_err(Self::grant_error)?;

        info!(document_id = %id, target = %target, permission = %permission, "Share revoked");
        Ok(())
    }

    /// Users holding `permission` on the document; visible to those who can share it.
    ///
    /// # Errors
    ///
    /// `Forbidden` without Share, `Authorization` if the lookup fails.
    pub async fn collaborators(
        &self,
        caller: Uuid,
        id: Uuid,
        permission: PermissionKind,
    ) -> Result<BTreeSet<Subject>> {
        self.authorize(caller, id, PermissionKind::Share).await?;
        Ok(self.permissions.collaborators(&ObjectRef::from(id), permission).await?)
    }

    fn require_user(&self, caller: Uuid) -> Result<()> {
        if self.users.contains(caller) {
            Ok(())
        } else {
            warn!(user_id = %caller, "Request from unknown user");
            Err(ServiceError::unauthorized(caller))
        }
    }

    async fn authorize(&self, caller: Uuid, id: Uuid, kind: PermissionKind) -> Result<()> {
        let decision = self
            .permissions
            .check_permission(&Subject::from(caller), &ObjectRef::from(id), kind)
            .await;

        if decision.is_allowed() {
            Ok(())
        } else {
            debug!(user_id = %caller, document_id = %id, permission = %kind, "Access denied");
            Err(ServiceError::Forbidden)
        }
    }

    fn grant_error(error: AuthzError) -> ServiceError {
        match error {
            AuthzError::InvalidGrantKind(kind) => {
                ServiceError::bad_request(format!("{} cannot be shared", kind))
            }
            other => ServiceError::Authorization(other),
        }
    }
}
