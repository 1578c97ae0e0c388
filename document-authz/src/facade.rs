//! Application-facing permission operations
//!
//! Document handlers speak in [`PermissionKind`]s; the facade maps them onto
//! engine relations and fails every check closed.

use crate::{
    engine::AuthorizationEngine,
    error::{AuthzError, Result},
    models::*,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of a permission check
///
/// `allowed` is false whenever `fault` is set. The fault is kept for logging
/// only and must not change what the end user is told.
#[derive(Debug)]
pub struct PermissionDecision {
    allowed: bool,
    fault: Option<AuthzError>,
}

impl PermissionDecision {
    fn allow(allowed: bool) -> Self {
        Self { allowed, fault: None }
    }

    fn fail_closed(fault: AuthzError) -> Self {
        Self {
            allowed: false,
            fault: Some(fault),
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    /// The engine error behind a fail-closed denial, if any
    pub fn fault(&self) -> Option<&AuthzError> {
        self.fault.as_ref()
    }
}

#[derive(Clone)]
pub struct PermissionFacade {
    engine: Arc<AuthorizationEngine>,
}

impl PermissionFacade {
    pub fn new(engine: Arc<AuthorizationEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<AuthorizationEngine> {
        &self.engine
    }

    /// Check `kind` for `subject` on `object`, denying on any engine error.
    pub async fn check_permission(
        &self,
        subject: &Subject,
        object: &ObjectRef,
        kind: PermissionKind,
    ) -> PermissionDecision {
        match self.engine.check(subject, object, kind.relation()).await {
            Ok(allowed) => PermissionDecision::allow(allowed),
            Err(fault) => {
                warn!(
                    subject = %subject,
                    object = %object,
                    permission = %kind,
                    error = %fault,
                    "Permission check failed, denying"
                );
                PermissionDecision::fail_closed(fault)
            }
        }
    }

    /// Record `subject` as owner of a freshly created document.
    ///
    /// # Errors
    ///
    /// `StorageError` if the tuple could not be written; the document must not
    /// be published in that case.
    pub async fn grant_ownership(&self, subject: &Subject, object: &ObjectRef) -> Result<()> {
        self.engine.grant_direct(subject, Relation::Owner, object).await?;
        info!("{} now owns {}", subject, object);
        Ok(())
    }

    /// Grant Read or Write on `object` to `subject`.
    ///
    /// # Errors
    ///
    /// `InvalidGrantKind` for Delete and Share, `StorageError` on store failure.
    pub async fn share_with(
        &self,
        subject: &Subject,
        object: &ObjectRef,
        kind: PermissionKind,
    ) -> Result<()> {
        let relation = kind.grant_relation()?;
        self.engine.grant_direct(subject, relation, object).await
    }

    /// Inverse of [`share_with`](Self::share_with).
    ///
    /// # Errors
    ///
    /// `InvalidGrantKind` for Delete and Share, `StorageError` on store failure.
    pub async fn revoke(
        &self,
        subject: &Subject,
        object: &ObjectRef,
        kind: PermissionKind,
    ) -> Result<()> {
        let relation = kind.grant_relation()?;
        self.engine.revoke_direct(subject, relation, object).await
    }

    /// Remove every grant on a deleted document.
    ///
    /// # Errors
    ///
    /// `StorageError` if the store fails; the grants are left untouched.
    pub async fn revoke_all(&self, object: &ObjectRef) -> Result<()> {
        self.engine.revoke_object(object).await.map(|_| ())
    }

    /// Objects on which `subject` holds `kind`, empty when the lookup fails.
    pub async fn accessible_objects(
        &self,
        subject: &Subject,
        kind: PermissionKind,
    ) -> Vec<ObjectRef> {
        match self.engine.list_objects(subject, kind.relation()).await {
            Ok(objects) => objects,
            Err(fault) => {
                warn!(
                    subject = %subject,
                    permission = %kind,
                    error = %fault,
                    "Object listing failed, returning none"
                );
                Vec::new()
            }
        }
    }

    /// Subjects holding `kind` on `object`
    ///
    /// # Errors
    ///
    /// `StorageError` if the store fails.
    pub async fn collaborators(
        &self,
        object: &ObjectRef,
        kind: PermissionKind,
    ) -> Result<BTreeSet<Subject>> {
        self.engine.expand(object, kind.relation()).await
    }
}
