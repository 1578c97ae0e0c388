use crate::{
    error::{AuthzError, Result},
    models::*,
    relation_graph::RelationGraph,
    repository::TupleStore,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Tunables for the authorization engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Upper bound for any single storage round-trip, in milliseconds
    pub operation_timeout_ms: u64,
}

impl EngineSettings {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            operation_timeout_ms: 5_000,
        }
    }
}

/// Evaluates checks against the tuple store and applies tuple mutations.
///
/// The engine keeps no state of its own between calls. Every answer is
/// derived from the store at call time and nothing is cached, so a revoke
/// that has completed is visible to every check issued after it.
pub struct AuthorizationEngine {
    /// Storage for relationship tuples
    store: Arc<dyn TupleStore>,

    settings: EngineSettings,
}

impl AuthorizationEngine {
    pub fn new(store: Arc<dyn TupleStore>) -> Self {
        Self {
            store,
            settings: EngineSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Runs one storage operation under the configured timeout.
    ///
    /// An elapsed timeout is reported as a storage fault; dropping the inner
    /// future is safe because stores commit batches atomically.
    async fn bounded<T>(&self, operation: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        let timeout = self.settings.operation_timeout();
        tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| Self::timed_out(operation, timeout))?
    }

    fn timed_out(operation: &str, timeout: Duration) -> AuthzError {
        AuthzError::StorageError(format!("{} timed out after {}ms", operation, timeout.as_millis()))
    }

    // =============================================================================
    // Core Authorization Operations
    // =============================================================================

    /// Check whether `subject` holds `relation` on `object`, directly or through
    /// the relation's computed rule.
    ///
    /// # Errors
    ///
    /// `StorageError` if the store fails or times out. Callers must treat that
    /// as a denial and must not reuse an earlier answer.
    pub async fn check(
        &self,
        subject: &Subject,
        object: &ObjectRef,
        relation: Relation,
    ) -> Result<bool> {
        let allowed = self
            .bounded("check", async {
                for candidate in RelationGraph::expand(relation) {
                    if self.store.exists(subject, *candidate, object).await? {
                        debug!("{} {} {} satisfied by {}", subject, relation, object, candidate);
                        return Ok(true);
                    }
                }
                Ok::<_, AuthzError>(false)
            })
            .await?;

        if !allowed {
            debug!("{} {} {} denied", subject, relation, object);
        }
        Ok(allowed)
    }

    /// Same as [`check`](Self::check) for a relation given by name.
    ///
    /// # Errors
    ///
    /// `UnsupportedRelation` if the name is outside the fixed relation set.
    pub async fn check_named(
        &self,
        subject: &Subject,
        object: &ObjectRef,
        relation: &str,
    ) -> Result<bool> {
        let relation: Relation = relation.parse()?;
        self.check(subject, object, relation).await
    }

    /// Batch check multiple permissions at once
    ///
    /// # Errors
    ///
    /// The first storage fault aborts the batch.
    pub async fn batch_check(&self, requests: Vec<CheckRequest>) -> Result<Vec<CheckResponse>> {
        let mut responses = Vec::with_capacity(requests.len());

        for request in requests {
            let allowed = self
                .check(&request.subject, &request.object, request.relation)
                .await?;
            responses.push(CheckResponse { request, allowed });
        }

        Ok(responses)
    }

    // =============================================================================
    // Tuple Management
    // =============================================================================

    /// Write a single direct tuple
    ///
    /// # Errors
    ///
    /// `StorageError` if the store rejects or times out the write.
    pub async fn grant_direct(
        &self,
        subject: &Subject,
        relation: Relation,
        object: &ObjectRef,
    ) -> Result<()> {
        self.write_tuples(vec![Tuple::new(subject.clone(), relation, object.clone())])
            .await
    }

    /// Delete a single direct tuple
    ///
    /// # Errors
    ///
    /// `StorageError` if the store rejects or times out the delete.
    pub async fn revoke_direct(
        &self,
        subject: &Subject,
        relation: Relation,
        object: &ObjectRef,
    ) -> Result<()> {
        self.delete_tuples(vec![Tuple::new(subject.clone(), relation, object.clone())])
            .await
    }

    /// Write a batch of tuples atomically
    ///
    /// # Errors
    ///
    /// `StorageError`; no tuple of the batch is stored in that case.
    pub async fn write_tuples(&self, tuples: Vec<Tuple>) -> Result<()> {
        if tuples.is_empty() {
            return Ok(());
        }
        for tuple in &tuples {
            info!("Writing tuple: {}", tuple);
        }
        self.bounded("write", self.store.write(&tuples)).await
    }

    /// Delete a batch of tuples atomically
    ///
    /// # Errors
    ///
    /// `StorageError`; every tuple of the batch is kept in that case.
    pub async fn delete_tuples(&self, tuples: Vec<Tuple>) -> Result<()> {
        if tuples.is_empty() {
            return Ok(());
        }
        for tuple in &tuples {
            info!("Deleting tuple: {}", tuple);
        }
        self.bounded("delete", self.store.delete(&tuples)).await
    }

    /// Remove every tuple referencing `object`
    ///
    /// # Errors
    ///
    /// `StorageError` if the store fails or times out.
    pub async fn revoke_object(&self, object: &ObjectRef) -> Result<u64> {
        let removed = self
            .bounded("revoke_object", self.store.delete_object(object))
            .await?;
        info!("Revoked {} tuple(s) on {}", removed, object);
        Ok(removed)
    }

    /// Read tuples matching a filter
    ///
    /// # Errors
    ///
    /// `StorageError` if the store fails or times out.
    pub async fn read_tuples(&self, filter: &TupleFilter) -> Result<Vec<StoredTuple>> {
        self.bounded("read", self.store.read(filter)).await
    }

    // =============================================================================
    // Permission Expansion
    // =============================================================================

    /// Every subject that satisfies `relation` on `object`
    ///
    /// # Errors
    ///
    /// `StorageError` if the store fails or times out.
    pub async fn expand(
        &self,
        object: &ObjectRef,
        relation: Relation,
    ) -> Result<BTreeSet<Subject>> {
        let tuples = self.read_tuples(&TupleFilter::object(object)).await?;

        Ok(tuples
            .into_iter()
            .filter(|stored| RelationGraph::implies(stored.tuple.relation, relation))
            .map(|stored| stored.tuple.subject)
            .collect())
    }

    /// Every object on which `subject` satisfies `relation`
    ///
    /// # Errors
    ///
    /// `StorageError` if the store fails or times out.
    pub async fn list_objects(
        &self,
        subject: &Subject,
        relation: Relation,
    ) -> Result<Vec<ObjectRef>> {
        let tuples = self.read_tuples(&TupleFilter::subject(subject)).await?;

        let objects: BTreeSet<ObjectRef> = tuples
            .into_iter()
            .filter(|stored| RelationGraph::implies(stored.tuple.relation, relation))
            .map(|stored| stored.tuple.object)
            .collect();

        Ok(objects.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{InMemoryTupleStore, MockTupleStore};
    use async_trait::async_trait;

    fn engine() -> AuthorizationEngine {
        AuthorizationEngine::new(Arc::new(InMemoryTupleStore::new()))
    }

    #[tokio::test]
    async fn test_basic_check() {
        let engine = engine();
        let alice = Subject::user("alice");
        let doc = ObjectRef::document("doc1");

        assert!(!engine.check(&alice, &doc, Relation::Writer).await.unwrap());

        engine.grant_direct(&alice, Relation::Writer, &doc).await.unwrap();
        assert!(engine.check(&alice, &doc, Relation::Writer).await.unwrap());
        assert!(!engine.check(&alice, &doc, Relation::Reader).await.unwrap());

        engine.revoke_direct(&alice, Relation::Writer, &doc).await.unwrap();
        assert!(!engine.check(&alice, &doc, Relation::Writer).await.unwrap());
    }

    #[tokio::test]
    async fn test_owner_satisfies_computed_relations() {
        let engine = engine();
        let alice = Subject::user("alice");
        let doc = ObjectRef::document("doc1");

        engine.grant_direct(&alice, Relation::Owner, &doc).await.unwrap();

        for relation in Relation::ALL {
            assert!(engine.check(&alice, &doc, relation).await.unwrap(), "{relation}");
        }
    }

    #[tokio::test]
    async fn test_check_named_rejects_unknown_relation() {
        let engine = engine();
        let err = engine
            .check_named(&Subject::user("alice"), &ObjectRef::document("doc1"), "editor")
            .await
            .unwrap_err();

        assert!(matches!(err, AuthzError::UnsupportedRelation(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_check_short_circuits_on_direct_tuple() {
        let mut store = MockTupleStore::new();
        store
            .expect_exists()
            .withf(|_, relation, _| *relation == Relation::Reader)
            .times(1)
            .returning(|_, _, _| Ok(true));
        store
            .expect_exists()
            .withf(|_, relation, _| *relation == Relation::Owner)
            .times(0);

        let engine = AuthorizationEngine::new(Arc::new(store));
        assert!(engine
            .check(&Subject::user("bob"), &ObjectRef::document("doc1"), Relation::Reader)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_storage_fault_propagates() {
        let mut store = MockTupleStore::new();
        store
            .expect_exists()
            .returning(|_, _, _| Err(AuthzError::StorageError("connection refused".into())));

        let engine = AuthorizationEngine::new(Arc::new(store));
        let err = engine
            .check(&Subject::user("bob"), &ObjectRef::document("doc1"), Relation::Reader)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    struct StalledStore;

    #[async_trait]
    impl TupleStore for StalledStore {
        async fn write(&self, _tuples: &[Tuple]) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }

        async fn delete(&self, _tuples: &[Tuple]) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }

        async fn exists(
            &self,
            _subject: &Subject,
            _relation: Relation,
            _object: &ObjectRef,
        ) -> Result<bool> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(true)
        }

        async fn read(&self, _filter: &TupleFilter) -> Result<Vec<StoredTuple>> {
            Ok(Vec::new())
        }

        async fn delete_object(&self, _object: &ObjectRef) -> Result<u64> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_timeout_surfaces_as_storage_error() {
        let engine = AuthorizationEngine::new(Arc::new(StalledStore))
            .with_settings(EngineSettings { operation_timeout_ms: 20 });
        let alice = Subject::user("alice");
        let doc = ObjectRef::document("doc1");

        let err = engine.check(&alice, &doc, Relation::Reader).await.unwrap_err();
        assert!(matches!(err, AuthzError::StorageError(ref msg) if msg.contains("timed out")));

        let err = engine.grant_direct(&alice, Relation::Reader, &doc).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_expand_and_list_objects() {
        let engine = engine();
        let alice = Subject::user("alice");
        let bob = Subject::user("bob");
        let doc1 = ObjectRef::document("doc1");
        let doc2 = ObjectRef::document("doc2");

        engine
            .write_tuples(vec![
                Tuple::new(alice.clone(), Relation::Owner, doc1.clone()),
                Tuple::new(bob.clone(), Relation::Writer, doc1.clone()),
                Tuple::new(bob.clone(), Relation::Reader, doc2.clone()),
            ])
            .await
            .unwrap();

        let writers = engine.expand(&doc1, Relation::Writer).await.unwrap();
        assert_eq!(writers, BTreeSet::from([alice.clone(), bob.clone()]));

        let readers = engine.expand(&doc1, Relation::Reader).await.unwrap();
        assert_eq!(readers, BTreeSet::from([alice.clone()]));

        assert_eq!(engine.list_objects(&bob, Relation::Reader).await.unwrap(), vec![doc2.clone()]);
        assert_eq!(engine.list_objects(&alice, Relation::Reader).await.unwrap(), vec![doc1]);
    }

    #[tokio::test]
    async fn test_batch_check() {
        let engine = engine();
        let alice = Subject::user("alice");
        let doc = ObjectRef::document("doc1");
        engine.grant_direct(&alice, Relation::Owner, &doc).await.unwrap();

        let responses = engine
            .batch_check(vec![
                CheckRequest {
                    subject: alice.clone(),
                    relation: Relation::CanShare,
                    object: doc.clone(),
                },
                CheckRequest {
                    subject: Subject::user("mallory"),
                    relation: Relation::Reader,
                    object: doc,
                },
            ])
            .await
            .unwrap();

        let allowed: Vec<bool> = responses.iter().map(|r| r.allowed).collect();
        assert_eq!(allowed, vec![true, false]);
    }
}
