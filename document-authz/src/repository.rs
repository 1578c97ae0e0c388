use crate::{error::AuthzError, models::*};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

pub mod postgres;

pub use postgres::PostgresTupleStore;

/// Durable mapping from (object, relation) to the subjects holding it directly.
///
/// Implementations own their synchronization. Once a `write` or `delete`
/// returns, every later `exists` on that object observes it, and a batch is
/// either applied in full or not at all, including when the caller drops the
/// future mid-flight.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TupleStore: Send + Sync {
    /// Insert every tuple; already present tuples are left untouched
    async fn write(&self, tuples: &[Tuple]) -> Result<(), AuthzError>;

    /// Remove every tuple that is present; missing ones are ignored
    async fn delete(&self, tuples: &[Tuple]) -> Result<(), AuthzError>;

    /// Direct membership test, no derivation
    async fn exists(
        &self,
        subject: &Subject,
        relation: Relation,
        object: &ObjectRef,
    ) -> Result<bool, AuthzError>;

    /// Read tuples matching the filter
    async fn read(&self, filter: &TupleFilter) -> Result<Vec<StoredTuple>, AuthzError>;

    /// Remove every tuple on the object, returning how many were removed
    async fn delete_object(&self, object: &ObjectRef) -> Result<u64, AuthzError>;
}

type Grants = BTreeMap<(Subject, Relation), DateTime<Utc>>;

/// In-memory tuple store for tests, development and single-process deployments.
///
/// Each object owns its own lock, so checks on one document never wait on
/// writes to another. Batches lock every object they touch in `ObjectRef`
/// order, which keeps concurrent batches deadlock free.
pub struct InMemoryTupleStore {
    objects: DashMap<ObjectRef, Arc<RwLock<Grants>>>,
    #[cfg(test)]
    fail_at: parking_lot::Mutex<Option<usize>>,
}

impl InMemoryTupleStore {
    pub fn new() -> Self {
        Self {
            objects: DashMap::new(),
            #[cfg(test)]
            fail_at: parking_lot::Mutex::new(None),
        }
    }

    pub fn len(&self) -> usize {
        self.cells().iter().map(|(_, cell)| cell.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cell(&self, object: &ObjectRef) -> Arc<RwLock<Grants>> {
        Arc::clone(self.objects.entry(object.clone()).or_default().value())
    }

    fn existing_cell(&self, object: &ObjectRef) -> Option<Arc<RwLock<Grants>>> {
        self.objects.get(object).map(|entry| Arc::clone(entry.value()))
    }

    fn cells(&self) -> Vec<(ObjectRef, Arc<RwLock<Grants>>)> {
        self.objects
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }

    /// Groups a batch per object in lock order.
    fn group<'a>(tuples: &'a [Tuple]) -> BTreeMap<&'a ObjectRef, Vec<&'a Tuple>> {
        let mut batch: BTreeMap<&ObjectRef, Vec<&Tuple>> = BTreeMap::new();
        for tuple in tuples {
            batch.entry(&tuple.object).or_default().push(tuple);
        }
        batch
    }

    /// Locks all objects of the batch, stages every change, then commits.
    ///
    /// Staging is the only step that can fail, so an error leaves every
    /// object exactly as it was. No await point exists while locks are held.
    fn apply(&self, tuples: &[Tuple], insert: bool) -> Result<(), AuthzError> {
        let batch = Self::group(tuples);
        let objects: Vec<&ObjectRef> = batch.keys().copied().collect();
        let cells: Vec<(Arc<RwLock<Grants>>, Vec<&Tuple>)> = batch
            .into_iter()
            .filter_map(|(object, tuples)| {
                let cell = if insert {
                    Some(self.cell(object))
                } else {
                    self.existing_cell(object)
                };
                cell.map(|cell| (cell, tuples))
            })
            .collect();

        let outcome = self.commit(&cells, insert);

        // Cells created for a failed insert, or emptied by a delete, go away
        drop(cells);
        for object in objects {
            self.retire(object);
        }

        outcome
    }

    fn commit(
        &self,
        cells: &[(Arc<RwLock<Grants>>, Vec<&Tuple>)],
        insert: bool,
    ) -> Result<(), AuthzError> {
        let mut guards: Vec<_> = cells.iter().map(|(cell, _)| cell.write()).collect();

        let mut staged: Vec<(usize, (Subject, Relation))> = Vec::new();
        for (index, (_, tuples)) in cells.iter().enumerate() {
            for tuple in tuples {
                self.inject_fault(staged.len())?;
                staged.push((index, (tuple.subject.clone(), tuple.relation)));
            }
        }

        let now = Utc::now();
        for (index, key) in staged {
            if let Some(grants) = guards.get_mut(index) {
                if insert {
                    grants.entry(key).or_insert(now);
                } else {
                    grants.remove(&key);
                }
            }
        }

        Ok(())
    }

    /// Drops the object's cell once it is empty and nobody else holds it.
    ///
    /// Handles to a cell are only cloned under the map's shard lock, which
    /// `remove_if` also takes, so a retired cell can never be written to.
    fn retire(&self, object: &ObjectRef) {
        self.objects
            .remove_if(object, |_, cell| Arc::strong_count(cell) == 1 && cell.read().is_empty());
    }

    #[cfg(test)]
    fn inject_fault(&self, step: usize) -> Result<(), AuthzError> {
        match *self.fail_at.lock() {
            Some(fail_at) if fail_at == step => Err(AuthzError::StorageError(format!(
                "injected fault at batch step {step}"
            ))),
            _ => Ok(()),
        }
    }

    #[cfg(not(test))]
    #[inline]
    fn inject_fault(&self, _step: usize) -> Result<(), AuthzError> {
        Ok(())
    }

    #[cfg(test)]
    fn fail_batches_at(&self, step: Option<usize>) {
        *self.fail_at.lock() = step;
    }
}

impl Default for InMemoryTupleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TupleStore for InMemoryTupleStore {
    async fn write(&self, tuples: &[Tuple]) -> Result<(), AuthzError> {
        self.apply(tuples, true)
    }

    async fn delete(&self, tuples: &[Tuple]) -> Result<(), AuthzError> {
        self.apply(tuples, false)
    }

    async fn exists(
        &self,
        subject: &Subject,
        relation: Relation,
        object: &ObjectRef,
    ) -> Result<bool, AuthzError> {
        let Some(cell) = self.existing_cell(object) else {
            return Ok(false);
        };
        let found = cell.read().contains_key(&(subject.clone(), relation));
        Ok(found)
    }

    async fn read(&self, filter: &TupleFilter) -> Result<Vec<StoredTuple>, AuthzError> {
        let cells = match filter.object {
            Some(ref object) => self
                .existing_cell(object)
                .map(|cell| vec![(object.clone(), cell)])
                .unwrap_or_default(),
            None => self.cells(),
        };

        let mut tuples = Vec::new();
        for (object, cell) in cells {
            let grants = cell.read();
            tuples.extend(grants.iter().filter_map(|((subject, relation), created_at)| {
                let tuple = Tuple::new(subject.clone(), *relation, object.clone());
                filter.matches(&tuple).then(|| StoredTuple {
                    tuple,
                    created_at: *created_at,
                })
            }));
        }

        Ok(tuples)
    }

    async fn delete_object(&self, object: &ObjectRef) -> Result<u64, AuthzError> {
        let Some(cell) = self.existing_cell(object) else {
            return Ok(0);
        };
        let removed = {
            let mut grants = cell.write();
            let removed = grants.len() as u64;
            grants.clear();
            removed
        };
        drop(cell);
        self.retire(object);
        Ok(removed)
    }
}
