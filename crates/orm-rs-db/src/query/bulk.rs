//! Buffered multi-row inserts.
//!
//! A [`BulkInsert`] queues new entities of one class and writes them with a
//! single `INSERT` per batch. A batch is written as soon as the queue
//! reaches the limit, and once more by [`BulkInsert::finish`].
//!
//! ```no_run
//! # use orm_rs_db::manager::EntityManager;
//! # fn demo(em: &EntityManager, articles: Vec<orm_rs_db::entity::EntityRef>) -> orm_rs_core::OrmResult<()> {
//! let mut bulk = em
//!     .bulk_insert("Article")?
//!     .limit(100)
//!     .on_sync(|batch| println!("{} articles written", batch.len()));
//! bulk.add(articles)?;
//! let written = bulk.finish()?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::rc::Rc;

use orm_rs_core::{OrmError, OrmResult};

use crate::entity::{EntityRef, EntityType};
use crate::manager::EntityManager;

type SyncCallback<'m> = Box<dyn FnMut(&[EntityRef]) + 'm>;

/// Queues entities of one class and inserts them in batches.
pub struct BulkInsert<'m> {
    manager: &'m EntityManager,
    entity_type: Rc<EntityType>,
    limit: usize,
    use_auto_increment: bool,
    on_sync: Option<SyncCallback<'m>>,
    queue: Vec<EntityRef>,
    synced: Vec<EntityRef>,
}

impl fmt::Debug for BulkInsert<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BulkInsert")
            .field("class", &self.entity_type.name())
            .field("limit", &self.limit)
            .field("use_auto_increment", &self.use_auto_increment)
            .field("queued", &self.queue.len())
            .field("synced", &self.synced.len())
            .finish_non_exhaustive()
    }
}

impl<'m> BulkInsert<'m> {
    pub(crate) fn new(manager: &'m EntityManager, entity_type: Rc<EntityType>) -> Self {
        let settings = manager.settings();
        Self {
            manager,
            entity_type,
            limit: settings.bulk_insert_limit.max(1),
            use_auto_increment: settings.use_auto_increment,
            on_sync: None,
            queue: Vec::new(),
            synced: Vec::new(),
        }
    }

    /// Sets the batch size. Values below one are raised to one.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    /// Whether generated keys are read back into the entities.
    pub fn use_auto_increment(mut self, use_auto_increment: bool) -> Self {
        self.use_auto_increment = use_auto_increment;
        self
    }

    /// Registers a callback invoked with every written batch.
    pub fn on_sync(mut self, callback: impl FnMut(&[EntityRef]) + 'm) -> Self {
        self.on_sync = Some(Box::new(callback));
        self
    }

    /// The number of entities waiting for the next batch.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Queues `entities`, writing a batch each time the limit is reached.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::InvalidArgument`] when an entity is of another
    /// class; nothing is queued in that case. Propagates errors of written
    /// batches.
    pub fn add(&mut self, entities: impl IntoIterator<Item = EntityRef>) -> OrmResult<&mut Self> {
        let entities: Vec<EntityRef> = entities.into_iter().collect();
        if let Some(other) = entities
            .iter()
            .find(|e| e.borrow().class() != self.entity_type.name())
        {
            return Err(OrmError::InvalidArgument(format!(
                "Bulk insert of {} can not take an entity of {}",
                self.entity_type.name(),
                other.borrow().class()
            )));
        }
        for entity in entities {
            self.queue.push(entity);
            if self.queue.len() >= self.limit {
                self.flush()?;
            }
        }
        Ok(self)
    }

    /// Writes the queued entities now.
    ///
    /// # Errors
    ///
    /// Propagates driver errors; the batch is dropped from the queue.
    pub fn flush(&mut self) -> OrmResult<()> {
        if self.queue.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.queue);
        let _span =
            orm_rs_core::logging::query_span("bulk_insert", self.entity_type.name()).entered();
        self.manager
            .insert_batch(&batch, self.use_auto_increment)?;

        let mut mapped = Vec::with_capacity(batch.len());
        for entity in batch {
            let has_key = entity.borrow().has_primary_key();
            mapped.push(if has_key {
                self.manager.map(entity)?
            } else {
                entity
            });
        }
        tracing::debug!(
            class = %self.entity_type.name(),
            rows = mapped.len(),
            "bulk insert batch written"
        );
        if let Some(callback) = self.on_sync.as_mut() {
            callback(&mapped);
        }
        self.synced.extend(mapped);
        Ok(())
    }

    /// Writes the remaining entities and returns everything written.
    ///
    /// # Errors
    ///
    /// See [`flush`](Self::flush).
    pub fn finish(mut self) -> OrmResult<Vec<EntityRef>> {
        self.flush()?;
        Ok(std::mem::take(&mut self.synced))
    }
}
