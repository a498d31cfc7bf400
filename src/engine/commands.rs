//! Deferred structural mutations.
//!
//! While iteration is active (or a flush is already running), structural
//! changes must not move rows under the iterator. The world records them as
//! [`DeferredOp`] values instead and applies the queue in FIFO order when
//! the iteration depth returns to zero. Ops enqueued during a flush join
//! the same pass.

use crate::engine::types::{ComponentID, EntityID};


/// A structural mutation captured for later application.
pub enum DeferredOp {
    /// Add (or overwrite) a component; `data` is a heap copy of the value
    /// bytes, `None` for tags.
    Add {
        /// Target entity.
        entity: EntityID,
        /// Component or pair identifier.
        component_id: ComponentID,
        /// Owned value bytes.
        data: Option<Box<[u8]>>,
    },
    /// Remove a component; a no-op if absent by flush time.
    Remove {
        /// Target entity.
        entity: EntityID,
        /// Component or pair identifier.
        component_id: ComponentID,
    },
    /// Destroy an entity; a no-op if already dead by flush time.
    Destroy {
        /// Target entity.
        entity: EntityID,
    },
}
