//! Reactive observers over archetype transitions.
//!
//! An observer registers interest in component sets and fires whenever an
//! entity's archetype transition crosses the matching boundary:
//!
//! - `OnAdd` fires when the destination matches and the origin did not —
//!   including `None → A` on entity creation.
//! - `OnRemove` fires when the origin matched and the destination does not —
//!   including `A → None` on entity destruction.
//!
//! `matches(A)` is `required ⊆ A.signature ∧ excluded ∩ A.signature = ∅`;
//! a missing archetype never matches. For a single transition, observers
//! fire in registration order.
//!
//! Observer callbacks run during mutation paths, so any structural change
//! they request is enqueued as a deferred op rather than applied reentrantly
//! mid-move.

use std::cell::RefCell;
use std::rc::Rc;

use crate::engine::term::TermArg;
use crate::engine::types::{ComponentID, EntityID};
use crate::engine::world::World;


/// Transition event an observer listens for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObserverEvent {
    /// The entity's archetype began matching.
    OnAdd,
    /// The entity's archetype stopped matching.
    OnRemove,
}

/// Handle identifying a registered observer.
pub type ObserverID = u64;

/// An observer definition awaiting registration.
///
/// Built with [`on_add`] / [`on_remove`]; the term list is resolved when the
/// definition is handed to `World::observe`. Only plain component and exact
/// pair terms participate: observers match on signatures, not wildcards.
pub struct ObserverDef {
    pub(crate) event: ObserverEvent,
    pub(crate) terms: Vec<TermArg>,
}

/// Defines an observer firing when its component set starts matching.
pub fn on_add(terms: Vec<TermArg>) -> ObserverDef {
    ObserverDef { event: ObserverEvent::OnAdd, terms }
}

/// Defines an observer firing when its component set stops matching.
pub fn on_remove(terms: Vec<TermArg>) -> ObserverDef {
    ObserverDef { event: ObserverEvent::OnRemove, terms }
}

pub(crate) type ObserverCallback = Rc<RefCell<dyn FnMut(&mut World, EntityID)>>;

pub(crate) struct Observer {
    pub id: ObserverID,
    pub event: ObserverEvent,
    pub required: Vec<ComponentID>,
    pub excluded: Vec<ComponentID>,
    pub callback: ObserverCallback,
}

impl Observer {
    /// Signature-level match; `signature` must be sorted.
    pub fn matches(&self, signature: &[ComponentID]) -> bool {
        self.required.iter().all(|id| signature.binary_search(id).is_ok())
            && !self.excluded.iter().any(|id| signature.binary_search(id).is_ok())
    }
}
