//! Declarative query terms and their resolution.
//!
//! A query is described by a list of *terms*. Each term argument is either a
//! raw component kind (shorthand for "must be present") or an explicit
//! [`Term`] record built by the constructor functions in this module. A term
//! list is implicitly conjoined.
//!
//! ## Term forms
//! - **Component** — requires (or, negated, excludes) a component kind.
//! - **Pair** — requires a relation/target pair. Targets may be concrete
//!   (a type or an entity) or open: `Wildcard` and `Any` match any pair with
//!   the stated relation, `Var(slot)` additionally binds the matched target
//!   to a numbered capture slot.
//! - **Group** — composes sub-terms with `All`, `Any`, or `None`.
//!
//! `hierarchy::<R>()` is sugar for a wildcard pair on `R` with the cascade
//! flag set. At most one cascade term governs a query: only the first is
//! recorded, and any later (or negated) cascade term resolves as an
//! ordinary wildcard pair.
//!
//! ## Resolution
//! [`resolve_terms`] walks a term list and produces a [`QueryContext`]:
//! concrete ids partition into `required` / `excluded` multisets, open pairs
//! become wildcard entries, `Any` groups are retained structurally for
//! recursive matching, and captures and the cascade relation are collected.
//! Exact pairs are registered with the component registry on first sight,
//! inheriting the relation's column width.
//!
//! Term values are self-contained: builders copy the size/alignment
//! descriptor of each named type into the term, so resolution can register
//! kinds the world has never seen. No shared side table is involved, which
//! is also what makes term construction trivially thread-safe.

use crate::engine::component::{Component, ComponentRegistry, TypeHandle};
use crate::engine::error::{ContractViolationError, ECSResult, EncodingOverflowError};
use crate::engine::pair::make_pair_id;
use crate::engine::types::{
    entity_index, ComponentID, EntityID, VarSlot, MAX_QUERY_BINDINGS, PAIR_RELATION_MAX,
    PAIR_TARGET_MAX, VAR_NONE, VAR_THIS,
};


/// The relation half of a pair term.
#[derive(Clone, Copy, Debug)]
pub enum PairRelation {
    /// A component kind acts as the relation.
    Type(TypeHandle),
    /// An entity acts as the relation; such pairs never carry data.
    Entity(EntityID),
}

/// The target half of a pair term.
#[derive(Clone, Copy, Debug)]
pub enum PairTarget {
    /// A concrete component kind.
    Type(TypeHandle),
    /// A concrete entity.
    Entity(EntityID),
    /// Any target; the term matches any pair with the stated relation.
    Wildcard,
    /// At least one target; equivalent to [`PairTarget::Wildcard`] for
    /// archetype matching, kept distinct for cache keys.
    Any,
    /// Any target, bound to a numbered capture slot per matched archetype.
    Var(VarSlot),
}

/// Composition operator for term groups.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupOp {
    /// Every sub-term must hold.
    All,
    /// At least one sub-term must hold.
    Any,
    /// No sub-term may hold.
    None,
}

/// A declarative query predicate.
#[derive(Clone, Debug)]
pub enum Term {
    /// Presence (or, negated, absence) of a component kind.
    Component {
        /// The component kind.
        handle: TypeHandle,
        /// Invert the predicate.
        negate: bool,
        /// Source variable; [`VAR_THIS`] means the iterated entity.
        source: VarSlot,
        /// Capture slot, [`VAR_NONE`] when unused.
        capture_to: VarSlot,
    },
    /// Presence of a relation/target pair.
    Pair {
        /// The relation half.
        relation: PairRelation,
        /// The target half.
        target: PairTarget,
        /// Invert the predicate.
        negate: bool,
        /// Request depth-ordered iteration along this relation.
        cascade: bool,
        /// Source variable; [`VAR_THIS`] means the iterated entity.
        source: VarSlot,
        /// Capture slot, [`VAR_NONE`] when unused.
        capture_to: VarSlot,
    },
    /// Composition of sub-terms.
    Group {
        /// Composition operator.
        op: GroupOp,
        /// The composed sub-terms.
        terms: Vec<Term>,
        /// Invert the whole group.
        negate: bool,
    },
}

/// One element of a term list: a raw component kind or an explicit term.
#[derive(Clone, Debug)]
pub enum TermArg {
    /// Shorthand for a non-negated component term.
    Type(TypeHandle),
    /// An explicit term record.
    Term(Term),
}

impl TermArg {
    fn into_term(self) -> Term {
        match self {
            TermArg::Type(handle) => Term::Component {
                handle,
                negate: false,
                source: VAR_THIS,
                capture_to: VAR_NONE,
            },
            TermArg::Term(term) => term,
        }
    }
}

// ───────────────────────────────────────────────────────────────────────────
// Constructors
// ───────────────────────────────────────────────────────────────────────────

/// Requires component `T` on the matched entity.
pub fn term<T: Component>() -> TermArg {
    TermArg::Type(TypeHandle::of::<T>())
}

/// Negates a term: component terms become exclusions, pair terms must not
/// match, groups invert.
pub fn not(argument: TermArg) -> TermArg {
    TermArg::Term(negate_term(argument.into_term()))
}

/// Groups sub-terms; every one must hold.
pub fn all(terms: Vec<TermArg>) -> TermArg {
    TermArg::Term(Term::Group {
        op: GroupOp::All,
        terms: terms.into_iter().map(TermArg::into_term).collect(),
        negate: false,
    })
}

/// Alias for [`all`].
pub fn and(terms: Vec<TermArg>) -> TermArg {
    all(terms)
}

/// Groups sub-terms; at least one must hold.
pub fn any(terms: Vec<TermArg>) -> TermArg {
    TermArg::Term(Term::Group {
        op: GroupOp::Any,
        terms: terms.into_iter().map(TermArg::into_term).collect(),
        negate: false,
    })
}

/// Alias for [`any`].
pub fn or(terms: Vec<TermArg>) -> TermArg {
    any(terms)
}

/// Alias for [`any`].
pub fn some(terms: Vec<TermArg>) -> TermArg {
    any(terms)
}

/// Groups sub-terms; none may hold.
pub fn none(terms: Vec<TermArg>) -> TermArg {
    TermArg::Term(Term::Group {
        op: GroupOp::None,
        terms: terms.into_iter().map(TermArg::into_term).collect(),
        negate: false,
    })
}

fn pair_term(relation: PairRelation, target: PairTarget) -> TermArg {
    TermArg::Term(Term::Pair {
        relation,
        target,
        negate: false,
        cascade: false,
        source: VAR_THIS,
        capture_to: VAR_NONE,
    })
}

/// Requires the exact pair `(R, T)` with a type target.
pub fn pair<R: Component, T: Component>() -> TermArg {
    pair_term(PairRelation::Type(TypeHandle::of::<R>()), PairTarget::Type(TypeHandle::of::<T>()))
}

/// Requires the exact pair `(R, target)` with an entity target.
pub fn pair_entity<R: Component>(target: EntityID) -> TermArg {
    pair_term(PairRelation::Type(TypeHandle::of::<R>()), PairTarget::Entity(target))
}

/// Requires any pair with relation `R`.
pub fn pair_wildcard<R: Component>() -> TermArg {
    pair_term(PairRelation::Type(TypeHandle::of::<R>()), PairTarget::Wildcard)
}

/// Requires at least one pair with relation `R`.
pub fn pair_any<R: Component>() -> TermArg {
    pair_term(PairRelation::Type(TypeHandle::of::<R>()), PairTarget::Any)
}

/// Requires any pair with relation `R`, binding the matched target to a
/// capture slot.
pub fn pair_var<R: Component>(slot: VarSlot) -> TermArg {
    pair_term(PairRelation::Type(TypeHandle::of::<R>()), PairTarget::Var(slot))
}

/// Requires the exact entity-relation pair `(relation, target)`.
pub fn entity_pair(relation: EntityID, target: EntityID) -> TermArg {
    pair_term(PairRelation::Entity(relation), PairTarget::Entity(target))
}

/// Requires any pair with the entity relation `relation`.
pub fn entity_pair_wildcard(relation: EntityID) -> TermArg {
    pair_term(PairRelation::Entity(relation), PairTarget::Wildcard)
}

/// Requests depth-ordered iteration along relation `R`.
///
/// Sugar for a wildcard pair on `R` with the cascade flag set. Only the
/// first cascade term of a query is honored.
pub fn hierarchy<R: Component>() -> TermArg {
    TermArg::Term(Term::Pair {
        relation: PairRelation::Type(TypeHandle::of::<R>()),
        target: PairTarget::Wildcard,
        negate: false,
        cascade: true,
        source: VAR_THIS,
        capture_to: VAR_NONE,
    })
}

/// Alias for [`hierarchy`].
pub fn cascade<R: Component>() -> TermArg {
    hierarchy::<R>()
}

/// Binds the matched target of a wildcard pair term to a capture slot.
pub fn capture(slot: VarSlot, argument: TermArg) -> TermArg {
    let term = match argument.into_term() {
        Term::Pair { relation, target, negate, cascade, source, .. } => {
            Term::Pair { relation, target, negate, cascade, source, capture_to: slot }
        }
        Term::Component { handle, negate, source, .. } => {
            Term::Component { handle, negate, source, capture_to: slot }
        }
        group => group,
    };
    TermArg::Term(term)
}

/// Selects the source variable a term applies to.
///
/// Only [`VAR_THIS`]-sourced terms constrain the matched archetype; other
/// sources are recorded for callers that post-process bindings.
pub fn on(source: VarSlot, argument: TermArg) -> TermArg {
    let term = match argument.into_term() {
        Term::Component { handle, negate, capture_to, .. } => {
            Term::Component { handle, negate, source, capture_to }
        }
        Term::Pair { relation, target, negate, cascade, capture_to, .. } => {
            Term::Pair { relation, target, negate, cascade, source, capture_to }
        }
        group => group,
    };
    TermArg::Term(term)
}

// ───────────────────────────────────────────────────────────────────────────
// Resolution
// ───────────────────────────────────────────────────────────────────────────

/// A term reduced to registry identifiers, retained for recursive matching
/// inside `Any` groups.
#[derive(Clone, Debug)]
pub enum ResolvedTerm {
    /// Concrete identifier presence test.
    Component {
        /// The identifier (plain or pair).
        id: ComponentID,
        /// Invert the predicate.
        negate: bool,
    },
    /// Open pair presence test.
    WildcardPair {
        /// Relation field value to look for.
        relation: u32,
        /// Invert the predicate.
        negate: bool,
    },
    /// Nested composition.
    Group {
        /// Composition operator.
        op: GroupOp,
        /// Resolved sub-terms.
        terms: Vec<ResolvedTerm>,
        /// Invert the whole group.
        negate: bool,
    },
}

/// The resolved form of a term list, consumed by the matcher and cache.
#[derive(Clone, Debug, Default)]
pub struct QueryContext {

    /// Identifiers that must be present.
    pub required: Vec<ComponentID>,

    /// Identifiers that must be absent.
    pub excluded: Vec<ComponentID>,

    /// Open pair tests as `(relation, negate)`.
    pub wildcard_terms: Vec<(u32, bool)>,

    /// `Any` groups retained structurally.
    pub any_of_groups: Vec<Vec<ResolvedTerm>>,

    /// Capture requests as `(relation, slot)`.
    pub captures: Vec<(u32, VarSlot)>,

    /// Cascade relation field value, `0` when absent.
    pub cascade_rel: u32,
}

/// Resolves a term list into a [`QueryContext`].
///
/// Component kinds and exact pairs named by the terms are registered on
/// first sight, so a query may mention kinds no entity carries yet; such
/// terms simply match nothing.
///
/// ## Errors
/// - `Encoding` when a relation or target exceeds pair field capacity.
/// - `Contract` when a capture slot is outside the binding range.
pub fn resolve_terms(
    registry: &mut ComponentRegistry,
    terms: &[TermArg],
) -> ECSResult<QueryContext> {
    let mut context = QueryContext::default();
    for argument in terms {
        resolve_into(registry, &mut context, argument.clone().into_term(), false)?;
    }
    Ok(context)
}

fn resolve_relation_field(
    registry: &mut ComponentRegistry,
    relation: &PairRelation,
) -> ECSResult<(u32, bool)> {
    match relation {
        PairRelation::Type(handle) => {
            let ordinal = registry.register_handle(handle)?;
            if ordinal > PAIR_RELATION_MAX {
                return Err(EncodingOverflowError { relation: ordinal as u64, target: 0 }.into());
            }
            Ok((ordinal, false))
        }
        PairRelation::Entity(entity) => {
            let index = entity_index(*entity);
            if index > PAIR_RELATION_MAX as u64 {
                return Err(EncodingOverflowError { relation: index, target: 0 }.into());
            }
            Ok((index as u32, true))
        }
    }
}

fn resolve_exact_pair(
    registry: &mut ComponentRegistry,
    relation: &PairRelation,
    target: &PairTarget,
) -> ECSResult<ComponentID> {
    let (relation_field, relation_is_entity) = resolve_relation_field(registry, relation)?;

    let target_field = match target {
        PairTarget::Type(handle) => registry.register_handle(handle)?,
        PairTarget::Entity(entity) => {
            let index = entity_index(*entity);
            if index > PAIR_TARGET_MAX as u64 {
                return Err(
                    EncodingOverflowError { relation: relation_field as u64, target: index }.into()
                );
            }
            index as u32
        }
        _ => {
            return Err(ContractViolationError {
                reason: "open pair target where a concrete pair is required",
            }
            .into())
        }
    };

    let pair_id = make_pair_id(relation_field, target_field)?;
    if relation_is_entity {
        Ok(registry.register_entity_pair(pair_id))
    } else {
        Ok(registry.register_pair(pair_id)?)
    }
}

fn check_capture_slot(slot: VarSlot) -> ECSResult<()> {
    if slot == VAR_NONE || (slot as usize) < MAX_QUERY_BINDINGS {
        Ok(())
    } else {
        Err(ContractViolationError { reason: "capture slot outside the binding range" }.into())
    }
}

fn resolve_into(
    registry: &mut ComponentRegistry,
    context: &mut QueryContext,
    term: Term,
    invert: bool,
) -> ECSResult<()> {
    match term {
        Term::Component { handle, negate, source, .. } => {
            let id = registry.register_handle(&handle)?;
            // Terms sourced away from the iterated entity never constrain
            // the matched archetype; the kind is still registered.
            if source != VAR_THIS {
                return Ok(());
            }
            if negate ^ invert {
                context.excluded.push(id);
            } else {
                context.required.push(id);
            }
        }
        Term::Pair { relation, target, negate, cascade, source, capture_to } => {
            check_capture_slot(capture_to)?;
            let negated = negate ^ invert;
            let constrains = source == VAR_THIS;
            match target {
                PairTarget::Type(_) | PairTarget::Entity(_) => {
                    let pair_id = resolve_exact_pair(registry, &relation, &target)?;
                    if !constrains {
                        return Ok(());
                    }
                    if negated {
                        context.excluded.push(pair_id);
                    } else {
                        context.required.push(pair_id);
                    }
                }
                PairTarget::Wildcard | PairTarget::Any | PairTarget::Var(_) => {
                    let (relation_field, _) = resolve_relation_field(registry, &relation)?;

                    // The first non-negated cascade term orders iteration
                    // by depth along its relation; entities without the
                    // pair sit at depth 0 and still match, so it adds no
                    // wildcard predicate. Any further (or negated) cascade
                    // term falls back to ordinary wildcard filtering.
                    if constrains {
                        if cascade && !negated && context.cascade_rel == 0 {
                            context.cascade_rel = relation_field;
                        } else {
                            context.wildcard_terms.push((relation_field, negated));
                        }
                    }

                    // Captures are recorded regardless of source: they bind
                    // per matched archetype, not per constraint.
                    let slot = match target {
                        PairTarget::Var(slot) => slot,
                        _ => capture_to,
                    };
                    check_capture_slot(slot)?;
                    if slot != VAR_NONE {
                        context.captures.push((relation_field, slot));
                    }
                }
            }
        }
        Term::Group { op, terms, negate } => {
            let inverted = invert ^ negate;
            match (op, inverted) {
                (GroupOp::All, false) => {
                    for sub_term in terms {
                        resolve_into(registry, context, sub_term, false)?;
                    }
                }
                (GroupOp::None, false) => {
                    // None is All of the negated sub-terms.
                    for sub_term in terms {
                        resolve_into(registry, context, sub_term, true)?;
                    }
                }
                (GroupOp::Any, false) => {
                    let mut resolved = Vec::with_capacity(terms.len());
                    for sub_term in terms {
                        if let Some(sub) = resolve_structural(registry, context, sub_term)? {
                            resolved.push(sub);
                        }
                    }
                    if !resolved.is_empty() {
                        context.any_of_groups.push(resolved);
                    }
                }
                (GroupOp::Any, true) => {
                    // De Morgan: a negated Any is the conjunction of the
                    // negated sub-terms; fold it back into the flat sets.
                    for sub_term in terms {
                        resolve_into(registry, context, sub_term, true)?;
                    }
                }
                (GroupOp::All, true) => {
                    // De Morgan: a negated All is an Any of the negated
                    // sub-terms, retained structurally.
                    let mut resolved = Vec::with_capacity(terms.len());
                    for sub_term in terms {
                        if let Some(sub) =
                            resolve_structural(registry, context, negate_term(sub_term))?
                        {
                            resolved.push(sub);
                        }
                    }
                    if !resolved.is_empty() {
                        context.any_of_groups.push(resolved);
                    }
                }
                (GroupOp::None, true) => {
                    // De Morgan: a negated None is an Any of the sub-terms.
                    let mut resolved = Vec::with_capacity(terms.len());
                    for sub_term in terms {
                        if let Some(sub) = resolve_structural(registry, context, sub_term)? {
                            resolved.push(sub);
                        }
                    }
                    if !resolved.is_empty() {
                        context.any_of_groups.push(resolved);
                    }
                }
            }
        }
    }
    Ok(())
}

fn negate_term(term: Term) -> Term {
    match term {
        Term::Component { handle, negate, source, capture_to } => {
            Term::Component { handle, negate: !negate, source, capture_to }
        }
        Term::Pair { relation, target, negate, cascade, source, capture_to } => {
            Term::Pair { relation, target, negate: !negate, cascade, source, capture_to }
        }
        Term::Group { op, terms, negate } => Term::Group { op, terms, negate: !negate },
    }
}

/// Resolves a sub-term for structural retention inside `Any` groups.
///
/// Returns `None` for terms sourced away from the iterated entity: only
/// `This`-sourced terms constrain the matched archetype, so they drop out
/// of the group (a group left empty constrains nothing at all).
fn resolve_structural(
    registry: &mut ComponentRegistry,
    context: &mut QueryContext,
    term: Term,
) -> ECSResult<Option<ResolvedTerm>> {
    match term {
        Term::Component { handle, negate, source, .. } => {
            let id = registry.register_handle(&handle)?;
            if source != VAR_THIS {
                return Ok(None);
            }
            Ok(Some(ResolvedTerm::Component { id, negate }))
        }
        Term::Pair { relation, target, negate, source, capture_to, .. } => {
            check_capture_slot(capture_to)?;
            match target {
                PairTarget::Type(_) | PairTarget::Entity(_) => {
                    let pair_id = resolve_exact_pair(registry, &relation, &target)?;
                    if source != VAR_THIS {
                        return Ok(None);
                    }
                    Ok(Some(ResolvedTerm::Component { id: pair_id, negate }))
                }
                PairTarget::Wildcard | PairTarget::Any | PairTarget::Var(_) => {
                    let (relation_field, _) = resolve_relation_field(registry, &relation)?;
                    let slot = match target {
                        PairTarget::Var(slot) => slot,
                        _ => capture_to,
                    };
                    check_capture_slot(slot)?;
                    if slot != VAR_NONE {
                        context.captures.push((relation_field, slot));
                    }
                    if source != VAR_THIS {
                        return Ok(None);
                    }
                    Ok(Some(ResolvedTerm::WildcardPair { relation: relation_field, negate }))
                }
            }
        }
        Term::Group { op, terms, negate } => {
            let mut resolved = Vec::with_capacity(terms.len());
            for sub_term in terms {
                if let Some(sub) = resolve_structural(registry, context, sub_term)? {
                    resolved.push(sub);
                }
            }
            if resolved.is_empty() {
                return Ok(None);
            }
            Ok(Some(ResolvedTerm::Group { op, terms: resolved, negate }))
        }
    }
}
