//! Error types for entity storage, pair encoding, and world operations.
//!
//! This module declares focused, composable error types used across the
//! engine. Each error carries enough context to make failures actionable
//! while remaining small and cheap to pass around or convert into the
//! aggregate [`ECSError`].
//!
//! ## Goals
//! * **Specificity:** Each error type models a single failure mode (e.g.
//!   pair-encoding overflow, registry capacity, column width mismatches).
//! * **Ergonomics:** All errors implement [`std::error::Error`] and
//!   [`fmt::Display`], and provide `From<T>` conversions into [`ECSError`].
//! * **Actionability:** Structured fields (offending values, expected vs.
//!   actual widths) make logs useful without reproducing the issue.
//!
//! ## Soft vs. fatal failures
//! The engine distinguishes two failure classes:
//!
//! * **Soft** conditions — operations on dead or stale entities, and queries
//!   for component kinds that were never registered — are *not* errors. They
//!   propagate as sentinel returns (`None`, `false`, no-op) and never reach
//!   this module.
//! * **Fatal** conditions — encoding overflow, contract violations, broken
//!   structural invariants — surface as `Err(ECSError::…)` from the lowest
//!   level at which they are detected. The engine commits no partial
//!   structural change before returning them. Allocation failure itself
//!   aborts the process, as is standard for infallible Rust collections.
//!
//! ## Display vs. Debug
//! * [`fmt::Display`] is optimized for operator logs (short, imperative).
//! * [`fmt::Debug`] (derived) retains full structure for diagnostics.

use std::fmt;

use crate::engine::types::{ComponentID, PAIR_RELATION_MAX, PAIR_TARGET_MAX};


/// Returned when a pair cannot be encoded because the relation or target
/// value exceeds its bit-field capacity.
///
/// ### Fields
/// * `relation` — The relation value that was requested.
/// * `target` — The target value that was requested.
///
/// Relations must fit in 15 bits and targets in 16; anything larger cannot
/// be represented in a pair [`ComponentID`].

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodingOverflowError {

    /// Requested relation value.
    pub relation: u64,

    /// Requested target value.
    pub target: u64,
}

impl fmt::Display for EncodingOverflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pair encoding overflow: relation {} (max {}), target {} (max {})",
            self.relation, PAIR_RELATION_MAX, self.target, PAIR_TARGET_MAX
        )
    }
}

impl std::error::Error for EncodingOverflowError {}

/// Errors raised by the component registry.
///
/// ## Context
/// The registry assigns compact ordinals to component kinds and stores
/// size/alignment descriptors. Exhausting the ordinal space is the only
/// registration failure; lookups for unknown kinds are soft and return
/// `None` instead.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {

    /// The ordinal space for plain component kinds is exhausted.
    CapacityExceeded {
        /// Maximum number of representable component ordinals.
        cap: u32,
    },

    /// A pair was registered against a relation with no size descriptor.
    ///
    /// This indicates an internal ordering bug: pairs inherit their column
    /// width from the relation, so the relation must be registered first.
    MissingRelationInfo {
        /// The offending relation ordinal.
        relation: u32,
    },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::CapacityExceeded { cap } => {
                write!(f, "component registry full ({} ordinals)", cap)
            }
            RegistryError::MissingRelationInfo { relation } => {
                write!(f, "no size descriptor for relation ordinal {}", relation)
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// Returned when a column operation addresses storage incorrectly.
///
/// ## Invariants
/// - A column always holds exactly `rows × elem_size` bytes.
/// - Row writes must supply exactly `elem_size` bytes.
/// - Cross-column copies require identical element widths.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnError {

    /// A row index was outside the valid range.
    RowOutOfBounds {
        /// Row that was addressed.
        row: usize,
        /// Number of valid rows.
        rows: usize,
    },

    /// A value write did not match the column's element width.
    SizeMismatch {
        /// Element width declared by the column.
        expected: usize,
        /// Width of the value provided by the caller.
        actual: usize,
    },

    /// Two columns participating in a row move disagreed on element width.
    WidthMismatch {
        /// Destination column element width.
        destination: usize,
        /// Source column element width.
        source: usize,
    },
}

impl fmt::Display for ColumnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnError::RowOutOfBounds { row, rows } => {
                write!(f, "row {} out of bounds ({} rows)", row, rows)
            }
            ColumnError::SizeMismatch { expected, actual } => {
                write!(f, "value width mismatch: column holds {} bytes, got {}", expected, actual)
            }
            ColumnError::WidthMismatch { destination, source } => {
                write!(
                    f,
                    "column width mismatch during move: destination {} bytes, source {} bytes",
                    destination, source
                )
            }
        }
    }
}

impl std::error::Error for ColumnError {}

/// Errors that can occur while moving an entity between archetypes.
///
/// ## Notes
/// These generally indicate internal inconsistencies or violated invariants
/// rather than recoverable user-facing failures.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveError {

    /// A column named by a transition edge's column map was missing.
    MissingColumn {
        /// Component whose column could not be found.
        component_id: ComponentID,
    },

    /// Copying a cell between archetypes failed.
    ColumnCopy(ColumnError),

    /// An edge referenced an archetype that no longer exists.
    StaleEdge,
}

impl fmt::Display for MoveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoveError::MissingColumn { component_id } => {
                write!(f, "missing column for component {} during move", component_id)
            }
            MoveError::ColumnCopy(e) => write!(f, "failed to copy column cell: {e}"),
            MoveError::StaleEdge => f.write_str("transition edge points at a removed archetype"),
        }
    }
}

impl std::error::Error for MoveError {}

impl From<ColumnError> for MoveError {
    fn from(e: ColumnError) -> Self { MoveError::ColumnCopy(e) }
}

/// Returned when an operation is used outside its contract.
///
/// The canonical case is passing a wildcard, any-of, or variable pair target
/// to an operation that requires a concrete [`ComponentID`] (add, remove,
/// get). Query construction is the only place such targets are meaningful.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractViolationError {

    /// Human-readable description of the violated contract.
    pub reason: &'static str,
}

impl fmt::Display for ContractViolationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "contract violation: {}", self.reason)
    }
}

impl std::error::Error for ContractViolationError {}

/// Aggregate error for world-level operations.
///
/// Low-level modules return their focused error types; world orchestration
/// code uses `?` to bubble failures into this single expressive type.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ECSError {

    /// Pair encoding exceeded its bit-field capacity.
    Encoding(EncodingOverflowError),

    /// Component registry failure.
    Registry(RegistryError),

    /// Column storage addressed incorrectly.
    Column(ColumnError),

    /// Entity migration between archetypes failed.
    Move(MoveError),

    /// An operation was used outside its contract.
    Contract(ContractViolationError),

    /// An internal invariant was violated.
    ///
    /// This indicates a bug in the engine rather than misuse by the caller.
    Internal(&'static str),
}

impl fmt::Display for ECSError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ECSError::Encoding(e) => write!(f, "{e}"),
            ECSError::Registry(e) => write!(f, "{e}"),
            ECSError::Column(e) => write!(f, "{e}"),
            ECSError::Move(e) => write!(f, "{e}"),
            ECSError::Contract(e) => write!(f, "{e}"),
            ECSError::Internal(what) => write!(f, "internal invariant violated: {}", what),
        }
    }
}

impl std::error::Error for ECSError {}

impl From<EncodingOverflowError> for ECSError {
    fn from(e: EncodingOverflowError) -> Self { ECSError::Encoding(e) }
}
impl From<RegistryError> for ECSError {
    fn from(e: RegistryError) -> Self { ECSError::Registry(e) }
}
impl From<ColumnError> for ECSError {
    fn from(e: ColumnError) -> Self { ECSError::Column(e) }
}
impl From<MoveError> for ECSError {
    fn from(e: MoveError) -> Self { ECSError::Move(e) }
}
impl From<ContractViolationError> for ECSError {
    fn from(e: ContractViolationError) -> Self { ECSError::Contract(e) }
}

/// Convenience result alias for world-level operations.
pub type ECSResult<T> = Result<T, ECSError>;
