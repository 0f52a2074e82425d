use thiserror::Error;

use crate::value::Kind;

/// Errors that can occur in the interpreter at the Rust level.
///
/// Every condition the evaluator or the stores detect ends up here instead of
/// aborting the process; the driver decides whether a session survives it.
#[derive(Debug, Error)]
pub enum SchemeError {
    /// The OS refused to map a page.
    #[error("page mapping failed: {0}")]
    PageMap(#[source] std::io::Error),

    /// A page cannot hold an integral number of elements, or is not a
    /// multiple of the OS page size.
    #[error(
        "invalid arena geometry: element size {element_size}, page size {page_size}, os page size {os_page_size}"
    )]
    ArenaGeometry {
        element_size: usize,
        page_size: usize,
        os_page_size: usize,
    },

    /// Indexed beyond the elements allocated in an arena.
    #[error("index {index} out of range ({len} allocated)")]
    IndexOutOfRange { index: u64, len: u64 },

    /// An operation expected a specific value kind.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: Kind, found: Kind },

    /// A primitive received an argument it cannot work with.
    #[error("type error: {0}")]
    TypeError(String),

    /// Lookup or `set!` on a name bound nowhere in the environment chain.
    #[error("unbound variable '{0}'")]
    Unbound(String),

    /// Extending an environment with names and values of different lengths.
    #[error("arity mismatch: {vars} parameters, {vals} arguments")]
    ArityMismatch { vars: usize, vals: usize },

    /// An application supplied more operands than the evaluator buffers.
    #[error("too many operands (maximum {max})")]
    OperandOverflow { max: usize },

    /// Too many evaluations pending at once, e.g. runaway non-tail recursion.
    #[error("evaluation nested too deeply (maximum {max} pending)")]
    RecursionDepth { max: usize },

    /// Integer literal or arithmetic result outside the inline range.
    #[error("numeric range: {0}")]
    NumericRange(String),

    /// List traversal hit a tail that is neither a pair nor null.
    #[error("malformed list: not null-terminated")]
    MalformedList,

    /// A special form with the wrong shape.
    #[error("bad form: {0}")]
    BadForm(String),

    /// Applying something that is not a closure or primitive.
    #[error("cannot apply a value of kind {0}")]
    NotApplicable(Kind),

    /// Reader error.
    #[error("read error: {0}")]
    ReadError(String),
}

pub type SchemeResult<T> = Result<T, SchemeError>;
