//! A small Scheme interpreter over page-arena value stores.

pub mod arena;
pub mod bytes;
pub mod config;
pub mod env;
pub mod error;
pub mod eval;
pub mod intern;
pub mod primitives;
pub mod printer;
pub mod reader;
pub mod store;
pub mod value;

pub use config::{InterpreterConfig, StoreConfig};
pub use error::{SchemeError, SchemeResult};
pub use eval::Interpreter;
pub use value::Value;
