//! sqlbatch core - values, calls and connection traits
//!
//! This crate provides the types every other sqlbatch crate depends on:
//!
//! - `Value` / `ArgumentType` - the five storage classes and their argument tags
//! - `BoundArgument` - one parsed `[name=]value[:type]` spec
//! - `CallSequenceBuilder` / `CallSequence` - ordered exec and query calls
//! - `Connection` / `Transaction` / `DatabaseDriver` - seams implemented by drivers
//! - `SqlBatchError` - the error taxonomy

mod argument;
mod call;
mod connection;
mod driver;
mod error;
mod types;

pub use argument::*;
pub use call::*;
pub use connection::*;
pub use driver::*;
pub use error::*;
pub use types::*;
