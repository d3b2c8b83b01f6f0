#![allow(clippy::type_complexity)]
#![allow(clippy::from_over_into)]
#![allow(clippy::module_inception)]
#![allow(clippy::upper_case_acronyms)]
#![doc(test(
    no_crate_inject,
    attr(deny(warnings, rust_2018_idioms), allow(dead_code, unused_variables))
))]

#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;

pub use error::TallyError;
pub use hook::{AutoIncrement, SequenceHook};
pub use reference::{FieldValue, ReferenceValue};
pub use registry::SequenceRegistry;
pub use sequence::{HookMode, RetryPolicy, Sequence, SequenceDefinition};
pub use tally_etc::{Config, ReferenceFields, RetryOptions, SequenceOptions};

pub type Result<T> = std::result::Result<T, TallyError>;

pub mod document;
mod error;
mod hook;
mod reference;
mod registry;
mod sequence;
pub mod store;
