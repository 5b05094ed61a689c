//! Fatal generator errors.
//!
//! Anything in here aborts the batch. Per-variant eligibility rejections are
//! plain data (see [`crate::filter::Eligibility`]) and never show up here.

use crate::decl::Origin;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenError {
    /// Every scope candidate was tried and none named a declared type.
    #[error("unresolvable type '{ty}' in {context} (searched from scope '{scope}')")]
    UnresolvedType {
        ty: String,
        scope: String,
        /// e.g. "cv.Foo.bar variant 1 argument 'x'"
        context: String,
    },

    /// An enum or class whose scope is neither a namespace nor a class, and
    /// which cannot be hosted by a synthesized class either.
    #[error("cannot place '{name}': scope '{scope}' is not a known namespace or class")]
    Placement { name: String, scope: String },

    #[error("class '{name}' declared twice ({first} and {second})")]
    DuplicateClass {
        name: String,
        first: Origin,
        second: Origin,
    },

    #[error("enum '{name}' declared twice ({first} and {second})")]
    DuplicateEnum {
        name: String,
        first: Origin,
        second: Origin,
    },

    #[error("inheritance cycle through class '{name}'")]
    InheritanceCycle { name: String },

    #[error("malformed declaration at {origin}: {message}")]
    MalformedDecl { origin: Origin, message: String },
}

pub type Result<T> = std::result::Result<T, GenError>;
