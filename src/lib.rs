//! rbbind: generate Ruby C-extension glue from exported C++ API declarations.
//!
//! The pipeline runs in fixed stages over one [`decl::DeclSet`]:
//!
//! 1. [`ingest`] files each raw declaration by kind.
//! 2. [`assemble`] links owners, parents and overload sets into a [`model::Api`].
//! 3. [`resolve`] qualifies every type a signature mentions.
//! 4. [`filter`] decides which variants can be marshalled.
//! 5. [`emit`] writes the dispatch routines and registration code.
//!
//! [`generate`] runs all of them.

pub mod assemble;
pub mod config;
pub mod decl;
pub mod emit;
pub mod error;
pub mod filter;
pub mod ingest;
pub mod model;
pub mod report;
pub mod resolve;

use config::Config;
use decl::DeclSet;
use error::Result;
use ingest::ApiBuilder;
use tracing::info;

/// Result of one generation run.
#[derive(Debug, Clone)]
pub struct Generated {
    pub output: emit::Output,
    pub report: Vec<report::ReportRow>,
    pub functions: usize,
    pub emitted: usize,
}

/// Run every stage over a declaration set.
pub fn generate(set: &DeclSet, config: &Config) -> Result<Generated> {
    let mut builder = ApiBuilder::new(&config.root_namespace);
    builder.ingest_all(set)?;
    let mut api = builder.finish(config)?;
    resolve::resolve_api(&mut api, config)?;

    let statuses = filter::classify_all(&api, config);
    let emitted = statuses
        .values()
        .filter(|st| st.iter().any(|s| s.eligible))
        .count();
    info!(
        "{} of {} functions have an eligible variant",
        emitted,
        api.functions.len()
    );

    Ok(Generated {
        output: emit::emit_api(&api, &statuses, config),
        report: report::rows(&api, &statuses),
        functions: api.functions.len(),
        emitted,
    })
}
