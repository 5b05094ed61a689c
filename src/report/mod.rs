//! Support-status report: one row per variant, rendered through a
//! format-specific [`Report`].

pub mod csv;
pub mod json;

use crate::filter::Eligibility;
use crate::model::Api;
use anyhow::{anyhow, Result};
use serde::Serialize;
use std::collections::BTreeMap;

/// Eligibility of one variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    pub function: String,
    pub variant: usize,
    pub arg_types: Vec<String>,
    pub eligible: bool,
    /// Empty when eligible.
    pub reason: String,
}

/// Rows for every variant of every function, ordered by qualified name and
/// then declaration order.
pub fn rows(api: &Api, statuses: &BTreeMap<String, Vec<Eligibility>>) -> Vec<ReportRow> {
    let mut out = Vec::new();
    for (key, function) in &api.functions {
        let Some(status) = statuses.get(key) else {
            continue;
        };
        for (i, (variant, st)) in function.variants.iter().zip(status).enumerate() {
            out.push(ReportRow {
                function: function.qualified_name.clone(),
                variant: i,
                arg_types: variant.args.iter().map(|a| a.ty().to_string()).collect(),
                eligible: st.eligible,
                reason: st.reason.clone(),
            });
        }
    }
    out
}

pub trait Report {
    fn render(&self, rows: &[ReportRow]) -> String;
    fn file_extension(&self) -> &str;
}

/// Create a report renderer for the given format name.
pub fn create_report(format: &str) -> Result<Box<dyn Report>> {
    match format {
        "csv" => Ok(Box::new(csv::CsvReport)),
        "json" => Ok(Box::new(json::JsonReport)),
        _ => Err(anyhow!("unknown report format: {}. Use csv or json", format)),
    }
}
