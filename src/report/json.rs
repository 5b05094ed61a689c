//! JSON array of rows, for tooling that diffs support across runs.

use super::{Report, ReportRow};

pub struct JsonReport;

impl Report for JsonReport {
    fn render(&self, rows: &[ReportRow]) -> String {
        // Serializing plain strings, bools and integers cannot fail.
        let mut out = serde_json::to_string_pretty(rows).unwrap_or_else(|_| "[]".to_string());
        out.push('\n');
        out
    }

    fn file_extension(&self) -> &str {
        "json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_serialize_with_field_names() {
        let rows = vec![ReportRow {
            function: "cv.add".to_string(),
            variant: 0,
            arg_types: vec!["int".to_string()],
            eligible: false,
            reason: "too many mandatory arguments: 11".to_string(),
        }];
        let value: serde_json::Value = serde_json::from_str(&JsonReport.render(&rows)).unwrap();
        assert_eq!(value[0]["function"], "cv.add");
        assert_eq!(value[0]["arg_types"][0], "int");
        assert_eq!(value[0]["eligible"], false);
        assert_eq!(value[0]["reason"], "too many mandatory arguments: 11");
    }
}
