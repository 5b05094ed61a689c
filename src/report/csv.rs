//! Flat CSV table, one line per variant.

use super::{Report, ReportRow};

pub struct CsvReport;

impl Report for CsvReport {
    fn render(&self, rows: &[ReportRow]) -> String {
        let mut out = String::from("function,variant,arg_types,supported,reason\n");
        for row in rows {
            out.push_str(&format!(
                "{},{},{},{},{}\n",
                field(&row.function),
                row.variant,
                field(&row.arg_types.join(" ")),
                row.eligible,
                field(&row.reason)
            ));
        }
        out
    }

    fn file_extension(&self) -> &str {
        "csv"
    }
}

/// Quote a field when it holds a separator, quote or newline.
fn field(s: &str) -> String {
    if s.contains([',', '"', '\n']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_only_when_needed() {
        let rows = vec![
            ReportRow {
                function: "cv.add".to_string(),
                variant: 0,
                arg_types: vec!["int".to_string(), "int".to_string()],
                eligible: true,
                reason: String::new(),
            },
            ReportRow {
                function: "cv.blur".to_string(),
                variant: 1,
                arg_types: vec!["vector<cv.Point>".to_string()],
                eligible: false,
                reason: "argument 'x' has unresolved type 'Foo, \"Bar\"'".to_string(),
            },
        ];
        let text = CsvReport.render(&rows);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "function,variant,arg_types,supported,reason");
        assert_eq!(lines[1], "cv.add,0,int int,true,");
        assert_eq!(
            lines[2],
            "cv.blur,1,vector<cv.Point>,false,\"argument 'x' has unresolved type 'Foo, \"\"Bar\"\"'\""
        );
    }
}
