//! Wrapper emission for the Ruby C extension API.
//!
//! Output is split across five headers, included by the hand-written
//! extension source in this order:
//!
//! | file                              | content                                    |
//! |-----------------------------------|--------------------------------------------|
//! | `<prefix>_generated_enums.h`      | enum converters                            |
//! | `<prefix>_generated_types.h`      | class storage, converters and accessors    |
//! | `<prefix>_generated_funcs.h`      | dispatch routines                          |
//! | `<prefix>_generated_modules_content.h` | method and constant tables            |
//! | `<prefix>_generated_modules.h`    | registration calls                         |
//!
//! Value conversion is done by overloaded `<prefix>_to(VALUE, T&)` and
//! `<prefix>_from(const T&)` functions. Those for library types (`cv::Mat`,
//! `cv::Point`, ...) and the `MethodDef`/`ConstDef` helpers live in the
//! hand-written runtime; the ones for declared classes and enums are emitted
//! here.

pub mod class;
pub mod dispatch;
pub mod enums;
pub mod module;

use crate::config::Config;
use crate::filter::Eligibility;
use crate::model::{Api, Function};
use dispatch::DispatchPlan;
use std::collections::BTreeMap;
use tracing::debug;

/// The generated headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Output {
    pub funcs: String,
    pub types: String,
    pub enums: String,
    pub modules_content: String,
    pub modules: String,
}

impl Output {
    /// `(file name, content)` pairs, in include order.
    pub fn files(&self, prefix: &str) -> Vec<(String, &str)> {
        [
            ("enums", &self.enums),
            ("types", &self.types),
            ("funcs", &self.funcs),
            ("modules_content", &self.modules_content),
            ("modules", &self.modules),
        ]
        .into_iter()
        .map(|(part, body)| (format!("{}_generated_{}.h", prefix, part), body.as_str()))
        .collect()
    }
}

const BANNER: &str = "// Generated by rbbind. Do not edit.\n\n";

/// Emit the dispatch routine for one function, or `None` when it has no
/// eligible variant.
pub fn emit(
    function: &Function,
    statuses: &[Eligibility],
    api: &Api,
    config: &Config,
) -> Option<String> {
    DispatchPlan::build(function, statuses, api, config).map(|plan| plan.render(&config.prefix))
}

/// Emit every header for a classified model.
pub fn emit_api(
    api: &Api,
    statuses: &BTreeMap<String, Vec<Eligibility>>,
    config: &Config,
) -> Output {
    let plans: BTreeMap<&str, DispatchPlan> = api
        .functions
        .iter()
        .filter_map(|(key, f)| {
            let st = statuses.get(key)?;
            DispatchPlan::build(f, st, api, config).map(|p| (key.as_str(), p))
        })
        .collect();
    debug!("emitting {} of {} functions", plans.len(), api.functions.len());

    let mut out = Output::default();
    out.funcs.push_str(BANNER);
    for plan in plans.values() {
        out.funcs.push_str(&plan.render(&config.prefix));
        out.funcs.push('\n');
    }

    out.enums.push_str(BANNER);
    out.enums.push_str(&enums::emit_enums(api, config));

    out.types.push_str(BANNER);
    out.types.push_str(&class::emit_classes(api, config));

    out.modules_content.push_str(BANNER);
    out.modules_content
        .push_str(&module::emit_tables(api, &plans, config));

    out.modules.push_str(BANNER);
    out.modules
        .push_str(&module::emit_registration(api, &plans, config));
    out
}

/// Spell a resolved type the way C++ does.
///
/// ```text
/// vector<cv.Point>  ->  std::vector<cv::Point>
/// Ptr<cv.ml.SVM>    ->  cv::Ptr<cv::ml::SVM>
/// string            ->  std::string
/// ```
pub fn cpp_type(ty: &str) -> String {
    if let Some(inner) = ty.strip_suffix('*') {
        return format!("{}*", cpp_type(inner));
    }
    if let Some(inner) = unwrap_template(ty, "vector<") {
        return format!("std::vector<{}>", cpp_type(inner));
    }
    if let Some(inner) = unwrap_template(ty, "Ptr<") {
        return format!("cv::Ptr<{}>", cpp_type(inner));
    }
    match ty {
        "string" => "std::string".to_string(),
        "c_string" => "const char*".to_string(),
        _ => ty.replace('.', "::"),
    }
}

fn unwrap_template<'a>(ty: &'a str, open: &str) -> Option<&'a str> {
    ty.strip_prefix(open)?.strip_suffix('>').map(str::trim)
}

/// Turn a dotted name into a C identifier fragment: `cv.Foo.operator()`
/// becomes `cv_Foo_operator__`.
pub fn ident(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Declaration docs as `//` lines, blank lines dropped.
pub fn doc_comment(doc: &str, indent: &str) -> String {
    doc.lines()
        .map(str::trim_end)
        .filter(|l| !l.trim().is_empty())
        .map(|l| format!("{}// {}\n", indent, l))
        .collect()
}

/// Escape text for a C string literal.
pub fn c_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpp_spellings() {
        assert_eq!(cpp_type("int"), "int");
        assert_eq!(cpp_type("int*"), "int*");
        assert_eq!(cpp_type("string"), "std::string");
        assert_eq!(cpp_type("cv.Mat"), "cv::Mat");
        assert_eq!(cpp_type("vector<cv.Point>"), "std::vector<cv::Point>");
        assert_eq!(
            cpp_type("vector<vector<cv.Point>>"),
            "std::vector<std::vector<cv::Point>>"
        );
        assert_eq!(cpp_type("Ptr<cv.ml.SVM>"), "cv::Ptr<cv::ml::SVM>");
    }

    #[test]
    fn identifiers() {
        assert_eq!(ident("cv.Foo.method1"), "cv_Foo_method1");
        assert_eq!(ident("cv.Foo.operator()"), "cv_Foo_operator__");
    }

    #[test]
    fn file_names_follow_prefix() {
        let out = Output::default();
        let names: Vec<String> = out.files("ext").into_iter().map(|(n, _)| n).collect();
        assert_eq!(
            names,
            vec![
                "ext_generated_enums.h",
                "ext_generated_types.h",
                "ext_generated_funcs.h",
                "ext_generated_modules_content.h",
                "ext_generated_modules.h",
            ]
        );
    }

    #[test]
    fn emit_skips_functions_without_eligible_variants() {
        let config = Config::default();
        let set = crate::decl::parse_document(
            r#"[
                ["cv.ok", "int", [], [["int", "a", "", []]], "int", ""],
                ["cv.bad", "Range", [], [], "Range", ""]
            ]"#,
            "test.json",
        )
        .unwrap();
        let mut b = crate::ingest::ApiBuilder::new("cv");
        b.ingest_all(&set).unwrap();
        let mut api = b.finish(&config).unwrap();
        crate::resolve::resolve_api(&mut api, &config).unwrap();
        let statuses = crate::filter::classify_all(&api, &config);

        let ok = emit(&api.functions["cv.ok"], &statuses["cv.ok"], &api, &config).unwrap();
        assert!(ok.starts_with("// cv.ok\nstatic VALUE rbbind_cv_ok("));
        assert!(emit(&api.functions["cv.bad"], &statuses["cv.bad"], &api, &config).is_none());
    }

    #[test]
    fn docs_become_line_comments() {
        assert_eq!(doc_comment("Adds.\n\n  two ints", "    "), "    // Adds.\n    //   two ints\n");
        assert_eq!(doc_comment("", ""), "");
    }

    #[test]
    fn c_string_escapes() {
        assert_eq!(c_string(r#"a "b" \ c"#), r#"a \"b\" \\ c"#);
    }
}
