//! Enum converters and enumerator constants.

use super::cpp_type;
use crate::config::Config;
use crate::model::{cpp_name, scope_of, Api, Enum};

/// An enum that gets a converter pair.
pub fn is_bindable(e: &Enum) -> bool {
    e.rejection.is_none() && !e.is_anonymous()
}

/// C++ scope holding the enumerators: the enum itself when scoped, the
/// enclosing scope otherwise.
pub fn value_scope(e: &Enum) -> &str {
    if e.is_scoped {
        &e.qualified_name
    } else {
        scope_of(&e.qualified_name)
    }
}

/// Host constant `(name, C++ expression)` for every enumerator.
///
/// Names are the enumerator's path below `scope` joined with `_`. Seen from
/// `cv`, scoped `cv.Flag.A` is `Flag_A`, `cv.ORB.HARRIS_SCORE` is
/// `ORB_HARRIS_SCORE` and a plain namespace enumerator keeps its own name.
pub fn enumerator_constants(e: &Enum, scope: &str) -> Vec<(String, String)> {
    if e.rejection.is_some() {
        return Vec::new();
    }
    let values = value_scope(e);
    e.enumerators
        .iter()
        .map(|v| {
            let full = format!("{}.{}", values, v.name);
            let below = full
                .strip_prefix(scope)
                .and_then(|r| r.strip_prefix('.'))
                .unwrap_or(&full);
            (below.replace('.', "_"), cpp_name(&full))
        })
        .collect()
}

/// Converter pair per bindable enum.
pub fn emit_enums(api: &Api, config: &Config) -> String {
    let p = &config.prefix;
    let mut out = String::new();
    for e in api.enums.values().filter(|e| is_bindable(e)) {
        let cpp = cpp_type(&e.qualified_name);
        out.push_str(&format!("// {}\n", e.qualified_name));
        out.push_str(&format!(
            "static bool {p}_to(VALUE obj, {cpp}& dst)\n{{\n    if (!RB_INTEGER_TYPE_P(obj)) {{\n        return false;\n    }}\n    dst = static_cast<{cpp}>(NUM2INT(obj));\n    return true;\n}}\n\n",
            p = p,
            cpp = cpp
        ));
        out.push_str(&format!(
            "static VALUE {p}_from(const {cpp}& src)\n{{\n    return INT2NUM(static_cast<int>(src));\n}}\n\n",
            p = p,
            cpp = cpp
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Enumerator, Owner};

    fn enumeration(name: &str, scoped: bool, values: &[&str]) -> Enum {
        Enum {
            qualified_name: name.to_string(),
            is_scoped: scoped,
            owner: Owner::Namespace("cv".to_string()),
            enumerators: values
                .iter()
                .enumerate()
                .map(|(i, v)| Enumerator {
                    name: v.to_string(),
                    value: i.to_string(),
                })
                .collect(),
            rejection: None,
        }
    }

    #[test]
    fn constant_names_by_enum_kind() {
        let plain = enumeration("cv.BorderTypes", false, &["BORDER_DEFAULT"]);
        assert_eq!(
            enumerator_constants(&plain, "cv"),
            vec![("BORDER_DEFAULT".to_string(), "cv::BORDER_DEFAULT".to_string())]
        );

        let scoped = enumeration("cv.Flag", true, &["A"]);
        assert_eq!(
            enumerator_constants(&scoped, "cv"),
            vec![("Flag_A".to_string(), "cv::Flag::A".to_string())]
        );

        let nested = enumeration("cv.ORB.ScoreType", false, &["HARRIS_SCORE"]);
        assert_eq!(
            enumerator_constants(&nested, "cv"),
            vec![("ORB_HARRIS_SCORE".to_string(), "cv::ORB::HARRIS_SCORE".to_string())]
        );
        assert_eq!(
            enumerator_constants(&nested, "cv.ORB"),
            vec![("HARRIS_SCORE".to_string(), "cv::ORB::HARRIS_SCORE".to_string())]
        );

        let anon = enumeration("cv.<unnamed>", false, &["FILLED"]);
        assert_eq!(
            enumerator_constants(&anon, "cv"),
            vec![("FILLED".to_string(), "cv::FILLED".to_string())]
        );
    }

    #[test]
    fn rejected_enums_export_no_constants() {
        let mut e = enumeration("cv.Foo.Mode", true, &["X"]);
        e.rejection = Some("scoped enum inside class".to_string());
        assert!(enumerator_constants(&e, "cv").is_empty());
    }

    #[test]
    fn only_bindable_enums_get_converters() {
        let mut api = Api::default();
        let mut rejected = enumeration("cv.Foo.Mode", true, &["X"]);
        rejected.rejection = Some("scoped enum inside class".to_string());
        api.enums.insert("cv.Flag".to_string(), enumeration("cv.Flag", true, &["A"]));
        api.enums.insert("cv.Foo.Mode".to_string(), rejected);
        api.enums
            .insert("cv.<unnamed>".to_string(), enumeration("cv.<unnamed>", false, &["FILLED"]));

        let text = emit_enums(&api, &Config::default());
        assert!(text.contains("static bool rbbind_to(VALUE obj, cv::Flag& dst)"));
        assert!(text.contains("static VALUE rbbind_from(const cv::Flag& src)"));
        assert!(!text.contains("Mode"));
        assert!(!text.contains("unnamed"));
    }
}
