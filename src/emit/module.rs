//! Method and constant tables, and the registration sequence.
//!
//! Namespaces become host modules through `<prefix>_init_submodule`; bound
//! classes are defined through `<prefix>_define_class` and filled in with
//! `<prefix>_init_class`. Both helpers belong to the hand-written runtime.

use super::dispatch::{host_name, CallKind, DispatchPlan};
use super::{c_string, class, enums, ident};
use crate::assemble::split_namespace;
use crate::config::Config;
use crate::model::{scope_of, Api, Class};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

type Plans<'a> = BTreeMap<&'a str, DispatchPlan>;

fn method_table(name: &str, entries: &[(String, String)]) -> String {
    let mut out = format!("static MethodDef {}[] = {{\n", name);
    for (host, wrapper) in entries {
        out.push_str(&format!("    {{\"{}\", {}}},\n", c_string(host), wrapper));
    }
    out.push_str("    {NULL, NULL}\n};\n\n");
    out
}

fn const_table(name: &str, entries: &[(String, String)]) -> String {
    let mut out = format!("static ConstDef {}[] = {{\n", name);
    for (host, expr) in entries {
        out.push_str(&format!(
            "    {{\"{}\", static_cast<long>({})}},\n",
            c_string(host),
            expr
        ));
    }
    out.push_str("    {NULL, 0}\n};\n\n");
    out
}

/// `(host name, wrapper)` for every emitted function in `keys` of the given
/// kinds.
fn entries(plans: &Plans, keys: &[String], kinds: &[CallKind], api: &Api) -> Vec<(String, String)> {
    keys.iter()
        .filter_map(|k| {
            let plan = plans.get(k.as_str())?;
            if !kinds.contains(&plan.kind) {
                return None;
            }
            let function = api.functions.get(k)?;
            Some((host_name(function).to_string(), plan.wrapper_name.clone()))
        })
        .collect()
}

static CAMEL_HUMP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([a-z])([A-Z])").unwrap());

/// `UPPER_SNAKE` spelling of a constant name: `BorderTypes_X` -> `BORDER_TYPES_X`.
pub fn compat_name(name: &str) -> String {
    CAMEL_HUMP.replace_all(name, "${1}_${2}").to_uppercase()
}

/// Follow every row whose name is not already `UPPER_SNAKE` with an alias
/// that is, unless that name is taken.
fn with_compat_aliases(rows: Vec<(String, String)>) -> Vec<(String, String)> {
    let mut taken: BTreeSet<String> = rows.iter().map(|(n, _)| n.clone()).collect();
    let mut out = Vec::with_capacity(rows.len() * 2);
    for (name, expr) in rows {
        let compat = compat_name(&name);
        let alias = taken.insert(compat.clone()).then(|| (compat, expr.clone()));
        out.push((name, expr));
        out.extend(alias);
    }
    out
}

/// Method and constant tables for every namespace and bound class.
///
/// A namespace table also carries the static methods of the classes below
/// it (`Detector_create`) and every enumerator below it, class-level ones
/// included (`Detector_FAST`), so constants of unbound classes still reach
/// the host.
pub fn emit_tables(api: &Api, plans: &Plans, config: &Config) -> String {
    let p = &config.prefix;
    let mut out = String::new();

    // -- Namespaces -----------------------------------------------------------
    for (name, ns) in &api.namespaces {
        let id = ident(name);
        out.push_str(&format!("// {}\n", name));
        let mut methods = entries(plans, &ns.functions, &[CallKind::Function], api);
        for (key, plan) in plans {
            if plan.kind != CallKind::StaticMethod || plan.namespace != *name {
                continue;
            }
            methods.push((split_namespace(api, key).1, plan.wrapper_name.clone()));
        }
        out.push_str(&method_table(&format!("{}_methods_{}", p, id), &methods));

        let mut consts: Vec<(String, String)> = ns
            .constants
            .iter()
            .map(|c| (c.name.clone(), c.cname.clone()))
            .collect();
        for e in api.enums.values() {
            if api.nearest_namespace(enums::value_scope(e)) == name.as_str() {
                consts.extend(enums::enumerator_constants(e, name));
            }
        }
        out.push_str(&const_table(
            &format!("{}_consts_{}", p, id),
            &with_compat_aliases(consts),
        ));
    }

    // -- Classes --------------------------------------------------------------
    for c in registration_order(api) {
        let id = ident(&c.qualified_name);
        out.push_str(&format!("// {}\n", c.qualified_name));
        out.push_str(&method_table(
            &format!("{}_methods_{}", p, id),
            &entries(plans, &c.methods, &[CallKind::Method], api),
        ));
        out.push_str(&method_table(
            &format!("{}_smethods_{}", p, id),
            &entries(plans, &c.methods, &[CallKind::StaticMethod], api),
        ));
        let consts: Vec<(String, String)> = c
            .nested_enums
            .iter()
            .filter_map(|e| api.enums.get(e))
            .flat_map(|e| enums::enumerator_constants(e, &c.qualified_name))
            .collect();
        out.push_str(&const_table(&format!("{}_consts_{}", p, id), &consts));
    }
    out
}

/// Registration calls: modules first, then classes with every base class
/// and enclosing class ahead of the classes that need it.
pub fn emit_registration(api: &Api, plans: &Plans, config: &Config) -> String {
    let p = &config.prefix;
    let mut out = String::new();
    for name in api.namespaces.keys() {
        let id = ident(name);
        out.push_str(&format!(
            "{p}_init_submodule(\"{name}\", {p}_methods_{id}, {p}_consts_{id});\n",
            p = p,
            name = name,
            id = id
        ));
    }
    if !api.namespaces.is_empty() {
        out.push('\n');
    }

    let filter = crate::filter::Filter::new(api, config);
    for c in registration_order(api) {
        let id = ident(&c.qualified_name);
        let var = format!("{}_{}_class", p, id);
        let superclass = match class::bound_parent(api, c) {
            Some(parent) => format!("{}_{}_class", p, ident(&parent.qualified_name)),
            None => "rb_cObject".to_string(),
        };
        out.push_str(&format!(
            "{var} = {p}_define_class(\"{owner}\", \"{name}\", {sup});\n",
            var = var,
            p = p,
            owner = scope_of(&c.qualified_name),
            name = c_string(&c.display_name),
            sup = superclass
        ));
        out.push_str(&format!(
            "rb_define_alloc_func({}, {}_{}_alloc);\n",
            var, p, id
        ));
        let ctor = c
            .methods
            .iter()
            .filter_map(|k| plans.get(k.as_str()))
            .find(|plan| plan.kind == CallKind::Constructor);
        if let Some(plan) = ctor {
            out.push_str(&format!(
                "rb_define_method({}, \"initialize\", RUBY_METHOD_FUNC({}), -1);\n",
                var, plan.wrapper_name
            ));
        }
        for acc in class::accessors(p, c, &filter) {
            out.push_str(&format!(
                "rb_define_method({}, \"{}\", RUBY_METHOD_FUNC({}), 0);\n",
                var, acc.field, acc.getter
            ));
            if let Some(setter) = &acc.setter {
                out.push_str(&format!(
                    "rb_define_method({}, \"{}=\", RUBY_METHOD_FUNC({}), 1);\n",
                    var, acc.field, setter
                ));
            }
        }
        out.push_str(&format!(
            "{p}_init_class({var}, {p}_methods_{id}, {p}_smethods_{id}, {p}_consts_{id});\n\n",
            p = p,
            var = var,
            id = id
        ));
    }
    out
}

/// Bound classes, each after its bound parent and its enclosing class.
pub fn registration_order(api: &Api) -> Vec<&Class> {
    fn visit<'a>(api: &'a Api, c: &'a Class, seen: &mut BTreeSet<&'a str>, out: &mut Vec<&'a Class>) {
        if !seen.insert(c.qualified_name.as_str()) {
            return;
        }
        if let Some(parent) = class::bound_parent(api, c) {
            visit(api, parent, seen, out);
        }
        if let Some(outer) = api.classes.get(scope_of(&c.qualified_name)) {
            if class::is_bound(outer) {
                visit(api, outer, seen, out);
            }
        }
        out.push(c);
    }

    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for c in api.classes_by_depth() {
        if class::is_bound(c) {
            visit(api, c, &mut seen, &mut out);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decl::parse_document;
    use crate::filter::classify_all;
    use crate::ingest::ApiBuilder;
    use crate::resolve::resolve_api;

    fn tables(src: &str) -> (String, String) {
        let config = Config::default();
        let set = parse_document(src, "test.json").unwrap();
        let mut b = ApiBuilder::new("cv");
        b.ingest_all(&set).unwrap();
        let mut api = b.finish(&config).unwrap();
        resolve_api(&mut api, &config).unwrap();
        let statuses = classify_all(&api, &config);
        let plans: Plans = api
            .functions
            .iter()
            .filter_map(|(k, f)| {
                DispatchPlan::build(f, &statuses[k], &api, &config).map(|p| (k.as_str(), p))
            })
            .collect();
        (
            emit_tables(&api, &plans, &config),
            emit_registration(&api, &plans, &config),
        )
    }

    const SRC: &str = r#"{
        "namespaces": ["cv", "cv.aruco"],
        "decls": [
            ["class cv.Algorithm", "", [], []],
            ["class cv.aruco.Detector", ": cv::Algorithm", [], [["int", "level", "", ["/RW"]]]],
            ["class cv.aruco.Detector.Options", "", [], []],
            ["cv.aruco.Detector.Detector", "", [], [], "", ""],
            ["cv.aruco.Detector.detect", "int", [], [["Mat", "img", "", []]], "int", ""],
            ["cv.aruco.Detector.create", "Ptr_aruco_Detector", ["/S"], [], "Ptr<aruco::Detector>", ""],
            ["enum cv.aruco.Detector.Mode", "", [], [["const cv.aruco.Detector.Mode.FAST", "0", [], []]]],
            ["enum class cv.aruco.Corner", "", [], [["const cv.aruco.Corner.TL", "0", [], []]]],
            ["const cv.aruco.MAX_MARKERS", "1024", [], []],
            ["cv.aruco.draw", "void", [], [["Mat", "img", "", []]], "void", ""],
            ["cv.aruco.unsupported", "Range", [], [], "Range", ""]
        ]
    }"#;

    #[test]
    fn namespace_tables() {
        let (tables, _) = tables(SRC);
        assert!(tables.contains(
            "static MethodDef rbbind_methods_cv_aruco[] = {\n    {\"draw\", rbbind_cv_aruco_draw},\n    {\"Detector_create\", rbbind_cv_aruco_Detector_create_static},\n    {NULL, NULL}\n};"
        ));
        assert!(!tables.contains("unsupported"));
        assert!(tables.contains(
            "static ConstDef rbbind_consts_cv_aruco[] = {\n    {\"MAX_MARKERS\", static_cast<long>(cv::aruco::MAX_MARKERS)},\n    {\"Corner_TL\", static_cast<long>(cv::aruco::Corner::TL)},\n    {\"CORNER_TL\", static_cast<long>(cv::aruco::Corner::TL)},\n    {\"Detector_FAST\", static_cast<long>(cv::aruco::Detector::FAST)},\n    {\"DETECTOR_FAST\", static_cast<long>(cv::aruco::Detector::FAST)},\n    {NULL, 0}\n};"
        ));
    }

    #[test]
    fn enumerators_of_unbound_classes_reach_the_namespace() {
        let (tables, _) = tables(
            r#"[
                ["cv.detect", "void", [], []],
                ["enum cv.Params.Mode", "", [], [["const cv.Params.Mode.FAST", "1", [], []]]],
                ["class cv.Options", "", ["/Map"], []],
                ["enum cv.Options.Level", "", [], [["const cv.Options.Level.HIGH", "2", [], []]]]
            ]"#,
        );
        assert!(tables.contains("    {\"Params_FAST\", static_cast<long>(cv::Params::FAST)},\n"));
        assert!(tables.contains("    {\"PARAMS_FAST\", static_cast<long>(cv::Params::FAST)},\n"));
        assert!(tables.contains("    {\"Options_HIGH\", static_cast<long>(cv::Options::HIGH)},\n"));
        assert!(!tables.contains("rbbind_consts_cv_Params"));
    }

    #[test]
    fn compat_names_split_camel_case() {
        assert_eq!(compat_name("BorderTypes_X"), "BORDER_TYPES_X");
        assert_eq!(compat_name("MAX_MARKERS"), "MAX_MARKERS");
        assert_eq!(compat_name("Ns1_Foo_LIMIT"), "NS1_FOO_LIMIT");

        let rows = with_compat_aliases(vec![
            ("FILLED".to_string(), "cv::FILLED".to_string()),
            ("Flag_A".to_string(), "cv::Flag::A".to_string()),
            ("FLAG_A".to_string(), "cv::FLAG_A".to_string()),
        ]);
        let names: Vec<&str> = rows.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["FILLED", "Flag_A", "FLAG_A"]);
    }

    #[test]
    fn class_tables_split_instance_and_static_methods() {
        let (tables, _) = tables(SRC);
        assert!(tables.contains(
            "static MethodDef rbbind_methods_cv_aruco_Detector[] = {\n    {\"detect\", rbbind_cv_aruco_Detector_detect},\n    {NULL, NULL}\n};"
        ));
        assert!(tables.contains(
            "static MethodDef rbbind_smethods_cv_aruco_Detector[] = {\n    {\"create\", rbbind_cv_aruco_Detector_create_static},\n    {NULL, NULL}\n};"
        ));
        assert!(tables.contains(
            "static ConstDef rbbind_consts_cv_aruco_Detector[] = {\n    {\"FAST\", static_cast<long>(cv::aruco::Detector::FAST)},\n    {NULL, 0}\n};"
        ));
    }

    #[test]
    fn registration_respects_inheritance_and_nesting() {
        let (_, reg) = tables(SRC);
        assert!(reg.contains("rbbind_init_submodule(\"cv.aruco\", rbbind_methods_cv_aruco, rbbind_consts_cv_aruco);"));
        assert!(reg.contains(
            "rbbind_cv_aruco_Detector_class = rbbind_define_class(\"cv.aruco\", \"Detector\", rbbind_cv_Algorithm_class);"
        ));
        assert!(reg.contains(
            "rb_define_method(rbbind_cv_aruco_Detector_class, \"initialize\", RUBY_METHOD_FUNC(rbbind_cv_aruco_Detector_Detector), -1);"
        ));
        assert!(reg.contains("\"level=\""));
        let alg = reg.find("rbbind_cv_Algorithm_class = ").unwrap();
        let det = reg.find("rbbind_cv_aruco_Detector_class = ").unwrap();
        let opt = reg.find("rbbind_cv_aruco_Detector_Options_class = ").unwrap();
        assert!(alg < det && det < opt);
    }
}
