//! Class emission: typed-data storage, converters and field accessors.
//!
//! A regular class is held as `cv::Ptr<Root>`, where `Root` is the topmost
//! bound ancestor, so an instance of a derived class is readable through any
//! base's descriptor. `/Simple` classes are stored by value and do not take
//! part in the hierarchy. `/Map` classes get a single converter reading a
//! host hash key by key.

use super::{cpp_type, ident};
use crate::config::Config;
use crate::filter::Filter;
use crate::model::{Api, Class};
use tracing::debug;

/// A class that gets a host type of its own.
pub fn is_bound(class: &Class) -> bool {
    !class.no_bind && !class.is_map
}

/// Values of this resolved type live behind a smart pointer.
pub fn held_by_ptr(api: &Api, ty: &str) -> bool {
    api.classes
        .get(ty)
        .is_some_and(|c| is_bound(c) && !c.is_simple)
}

/// The parent whose descriptor and host class this class chains to.
pub fn bound_parent<'a>(api: &'a Api, class: &Class) -> Option<&'a Class> {
    if class.is_simple {
        return None;
    }
    let parent = api.classes.get(class.parent.as_deref()?)?;
    (is_bound(parent) && !parent.is_simple).then_some(parent)
}

/// Topmost ancestor reachable through [`bound_parent`].
fn storage_root<'a>(api: &'a Api, class: &'a Class) -> &'a Class {
    let mut current = class;
    while let Some(parent) = bound_parent(api, current) {
        current = parent;
    }
    current
}

/// Expression building a new instance from constructor arguments.
pub fn construct_expr(simple: bool, cpp: &str, args: &str) -> String {
    if simple {
        format!("{}({})", cpp, args)
    } else {
        format!("cv::makePtr<{}>({})", cpp, args)
    }
}

/// A field exposed on the host class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accessor {
    pub field: String,
    pub getter: String,
    pub setter: Option<String>,
}

/// Getter (and setter, for `/RW` fields) per field with a bindable type.
pub fn accessors(prefix: &str, class: &Class, filter: &Filter) -> Vec<Accessor> {
    let id = ident(&class.qualified_name);
    class
        .fields
        .iter()
        .filter_map(|f| {
            let ty = f.qualified_type.as_deref()?;
            if !filter.is_bindable_return(ty) {
                debug!("{}.{}: field type {} is not bindable", class.qualified_name, f.name, ty);
                return None;
            }
            Some(Accessor {
                field: f.name.clone(),
                getter: format!("{}_{}_get_{}", prefix, id, f.name),
                setter: (!f.read_only && filter.is_bindable_arg(ty))
                    .then(|| format!("{}_{}_set_{}", prefix, id, f.name)),
            })
        })
        .collect()
}

/// Everything that goes into the types header.
pub fn emit_classes(api: &Api, config: &Config) -> String {
    let prefix = &config.prefix;
    let filter = Filter::new(api, config);
    let classes: Vec<&Class> = api
        .classes_by_depth()
        .into_iter()
        .filter(|c| !c.no_bind)
        .collect();

    let mut out = String::new();

    // -- Forward declarations -------------------------------------------------
    for class in &classes {
        out.push_str(&forward_decls(prefix, class));
    }
    if !classes.is_empty() {
        out.push('\n');
    }

    for class in &classes {
        if class.is_map {
            out.push_str(&emit_map_converter(api, prefix, class, &filter));
        } else {
            out.push_str(&emit_bound_class(api, prefix, class, &filter));
        }
        out.push('\n');
    }
    out
}

fn forward_decls(prefix: &str, class: &Class) -> String {
    let cpp = cpp_type(&class.qualified_name);
    let id = ident(&class.qualified_name);
    if class.is_map {
        return format!("static bool {}_to(VALUE obj, {}& dst);\n", prefix, cpp);
    }
    let mut out = format!("static VALUE {}_{}_class = Qnil;\n", prefix, id);
    if class.is_simple {
        out.push_str(&format!("static bool {}_to(VALUE obj, {}& dst);\n", prefix, cpp));
        out.push_str(&format!("static VALUE {}_from(const {}& src);\n", prefix, cpp));
    } else {
        out.push_str(&format!(
            "static bool {}_to(VALUE obj, cv::Ptr<{}>& dst);\n",
            prefix, cpp
        ));
        out.push_str(&format!(
            "static VALUE {}_from(const cv::Ptr<{}>& src);\n",
            prefix, cpp
        ));
    }
    out
}

fn emit_bound_class(api: &Api, prefix: &str, class: &Class, filter: &Filter) -> String {
    let cpp = cpp_type(&class.qualified_name);
    let id = ident(&class.qualified_name);
    let name = format!("{}_{}", prefix, id);
    let stored = if class.is_simple {
        cpp.clone()
    } else {
        format!("cv::Ptr<{}>", cpp_type(&storage_root(api, class).qualified_name))
    };
    let parent_type = match bound_parent(api, class) {
        Some(p) => format!("&{}_{}_type", prefix, ident(&p.qualified_name)),
        None => "NULL".to_string(),
    };

    let mut out = String::new();
    out.push_str(&format!("// {}\n", class.qualified_name));
    out.push_str(&super::doc_comment(&class.doc, ""));
    out.push_str(&format!("struct {}_t {{\n    {} v;\n}};\n\n", name, stored));

    out.push_str(&format!(
        "static void {n}_free(void* ptr)\n{{\n    {n}_t* p = static_cast<{n}_t*>(ptr);\n    p->~{n}_t();\n    ruby_xfree(p);\n}}\n\n",
        n = name
    ));
    out.push_str(&format!(
        "static size_t {n}_memsize(const void*)\n{{\n    return sizeof({n}_t);\n}}\n\n",
        n = name
    ));
    out.push_str(&format!(
        "static const rb_data_type_t {n}_type = {{\n    \"{cpp}\",\n    {{ NULL, {n}_free, {n}_memsize, }},\n    {parent},\n    NULL,\n    RUBY_TYPED_FREE_IMMEDIATELY,\n}};\n\n",
        n = name,
        cpp = cpp,
        parent = parent_type
    ));
    out.push_str(&format!(
        "static VALUE {n}_alloc(VALUE klass)\n{{\n    {n}_t* p;\n    VALUE obj = TypedData_Make_Struct(klass, {n}_t, &{n}_type, p);\n    new (p) {n}_t();\n    return obj;\n}}\n\n",
        n = name
    ));
    out.push_str(&format!(
        "static {n}_t* {n}_storage(VALUE self)\n{{\n    return static_cast<{n}_t*>(rb_check_typeddata(self, &{n}_type));\n}}\n\n",
        n = name
    ));

    if class.is_simple {
        out.push_str(&format!(
            "static {cpp}* {n}_getp(VALUE self)\n{{\n    return &{n}_storage(self)->v;\n}}\n\n",
            cpp = cpp,
            n = name
        ));
        out.push_str(&format!(
            "static bool {p}_to(VALUE obj, {cpp}& dst)\n{{\n    if (!rb_typeddata_is_kind_of(obj, &{n}_type)) {{\n        return false;\n    }}\n    dst = static_cast<{n}_t*>(RTYPEDDATA_DATA(obj))->v;\n    return true;\n}}\n\n",
            p = prefix,
            cpp = cpp,
            n = name
        ));
        out.push_str(&format!(
            "static VALUE {p}_from(const {cpp}& src)\n{{\n    VALUE obj = {n}_alloc({n}_class);\n    {n}_storage(obj)->v = src;\n    return obj;\n}}\n\n",
            p = prefix,
            cpp = cpp,
            n = name
        ));
    } else {
        out.push_str(&format!(
            "static {cpp}* {n}_getp(VALUE self)\n{{\n    {n}_t* p = {n}_storage(self);\n    if (!p->v) {{\n        rb_raise(rb_eRuntimeError, \"{cpp} is not initialized\");\n    }}\n    return static_cast<{cpp}*>(p->v.get());\n}}\n\n",
            cpp = cpp,
            n = name
        ));
        out.push_str(&format!(
            "static bool {p}_to(VALUE obj, cv::Ptr<{cpp}>& dst)\n{{\n    if (!rb_typeddata_is_kind_of(obj, &{n}_type)) {{\n        return false;\n    }}\n    {n}_t* p = static_cast<{n}_t*>(RTYPEDDATA_DATA(obj));\n    dst = cv::Ptr<{cpp}>(p->v, static_cast<{cpp}*>(p->v.get()));\n    return true;\n}}\n\n",
            p = prefix,
            cpp = cpp,
            n = name
        ));
        out.push_str(&format!(
            "static VALUE {p}_from(const cv::Ptr<{cpp}>& src)\n{{\n    VALUE obj = {n}_alloc({n}_class);\n    {n}_storage(obj)->v = src;\n    return obj;\n}}\n\n",
            p = prefix,
            cpp = cpp,
            n = name
        ));
    }

    for acc in accessors(prefix, class, filter) {
        out.push_str(&format!(
            "static VALUE {g}(VALUE self)\n{{\n    return {p}_from({n}_getp(self)->{f});\n}}\n\n",
            g = acc.getter,
            p = prefix,
            n = name,
            f = acc.field
        ));
        if let Some(setter) = &acc.setter {
            out.push_str(&format!(
                "static VALUE {s}(VALUE self, VALUE value)\n{{\n    if (!{p}_to(value, {n}_getp(self)->{f})) {{\n        rb_raise(rb_eTypeError, \"can't convert value for {cpp}::{f}\");\n    }}\n    return value;\n}}\n\n",
                s = setter,
                p = prefix,
                n = name,
                f = acc.field,
                cpp = cpp
            ));
        }
    }
    out
}

fn emit_map_converter(api: &Api, prefix: &str, class: &Class, filter: &Filter) -> String {
    let cpp = cpp_type(&class.qualified_name);
    let mut out = String::new();
    out.push_str(&format!("// {}\n", class.qualified_name));
    out.push_str(&super::doc_comment(&class.doc, ""));
    out.push_str(&format!(
        "static bool {}_to(VALUE obj, {}& dst)\n{{\n",
        prefix, cpp
    ));
    out.push_str("    VALUE hash = rb_check_hash_type(obj);\n");
    out.push_str("    if (NIL_P(hash)) {\n        return false;\n    }\n");
    out.push_str("    VALUE tmp;\n");
    for field in &class.fields {
        let Some(ty) = field.qualified_type.as_deref() else {
            continue;
        };
        if !filter.is_bindable_arg(ty) || held_by_ptr(api, ty) {
            debug!("{}.{}: skipped in hash conversion", class.qualified_name, field.name);
            continue;
        }
        out.push_str(&format!(
            "    tmp = rb_hash_lookup2(hash, ID2SYM(rb_intern(\"{f}\")), Qundef);\n    if (tmp != Qundef && !{p}_to(tmp, dst.{f})) {{\n        return false;\n    }}\n",
            f = field.name,
            p = prefix
        ));
    }
    let map_parent = class
        .parent
        .as_deref()
        .and_then(|p| api.classes.get(p))
        .filter(|p| p.is_map);
    match map_parent {
        Some(parent) => out.push_str(&format!(
            "    return {}_to(obj, static_cast<{}&>(dst));\n}}\n",
            prefix,
            cpp_type(&parent.qualified_name)
        )),
        None => out.push_str("    return true;\n}\n"),
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decl::parse_document;
    use crate::ingest::ApiBuilder;
    use crate::resolve::resolve_api;

    fn model(src: &str) -> Api {
        let config = Config::default();
        let set = parse_document(src, "test.json").unwrap();
        let mut b = ApiBuilder::new("cv");
        b.ingest_all(&set).unwrap();
        let mut api = b.finish(&config).unwrap();
        resolve_api(&mut api, &config).unwrap();
        api
    }

    const HIERARCHY: &str = r#"[
        ["class cv.Algorithm", "", [], []],
        ["class cv.Feature2D", ": cv::Algorithm", [], [["int", "nfeatures", "", ["/RW"]], ["Range", "range", "", []]]],
        ["class cv.ORB", ": cv::Feature2D", [], [], "", "Oriented FAST and rotated BRIEF."],
        ["class cv.KeyPoint", "", ["/Simple"], [["float", "size", "", ["/RW"]], ["Point2f", "pt", "", []]]]
    ]"#;

    #[test]
    fn derived_classes_share_the_root_storage() {
        let api = model(HIERARCHY);
        let orb = &api.classes["cv.ORB"];
        assert_eq!(storage_root(&api, orb).qualified_name, "cv.Algorithm");
        assert_eq!(
            bound_parent(&api, orb).map(|c| c.qualified_name.as_str()),
            Some("cv.Feature2D")
        );

        let text = emit_classes(&api, &Config::default());
        assert!(text.contains(
            "// cv.ORB\n// Oriented FAST and rotated BRIEF.\nstruct rbbind_cv_ORB_t {\n    cv::Ptr<cv::Algorithm> v;\n};"
        ));
        assert!(text.contains("    &rbbind_cv_Feature2D_type,\n"));
        assert!(text.contains("static cv::ORB* rbbind_cv_ORB_getp(VALUE self)"));
        // Parents are emitted before children.
        let alg = text.find("// cv.Algorithm").unwrap();
        let feat = text.find("// cv.Feature2D").unwrap();
        let orb = text.find("// cv.ORB").unwrap();
        assert!(alg < feat && feat < orb);
    }

    #[test]
    fn only_read_write_fields_get_setters() {
        let api = model(HIERARCHY);
        let config = Config::default();
        let filter = Filter::new(&api, &config);
        let acc = accessors("rbbind", &api.classes["cv.Feature2D"], &filter);
        assert_eq!(acc.len(), 1, "range is not bindable");
        assert_eq!(acc[0].getter, "rbbind_cv_Feature2D_get_nfeatures");
        assert_eq!(acc[0].setter.as_deref(), Some("rbbind_cv_Feature2D_set_nfeatures"));

        let acc = accessors("rbbind", &api.classes["cv.KeyPoint"], &filter);
        assert_eq!(acc.len(), 2);
        assert!(acc[0].setter.is_some());
        assert!(acc[1].setter.is_none());
    }

    #[test]
    fn simple_classes_are_stored_by_value() {
        let api = model(HIERARCHY);
        let text = emit_classes(&api, &Config::default());
        assert!(text.contains("struct rbbind_cv_KeyPoint_t {\n    cv::KeyPoint v;\n};"));
        assert!(text.contains("static VALUE rbbind_from(const cv::KeyPoint& src);"));
        assert!(text.contains("return &rbbind_cv_KeyPoint_storage(self)->v;"));
        assert!(!held_by_ptr(&api, "cv.KeyPoint"));
        assert!(held_by_ptr(&api, "cv.ORB"));
    }

    #[test]
    fn map_classes_read_a_hash() {
        let api = model(
            r#"[
                ["class cv.Base.Params", "", ["/Map"], [["int", "depth", "", []]]],
                ["class cv.Detector.Params", ": cv::Base::Params", ["/Map"], [["double", "scale", "", []]]]
            ]"#,
        );
        let text = emit_classes(&api, &Config::default());
        assert!(text.contains("static bool rbbind_to(VALUE obj, cv::Detector::Params& dst)\n{"));
        assert!(text.contains("rb_intern(\"scale\")"));
        assert!(text.contains("return rbbind_to(obj, static_cast<cv::Base::Params&>(dst));"));
        assert!(!text.contains("rbbind_cv_Detector_Params_alloc"));
    }

    #[test]
    fn synthesized_hosts_emit_nothing() {
        let api = model(r#"[["enum cv.Params.Mode", "", [], []]]"#);
        assert!(api.classes["cv.Params"].no_bind);
        assert_eq!(emit_classes(&api, &Config::default()), "");
    }
}
