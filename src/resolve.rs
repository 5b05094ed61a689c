//! Qualified-name resolution for every type mentioned in a signature.
//!
//! A raw C++ spelling (`std::vector<Point>`, `Ptr_aruco_Dictionary`,
//! `Ns1::Bar`) is reduced to a main type plus a wrapper template, the main
//! type is looked up by lexical scope walk, and the wrapper is re-applied:
//!
//! ```text
//! std::vector<Point>   (scope cv.Foo)  ->  vector<cv.Point>
//! Ptr_aruco_Dictionary (scope cv)      ->  Ptr<cv.aruco.Dictionary>
//! int*                                 ->  int*
//! ```

use crate::config::{Config, UnresolvedPolicy};
use crate::error::{GenError, Result};
use crate::model::{Api, Declared};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use tracing::{debug, warn};

// -- Container shapes, tried in order ------------------------------------------

static RE_VECTOR_VECTOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:vector_vector_(\w+)|vector<\s*(?:std::)?vector<\s*(.+?)\s*>\s*>)$").unwrap()
});

static RE_VECTOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:vector_(\w+)|vector<\s*(.+?)\s*>)$").unwrap());

static RE_PTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:Ptr_(\w+)|(?:cv(?:::|\.))?Ptr<\s*(.+?)\s*>)$").unwrap()
});

/// Names that contain an underscore which is part of the name itself, not an
/// encoded scope separator (`Ptr_ml_ANN_MLP` is `ml.ANN_MLP`).
const UNSPLIT_NAMES: &[&str] = &["ANN_MLP"];

/// Types that resolve regardless of scope.
const PRIMITIVES: &[&str] = &[
    "bool", "char", "uchar", "schar", "short", "ushort", "int", "uint", "unsigned", "long",
    "int64", "uint64", "int64_t", "uint64_t", "size_t", "float", "double", "string", "c_string",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wrapper {
    Plain,
    Vector,
    VectorVector,
    Ptr,
}

impl Wrapper {
    fn apply(self, inner: &str) -> String {
        match self {
            Wrapper::Plain => inner.to_string(),
            Wrapper::Vector => format!("vector<{}>", inner),
            Wrapper::VectorVector => format!("vector<vector<{}>>", inner),
            Wrapper::Ptr => format!("Ptr<{}>", inner),
        }
    }
}

/// A type no scope candidate could name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unresolved {
    pub main_type: String,
}

impl fmt::Display for Unresolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unresolved type '{}'", self.main_type)
    }
}

/// Reduce a raw spelling to `(main_type, wrapper, is_pointer)`.
fn decompose(raw: &str) -> (String, Wrapper, bool) {
    let mut ty = raw.trim();
    ty = ty.strip_prefix("const ").unwrap_or(ty).trim();
    ty = ty.strip_suffix('&').unwrap_or(ty).trim();
    ty = ty.strip_prefix("std::").unwrap_or(ty);

    let compact = ty.replace(' ', "");
    if compact == "char*" || compact == "c_string" {
        return ("c_string".to_string(), Wrapper::Plain, false);
    }

    let (ty, pointer) = match ty.strip_suffix('*') {
        Some(rest) => (rest.trim(), true),
        None => (ty, false),
    };

    let (main, wrapper) = if let Some(caps) = RE_VECTOR_VECTOR.captures(ty) {
        let inner = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
        (inner.to_string(), Wrapper::VectorVector)
    } else if let Some(caps) = RE_VECTOR.captures(ty) {
        let inner = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
        (inner.to_string(), Wrapper::Vector)
    } else if let Some(caps) = RE_PTR.captures(ty) {
        match (caps.get(1), caps.get(2)) {
            (Some(underscored), _) => (split_underscored(underscored.as_str()), Wrapper::Ptr),
            (None, Some(angled)) => (angled.as_str().to_string(), Wrapper::Ptr),
            _ => (ty.to_string(), Wrapper::Plain),
        }
    } else {
        (ty.to_string(), Wrapper::Plain)
    };

    let main = main.strip_prefix("std::").unwrap_or(&main).replace("::", ".");
    let main = match main.as_str() {
        "String" | "cv.String" => "string".to_string(),
        _ => main,
    };
    (main, wrapper, pointer)
}

/// `aruco_Dictionary` -> `aruco.Dictionary`, keeping [`UNSPLIT_NAMES`] whole.
fn split_underscored(inner: &str) -> String {
    let parts: Vec<&str> = inner.split('_').collect();
    let mut out: Vec<String> = Vec::with_capacity(parts.len());
    let mut i = 0;
    while i < parts.len() {
        if i + 1 < parts.len() {
            let joined = format!("{}_{}", parts[i], parts[i + 1]);
            if UNSPLIT_NAMES.contains(&joined.as_str()) {
                out.push(joined);
                i += 2;
                continue;
            }
        }
        out.push(parts[i].to_string());
        i += 1;
    }
    out.join(".")
}

/// Innermost-to-outermost lookup of `name` from `scope`.
///
/// For scope `a.b.c` the candidates are `a.b.c.name`, `a.b.name`, `a.name`.
pub fn scope_walk(name: &str, scope: &str, mut known: impl FnMut(&str) -> bool) -> Option<String> {
    let segments: Vec<&str> = scope.split('.').filter(|s| !s.is_empty()).collect();
    (1..=segments.len()).rev().find_map(|i| {
        let candidate = format!("{}.{}", segments[..i].join("."), name);
        known(&candidate).then_some(candidate)
    })
}

/// Resolve a raw type as seen from `enclosing_scope`.
pub fn resolve(api: &Api, raw_type: &str, enclosing_scope: &str) -> std::result::Result<String, Unresolved> {
    let (main, wrapper, pointer) = decompose(raw_type);
    let resolved = resolve_main(api, &main, enclosing_scope).ok_or(Unresolved { main_type: main })?;
    let mut out = wrapper.apply(&resolved);
    if pointer {
        out.push('*');
    }
    Ok(out)
}

fn resolve_main(api: &Api, main: &str, scope: &str) -> Option<String> {
    if PRIMITIVES.contains(&main) {
        return Some(main.to_string());
    }
    let rooted = format!("{}.{}", api.root, main);
    let hit = if api.declared(main).is_some() {
        Some(main.to_string())
    } else if api.declared(&rooted).is_some() {
        Some(rooted)
    } else {
        scope_walk(main, scope, |candidate| api.declared(candidate).is_some())
    }?;
    // An alias stands for its target, not for a new type.
    match api.declared(&hit) {
        Some(Declared::Typedef(t)) => Some(t.target.clone()),
        _ => Some(hit),
    }
}

/// Resolve every return type, argument type and field type in the model,
/// caching results on the nodes.
pub fn resolve_api(api: &mut Api, config: &Config) -> Result<()> {
    let mut variant_updates = Vec::new();
    for (key, func) in &api.functions {
        let scope = func.owner.name();
        for (vidx, variant) in func.variants.iter().enumerate() {
            let ret = if variant.has_return() {
                let context = || format!("{} variant {} return type", key, vidx);
                settle(resolve(api, &variant.return_type, scope), &variant.return_type, scope, context, config)?
            } else {
                Some(String::new())
            };
            let mut args = Vec::with_capacity(variant.args.len());
            for arg in &variant.args {
                // Never marshalled, so its spelling does not need to name a type.
                if arg.forbidden.is_some() {
                    args.push(None);
                    continue;
                }
                let context = || format!("{} variant {} argument '{}'", key, vidx, arg.name);
                args.push(settle(resolve(api, &arg.raw_type, scope), &arg.raw_type, scope, context, config)?);
            }
            variant_updates.push((key.clone(), vidx, ret, args));
        }
    }

    let mut field_updates = Vec::new();
    for (key, class) in &api.classes {
        for (fidx, field) in class.fields.iter().enumerate() {
            let context = || format!("field {}.{}", key, field.name);
            let resolved = settle(resolve(api, &field.raw_type, key), &field.raw_type, key, context, config)?;
            field_updates.push((key.clone(), fidx, resolved));
        }
    }

    let resolved_count = variant_updates.len();
    for (key, vidx, ret, args) in variant_updates {
        if let Some(variant) = api.functions.get_mut(&key).and_then(|f| f.variants.get_mut(vidx)) {
            variant.qualified_return_type = ret;
            for (arg, ty) in variant.args.iter_mut().zip(args) {
                arg.qualified_type = ty;
            }
        }
    }
    for (key, fidx, ty) in field_updates {
        if let Some(field) = api.classes.get_mut(&key).and_then(|c| c.fields.get_mut(fidx)) {
            field.qualified_type = ty;
        }
    }
    debug!("resolved types of {} variants", resolved_count);
    Ok(())
}

fn settle(
    outcome: std::result::Result<String, Unresolved>,
    raw: &str,
    scope: &str,
    context: impl Fn() -> String,
    config: &Config,
) -> Result<Option<String>> {
    match outcome {
        Ok(ty) => Ok(Some(ty)),
        Err(_) if config.unresolved == UnresolvedPolicy::Lenient => {
            warn!("{}: cannot resolve '{}'", context(), raw);
            Ok(None)
        }
        Err(_) => Err(GenError::UnresolvedType {
            ty: raw.to_string(),
            scope: scope.to_string(),
            context: context(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Class, Typedef, TypedefTarget};

    fn api(names: &[&str]) -> Api {
        let mut api = Api {
            root: "cv".to_string(),
            ..Default::default()
        };
        for n in names {
            api.classes.insert(n.to_string(), Class::new(n));
        }
        api
    }

    #[test]
    fn primitives_resolve_anywhere() {
        let api = api(&[]);
        assert_eq!(resolve(&api, "int", "cv.Foo").unwrap(), "int");
        assert_eq!(resolve(&api, "int*", "").unwrap(), "int*");
        assert_eq!(resolve(&api, "std::string", "cv").unwrap(), "string");
        assert_eq!(resolve(&api, "String", "cv").unwrap(), "string");
        assert_eq!(resolve(&api, "char*", "cv").unwrap(), "c_string");
    }

    #[test]
    fn innermost_scope_wins() {
        let api = api(&["cv.A.B.T", "cv.A.T"]);
        assert_eq!(resolve(&api, "T", "cv.A.B.C").unwrap(), "cv.A.B.T");
        assert_eq!(resolve(&api, "T", "cv.A.X").unwrap(), "cv.A.T");
    }

    #[test]
    fn resolving_is_idempotent() {
        let api = api(&["cv.Point", "cv.Ns1.Foo"]);
        for raw in ["cv.Point", "vector<cv.Point>", "vector<vector<cv.Point>>", "Ptr<cv.Ns1.Foo>", "cv.Point*", "int"] {
            let once = resolve(&api, raw, "cv.Ns1").unwrap();
            assert_eq!(once, raw);
            assert_eq!(resolve(&api, &once, "cv.Ns1").unwrap(), once);
        }
    }

    #[test]
    fn container_shapes() {
        let api = api(&["cv.Point", "cv.Mat"]);
        assert_eq!(resolve(&api, "vector_Point", "cv").unwrap(), "vector<cv.Point>");
        assert_eq!(resolve(&api, "std::vector<Point>", "cv").unwrap(), "vector<cv.Point>");
        assert_eq!(resolve(&api, "vector_vector_Point", "cv").unwrap(), "vector<vector<cv.Point>>");
        assert_eq!(
            resolve(&api, "std::vector<std::vector<Point> >", "cv").unwrap(),
            "vector<vector<cv.Point>>"
        );
        assert_eq!(resolve(&api, "vector_int", "cv").unwrap(), "vector<int>");
    }

    #[test]
    fn smart_pointer_qualifies_inner_path() {
        let api = api(&["cv.aruco.Dictionary", "cv.ml.ANN_MLP"]);
        assert_eq!(resolve(&api, "Ptr_aruco_Dictionary", "cv").unwrap(), "Ptr<cv.aruco.Dictionary>");
        assert_eq!(resolve(&api, "Ptr<aruco::Dictionary>", "cv").unwrap(), "Ptr<cv.aruco.Dictionary>");
        assert_eq!(resolve(&api, "Ptr_ml_ANN_MLP", "cv").unwrap(), "Ptr<cv.ml.ANN_MLP>");
    }

    #[test]
    fn cpp_scope_separators_become_dots() {
        let api = api(&["cv.Ns1.Bar"]);
        assert_eq!(resolve(&api, "cv::Ns1::Bar", "cv").unwrap(), "cv.Ns1.Bar");
        assert_eq!(resolve(&api, "Ns1::Bar", "cv.Other").unwrap(), "cv.Ns1.Bar");
    }

    #[test]
    fn typedef_resolves_to_target() {
        let mut api = api(&["cv.Feature2D"]);
        api.typedefs.insert(
            "cv.FeatureDetector".to_string(),
            Typedef {
                name: "cv.FeatureDetector".to_string(),
                target_kind: TypedefTarget::Class,
                target: "cv.Feature2D".to_string(),
            },
        );
        assert_eq!(resolve(&api, "Ptr<FeatureDetector>", "cv").unwrap(), "Ptr<cv.Feature2D>");
    }

    #[test]
    fn unknown_type_is_reported() {
        let api = api(&[]);
        let err = resolve(&api, "cv::Ns1::UnknownType", "cv.Ns1.Foo").unwrap_err();
        assert_eq!(err.main_type, "cv.Ns1.UnknownType");
    }

    #[test]
    fn scope_walk_candidates() {
        let mut seen = Vec::new();
        let hit = scope_walk("T", "a.b.c", |c| {
            seen.push(c.to_string());
            false
        });
        assert_eq!(hit, None);
        assert_eq!(seen, vec!["a.b.c.T", "a.b.T", "a.T"]);
    }
}
