//! Declaration ingestion: classify each raw record and file it into an
//! [`ApiBuilder`].
//!
//! Ingestion never links anything. Owners, parents and constructors are only
//! decided in [`crate::assemble`], once every declaration has been seen.

pub mod attrs;

use crate::decl::{Decl, DeclSet, Origin};
use crate::error::{GenError, Result};
use crate::model::{base_name, scope_of, Argument, Class, Enumerator, Forbidden, Prop, Variant};
use attrs::{ArgAttr, ClassAttr, FuncAttr, PropAttr};
use std::collections::BTreeMap;
use tracing::warn;

/// One function declaration, waiting to be grouped into its overload set.
#[derive(Debug, Clone)]
pub struct FunctionFragment {
    /// Overload-set key: scope + display name.
    pub key: String,
    pub scope: String,
    /// Name as declared, before any rename.
    pub declared_name: String,
    pub display_name: String,
    pub variant: Variant,
}

#[derive(Debug, Clone)]
pub struct EnumFragment {
    pub qualified_name: String,
    pub is_scoped: bool,
    pub enumerators: Vec<Enumerator>,
    pub origin: Origin,
}

#[derive(Debug, Clone)]
pub struct ConstFragment {
    pub qualified_name: String,
    pub value: String,
}

/// Everything ingested so far, unlinked.
#[derive(Debug, Default)]
pub struct ApiBuilder {
    pub root: String,
    pub namespaces: Vec<String>,
    pub classes: BTreeMap<String, Class>,
    /// Class keys in declaration order.
    pub class_order: Vec<String>,
    pub enums: Vec<EnumFragment>,
    pub constants: Vec<ConstFragment>,
    pub functions: Vec<FunctionFragment>,
}

impl ApiBuilder {
    pub fn new(root: &str) -> Self {
        ApiBuilder {
            root: root.to_string(),
            ..Default::default()
        }
    }

    /// Ingest a whole declaration set.
    pub fn ingest_all(&mut self, set: &DeclSet) -> Result<()> {
        self.namespaces.extend(set.namespaces.iter().cloned());
        for decl in &set.decls {
            self.ingest(decl)?;
        }
        Ok(())
    }

    /// Classify one declaration by its leading token and file it.
    pub fn ingest(&mut self, decl: &Decl) -> Result<()> {
        let mut tokens = decl.name.split_whitespace();
        match tokens.next() {
            Some("class" | "struct") => self.ingest_class(decl),
            Some("enum") => self.ingest_enum(decl),
            Some("const") => self.ingest_const(decl),
            Some(_) => self.ingest_function(decl),
            None => Err(malformed(&decl.origin, "empty declaration name")),
        }
    }

    fn ingest_class(&mut self, decl: &Decl) -> Result<()> {
        let name = decl
            .name
            .split_whitespace()
            .nth(1)
            .ok_or_else(|| malformed(&decl.origin, "class declaration without a name"))?
            .to_string();

        if let Some(existing) = self.classes.get(&name) {
            return Err(GenError::DuplicateClass {
                name,
                first: existing.origin.clone().unwrap_or_default(),
                second: decl.origin.clone(),
            });
        }

        let mut class = Class::new(&name);
        class.parent_name = parse_parent(&decl.kind_and_bases, &name);
        class.doc = decl.doc.clone();
        class.origin = Some(decl.origin.clone());

        for attr in attrs::parse_all::<ClassAttr>(&decl.attrs) {
            match attr {
                ClassAttr::Simple => class.is_simple = true,
                ClassAttr::Map => class.is_map = true,
                ClassAttr::Rename(n) => class.display_name = n,
                ClassAttr::Unrecognized(t) => {
                    warn!("{} has unsupported class attribute: {}", name, t)
                }
            }
        }

        for item in &decl.items {
            let mut read_only = true;
            for attr in attrs::parse_all::<PropAttr>(&item.attrs) {
                match attr {
                    PropAttr::ReadWrite => read_only = false,
                    PropAttr::Unrecognized(t) => {
                        warn!("{}.{} has unsupported field attribute: {}", name, item.name, t)
                    }
                }
            }
            class.fields.push(Prop {
                raw_type: item.ty.clone(),
                qualified_type: None,
                name: item.name.clone(),
                read_only,
            });
        }

        self.class_order.push(name.clone());
        self.classes.insert(name, class);
        Ok(())
    }

    fn ingest_enum(&mut self, decl: &Decl) -> Result<()> {
        let tokens: Vec<&str> = decl.name.split_whitespace().collect();
        let (qualified_name, is_scoped) = match tokens.as_slice() {
            [_, name] => (name.to_string(), false),
            [_, _, name] => (name.to_string(), true),
            _ => return Err(malformed(&decl.origin, "cannot read enum name")),
        };

        let enumerators = decl
            .items
            .iter()
            .map(|item| {
                let full = item.ty.strip_prefix("const ").unwrap_or(&item.ty).trim();
                Enumerator {
                    name: base_name(full).to_string(),
                    value: item.name.clone(),
                }
            })
            .collect();

        self.enums.push(EnumFragment {
            qualified_name,
            is_scoped,
            enumerators,
            origin: decl.origin.clone(),
        });
        Ok(())
    }

    fn ingest_const(&mut self, decl: &Decl) -> Result<()> {
        let name = decl
            .name
            .split_whitespace()
            .nth(1)
            .ok_or_else(|| malformed(&decl.origin, "constant without a name"))?;
        self.constants.push(ConstFragment {
            qualified_name: name.to_string(),
            value: decl.kind_and_bases.clone(),
        });
        Ok(())
    }

    fn ingest_function(&mut self, decl: &Decl) -> Result<()> {
        let declared = decl.name.trim();
        let scope = scope_of(declared);
        if scope.is_empty() {
            return Err(malformed(
                &decl.origin,
                &format!("function '{}' has no enclosing scope", declared),
            ));
        }
        let declared_name = base_name(declared).to_string();
        let mut display_name = declared_name.clone();

        let mut variant = Variant {
            is_const: false,
            is_static: false,
            is_virtual: false,
            is_pure_virtual: false,
            return_type: String::new(),
            qualified_return_type: None,
            args: Vec::new(),
            doc: decl.doc.clone(),
            origin: decl.origin.clone(),
        };

        for attr in attrs::parse_all::<FuncAttr>(&decl.attrs) {
            match attr {
                FuncAttr::Static => variant.is_static = true,
                FuncAttr::Const => variant.is_const = true,
                FuncAttr::Virtual => variant.is_virtual = true,
                FuncAttr::PureVirtual => variant.is_pure_virtual = true,
                FuncAttr::Rename(n) => display_name = n,
                FuncAttr::Unrecognized(t) => {
                    warn!("{} has unsupported func attribute: {}", declared, t)
                }
            }
        }

        let ret = decl
            .return_type
            .as_deref()
            .unwrap_or(&decl.kind_and_bases)
            .trim();
        if ret != "void" {
            variant.return_type = ret.to_string();
        }

        for item in &decl.items {
            let mut arg = Argument::new(item.ty.trim(), &item.name);
            arg.default_expr = item.default.clone();
            for attr in attrs::parse_all::<ArgAttr>(&item.attrs) {
                match attr {
                    ArgAttr::Output => {
                        arg.is_input = false;
                        arg.is_output = true;
                    }
                    ArgAttr::InOut => {
                        arg.is_input = true;
                        arg.is_output = true;
                    }
                    ArgAttr::Const | ArgAttr::Ref => {}
                    ArgAttr::Array(counter) | ArgAttr::ArrayConvert(counter) => {
                        arg.forbidden = Some(Forbidden::ArrayCounter(counter))
                    }
                    ArgAttr::RvalueRef => arg.forbidden = Some(Forbidden::RvalueRef),
                    ArgAttr::Unrecognized(t) => {
                        warn!("{} has unsupported arg attribute: {}", declared, t)
                    }
                }
            }
            if arg.forbidden.is_none() && is_void_pointer(&arg.raw_type) {
                arg.forbidden = Some(Forbidden::VoidPointer);
            }
            variant.args.push(arg);
        }

        self.functions.push(FunctionFragment {
            key: format!("{}.{}", scope, display_name),
            scope: scope.to_string(),
            declared_name,
            display_name,
            variant,
        });
        Ok(())
    }
}

fn is_void_pointer(ty: &str) -> bool {
    ty.replace(' ', "") == "void*"
}

fn malformed(origin: &Origin, message: &str) -> GenError {
    GenError::MalformedDecl {
        origin: origin.clone(),
        message: message.to_string(),
    }
}

/// Read the first base out of `": cv::Algorithm, cv::Other"`.
///
/// Only single inheritance can be bound; extra bases are dropped with a
/// warning.
fn parse_parent(bases: &str, class_name: &str) -> Option<String> {
    let bases = bases.trim().trim_start_matches(':').trim();
    if bases.is_empty() {
        return None;
    }
    let mut parts = bases.split(',').map(str::trim).filter(|p| !p.is_empty());
    let first = parts.next()?;
    let first = first
        .strip_prefix("public ")
        .unwrap_or(first)
        .trim()
        .replace("::", ".");
    if parts.next().is_some() {
        warn!(
            "{} has multiple parent classes; only the first one ({}) is used",
            class_name, first
        );
    }
    Some(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decl::parse_document;

    fn builder(src: &str) -> ApiBuilder {
        let set = parse_document(src, "test.json").unwrap();
        let mut b = ApiBuilder::new("cv");
        b.ingest_all(&set).unwrap();
        b
    }

    #[test]
    fn parent_string_forms() {
        assert_eq!(parse_parent(": cv::Ns1::Bar", "cv.Ns1.Foo").as_deref(), Some("cv.Ns1.Bar"));
        assert_eq!(parse_parent("cv::Algorithm", "cv.X").as_deref(), Some("cv.Algorithm"));
        assert_eq!(parse_parent(": cv::A, cv::B", "cv.X").as_deref(), Some("cv.A"));
        assert_eq!(parse_parent("", "cv.X"), None);
        assert_eq!(parse_parent(": ", "cv.X"), None);
    }

    #[test]
    fn classifies_by_leading_token() {
        let b = builder(
            r#"[
                ["class cv.Foo", "", [], [["int", "width", "", ["/RW"]], ["int", "height", "", []]]],
                ["struct cv.Bar", "", ["/Simple"], []],
                ["enum cv.Flag", "", [], [["const cv.Flag.A", "0", [], []]]],
                ["enum class cv.Mode", "", [], []],
                ["const cv.MAX", "5", [], []],
                ["cv.add", "int", [], [["int", "a", "", []]]]
            ]"#,
        );
        assert_eq!(b.class_order, vec!["cv.Foo", "cv.Bar"]);
        let foo = &b.classes["cv.Foo"];
        assert!(!foo.fields[0].read_only);
        assert!(foo.fields[1].read_only);
        assert!(b.classes["cv.Bar"].is_simple);
        assert_eq!(b.enums.len(), 2);
        assert!(!b.enums[0].is_scoped);
        assert_eq!(b.enums[0].enumerators[0].name, "A");
        assert!(b.enums[1].is_scoped);
        assert_eq!(b.constants[0].value, "5");
        assert_eq!(b.functions[0].key, "cv.add");
    }

    #[test]
    fn function_attrs_and_rename() {
        let b = builder(
            r#"[["cv.Foo.operator()", "int", ["/S", "/C", "=call", "/weird"], [], "int", ""]]"#,
        );
        let f = &b.functions[0];
        assert_eq!(f.key, "cv.Foo.call");
        assert_eq!(f.declared_name, "operator()");
        assert!(f.variant.is_static);
        assert!(f.variant.is_const);
        assert_eq!(f.variant.return_type, "int");
    }

    #[test]
    fn void_return_is_empty() {
        let b = builder(r#"[["cv.f", "void", [], [], "void", ""]]"#);
        assert!(!b.functions[0].variant.has_return());
    }

    #[test]
    fn argument_direction_and_forbidden_markers() {
        let b = builder(
            r#"[["cv.f", "void", [], [
                ["int*", "c", "", ["/O"]],
                ["Point", "p", "", ["/IO", "/Ref"]],
                ["Point*", "pts", "", ["/A npts"]],
                ["void*", "data", "", []],
                ["Mat", "m", "", ["/RRef"]]
            ]]]"#,
        );
        let args = &b.functions[0].variant.args;
        assert!(args[0].is_pure_output());
        assert!(args[1].is_input && args[1].is_output);
        assert_eq!(args[2].forbidden, Some(Forbidden::ArrayCounter("npts".to_string())));
        assert_eq!(args[3].forbidden, Some(Forbidden::VoidPointer));
        assert_eq!(args[4].forbidden, Some(Forbidden::RvalueRef));
    }

    #[test]
    fn duplicate_class_is_fatal_and_names_both_origins() {
        let set = parse_document(
            r#"[["class cv.Foo", "", [], []], ["class cv.Foo", "", [], []]]"#,
            "dup.json",
        )
        .unwrap();
        let mut b = ApiBuilder::new("cv");
        let err = b.ingest_all(&set).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("dup.json#0"), "{msg}");
        assert!(msg.contains("dup.json#1"), "{msg}");
    }

    #[test]
    fn function_without_scope_is_malformed() {
        let set = parse_document(r#"[["free", "void", [], []]]"#, "m.json").unwrap();
        let mut b = ApiBuilder::new("cv");
        assert!(matches!(
            b.ingest_all(&set),
            Err(GenError::MalformedDecl { .. })
        ));
    }
}
