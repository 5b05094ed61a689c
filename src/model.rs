//! Semantic model of the exported API.
//!
//! Everything lives in one [`Api`] arena keyed by dotted qualified name.
//! Cross references (owner, parent class, typedef target) are keys into the
//! arena, never direct pointers.

use crate::decl::Origin;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// The namespace or class that owns a declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Owner {
    Namespace(String),
    Class(String),
}

impl Owner {
    pub fn name(&self) -> &str {
        match self {
            Owner::Namespace(n) | Owner::Class(n) => n,
        }
    }

    pub fn is_class(&self) -> bool {
        matches!(self, Owner::Class(_))
    }
}

/// Why an argument can never be marshalled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Forbidden {
    /// `/A n` or `/CA x`: a C array paired with a length counter.
    ArrayCounter(String),
    /// Raw `void*`.
    VoidPointer,
    /// `/RRef`: pass by rvalue reference.
    RvalueRef,
}

impl fmt::Display for Forbidden {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Forbidden::ArrayCounter(c) => write!(f, "array with counter '{}'", c),
            Forbidden::VoidPointer => write!(f, "raw void pointer"),
            Forbidden::RvalueRef => write!(f, "rvalue reference"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    pub raw_type: String,
    /// Set by the resolver; `None` before resolution or when left unresolved.
    pub qualified_type: Option<String>,
    pub name: String,
    pub default_expr: Option<String>,
    pub is_input: bool,
    pub is_output: bool,
    pub forbidden: Option<Forbidden>,
}

impl Argument {
    pub fn new(raw_type: &str, name: &str) -> Self {
        Argument {
            raw_type: raw_type.to_string(),
            qualified_type: None,
            name: name.to_string(),
            default_expr: None,
            is_input: true,
            is_output: false,
            forbidden: None,
        }
    }

    /// Input with no default: the caller must supply it.
    pub fn is_mandatory(&self) -> bool {
        self.is_input && self.default_expr.is_none()
    }

    pub fn is_pure_output(&self) -> bool {
        self.is_output && !self.is_input
    }

    /// Resolved type, falling back to the raw spelling.
    pub fn ty(&self) -> &str {
        self.qualified_type.as_deref().unwrap_or(&self.raw_type)
    }
}

/// One overload of a [`Function`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub is_const: bool,
    pub is_static: bool,
    pub is_virtual: bool,
    pub is_pure_virtual: bool,
    /// Raw return type; empty for `void` and constructors.
    pub return_type: String,
    /// Empty string for `void`, `None` until resolved (or when unresolved).
    pub qualified_return_type: Option<String>,
    pub args: Vec<Argument>,
    pub doc: String,
    pub origin: Origin,
}

impl Variant {
    pub fn has_return(&self) -> bool {
        !self.return_type.is_empty()
    }
}

/// An overload set: every declaration sharing one qualified name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    /// Dotted name after any `=rename`, e.g. `cv.Foo.method1`.
    pub qualified_name: String,
    /// Name of the C++ callable, e.g. `cv::Foo::method1`.
    pub cname: String,
    /// Name exposed to the host.
    pub display_name: String,
    pub owner: Owner,
    pub is_static: bool,
    pub is_constructor: bool,
    pub variants: Vec<Variant>,
}

impl Function {
    pub fn is_method(&self) -> bool {
        self.owner.is_class() && !self.is_static && !self.is_constructor
    }
}

/// A class field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prop {
    pub raw_type: String,
    pub qualified_type: Option<String>,
    pub name: String,
    pub read_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Class {
    pub qualified_name: String,
    /// Host-side name (`=Name` renames it).
    pub display_name: String,
    /// `None` only for a root class.
    pub owner: Option<Owner>,
    pub nested_classes: Vec<String>,
    pub nested_enums: Vec<String>,
    pub fields: Vec<Prop>,
    /// Keys of the functions owned by this class.
    pub methods: Vec<String>,
    pub parent_name: Option<String>,
    pub parent: Option<String>,
    pub children: Vec<String>,
    pub depth: usize,
    /// Synthesized to host a nested type; never exported itself.
    pub no_bind: bool,
    /// Stored by value instead of behind a smart pointer.
    pub is_simple: bool,
    /// Converted from a host hash field by field.
    pub is_map: bool,
    pub doc: String,
    /// `None` for synthesized classes.
    pub origin: Option<Origin>,
}

impl Class {
    pub fn new(qualified_name: &str) -> Self {
        Class {
            qualified_name: qualified_name.to_string(),
            display_name: base_name(qualified_name).to_string(),
            owner: None,
            nested_classes: Vec::new(),
            nested_enums: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            parent_name: None,
            parent: None,
            children: Vec::new(),
            depth: 0,
            no_bind: false,
            is_simple: false,
            is_map: false,
            doc: String::new(),
            origin: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enumerator {
    /// Bare enumerator name (`A` for `cv.Flag.A`).
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enum {
    pub qualified_name: String,
    pub is_scoped: bool,
    pub owner: Owner,
    pub enumerators: Vec<Enumerator>,
    /// Set when the enum resolves as a type but cannot be bound.
    pub rejection: Option<String>,
}

impl Enum {
    /// `enum { A, B }` with no name of its own.
    pub fn is_anonymous(&self) -> bool {
        self.qualified_name.ends_with("<unnamed>")
    }
}

/// A `const` declaration attached to a namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constant {
    /// Host-side name; class scopes are folded in (`Foo_LIMIT`).
    pub name: String,
    /// C++ expression naming the constant, e.g. `cv::Foo::LIMIT`.
    pub cname: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Namespace {
    pub qualified_name: String,
    pub classes: Vec<String>,
    pub enums: Vec<String>,
    pub functions: Vec<String>,
    pub constants: Vec<Constant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypedefTarget {
    Class,
    Function,
    Enum,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Typedef {
    pub name: String,
    pub target_kind: TypedefTarget,
    pub target: String,
}

/// What a declared name refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Declared<'a> {
    Class(&'a Class),
    Enum(&'a Enum),
    Typedef(&'a Typedef),
    Builtin,
}

/// The aggregate model for one generation run.
#[derive(Debug, Clone, Default)]
pub struct Api {
    pub root: String,
    pub namespaces: BTreeMap<String, Namespace>,
    pub classes: BTreeMap<String, Class>,
    pub enums: BTreeMap<String, Enum>,
    pub functions: BTreeMap<String, Function>,
    pub typedefs: BTreeMap<String, Typedef>,
    /// Hand-bound types that resolve without a declaration.
    pub builtin_types: BTreeSet<String>,
}

impl Api {
    /// Look a name up in classes ∪ enums ∪ typedefs ∪ builtins.
    ///
    /// Real declarations win over a typedef of the same name.
    pub fn declared(&self, name: &str) -> Option<Declared<'_>> {
        if let Some(c) = self.classes.get(name) {
            return Some(Declared::Class(c));
        }
        if let Some(e) = self.enums.get(name) {
            return Some(Declared::Enum(e));
        }
        if self.builtin_types.contains(name) {
            return Some(Declared::Builtin);
        }
        self.typedefs.get(name).map(Declared::Typedef)
    }

    pub fn is_namespace(&self, name: &str) -> bool {
        self.namespaces.contains_key(name)
    }

    /// `name` itself when it is a namespace, otherwise its closest enclosing
    /// namespace; empty when there is none.
    pub fn nearest_namespace<'a>(&self, name: &'a str) -> &'a str {
        let mut ns = name;
        while !ns.is_empty() && !self.is_namespace(ns) {
            ns = scope_of(ns);
        }
        ns
    }

    /// Classes ordered so every parent precedes its children.
    pub fn classes_by_depth(&self) -> Vec<&Class> {
        let mut classes: Vec<&Class> = self.classes.values().collect();
        classes.sort_by(|a, b| {
            a.depth
                .cmp(&b.depth)
                .then_with(|| a.qualified_name.cmp(&b.qualified_name))
        });
        classes
    }
}

/// Last dotted segment: `cv.Ns1.Foo` → `Foo`.
pub fn base_name(qualified: &str) -> &str {
    qualified.rsplit('.').next().unwrap_or(qualified)
}

/// Containing scope: `cv.Ns1.Foo` → `cv.Ns1`, `cv` → ``.
pub fn scope_of(qualified: &str) -> &str {
    qualified.rfind('.').map(|i| &qualified[..i]).unwrap_or("")
}

/// Dotted name as C++ spells it: `cv.Ns1.Foo` → `cv::Ns1::Foo`.
pub fn cpp_name(qualified: &str) -> String {
    qualified.replace('.', "::")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_helpers() {
        assert_eq!(base_name("cv.Ns1.Foo"), "Foo");
        assert_eq!(base_name("cv"), "cv");
        assert_eq!(scope_of("cv.Ns1.Foo"), "cv.Ns1");
        assert_eq!(scope_of("cv"), "");
        assert_eq!(cpp_name("cv.Ns1.Foo"), "cv::Ns1::Foo");
    }

    #[test]
    fn argument_roles() {
        let mut a = Argument::new("int", "a");
        assert!(a.is_mandatory());
        a.default_expr = Some("0".to_string());
        assert!(!a.is_mandatory());

        let mut out = Argument::new("int*", "c");
        out.is_input = false;
        out.is_output = true;
        assert!(out.is_pure_output());
        assert!(!out.is_mandatory());
    }

    #[test]
    fn declared_prefers_real_types_over_typedefs() {
        let mut api = Api::default();
        api.classes
            .insert("cv.Foo".to_string(), Class::new("cv.Foo"));
        api.typedefs.insert(
            "cv.Foo".to_string(),
            Typedef {
                name: "cv.Foo".to_string(),
                target_kind: TypedefTarget::Class,
                target: "cv.Bar".to_string(),
            },
        );
        assert!(matches!(api.declared("cv.Foo"), Some(Declared::Class(_))));
        assert!(api.declared("cv.Nope").is_none());
    }

    #[test]
    fn classes_sorted_parent_first() {
        let mut api = Api::default();
        let mut child = Class::new("cv.A");
        child.depth = 1;
        api.classes.insert("cv.A".to_string(), child);
        api.classes.insert("cv.Z".to_string(), Class::new("cv.Z"));
        let names: Vec<_> = api
            .classes_by_depth()
            .iter()
            .map(|c| c.qualified_name.as_str())
            .collect();
        assert_eq!(names, vec!["cv.Z", "cv.A"]);
    }
}
