//! Overload dispatch: one routine per function, trying each eligible variant
//! in turn.
//!
//! A [`DispatchPlan`] is pure data. [`DispatchPlan::render`] turns it into
//! C++ and [`DispatchPlan::dispatch`] runs the same protocol in-process, so
//! the binding rules can be checked without compiling anything.
//!
//! The protocol, per call:
//!
//! 1. a trailing hash argument is taken as the keyword map and not counted,
//!    unless it lands on a slot of a `/Map` class, which is filled from a
//!    hash; that is decided per variant
//! 2. variants are tried widest first; one whose arity window
//!    `mandatory <= argc <= mandatory + optional` excludes the call is skipped
//! 3. positional values bind left to right, mandatory slots then optional
//!    ones; optional slots left over are looked up by name in the keyword map
//! 4. the first conversion failure abandons the variant and the next one is
//!    tried
//! 5. if nothing was called, one error is raised listing every variant's
//!    failure

use super::{c_string, class, cpp_type, ident};
use crate::assemble::split_namespace;
use crate::config::Config;
use crate::filter::{Eligibility, Slots};
use crate::model::{Api, Function, Owner, Variant};
use std::collections::BTreeMap;

/// How the routine is attached to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Module function.
    Function,
    /// Class singleton method.
    StaticMethod,
    /// Instance method; the receiver is unwrapped first.
    Method,
    /// `initialize`; the receiver's storage is filled in.
    Constructor,
}

/// A host-visible argument slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    /// Index into the variant's declared arguments.
    pub arg: usize,
    pub name: String,
    /// Resolved type.
    pub ty: String,
    /// The type is a `/Map` class, converted from a host hash.
    pub hash: bool,
}

/// A native local holding one declared argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Local {
    pub name: String,
    pub cpp_type: String,
    pub init: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantPlan {
    /// Position of the variant in declaration order.
    pub index: usize,
    pub mandatory: Vec<Slot>,
    /// Output buffers, then defaulted inputs.
    pub optional: Vec<Slot>,
    /// One per declared argument, in declaration order.
    pub locals: Vec<Local>,
    /// Call expressions in declaration order (`raw_a`, `&raw_n`, `*raw_obj`).
    pub call_args: Vec<String>,
    /// C++ return type; `None` for `void` and constructors.
    pub return_type: Option<String>,
    /// Locals handed back to the caller: `raw_retval` first, then outputs in
    /// declaration order.
    pub results: Vec<String>,
    /// Host-side prototype, e.g. `add(a, b[, c]) -> retval`.
    pub prototype: String,
    pub doc: String,
}

impl VariantPlan {
    pub fn arg_count(&self) -> usize {
        self.locals.len()
    }

    pub fn max_positional(&self) -> usize {
        self.mandatory.len() + self.optional.len()
    }

    fn accepts(&self, positional: usize) -> bool {
        positional >= self.mandatory.len() && positional <= self.max_positional()
    }

    /// Optional slots in binding order, with their positional index.
    fn optional_positions(&self) -> impl Iterator<Item = (usize, &Slot)> {
        let base = self.mandatory.len();
        self.optional.iter().enumerate().map(move |(i, s)| (base + i, s))
    }

    /// Positions where a trailing hash binds to a `/Map` slot instead of
    /// being the keyword map. A position is listed only when a call ending
    /// there fits the arity window.
    pub fn hash_positions(&self) -> Vec<usize> {
        self.mandatory
            .iter()
            .chain(&self.optional)
            .enumerate()
            .filter(|(pos, slot)| slot.hash && self.accepts(pos + 1))
            .map(|(pos, _)| pos)
            .collect()
    }

    /// A call of `total` values ending in a hash binds that hash
    /// positionally.
    fn takes_trailing_hash(&self, total: usize) -> bool {
        total > 0 && self.hash_positions().contains(&(total - 1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchPlan {
    pub qualified_name: String,
    pub display_name: String,
    /// Name of the emitted routine.
    pub wrapper_name: String,
    /// Callable spelled in C++.
    pub cname: String,
    pub kind: CallKind,
    /// Owning class, for methods and constructors.
    pub class: Option<String>,
    /// The owning class is stored by value.
    pub simple: bool,
    /// Namespace brought into scope so default expressions compile.
    pub namespace: String,
    /// Eligible variants, widest first.
    pub variants: Vec<VariantPlan>,
}

impl DispatchPlan {
    /// Plan the routine for `function`; `None` when no variant is eligible.
    pub fn build(
        function: &Function,
        statuses: &[Eligibility],
        api: &Api,
        config: &Config,
    ) -> Option<DispatchPlan> {
        let mut variants: Vec<VariantPlan> = function
            .variants
            .iter()
            .enumerate()
            .zip(statuses)
            .filter(|(_, st)| st.eligible)
            .map(|((index, v), _)| plan_variant(index, function, v, api, config))
            .collect();
        if variants.is_empty() {
            return None;
        }
        // Stable: equal widths keep declaration order.
        variants.sort_by(|a, b| b.arg_count().cmp(&a.arg_count()));

        let kind = if function.is_constructor {
            CallKind::Constructor
        } else if function.is_method() {
            CallKind::Method
        } else if function.owner.is_class() {
            CallKind::StaticMethod
        } else {
            CallKind::Function
        };
        let class = match &function.owner {
            Owner::Class(c) => Some(c.clone()),
            Owner::Namespace(_) => None,
        };
        let simple = class
            .as_ref()
            .and_then(|c| api.classes.get(c))
            .is_some_and(|c| c.is_simple);
        let namespace = match &function.owner {
            Owner::Namespace(n) => n.clone(),
            Owner::Class(c) => split_namespace(api, c).0,
        };
        Some(DispatchPlan {
            qualified_name: function.qualified_name.clone(),
            display_name: function.display_name.clone(),
            wrapper_name: wrapper_name(&config.prefix, function),
            cname: function.cname.clone(),
            kind,
            class,
            simple,
            namespace,
            variants,
        })
    }

    /// Run the dispatch protocol against host values.
    ///
    /// `as_hash` stands in for `rb_check_hash_type` and `convert` for
    /// `<prefix>_to`: it reports whether a value converts to a slot's type.
    /// Attempts stop at the first variant that binds completely.
    pub fn dispatch<V>(
        &self,
        args: &[V],
        as_hash: impl Fn(&V) -> Option<&BTreeMap<String, V>>,
        mut convert: impl FnMut(&Slot, &V) -> bool,
    ) -> Outcome {
        let trailing = args.last().and_then(|v| as_hash(v));
        let mut attempts = Vec::new();
        for vp in &self.variants {
            let (positional, keywords) = match trailing {
                Some(h) if !vp.takes_trailing_hash(args.len()) => {
                    (&args[..args.len() - 1], Some(h))
                }
                _ => (args, None),
            };
            let argc = positional.len();
            let attempt = if !vp.accepts(argc) {
                Attempt::Arity {
                    min: vp.mandatory.len(),
                    max: vp.max_positional(),
                }
            } else {
                bind_variant(vp, positional, keywords, &mut convert)
            };
            let called = matches!(attempt, Attempt::Called(_));
            attempts.push((vp.index, attempt));
            if called {
                break;
            }
        }
        Outcome {
            name: self.display_name.clone(),
            attempts,
        }
    }

    /// Emit the routine as C++.
    pub fn render(&self, prefix: &str) -> String {
        let receiver = match self.kind {
            CallKind::Function | CallKind::StaticMethod => "klass",
            CallKind::Method | CallKind::Constructor => "self",
        };
        let mut out = String::new();
        out.push_str(&format!("// {}\n", self.qualified_name));
        out.push_str(&format!(
            "static VALUE {}(int argc, VALUE *argv, VALUE {})\n{{\n",
            self.wrapper_name, receiver
        ));
        if !self.namespace.is_empty() {
            out.push_str(&format!(
                "    using namespace {};\n\n",
                self.namespace.replace('.', "::")
            ));
        }
        out.push_str("    VALUE h = Qnil;\n");
        out.push_str("    if (argc > 0) {\n");
        out.push_str("        h = rb_check_hash_type(argv[argc - 1]);\n");
        out.push_str("        if (!NIL_P(h)) {\n            --argc;\n        }\n");
        out.push_str("    }\n");
        let hash_aware = self.variants.iter().any(|vp| !vp.hash_positions().is_empty());
        if hash_aware {
            out.push_str("    const int kw_argc = argc;\n");
            out.push_str("    const VALUE kw_h = h;\n");
        }
        if let (CallKind::Method, Some(class)) = (self.kind, &self.class) {
            out.push_str(&format!(
                "    {}* _self_ = {}_{}_getp(self);\n",
                cpp_type(class),
                prefix,
                ident(class)
            ));
        }
        out.push_str("    std::vector<std::string> errors;\n");

        for vp in &self.variants {
            out.push('\n');
            if hash_aware {
                render_hash_rebind(vp, &mut out);
            }
            self.render_variant(vp, prefix, &mut out);
        }

        out.push_str(&format!(
            "\n    {}_raise_overload_error(\"{}\", errors);\n",
            prefix,
            c_string(&self.display_name)
        ));
        out.push_str("    return Qnil;\n}\n");
        out
    }

    fn render_variant(&self, vp: &VariantPlan, prefix: &str, out: &mut String) {
        let tag = format!("variant {}", vp.index);
        out.push_str(&format!("    // {}\n", c_string(&vp.prototype)));
        out.push_str(&super::doc_comment(&vp.doc, "    "));
        out.push_str(&format!(
            "    if (argc >= {} && argc <= {}) {{\n",
            vp.mandatory.len(),
            vp.max_positional()
        ));
        for local in &vp.locals {
            match &local.init {
                Some(init) => out.push_str(&format!(
                    "        {} {} = {};\n",
                    local.cpp_type, local.name, init
                )),
                None => out.push_str(&format!("        {} {};\n", local.cpp_type, local.name)),
            }
        }
        out.push_str("        bool ok = true;\n");

        for (i, slot) in vp.mandatory.iter().enumerate() {
            out.push_str(&convert_stmt(prefix, &format!("argv[{}]", i), slot, &tag, "        "));
        }
        for (pos, slot) in vp.optional_positions() {
            out.push_str(&format!("        if (argc > {}) {{\n", pos));
            out.push_str(&convert_stmt(prefix, &format!("argv[{}]", pos), slot, &tag, "            "));
            out.push_str("        } else if (!NIL_P(h)) {\n");
            out.push_str(&format!(
                "            VALUE kw = rb_hash_lookup2(h, ID2SYM(rb_intern(\"{}\")), Qundef);\n",
                slot.name
            ));
            out.push_str("            if (kw != Qundef) {\n");
            out.push_str(&convert_stmt(prefix, "kw", slot, &tag, "                "));
            out.push_str("            }\n");
            out.push_str("        }\n");
        }

        out.push_str("        if (ok) {\n");
        let args = vp.call_args.join(", ");
        match (self.kind, &self.class) {
            (CallKind::Constructor, Some(class)) => {
                let cls = ident(class);
                let cpp = cpp_type(class);
                out.push_str(&format!(
                    "            {}_{}_t* _p_ = {}_{}_storage(self);\n",
                    prefix, cls, prefix, cls
                ));
                out.push_str(&format!(
                    "            _p_->v = {};\n",
                    class::construct_expr(self.simple, &cpp, &args)
                ));
                out.push_str("            return self;\n");
            }
            _ => {
                let callee = match self.kind {
                    CallKind::Method => format!("_self_->{}", method_name(&self.cname)),
                    _ => self.cname.clone(),
                };
                match &vp.return_type {
                    Some(ret) => out.push_str(&format!(
                        "            {} raw_retval = {}({});\n",
                        ret, callee, args
                    )),
                    None => out.push_str(&format!("            {}({});\n", callee, args)),
                }
                out.push_str(&pack_results(prefix, &vp.results));
            }
        }
        out.push_str("        }\n");
        out.push_str("    } else {\n");
        out.push_str(&format!(
            "        errors.push_back(\"{}: takes {}..{} positional arguments\");\n",
            tag,
            vp.mandatory.len(),
            vp.max_positional()
        ));
        out.push_str("    }\n");
    }
}

/// Undo the previous variant's choice, then let a trailing hash fill a
/// `/Map` slot when the call ends on one.
fn render_hash_rebind(vp: &VariantPlan, out: &mut String) {
    out.push_str("    argc = kw_argc;\n");
    out.push_str("    h = kw_h;\n");
    let positions = vp.hash_positions();
    if positions.is_empty() {
        return;
    }
    let cond: Vec<String> = positions
        .iter()
        .map(|p| format!("argc == {}", p))
        .collect();
    out.push_str(&format!(
        "    if (!NIL_P(h) && ({})) {{\n        ++argc;\n        h = Qnil;\n    }}\n",
        cond.join(" || ")
    ));
}

/// What happened when one variant was tried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    /// The positional count fell outside `min..=max`.
    Arity { min: usize, max: usize },
    /// A value failed to convert into the named slot.
    Failed { slot: String },
    /// Every slot bound; the native callable was invoked.
    Called(Vec<Binding>),
}

/// Where a slot's value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Positional(usize),
    Keyword,
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub slot: String,
    pub source: Source,
}

/// Per-variant results of one simulated call, in the order tried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub name: String,
    pub attempts: Vec<(usize, Attempt)>,
}

impl Outcome {
    /// The variant that was called and its bindings.
    pub fn called(&self) -> Option<(usize, &[Binding])> {
        self.attempts.iter().find_map(|(i, a)| match a {
            Attempt::Called(b) => Some((*i, b.as_slice())),
            _ => None,
        })
    }

    /// The aggregate error raised when no variant was called.
    pub fn error(&self) -> Option<String> {
        if self.called().is_some() {
            return None;
        }
        let reasons: Vec<String> = self
            .attempts
            .iter()
            .map(|(i, a)| match a {
                Attempt::Arity { min, max } => {
                    format!("variant {}: takes {}..{} positional arguments", i, min, max)
                }
                Attempt::Failed { slot } => format!("variant {}: can't parse '{}'", i, slot),
                Attempt::Called(_) => String::new(),
            })
            .collect();
        Some(format!(
            "{}: no overload matched ({})",
            self.name,
            reasons.join("; ")
        ))
    }
}

fn bind_variant<V>(
    vp: &VariantPlan,
    positional: &[V],
    keywords: Option<&BTreeMap<String, V>>,
    convert: &mut impl FnMut(&Slot, &V) -> bool,
) -> Attempt {
    let mut bindings = Vec::with_capacity(vp.max_positional());
    for (i, slot) in vp.mandatory.iter().enumerate() {
        if !convert(slot, &positional[i]) {
            return Attempt::Failed {
                slot: slot.name.clone(),
            };
        }
        bindings.push(Binding {
            slot: slot.name.clone(),
            source: Source::Positional(i),
        });
    }
    for (pos, slot) in vp.optional_positions() {
        let (value, source) = match positional.get(pos) {
            Some(v) => (Some(v), Source::Positional(pos)),
            None => match keywords.and_then(|k| k.get(&slot.name)) {
                Some(v) => (Some(v), Source::Keyword),
                None => (None, Source::Default),
            },
        };
        if let Some(v) = value {
            if !convert(slot, v) {
                return Attempt::Failed {
                    slot: slot.name.clone(),
                };
            }
        }
        bindings.push(Binding {
            slot: slot.name.clone(),
            source,
        });
    }
    Attempt::Called(bindings)
}

fn plan_variant(
    index: usize,
    function: &Function,
    v: &Variant,
    api: &Api,
    config: &Config,
) -> VariantPlan {
    let slots = Slots::of(v, config);
    let slot = |i: usize| {
        let ty = v.args[i].ty();
        Slot {
            arg: i,
            name: v.args[i].name.clone(),
            ty: ty.to_string(),
            hash: api.classes.get(ty).is_some_and(|c| c.is_map),
        }
    };
    let mut mandatory: Vec<Slot> = slots.ordered().map(slot).collect();
    let optional = mandatory.split_off(slots.mandatory.len());

    let mut locals = Vec::with_capacity(v.args.len());
    let mut call_args = Vec::with_capacity(v.args.len());
    for arg in &v.args {
        let ty = arg.ty();
        let name = format!("raw_{}", arg.name);
        if arg.is_pure_output() && ty.ends_with('*') {
            locals.push(Local {
                name: name.clone(),
                cpp_type: cpp_type(ty.trim_end_matches('*')),
                init: arg.default_expr.clone(),
            });
            call_args.push(format!("&{}", name));
        } else if class::held_by_ptr(api, ty) {
            locals.push(Local {
                name: name.clone(),
                cpp_type: format!("cv::Ptr<{}>", cpp_type(ty)),
                init: match &arg.default_expr {
                    Some(d) => Some(format!("cv::makePtr<{}>({})", cpp_type(ty), d)),
                    None if arg.is_pure_output() => Some(format!("cv::makePtr<{}>()", cpp_type(ty))),
                    None => None,
                },
            });
            call_args.push(format!("*{}", name));
        } else {
            locals.push(Local {
                name: name.clone(),
                cpp_type: cpp_type(ty),
                init: arg.default_expr.clone(),
            });
            call_args.push(name);
        }
    }

    let return_type = match v.qualified_return_type.as_deref() {
        Some(ret) if v.has_return() && !function.is_constructor => Some(cpp_type(ret)),
        _ => None,
    };
    let mut results = Vec::new();
    if return_type.is_some() {
        results.push("raw_retval".to_string());
    }
    results.extend(
        v.args
            .iter()
            .filter(|a| a.is_output)
            .map(|a| format!("raw_{}", a.name)),
    );

    let prototype = prototype(
        &function.display_name,
        &mandatory,
        &optional,
        return_type.is_some(),
        v.args.iter().filter(|a| a.is_output).map(|a| a.name.as_str()),
        function.is_constructor,
    );

    VariantPlan {
        index,
        mandatory,
        optional,
        locals,
        call_args,
        return_type,
        results,
        prototype,
        doc: v.doc.clone(),
    }
}

/// `add(a, b[, c]) -> retval`
fn prototype<'a>(
    name: &str,
    mandatory: &[Slot],
    optional: &[Slot],
    has_return: bool,
    outputs: impl Iterator<Item = &'a str>,
    is_constructor: bool,
) -> String {
    let mut args = mandatory
        .iter()
        .map(|s| s.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    for (i, slot) in optional.iter().enumerate() {
        if i == 0 && mandatory.is_empty() {
            args.push('[');
        } else {
            args.push_str("[, ");
        }
        args.push_str(&slot.name);
    }
    args.push_str(&"]".repeat(optional.len()));

    let mut returns: Vec<&str> = Vec::new();
    if has_return {
        returns.push("retval");
    }
    returns.extend(outputs);
    let returns = if is_constructor {
        format!("<{} object>", name)
    } else if returns.is_empty() {
        "nil".to_string()
    } else {
        returns.join(", ")
    };
    format!("{}({}) -> {}", name, args, returns)
}

fn convert_stmt(prefix: &str, value: &str, slot: &Slot, tag: &str, indent: &str) -> String {
    format!(
        "{i}if (ok && !{p}_to({v}, raw_{n})) {{\n{i}    ok = false;\n{i}    errors.push_back(\"{t}: can't parse '{n}'\");\n{i}}}\n",
        i = indent,
        p = prefix,
        v = value,
        n = slot.name,
        t = tag
    )
}

fn pack_results(prefix: &str, results: &[String]) -> String {
    match results {
        [] => "            return Qnil;\n".to_string(),
        [one] => format!("            return {}_from({});\n", prefix, one),
        many => {
            let values: Vec<String> = many
                .iter()
                .map(|r| format!("{}_from({})", prefix, r))
                .collect();
            format!(
                "            return rb_ary_new3({}, {});\n",
                many.len(),
                values.join(", ")
            )
        }
    }
}

/// `cv::Foo::method2` -> `method2`
fn method_name(cname: &str) -> &str {
    cname.rsplit("::").next().unwrap_or(cname)
}

/// `<prefix>_cv_Foo_method2`, with `_static` appended for class statics.
pub fn wrapper_name(prefix: &str, function: &Function) -> String {
    let mut name = format!("{}_{}", prefix, ident(&function.qualified_name));
    if function.is_static && function.owner.is_class() {
        name.push_str("_static");
    }
    name
}

/// Name the method is registered under on the host side.
pub fn host_name(function: &Function) -> &str {
    if function.is_constructor {
        "initialize"
    } else {
        &function.display_name
    }
}
