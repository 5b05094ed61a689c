//! Overload eligibility: decide, per variant, whether it can be marshalled.
//!
//! Rejections are data. A function whose variants are all rejected is left
//! out of emission and logged with the reasons; nothing here aborts a run.

use crate::config::Config;
use crate::model::{Api, Function, Owner, Variant};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

/// Outcome of classifying one variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eligibility {
    pub eligible: bool,
    /// Empty when eligible.
    pub reason: String,
}

impl Eligibility {
    pub fn accepted() -> Self {
        Eligibility {
            eligible: true,
            reason: String::new(),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Eligibility {
            eligible: false,
            reason: reason.into(),
        }
    }
}

/// Host-side argument slots of a variant, as indices into `variant.args`.
///
/// Callers see mandatory inputs first, then output buffers they may hand in
/// for reuse, then defaulted arguments (inputs, and outputs with an initial
/// value). Declaration order is kept within each group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Slots {
    pub mandatory: Vec<usize>,
    pub buffers: Vec<usize>,
    pub optional: Vec<usize>,
}

impl Slots {
    pub fn of(variant: &Variant, config: &Config) -> Self {
        let mut slots = Slots::default();
        for (i, arg) in variant.args.iter().enumerate() {
            if arg.default_expr.is_some() {
                slots.optional.push(i);
            } else if arg.is_pure_output() {
                if config.is_buffer_type(arg.ty()) {
                    slots.buffers.push(i);
                }
            } else {
                slots.mandatory.push(i);
            }
        }
        slots
    }

    /// Buffers and defaulted arguments together.
    pub fn optional_count(&self) -> usize {
        self.buffers.len() + self.optional.len()
    }

    /// All slots in host binding order.
    pub fn ordered(&self) -> impl Iterator<Item = usize> + '_ {
        self.mandatory
            .iter()
            .chain(&self.buffers)
            .chain(&self.optional)
            .copied()
    }
}

/// Allow-lists widened with the model's own bindable classes and enums.
pub struct Filter<'a> {
    api: &'a Api,
    config: &'a Config,
    return_types: BTreeSet<String>,
    arg_types: BTreeSet<String>,
}

impl<'a> Filter<'a> {
    pub fn new(api: &'a Api, config: &'a Config) -> Self {
        let mut return_types: BTreeSet<String> = config.return_types.iter().cloned().collect();
        let mut arg_types: BTreeSet<String> = config.arg_types.iter().cloned().collect();

        for class in api.classes.values().filter(|c| !c.no_bind) {
            let q = &class.qualified_name;
            arg_types.insert(q.clone());
            if class.is_map {
                // Converted one way only, from a host hash.
            } else if class.is_simple {
                return_types.insert(q.clone());
            } else {
                // Held behind a smart pointer; only the pointer goes back out.
                arg_types.insert(format!("Ptr<{}>", q));
                return_types.insert(format!("Ptr<{}>", q));
            }
        }
        for e in api.enums.values() {
            if e.rejection.is_none() && !e.is_anonymous() {
                arg_types.insert(e.qualified_name.clone());
                return_types.insert(e.qualified_name.clone());
            }
        }

        Filter {
            api,
            config,
            return_types,
            arg_types,
        }
    }

    pub fn is_bindable_return(&self, ty: &str) -> bool {
        self.return_types.contains(ty)
    }

    pub fn is_bindable_arg(&self, ty: &str) -> bool {
        self.arg_types.contains(ty)
    }

    /// One [`Eligibility`] per variant, in declaration order.
    pub fn classify(&self, function: &Function) -> Vec<Eligibility> {
        let owner_problem = self.owner_problem(function);
        function
            .variants
            .iter()
            .map(|v| match &owner_problem {
                Some(reason) => Eligibility::rejected(reason.clone()),
                None => self.classify_variant(function, v),
            })
            .collect()
    }

    fn owner_problem(&self, function: &Function) -> Option<String> {
        let Owner::Class(name) = &function.owner else {
            return None;
        };
        match self.api.classes.get(name) {
            None => Some(format!("owner class '{}' is not declared", name)),
            Some(c) if c.no_bind => Some(format!("owner class '{}' is not bound", name)),
            Some(c) if c.is_map => Some(format!(
                "owner class '{}' is converted from a hash and has no methods",
                name
            )),
            Some(_) => None,
        }
    }

    fn classify_variant(&self, function: &Function, v: &Variant) -> Eligibility {
        if v.is_static != function.is_static {
            return Eligibility::rejected("static and instance overloads cannot share a name");
        }

        if v.has_return() {
            match v.qualified_return_type.as_deref() {
                None => {
                    return Eligibility::rejected(format!(
                        "unresolved return type '{}'",
                        v.return_type
                    ))
                }
                Some(ty) if !self.is_bindable_return(ty) => {
                    return Eligibility::rejected(format!("retval type is not supported: {}", ty))
                }
                Some(_) => {}
            }
        }

        for arg in &v.args {
            if let Some(why) = &arg.forbidden {
                return Eligibility::rejected(format!(
                    "argument '{}' cannot be marshalled: {}",
                    arg.name, why
                ));
            }
            let Some(ty) = arg.qualified_type.as_deref() else {
                return Eligibility::rejected(format!(
                    "argument '{}' has unresolved type '{}'",
                    arg.name, arg.raw_type
                ));
            };
            if !self.is_bindable_arg(ty) {
                return Eligibility::rejected(format!(
                    "input argument type is not supported: {} {}",
                    arg.name, ty
                ));
            }
            if arg.is_output && !self.is_bindable_return(ty) {
                return Eligibility::rejected(format!(
                    "output argument type is not supported: {} {}",
                    arg.name, ty
                ));
            }
        }

        let slots = Slots::of(v, self.config);
        if slots.mandatory.len() > self.config.max_mandatory_args {
            return Eligibility::rejected(format!(
                "too many mandatory arguments: {}",
                slots.mandatory.len()
            ));
        }
        if slots.optional_count() > self.config.max_optional_args {
            return Eligibility::rejected(format!(
                "too many optional arguments: {}",
                slots.optional_count()
            ));
        }
        Eligibility::accepted()
    }
}

/// Convenience wrapper around [`Filter::classify`].
pub fn classify(function: &Function, api: &Api, config: &Config) -> Vec<Eligibility> {
    Filter::new(api, config).classify(function)
}

/// Classify every function in the model, logging those left with nothing to
/// emit.
pub fn classify_all(api: &Api, config: &Config) -> BTreeMap<String, Vec<Eligibility>> {
    let filter = Filter::new(api, config);
    let mut out = BTreeMap::new();
    for (key, function) in &api.functions {
        let statuses = filter.classify(function);
        if !statuses.iter().any(|s| s.eligible) {
            let reasons: Vec<&str> = statuses.iter().map(|s| s.reason.as_str()).collect();
            info!("omitting {}: {}", key, reasons.join("; "));
        }
        out.insert(key.clone(), statuses);
    }
    out
}
