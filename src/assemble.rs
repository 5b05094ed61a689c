//! Link ingested fragments into the [`Api`] model.
//!
//! Runs once every declaration has been ingested, because later declarations
//! can complete earlier ones (a method declared before its class, a parent
//! declared after its child).
//!
//! Passes, in order:
//!
//! 1. namespace inference from class and function scopes
//! 2. class placement
//! 3. enum and constant placement, synthesizing host classes where needed
//! 4. overload grouping of function fragments
//! 5. parent linkage
//! 6. depth computation
//! 7. typedef registration

use crate::config::Config;
use crate::error::{GenError, Result};
use crate::ingest::ApiBuilder;
use crate::model::{
    base_name, cpp_name, scope_of, Api, Class, Constant, Enum, Function, Namespace, Owner,
    Typedef, TypedefTarget,
};
use crate::resolve::scope_walk;
use std::collections::BTreeMap;
use tracing::{debug, warn};

impl ApiBuilder {
    /// Consume the builder and produce the linked model.
    pub fn finish(self, config: &Config) -> Result<Api> {
        let mut api = Api {
            root: self.root.clone(),
            builtin_types: config.builtin_types.iter().cloned().collect(),
            classes: self.classes,
            ..Default::default()
        };

        // 1. namespaces
        ensure_namespace(&mut api, &self.root);
        for ns in &self.namespaces {
            ensure_namespace(&mut api, ns);
        }
        for name in &self.class_order {
            let scope = scope_of(name);
            if !scope.is_empty() {
                ensure_namespace(&mut api, scope);
            }
        }
        for frag in &self.functions {
            ensure_namespace(&mut api, &frag.scope);
        }

        // 2. classes
        for name in &self.class_order {
            let scope = scope_of(name).to_string();
            let owner = if scope.is_empty() {
                None
            } else if api.classes.contains_key(&scope) {
                Some(Owner::Class(scope))
            } else {
                Some(Owner::Namespace(scope))
            };
            attach_class(&mut api, name, owner);
        }

        // 3. enums and constants
        let mut enum_origins = BTreeMap::new();
        for frag in self.enums {
            // Every anonymous enum in a scope shares one key.
            if let Some(existing) = api.enums.get_mut(&frag.qualified_name) {
                if !existing.is_anonymous() {
                    return Err(GenError::DuplicateEnum {
                        first: enum_origins
                            .get(&frag.qualified_name)
                            .cloned()
                            .unwrap_or_default(),
                        name: frag.qualified_name,
                        second: frag.origin,
                    });
                }
                existing.enumerators.extend(frag.enumerators);
                continue;
            }
            enum_origins.insert(frag.qualified_name.clone(), frag.origin.clone());
            let scope = scope_of(&frag.qualified_name).to_string();
            let owner = place(&mut api, &frag.qualified_name, &scope)?;
            let rejection = match &owner {
                Owner::Class(class) if frag.is_scoped => {
                    warn!(
                        "scoped enum {} inside class {} is not supported",
                        frag.qualified_name, class
                    );
                    Some(format!("scoped enum inside class '{}' is not supported", class))
                }
                _ => None,
            };
            match &owner {
                Owner::Class(c) => {
                    if let Some(c) = api.classes.get_mut(c) {
                        c.nested_enums.push(frag.qualified_name.clone());
                    }
                }
                Owner::Namespace(n) => {
                    if let Some(n) = api.namespaces.get_mut(n) {
                        n.enums.push(frag.qualified_name.clone());
                    }
                }
            }
            api.enums.insert(
                frag.qualified_name.clone(),
                Enum {
                    qualified_name: frag.qualified_name,
                    is_scoped: frag.is_scoped,
                    owner,
                    enumerators: frag.enumerators,
                    rejection,
                },
            );
        }
        for frag in self.constants {
            let (ns, name) = split_namespace(&api, &frag.qualified_name);
            match api.namespaces.get_mut(&ns) {
                Some(n) => n.constants.push(Constant {
                    name,
                    cname: cpp_name(&frag.qualified_name),
                    value: frag.value,
                }),
                None => {
                    return Err(GenError::Placement {
                        name: frag.qualified_name.clone(),
                        scope: scope_of(&frag.qualified_name).to_string(),
                    })
                }
            }
        }

        // 4. overload sets
        for frag in self.functions {
            let owner = if api.classes.contains_key(&frag.scope) {
                Owner::Class(frag.scope.clone())
            } else {
                Owner::Namespace(frag.scope.clone())
            };
            if let Some(func) = api.functions.get_mut(&frag.key) {
                func.variants.push(frag.variant);
                continue;
            }
            let is_constructor = owner.is_class()
                && frag.declared_name == base_name(&frag.scope)
                && !frag.variant.has_return();
            let display_name = if is_constructor {
                api.classes
                    .get(&frag.scope)
                    .map(|c| c.display_name.clone())
                    .unwrap_or(frag.display_name)
            } else {
                frag.display_name
            };
            match &owner {
                Owner::Class(c) => {
                    if let Some(c) = api.classes.get_mut(c) {
                        c.methods.push(frag.key.clone());
                    }
                }
                Owner::Namespace(n) => {
                    if let Some(n) = api.namespaces.get_mut(n) {
                        n.functions.push(frag.key.clone());
                    }
                }
            }
            api.functions.insert(
                frag.key.clone(),
                Function {
                    qualified_name: frag.key,
                    cname: format!("{}::{}", cpp_name(&frag.scope), frag.declared_name),
                    display_name,
                    is_static: frag.variant.is_static,
                    is_constructor,
                    owner,
                    variants: vec![frag.variant],
                },
            );
        }

        // 5. parents
        link_parents(&mut api);

        // 6. depth
        compute_depths(&mut api)?;

        // 7. typedefs
        for (alias, target) in &config.typedefs {
            let target_kind = if api.classes.contains_key(target) {
                TypedefTarget::Class
            } else if api.enums.contains_key(target) {
                TypedefTarget::Enum
            } else if api.functions.contains_key(target) {
                TypedefTarget::Function
            } else if api.builtin_types.contains(target) {
                TypedefTarget::Other
            } else {
                debug!("skipping typedef {} -> {}: target not declared", alias, target);
                continue;
            };
            api.typedefs.insert(
                alias.clone(),
                Typedef {
                    name: alias.clone(),
                    target_kind,
                    target: target.clone(),
                },
            );
        }

        debug!(
            "assembled {} namespaces, {} classes, {} enums, {} functions",
            api.namespaces.len(),
            api.classes.len(),
            api.enums.len(),
            api.functions.len()
        );
        Ok(api)
    }
}

/// Register `name` and every ancestor scope that is not a class.
fn ensure_namespace(api: &mut Api, name: &str) {
    let mut current = name;
    while !current.is_empty() && !api.classes.contains_key(current) {
        api.namespaces
            .entry(current.to_string())
            .or_insert_with(|| Namespace {
                qualified_name: current.to_string(),
                ..Default::default()
            });
        current = scope_of(current);
    }
}

fn attach_class(api: &mut Api, name: &str, owner: Option<Owner>) {
    match &owner {
        Some(Owner::Class(c)) => {
            if let Some(c) = api.classes.get_mut(c) {
                c.nested_classes.push(name.to_string());
            }
        }
        Some(Owner::Namespace(n)) => {
            if let Some(n) = api.namespaces.get_mut(n) {
                n.classes.push(name.to_string());
            }
        }
        None => {}
    }
    if let Some(class) = api.classes.get_mut(name) {
        class.owner = owner;
    }
}

/// Decide who owns a type declared as `name` inside `scope`.
///
/// When the scope is unknown, a class is synthesized there, provided the
/// scope's own parent is a namespace.
fn place(api: &mut Api, name: &str, scope: &str) -> Result<Owner> {
    if api.classes.contains_key(scope) {
        return Ok(Owner::Class(scope.to_string()));
    }
    if api.is_namespace(scope) {
        return Ok(Owner::Namespace(scope.to_string()));
    }
    let grandparent = scope_of(scope);
    if scope.is_empty() || !api.is_namespace(grandparent) {
        return Err(GenError::Placement {
            name: name.to_string(),
            scope: scope.to_string(),
        });
    }
    debug!("synthesizing class {} to host {}", scope, name);
    let mut host = Class::new(scope);
    host.no_bind = true;
    api.classes.insert(scope.to_string(), host);
    attach_class(api, scope, Some(Owner::Namespace(grandparent.to_string())));
    Ok(Owner::Class(scope.to_string()))
}

/// Split `cv.Foo.Bar.X` into its nearest namespace and the remaining path
/// joined with `_`: (`cv`, `Foo_Bar_X`).
pub fn split_namespace(api: &Api, qualified: &str) -> (String, String) {
    let ns = api.nearest_namespace(scope_of(qualified));
    let rest = if ns.is_empty() {
        qualified
    } else {
        &qualified[ns.len() + 1..]
    };
    (ns.to_string(), rest.replace('.', "_"))
}

fn link_parents(api: &mut Api) {
    let mut links = Vec::new();
    for (name, class) in &api.classes {
        let Some(parent_name) = &class.parent_name else {
            continue;
        };
        let rooted = format!("{}.{}", api.root, parent_name);
        let found = if api.classes.contains_key(parent_name) {
            Some(parent_name.clone())
        } else if api.classes.contains_key(&rooted) {
            Some(rooted)
        } else {
            scope_walk(parent_name, scope_of(name), |c| api.classes.contains_key(c))
        };
        match found {
            Some(parent) if parent != *name => links.push((name.clone(), parent)),
            _ => warn!(
                "parent class {} of {} is not declared; binding without a parent",
                parent_name, name
            ),
        }
    }
    for (child, parent) in links {
        if let Some(c) = api.classes.get_mut(&child) {
            c.parent = Some(parent.clone());
        }
        if let Some(p) = api.classes.get_mut(&parent) {
            p.children.push(child);
        }
    }
}

fn compute_depths(api: &mut Api) -> Result<()> {
    let limit = api.classes.len();
    let mut depths = Vec::with_capacity(limit);
    for (name, class) in &api.classes {
        let mut depth = 0;
        let mut current = class.parent.as_deref();
        while let Some(parent) = current {
            depth += 1;
            if depth > limit {
                return Err(GenError::InheritanceCycle { name: name.clone() });
            }
            current = api.classes.get(parent).and_then(|p| p.parent.as_deref());
        }
        depths.push((name.clone(), depth));
    }
    for (name, depth) in depths {
        if let Some(c) = api.classes.get_mut(&name) {
            c.depth = depth;
        }
    }
    Ok(())
}
