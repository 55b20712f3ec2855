//! Struct synthesizer.
//!
//! Produces one C struct definition per struct-shaped position in an
//! argument's type, innermost first so every definition only references
//! types declared before it.

use std::collections::HashMap;

use tracing::error;

use crate::ctype::{Placement, Scope, TypeStruct, native_type};
use crate::error::{Error, Result};
use crate::model::{Argument, Direction, Interface, Node};
use crate::signature::TypeNode;

/// Synthesize the structs needed by the value at `path`.
pub fn synthesize(node: &TypeNode, path: &str, scope: &Scope) -> Vec<TypeStruct> {
    let mut out = Vec::new();
    walk(node, path, scope, &mut out);
    out
}

fn walk(node: &TypeNode, path: &str, scope: &Scope, out: &mut Vec<TypeStruct>) {
    match node {
        TypeNode::Array(element) => walk(element, &format!("{path}_element"), scope, out),
        TypeNode::Struct(_) | TypeNode::DictEntry(..) => {
            let mut members = Vec::new();
            for (i, member) in node.members().into_iter().enumerate() {
                let member_path = format!("{path}_item{i}");
                walk(member, &member_path, scope, out);
                let native = native_type(member, &member_path, Placement::Member, scope);
                members.extend(native.vars(&format!("item{i}")));
            }
            out.push(TypeStruct {
                name: scope.struct_name(path),
                members,
            });
        }
        TypeNode::Scalar(_) | TypeNode::Str(_) => {}
    }
}

/// Every path nested below `path` in `node`: `_element` for array
/// elements and `_itemN` for struct members.
pub fn derived_paths(node: &TypeNode, path: &str) -> Vec<String> {
    let mut out = Vec::new();
    match node {
        TypeNode::Array(element) => {
            let element_path = format!("{path}_element");
            out.extend(derived_paths(element, &element_path));
            out.push(element_path);
        }
        TypeNode::Struct(_) | TypeNode::DictEntry(..) => {
            for (i, member) in node.members().into_iter().enumerate() {
                let member_path = format!("{path}_item{i}");
                out.extend(derived_paths(member, &member_path));
                out.push(member_path);
            }
        }
        TypeNode::Scalar(_) | TypeNode::Str(_) => {}
    }
    out
}

/// Struct names already defined across a node, with their layouts.
#[derive(Debug, Default)]
pub struct Registry {
    structs: HashMap<String, TypeStruct>,
}

impl Registry {
    /// Record the structs of one member, or fail without recording any of
    /// them if a name is already taken by a different layout.
    pub fn claim(&mut self, interface: &str, structs: Vec<TypeStruct>) -> Result<()> {
        {
            let mut local: HashMap<&str, &TypeStruct> = HashMap::new();
            for s in &structs {
                let have = self.structs.get(&s.name).or_else(|| local.get(s.name.as_str()).copied());
                if have.is_some_and(|have| have != s) {
                    return Err(Error::DuplicateSymbol {
                        kind: "structure",
                        symbol: s.name.clone(),
                        interface: interface.to_string(),
                    });
                }
                local.insert(s.name.as_str(), s);
            }
        }
        for s in structs {
            self.structs.entry(s.name.clone()).or_insert(s);
        }
        Ok(())
    }
}

/// Drop every member whose structs would reuse a name already defined
/// with another layout; members are visited in declaration order.
pub fn claim_names(prefix: &str, node: &mut Node, errors: &mut Vec<Error>) {
    let mut registry = Registry::default();
    for interface in &mut node.interfaces {
        let methods = std::mem::take(&mut interface.methods);
        for m in methods {
            let structs = member_structs(prefix, interface, &m.symbol, &m.args);
            match registry.claim(&interface.name, structs) {
                Ok(()) => interface.methods.push(m),
                Err(e) => report(errors, e),
            }
        }

        let signals = std::mem::take(&mut interface.signals);
        for s in signals {
            let structs = member_structs(prefix, interface, &s.symbol, &s.args);
            match registry.claim(&interface.name, structs) {
                Ok(()) => interface.signals.push(s),
                Err(e) => report(errors, e),
            }
        }

        let properties = std::mem::take(&mut interface.properties);
        for p in properties {
            let value = Argument::property_value(&p.ty, Direction::Out);
            let structs = member_structs(prefix, interface, &p.symbol, std::slice::from_ref(&value));
            match registry.claim(&interface.name, structs) {
                Ok(()) => interface.properties.push(p),
                Err(e) => report(errors, e),
            }
        }
    }
}

fn member_structs(prefix: &str, interface: &Interface, member_symbol: &str, args: &[Argument]) -> Vec<TypeStruct> {
    let scope = Scope {
        prefix,
        interface_symbol: interface.symbol.as_deref(),
        member_symbol,
    };
    args.iter()
        .flat_map(|arg| synthesize(&arg.ty, &arg.symbol, &scope))
        .collect()
}

fn report(errors: &mut Vec<Error>, e: Error) {
    error!(error = %e, "dropping declaration");
    errors.push(e);
}
