//! Extraction: interface declarations to the validated model.
//!
//! Every member is extracted independently; a member that fails validation
//! is dropped and its error collected while its siblings carry on.

use std::collections::HashSet;

use tracing::{debug, error, info, warn};

use crate::config::{AnnotationDecl, ArgDecl, InterfaceDecl, MethodDecl, PropertyDecl, SignalDecl};
use crate::error::{Error, Result};
use crate::model::*;
use crate::signature::TypeNode;
use crate::{structs, symbol};

pub const DEPRECATED: &str = "org.freedesktop.DBus.Deprecated";
pub const NO_REPLY: &str = "org.freedesktop.DBus.Method.NoReply";
pub const ASYNC: &str = "com.netsplit.Nih.Method.Async";
pub const SYMBOL: &str = "com.netsplit.Nih.Symbol";

/// Names used by the generated functions themselves; arguments may not
/// shadow them.
const RESERVED: &[&str] = &[
    "connection",
    "data",
    "error",
    "error_handler",
    "handler",
    "interface",
    "iter",
    "message",
    "method_call",
    "object",
    "origin_path",
    "parent",
    "pending_call",
    "pending_data",
    "property",
    "proxied",
    "proxy",
    "reply",
    "signal",
    "timeout",
    "variter",
];

/// Extracted model plus every error that dropped part of it.
#[derive(Debug, Default)]
pub struct Extraction {
    pub node: Node,
    pub errors: Vec<Error>,
}

/// Extract every interface.
pub fn extract_node(decls: &[InterfaceDecl]) -> Extraction {
    let mut extraction = Extraction::default();
    let mut seen = HashSet::new();

    for decl in decls {
        if !seen.insert(decl.name.as_str()) {
            report(&mut extraction.errors, Error::DuplicateSymbol {
                kind: "interface",
                symbol: decl.name.clone(),
                interface: decl.name.clone(),
            });
            continue;
        }
        match extract_interface(decl, &mut extraction.errors) {
            Ok(interface) => extraction.node.interfaces.push(interface),
            Err(e) => report(&mut extraction.errors, e),
        }
    }

    info!(
        interfaces = extraction.node.interfaces.len(),
        errors = extraction.errors.len(),
        "extraction complete"
    );
    extraction
}

fn report(errors: &mut Vec<Error>, e: Error) {
    error!(error = %e, "dropping declaration");
    errors.push(e);
}

/// Extract one interface; member errors are pushed to `errors`, interface
/// level errors are returned.
pub fn extract_interface(decl: &InterfaceDecl, errors: &mut Vec<Error>) -> Result<Interface> {
    if !symbol::valid_interface_name(&decl.name) {
        return Err(Error::InvalidName {
            kind: "interface",
            name: decl.name.clone(),
        });
    }

    let flags = annotations(&decl.annotation, &decl.name, Kind::Interface)?;
    let iface_symbol = flags.symbol.or_else(|| decl.symbol.clone());
    if let Some(sym) = &iface_symbol {
        if !symbol::valid(sym) {
            return Err(Error::InvalidSymbol(sym.clone()));
        }
    }

    let mut interface = Interface {
        name: decl.name.clone(),
        symbol: iface_symbol,
        deprecated: flags.deprecated,
        methods: Vec::new(),
        signals: Vec::new(),
        properties: Vec::new(),
    };

    let mut siblings = Siblings::new("method", &decl.name);
    for m in &decl.method {
        match extract_method(m, &decl.name, interface.deprecated)
            .and_then(|method| siblings.claim(&method.name, &method.symbol).map(|_| method))
        {
            Ok(method) => interface.methods.push(method),
            Err(e) => report(errors, e),
        }
    }

    let mut siblings = Siblings::new("signal", &decl.name);
    for s in &decl.signal {
        match extract_signal(s, interface.deprecated)
            .and_then(|signal| siblings.claim(&signal.name, &signal.symbol).map(|_| signal))
        {
            Ok(signal) => interface.signals.push(signal),
            Err(e) => report(errors, e),
        }
    }

    let mut siblings = Siblings::new("property", &decl.name);
    for p in &decl.property {
        match extract_property(p, interface.deprecated)
            .and_then(|property| siblings.claim(&property.name, &property.symbol).map(|_| property))
        {
            Ok(property) => interface.properties.push(property),
            Err(e) => report(errors, e),
        }
    }

    debug!(
        interface = %interface.name,
        methods = interface.methods.len(),
        signals = interface.signals.len(),
        properties = interface.properties.len(),
        "extracted interface"
    );
    Ok(interface)
}

/// Names and symbols already taken by one kind of member on an interface.
struct Siblings<'a> {
    kind: &'static str,
    interface: &'a str,
    names: HashSet<String>,
    symbols: HashSet<String>,
}

impl<'a> Siblings<'a> {
    fn new(kind: &'static str, interface: &'a str) -> Self {
        Siblings {
            kind,
            interface,
            names: HashSet::new(),
            symbols: HashSet::new(),
        }
    }

    fn claim(&mut self, name: &str, sym: &str) -> Result<()> {
        let taken = if self.names.contains(name) {
            Some(name)
        } else if self.symbols.contains(sym) {
            Some(sym)
        } else {
            None
        };
        if let Some(taken) = taken {
            return Err(Error::DuplicateSymbol {
                kind: self.kind,
                symbol: taken.to_string(),
                interface: self.interface.to_string(),
            });
        }
        self.names.insert(name.to_string());
        self.symbols.insert(sym.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Annotations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Interface,
    Method,
    Signal,
    Property,
}

#[derive(Debug, Default)]
struct Flags {
    deprecated: bool,
    is_async: bool,
    no_reply: bool,
    symbol: Option<String>,
}

fn boolean(annotation: &AnnotationDecl, member: &str) -> Result<bool> {
    match annotation.value.as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(Error::InvalidAnnotation {
            annotation: annotation.name.clone(),
            value: annotation.value.clone(),
            member: member.to_string(),
        }),
    }
}

/// Apply annotations in order; a repeated annotation overrides earlier ones.
fn annotations(list: &[AnnotationDecl], member: &str, kind: Kind) -> Result<Flags> {
    let mut flags = Flags::default();
    for a in list {
        match (a.name.as_str(), kind) {
            (DEPRECATED, _) => flags.deprecated = boolean(a, member)?,
            (NO_REPLY, Kind::Method) => flags.no_reply = boolean(a, member)?,
            (ASYNC, Kind::Method) => flags.is_async = boolean(a, member)?,
            (SYMBOL, _) => {
                if !symbol::valid(&a.value) {
                    return Err(Error::InvalidSymbol(a.value.clone()));
                }
                flags.symbol = Some(a.value.clone());
            }
            (name, _) => warn!(annotation = name, member, "ignoring unknown annotation"),
        }
    }
    Ok(flags)
}

/// Explicit symbol if given (annotation over attribute), derived otherwise.
fn member_symbol(name: &str, explicit: Option<&String>, flags: &Flags) -> Result<String> {
    let sym = match flags.symbol.as_ref().or(explicit) {
        Some(s) => s.clone(),
        None => symbol::from_name(name),
    };
    if !symbol::valid(&sym) {
        return Err(Error::InvalidSymbol(sym));
    }
    Ok(sym)
}

// ---------------------------------------------------------------------------
// Members
// ---------------------------------------------------------------------------

pub fn extract_method(decl: &MethodDecl, interface: &str, deprecated: bool) -> Result<Method> {
    if !symbol::valid_member_name(&decl.name) {
        return Err(Error::InvalidName {
            kind: "method",
            name: decl.name.clone(),
        });
    }
    let flags = annotations(&decl.annotation, &decl.name, Kind::Method)?;
    let sym = member_symbol(&decl.name, decl.symbol.as_ref(), &flags)?;
    let args = extract_args(&decl.arg, &decl.name, false)?;

    let mut method = Method {
        name: decl.name.clone(),
        symbol: sym,
        deprecated: deprecated || flags.deprecated,
        is_async: flags.is_async,
        no_reply: flags.no_reply,
        args,
    };

    if method.no_reply && method.outputs().next().is_some() {
        warn!(
            interface,
            method = %method.name,
            "method declared no-reply has output arguments; it will be replied to"
        );
        method.no_reply = false;
    }

    debug!(
        method = %method.name,
        symbol = %method.symbol,
        args = method.args.len(),
        is_async = method.is_async,
        no_reply = method.no_reply,
        "extracted method"
    );
    Ok(method)
}

pub fn extract_signal(decl: &SignalDecl, deprecated: bool) -> Result<Signal> {
    if !symbol::valid_member_name(&decl.name) {
        return Err(Error::InvalidName {
            kind: "signal",
            name: decl.name.clone(),
        });
    }
    let flags = annotations(&decl.annotation, &decl.name, Kind::Signal)?;
    let sym = member_symbol(&decl.name, decl.symbol.as_ref(), &flags)?;
    let args = extract_args(&decl.arg, &decl.name, true)?;

    debug!(signal = %decl.name, symbol = %sym, args = args.len(), "extracted signal");
    Ok(Signal {
        name: decl.name.clone(),
        symbol: sym,
        deprecated: deprecated || flags.deprecated,
        args,
    })
}

pub fn extract_property(decl: &PropertyDecl, deprecated: bool) -> Result<Property> {
    if !symbol::valid_member_name(&decl.name) {
        return Err(Error::InvalidName {
            kind: "property",
            name: decl.name.clone(),
        });
    }
    let flags = annotations(&decl.annotation, &decl.name, Kind::Property)?;
    let sym = member_symbol(&decl.name, decl.symbol.as_ref(), &flags)?;
    let ty = TypeNode::parse(&decl.ty)?;

    debug!(property = %decl.name, symbol = %sym, signature = %ty, "extracted property");
    Ok(Property {
        name: decl.name.clone(),
        symbol: sym,
        ty,
        access: decl.access,
        deprecated: deprecated || flags.deprecated,
    })
}

fn extract_args(decls: &[ArgDecl], member: &str, is_signal: bool) -> Result<Vec<Argument>> {
    let mut seen = HashSet::new();
    let mut args = Vec::with_capacity(decls.len());

    for (i, decl) in decls.iter().enumerate() {
        let ty = TypeNode::parse(&decl.ty)?;
        let direction = match (is_signal, decl.direction) {
            (true, Some(Direction::In)) => {
                return Err(Error::InvalidDirection {
                    member: member.to_string(),
                    argument: decl.name.clone().unwrap_or_else(|| format!("arg{}", i + 1)),
                });
            }
            (true, _) => Direction::Out,
            (false, d) => d.unwrap_or(Direction::In),
        };

        let sym = match &decl.name {
            Some(name) => symbol::from_name(name),
            None => format!("arg{}", i + 1),
        };
        if !symbol::valid(&sym) || RESERVED.contains(&sym.as_str()) {
            return Err(Error::InvalidSymbol(sym));
        }
        if !seen.insert(sym.clone()) {
            return Err(Error::DuplicateArgument {
                symbol: sym,
                member: member.to_string(),
            });
        }

        args.push(Argument {
            name: decl.name.clone(),
            symbol: sym,
            ty,
            direction,
        });
    }

    // `value_element` beside `value: a(su)` would reuse the names generated
    // for the array's elements.
    for arg in &args {
        let nested = structs::derived_paths(&arg.ty, &arg.symbol);
        if let Some(other) = args.iter().find(|other| nested.contains(&other.symbol)) {
            return Err(Error::DuplicateArgument {
                symbol: other.symbol.clone(),
                member: member.to_string(),
            });
        }
    }
    Ok(args)
}
