//! Argument binder: runs the emitters over one member's arguments for a
//! generation role and collects parameters, locals and code.

use crate::ctype::{Scope, TypeStruct, TypeVar};
use crate::demarshal::{Errors, demarshal};
use crate::marshal::{Slot, marshal};
use crate::model::{Argument, Direction};
use crate::structs;

/// The generated function an argument list is bound for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Object dispatch: demarshal inputs, call the handler, marshal outputs
    /// unless the handler replies later.
    Object { is_async: bool },
    /// Deferred reply of an async method.
    Reply,
    /// Proxy call: marshal inputs.
    ProxyCall,
    /// Proxy call completion: demarshal outputs.
    ProxyNotify,
    /// Blocking proxy call: marshal inputs, demarshal outputs into the caller.
    Sync,
    /// Signal emission: marshal every argument.
    Emit,
    /// Signal reception: demarshal every argument.
    Filter,
}

impl Role {
    fn demarshals(self, direction: Direction) -> bool {
        match self {
            Role::Object { .. } => direction == Direction::In,
            Role::ProxyNotify | Role::Sync => direction == Direction::Out,
            Role::Filter => true,
            Role::Reply | Role::ProxyCall | Role::Emit => false,
        }
    }

    fn marshals(self, direction: Direction) -> bool {
        match self {
            Role::Object { is_async } => !is_async && direction == Direction::Out,
            Role::Reply => direction == Direction::Out,
            Role::ProxyCall | Role::Sync => direction == Direction::In,
            Role::Emit => true,
            Role::ProxyNotify | Role::Filter => false,
        }
    }
}

/// Where the bound code runs.
#[derive(Debug, Clone)]
pub struct Frame<'a> {
    pub scope: Scope<'a>,
    /// Message iterator variable.
    pub iter: &'a str,
    /// Allocation parent for demarshalled values.
    pub parent: &'a str,
    /// Demarshal failure handlers.
    pub errors: Errors,
    /// Marshal allocation failure handler.
    pub oom_error: String,
}

/// Everything a function builder needs from an argument list.
#[derive(Debug, Clone, Default)]
pub struct Binding {
    /// Parameters of the generated function itself.
    pub params: Vec<TypeVar>,
    /// Parameters of the handler or callback the function invokes.
    pub handler_params: Vec<TypeVar>,
    /// Expressions passed for `handler_params`, in order.
    pub call_args: Vec<String>,
    pub locals: Vec<TypeVar>,
    pub demarshal: String,
    pub marshal: String,
    /// Copies results into caller-supplied pointers.
    pub assign: String,
    /// Frees every demarshalled value; used before late failures.
    pub cleanup: String,
    /// `nih_assert` checks on the function's parameters.
    pub asserts: String,
    pub structs: Vec<TypeStruct>,
}

pub fn bind(args: &[Argument], role: Role, frame: &Frame) -> Binding {
    let mut binding = Binding::default();

    for arg in args {
        let demarshals = role.demarshals(arg.direction);
        let marshals = role.marshals(arg.direction);
        if !demarshals && !marshals {
            continue;
        }

        binding
            .structs
            .extend(structs::synthesize(&arg.ty, &arg.symbol, &frame.scope));

        if demarshals {
            bind_demarshal(arg, role, frame, &mut binding);
        } else {
            bind_marshal(arg, role, frame, &mut binding);
        }
    }

    binding
}

fn bind_demarshal(arg: &Argument, role: Role, frame: &Frame, binding: &mut Binding) {
    let name = if role == Role::Sync {
        format!("{}_local", arg.symbol)
    } else {
        arg.symbol.clone()
    };
    let errors = frame.errors.with_cleanup(&binding.cleanup);
    let out = demarshal(
        &arg.ty,
        Slot::argument(&name, &arg.symbol),
        frame.parent,
        frame.iter,
        &errors,
        &frame.scope,
    );

    binding.demarshal.push_str(&out.code);
    binding.demarshal.push('\n');

    if role == Role::Sync {
        for var in &out.outputs {
            let suffix = &var.name[name.len()..];
            let param = format!("{}{suffix}", arg.symbol);
            binding
                .asserts
                .push_str(&format!("nih_assert ({param} != NULL);\n"));
            binding.assign.push_str(&format!("*{param} = {};\n", var.name));
            binding
                .params
                .push(TypeVar::new(var.ctype.to_pointer(), param));
        }
        if out.outputs.first().is_some_and(|v| v.ctype.is_pointer()) {
            binding.cleanup.push_str(&format!("nih_free ({name});\n"));
        }
    } else {
        for var in &out.outputs {
            binding
                .handler_params
                .push(TypeVar::new(var.ctype.to_const(), var.name.clone()));
            binding.call_args.push(var.name.clone());
        }
    }

    binding.locals.extend(out.outputs);
    binding.locals.extend(out.locals);
}

fn bind_marshal(arg: &Argument, role: Role, frame: &Frame, binding: &mut Binding) {
    let out = marshal(
        &arg.ty,
        Slot::argument(&arg.symbol, &arg.symbol),
        frame.iter,
        &frame.oom_error,
        &frame.scope,
    );

    binding.marshal.push_str(&out.code);
    binding.marshal.push('\n');

    if let Role::Object { .. } = role {
        // Handler fills local storage through pointers.
        for var in &out.inputs {
            binding
                .handler_params
                .push(TypeVar::new(var.ctype.to_pointer(), var.name.clone()));
            binding.call_args.push(format!("&{}", var.name));
        }
        binding.locals.extend(out.inputs);
    } else {
        if let Some(main) = out.inputs.first().filter(|v| v.ctype.is_pointer()) {
            let check = if out.inputs.len() > 1 {
                format!("({0}_len == 0) || ({0} != NULL)", main.name)
            } else {
                format!("{} != NULL", main.name)
            };
            binding.asserts.push_str(&format!("nih_assert ({check});\n"));
        }
        for var in &out.inputs {
            binding
                .params
                .push(TypeVar::new(var.ctype.to_const(), var.name.clone()));
        }
    }

    binding.locals.extend(out.locals);
}
