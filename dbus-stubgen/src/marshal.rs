//! Marshal emitter: C code appending a native value to a message iterator.

use crate::ctype::{CType, Placement, Scope, TypeVar, block, native_type, var_layout};
use crate::signature::TypeNode;

/// A value being moved between a message and C variables.
#[derive(Debug, Clone, Copy)]
pub struct Slot<'a> {
    /// C variable holding the value.
    pub name: &'a str,
    /// Struct-naming path for the value.
    pub path: &'a str,
    pub placement: Placement,
}

impl<'a> Slot<'a> {
    pub fn argument(name: &'a str, path: &'a str) -> Self {
        Slot {
            name,
            path,
            placement: Placement::Argument,
        }
    }
}

/// Generated marshalling code with the variables it reads and declares.
#[derive(Debug, Clone, Default)]
pub struct Marshal {
    pub code: String,
    /// Variables the code reads; the caller supplies them.
    pub inputs: Vec<TypeVar>,
    /// Variables the caller must declare for the code.
    pub locals: Vec<TypeVar>,
}

/// Emit code appending `slot` onto `iter`; `oom_error` runs when the
/// message cannot grow.
pub fn marshal(node: &TypeNode, slot: Slot, iter: &str, oom_error: &str, scope: &Scope) -> Marshal {
    match node {
        TypeNode::Scalar(_) | TypeNode::Str(_) => marshal_basic(node, slot, iter, oom_error, scope),
        TypeNode::Array(element) => marshal_array(node, element, slot, iter, oom_error, scope),
        TypeNode::Struct(_) | TypeNode::DictEntry(..) => {
            marshal_struct(node, slot, iter, oom_error, scope)
        }
    }
}

fn marshal_basic(node: &TypeNode, slot: Slot, iter: &str, oom_error: &str, scope: &Scope) -> Marshal {
    let native = native_type(node, slot.path, slot.placement, scope);
    let mut code = format!("/* Marshal a {} onto the message */\n", native.ctype);
    code.push_str(&block(
        &format!(
            "if (! dbus_message_iter_append_basic (&{iter}, {}, &{}))",
            node.dbus_const(),
            slot.name
        ),
        oom_error,
    ));

    Marshal {
        code,
        inputs: native.vars(slot.name),
        locals: Vec::new(),
    }
}

fn marshal_array(
    node: &TypeNode,
    element: &TypeNode,
    slot: Slot,
    iter: &str,
    oom_error: &str,
    scope: &Scope,
) -> Marshal {
    let name = slot.name;
    let native = native_type(node, slot.path, slot.placement, scope);

    let array_iter = format!("{name}_iter");
    let counter = format!("{name}_i");
    let element_name = format!("{name}_element");
    let element_path = format!("{}_element", slot.path);
    let element_native = native_type(element, &element_path, slot.placement, scope);

    let element_oom = format!("dbus_message_iter_abandon_container (&{iter}, &{array_iter});\n{oom_error}");
    let inner = marshal(
        element,
        Slot {
            name: &element_name,
            path: &element_path,
            placement: slot.placement,
        },
        &array_iter,
        &element_oom,
        scope,
    );

    let mut code = String::from("/* Marshal an array onto the message */\n");
    code.push_str(&block(
        &format!(
            "if (! dbus_message_iter_open_container (&{iter}, DBUS_TYPE_ARRAY, \"{}\", &{array_iter}))",
            element.signature()
        ),
        oom_error,
    ));
    code.push('\n');

    let condition = if native.null_terminated {
        format!("{name}[{counter}]")
    } else {
        format!("{counter} < {name}_len")
    };

    let mut body = String::new();
    let mut decls = inner.inputs.clone();
    decls.extend(inner.locals.iter().cloned());
    body.push_str(&var_layout(&decls));
    body.push('\n');
    body.push_str(&format!("{element_name} = {name}[{counter}];\n"));
    for (suffix, _) in &element_native.lens {
        body.push_str(&format!(
            "{element_name}{suffix} = {name}_element{suffix}s[{counter}];\n"
        ));
    }
    body.push('\n');
    body.push_str(&inner.code);

    code.push_str(&block(
        &format!("for (size_t {counter} = 0; {condition}; {counter}++)"),
        &body,
    ));
    code.push('\n');
    code.push_str(&block(
        &format!("if (! dbus_message_iter_close_container (&{iter}, &{array_iter}))"),
        oom_error,
    ));

    Marshal {
        code,
        inputs: native.vars(name),
        locals: vec![TypeVar::new(
            CType::named("DBusMessageIter"),
            array_iter,
        )],
    }
}

fn marshal_struct(node: &TypeNode, slot: Slot, iter: &str, oom_error: &str, scope: &Scope) -> Marshal {
    let name = slot.name;
    let native = native_type(node, slot.path, slot.placement, scope);
    let struct_iter = format!("{name}_iter");
    let container = match node {
        TypeNode::DictEntry(..) => "DBUS_TYPE_DICT_ENTRY",
        _ => "DBUS_TYPE_STRUCT",
    };

    let mut locals = vec![TypeVar::new(
        CType::named("DBusMessageIter"),
        struct_iter.clone(),
    )];

    let mut code = String::from("/* Marshal a structure onto the message */\n");
    code.push_str(&block(
        &format!("if (! dbus_message_iter_open_container (&{iter}, {container}, NULL, &{struct_iter}))"),
        oom_error,
    ));
    code.push('\n');

    let member_oom = format!("dbus_message_iter_abandon_container (&{iter}, &{struct_iter});\n{oom_error}");
    for (i, member) in node.members().into_iter().enumerate() {
        let member_name = format!("{name}_item{i}");
        let member_path = format!("{}_item{i}", slot.path);
        let inner = marshal(
            member,
            Slot {
                name: &member_name,
                path: &member_path,
                placement: Placement::Member,
            },
            &struct_iter,
            &member_oom,
            scope,
        );

        for var in &inner.inputs {
            let suffix = &var.name[member_name.len()..];
            code.push_str(&format!("{} = {name}->item{i}{suffix};\n", var.name));
        }
        code.push('\n');
        code.push_str(&inner.code);
        code.push('\n');

        locals.extend(inner.inputs);
        locals.extend(inner.locals);
    }

    code.push_str(&block(
        &format!("if (! dbus_message_iter_close_container (&{iter}, &{struct_iter}))"),
        oom_error,
    ));

    Marshal {
        code,
        inputs: native.vars(name),
        locals,
    }
}
