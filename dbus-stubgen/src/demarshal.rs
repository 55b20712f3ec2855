//! Demarshal emitter: C code reading a native value off a message iterator.
//!
//! Every allocation made while reading is parented so that freeing the
//! outermost value releases everything below it.

use crate::ctype::{CType, Placement, Scope, TypeVar, block, native_type, size_t, var_layout};
use crate::marshal::Slot;
use crate::signature::TypeNode;

/// Failure handlers spliced into generated code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Errors {
    /// Runs when an allocation fails.
    pub oom: String,
    /// Runs when the message does not hold the expected type.
    pub type_mismatch: String,
}

impl Errors {
    pub fn new(oom: impl Into<String>, type_mismatch: impl Into<String>) -> Self {
        Errors {
            oom: oom.into(),
            type_mismatch: type_mismatch.into(),
        }
    }

    /// Run `cleanup` before either handler.
    pub fn with_cleanup(&self, cleanup: &str) -> Self {
        Errors {
            oom: format!("{cleanup}{}", self.oom),
            type_mismatch: format!("{cleanup}{}", self.type_mismatch),
        }
    }
}

/// Generated demarshalling code with the variables it fills and declares.
#[derive(Debug, Clone, Default)]
pub struct Demarshal {
    pub code: String,
    /// Variables holding the result; the caller declares and consumes them.
    pub outputs: Vec<TypeVar>,
    /// Scratch variables the caller must declare.
    pub locals: Vec<TypeVar>,
}

/// Emit code reading `slot` from `iter`, allocating under `parent`.
pub fn demarshal(
    node: &TypeNode,
    slot: Slot,
    parent: &str,
    iter: &str,
    errors: &Errors,
    scope: &Scope,
) -> Demarshal {
    match node {
        TypeNode::Scalar(_) => demarshal_scalar(node, slot, iter, errors, scope),
        TypeNode::Str(_) => demarshal_string(node, slot, parent, iter, errors, scope),
        TypeNode::Array(element) => demarshal_array(node, element, slot, parent, iter, errors, scope),
        TypeNode::Struct(_) | TypeNode::DictEntry(..) => {
            demarshal_struct(node, slot, parent, iter, errors, scope)
        }
    }
}

fn type_check(iter: &str, dbus_type: &str, errors: &Errors) -> String {
    block(
        &format!("if (dbus_message_iter_get_arg_type (&{iter}) != {dbus_type})"),
        &errors.type_mismatch,
    )
}

fn demarshal_scalar(node: &TypeNode, slot: Slot, iter: &str, errors: &Errors, scope: &Scope) -> Demarshal {
    let native = native_type(node, slot.path, slot.placement, scope);
    let mut code = format!("/* Demarshal a {} from the message */\n", native.ctype);
    code.push_str(&type_check(iter, node.dbus_const(), errors));
    code.push('\n');
    code.push_str(&format!("dbus_message_iter_get_basic (&{iter}, &{});\n\n", slot.name));
    code.push_str(&format!("dbus_message_iter_next (&{iter});\n"));

    Demarshal {
        code,
        outputs: native.vars(slot.name),
        locals: Vec::new(),
    }
}

fn demarshal_string(
    node: &TypeNode,
    slot: Slot,
    parent: &str,
    iter: &str,
    errors: &Errors,
    scope: &Scope,
) -> Demarshal {
    let name = slot.name;
    let native = native_type(node, slot.path, slot.placement, scope);
    let raw = format!("{name}_dbus");

    let mut code = format!("/* Demarshal a {} from the message */\n", native.ctype);
    code.push_str(&type_check(iter, node.dbus_const(), errors));
    code.push('\n');
    code.push_str(&format!("dbus_message_iter_get_basic (&{iter}, &{raw});\n\n"));
    code.push_str(&format!("{name} = nih_strdup ({parent}, {raw});\n"));
    code.push_str(&block(&format!("if (! {name})"), &errors.oom));
    code.push('\n');
    code.push_str(&format!("dbus_message_iter_next (&{iter});\n"));

    Demarshal {
        code,
        outputs: native.vars(name),
        locals: vec![TypeVar::new(CType::named("char").ptr().to_const(), raw)],
    }
}

#[allow(clippy::too_many_arguments)]
fn demarshal_array(
    node: &TypeNode,
    element: &TypeNode,
    slot: Slot,
    parent: &str,
    iter: &str,
    errors: &Errors,
    scope: &Scope,
) -> Demarshal {
    let name = slot.name;
    let native = native_type(node, slot.path, slot.placement, scope);
    let array_iter = format!("{name}_iter");
    let element_name = format!("{name}_element");
    let element_path = format!("{}_element", slot.path);
    let element_native = native_type(element, &element_path, slot.placement, scope);
    let element_type = element_native.ctype.to_string();

    let release = format!("nih_free ({name});\n");
    let inner_errors = errors.with_cleanup(&release);
    let inner = demarshal(
        element,
        Slot {
            name: &element_name,
            path: &element_path,
            placement: slot.placement,
        },
        name,
        &array_iter,
        &inner_errors,
        scope,
    );

    let mut locals = vec![
        TypeVar::new(CType::named("DBusMessageIter"), array_iter.clone()),
        TypeVar::new(native.ctype.clone(), format!("{name}_tmp")),
    ];

    // Terminated arrays count into a local and keep a spare slot for NULL.
    let (count, extra) = if native.null_terminated {
        let size = format!("{name}_size");
        locals.push(TypeVar::new(size_t(), size.clone()));
        (size, 2)
    } else {
        (format!("{name}_len"), 1)
    };

    let mut code = String::from("/* Demarshal an array from the message */\n");
    code.push_str(&type_check(iter, "DBUS_TYPE_ARRAY", errors));
    code.push('\n');
    code.push_str(&format!("dbus_message_iter_recurse (&{iter}, &{array_iter});\n\n"));
    code.push_str(&format!("{count} = 0;\n"));
    code.push_str(&format!("{name} = nih_alloc ({parent}, sizeof ({element_type}));\n"));
    code.push_str(&block(&format!("if (! {name})"), &errors.oom));
    code.push('\n');
    if native.null_terminated {
        code.push_str(&format!("{name}[{count}] = NULL;\n\n"));
    }

    // Lengths of nested arrays travel in parallel arrays owned by this one.
    let parallel: Vec<(String, CType, String)> = element_native
        .lens
        .iter()
        .map(|(suffix, ctype)| {
            (
                format!("{name}_element{suffix}s"),
                ctype.clone(),
                format!("{element_name}{suffix}"),
            )
        })
        .collect();
    for (array, ctype, _) in &parallel {
        code.push_str(&format!("{array} = nih_alloc ({name}, sizeof ({ctype}));\n"));
        code.push_str(&block(&format!("if (! {array})"), &inner_errors.oom));
        code.push('\n');
        locals.push(TypeVar::new(ctype.clone().ptr(), format!("{array}_tmp")));
    }

    let mut body = String::new();
    let mut decls = inner.outputs.clone();
    decls.extend(inner.locals.iter().cloned());
    body.push_str(&var_layout(&decls));
    body.push('\n');
    body.push_str(&inner.code);
    body.push('\n');
    body.push_str(&block(
        &format!("if ({count} + {extra} > SIZE_MAX / sizeof ({element_type}))"),
        &inner_errors.type_mismatch,
    ));
    body.push('\n');
    body.push_str(&format!(
        "{name}_tmp = nih_realloc ({name}, {parent}, sizeof ({element_type}) * ({count} + {extra}));\n"
    ));
    body.push_str(&block(&format!("if (! {name}_tmp)"), &inner_errors.oom));
    body.push('\n');
    body.push_str(&format!("{name} = {name}_tmp;\n"));
    body.push_str(&format!("{name}[{count}] = {element_name};\n"));
    if native.null_terminated {
        body.push_str(&format!("{name}[{count} + 1] = NULL;\n"));
    }
    body.push('\n');
    for (array, ctype, value) in &parallel {
        body.push_str(&format!(
            "{array}_tmp = nih_realloc ({array}, {name}, sizeof ({ctype}) * ({count} + 1));\n"
        ));
        body.push_str(&block(&format!("if (! {array}_tmp)"), &inner_errors.oom));
        body.push('\n');
        body.push_str(&format!("{array} = {array}_tmp;\n"));
        body.push_str(&format!("{array}[{count}] = {value};\n\n"));
    }
    body.push_str(&format!("{count}++;\n"));

    code.push_str(&block(
        &format!("while (dbus_message_iter_get_arg_type (&{array_iter}) != DBUS_TYPE_INVALID)"),
        &body,
    ));
    code.push('\n');
    code.push_str(&format!("dbus_message_iter_next (&{iter});\n"));

    Demarshal {
        code,
        outputs: native.vars(name),
        locals,
    }
}

fn demarshal_struct(
    node: &TypeNode,
    slot: Slot,
    parent: &str,
    iter: &str,
    errors: &Errors,
    scope: &Scope,
) -> Demarshal {
    let name = slot.name;
    let native = native_type(node, slot.path, slot.placement, scope);
    let struct_iter = format!("{name}_iter");
    let struct_name = native.struct_name.clone().unwrap_or_default();
    let container = match node {
        TypeNode::DictEntry(..) => "DBUS_TYPE_DICT_ENTRY",
        _ => "DBUS_TYPE_STRUCT",
    };

    let release = format!("nih_free ({name});\n");
    let inner_errors = errors.with_cleanup(&release);
    let mut locals = vec![TypeVar::new(CType::named("DBusMessageIter"), struct_iter.clone())];

    let mut code = String::from("/* Demarshal a structure from the message */\n");
    code.push_str(&type_check(iter, container, errors));
    code.push('\n');
    code.push_str(&format!("dbus_message_iter_recurse (&{iter}, &{struct_iter});\n\n"));
    code.push_str(&format!("{name} = nih_new ({parent}, {struct_name});\n"));
    code.push_str(&block(&format!("if (! {name})"), &errors.oom));
    code.push('\n');

    for (i, member) in node.members().into_iter().enumerate() {
        let member_name = format!("{name}_item{i}");
        let member_path = format!("{}_item{i}", slot.path);
        let inner = demarshal(
            member,
            Slot {
                name: &member_name,
                path: &member_path,
                placement: Placement::Member,
            },
            name,
            &struct_iter,
            &inner_errors,
            scope,
        );
        code.push_str(&inner.code);
        code.push('\n');
        for var in &inner.outputs {
            let suffix = &var.name[member_name.len()..];
            code.push_str(&format!("{name}->item{i}{suffix} = {};\n", var.name));
        }
        code.push('\n');

        locals.extend(inner.outputs);
        locals.extend(inner.locals);
    }

    code.push_str(&block(
        &format!("if (dbus_message_iter_get_arg_type (&{struct_iter}) != DBUS_TYPE_INVALID)"),
        &inner_errors.type_mismatch,
    ));
    code.push('\n');
    code.push_str(&format!("dbus_message_iter_next (&{iter});\n"));

    Demarshal {
        code,
        outputs: native.vars(name),
        locals,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> Scope<'static> {
        Scope {
            prefix: "my",
            interface_symbol: None,
            member_symbol: "method",
        }
    }

    fn errors() -> Errors {
        Errors::new("return -1;\n", "return -2;\n")
    }

    fn emit(sig: &str) -> Demarshal {
        let node = TypeNode::parse(sig).unwrap();
        demarshal(&node, Slot::argument("value", "value"), "parent", "iter", &errors(), &scope())
    }

    #[test]
    fn scalar_value() {
        let d = emit("u");
        assert_eq!(
            d.code,
            "/* Demarshal a uint32_t from the message */\n\
             if (dbus_message_iter_get_arg_type (&iter) != DBUS_TYPE_UINT32) {\n\
             \treturn -2;\n\
             }\n\
             \n\
             dbus_message_iter_get_basic (&iter, &value);\n\
             \n\
             dbus_message_iter_next (&iter);\n"
        );
        assert_eq!(d.outputs, vec![TypeVar::new(CType::named("uint32_t"), "value")]);
    }

    #[test]
    fn strings_are_copied_under_parent() {
        let d = emit("o");
        assert!(d.code.contains("DBUS_TYPE_OBJECT_PATH"));
        assert!(d.code.contains("value = nih_strdup (parent, value_dbus);"));
        assert_eq!(d.locals[0].inline(), "const char *value_dbus");
    }

    #[test]
    fn terminated_array() {
        let d = emit("as");
        assert!(d.code.contains("value = nih_alloc (parent, sizeof (char *));"));
        assert!(d.code.contains("value[value_size] = NULL;"));
        assert!(d.code.contains("value_element = nih_strdup (value, value_element_dbus);"));
        assert!(d.code.contains("if (value_size + 2 > SIZE_MAX / sizeof (char *)) {\n\t\tnih_free (value);\n\t\treturn -2;"));
        assert!(d.code.contains("value[value_size + 1] = NULL;"));
        assert_eq!(d.outputs.len(), 1);
    }

    #[test]
    fn counted_array_of_arrays() {
        let d = emit("aai");
        assert!(d.code.contains("value_len = 0;"));
        assert!(d.code.contains("value_element_lens = nih_alloc (value, sizeof (size_t));"));
        assert!(d.code.contains("value_element_lens[value_len] = value_element_len;"));
        let names: Vec<&str> = d.outputs.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, ["value", "value_len", "value_element_lens"]);
    }

    #[test]
    fn struct_checks_trailing_members() {
        let d = emit("(si)");
        assert!(d.code.contains("value = nih_new (parent, MyMethodValueStructure);"));
        assert!(d.code.contains("value_item0 = nih_strdup (value, value_item0_dbus);"));
        assert!(d.code.contains("value->item1 = value_item1;"));
        assert!(d.code.contains(
            "if (dbus_message_iter_get_arg_type (&value_iter) != DBUS_TYPE_INVALID) {\n\tnih_free (value);\n\treturn -2;\n}"
        ));
    }

    #[test]
    fn nested_failures_release_outer_values() {
        let d = emit("a(ss)");
        // element string failure frees the struct then the array
        assert!(d.code.contains("nih_free (value_element);\n\t\tnih_free (value);\n\t\treturn -1;"));
    }
}
