//! Property builders.
//!
//! The value travels as a single implicit argument called `value`, wrapped
//! in a variant; proxies reach it through `org.freedesktop.DBus.Properties`.

use tracing::debug;

use crate::argument::{Binding, Frame, Role, bind};
use crate::ctype::{Attribute, Scope, TypeFunc, TypeVar, block};
use crate::demarshal::Errors;
use crate::member::{
    self, GeneratedFunction, Linkage, MemberOutput, declarations, named, pointer, var,
};
use crate::model::{Argument, Direction, Interface, Mode, Property};
use crate::symbol;

const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

pub fn generate(prefix: &str, interface: &Interface, property: &Property, mode: Mode) -> MemberOutput {
    let mut out = MemberOutput::default();
    match mode {
        Mode::Object => {
            if property.access.readable() {
                out.extend(object_get_function(prefix, interface, property));
            }
            if property.access.writable() {
                out.extend(object_set_function(prefix, interface, property));
            }
        }
        Mode::Proxy => {
            if property.access.readable() {
                out.extend(proxy_get_function(prefix, interface, property));
                out.extend(proxy_get_notify_function(prefix, interface, property));
                out.extend(proxy_get_sync_function(prefix, interface, property));
            }
            if property.access.writable() {
                out.extend(proxy_set_function(prefix, interface, property));
                out.extend(proxy_set_notify_function(prefix, interface, property));
                out.extend(proxy_set_sync_function(prefix, interface, property));
            }
        }
    }
    out
}

fn scope<'a>(prefix: &'a str, interface: &'a Interface, property: &'a Property) -> Scope<'a> {
    Scope {
        prefix,
        interface_symbol: interface.symbol.as_deref(),
        member_symbol: &property.symbol,
    }
}

fn extern_name(prefix: &str, interface: &Interface, property: &Property, midfix: &str, postfix: Option<&str>) -> String {
    symbol::extern_name(
        prefix,
        interface.symbol.as_deref(),
        Some(midfix),
        &property.symbol,
        postfix,
    )
}

fn reply_typedef_name(prefix: &str, interface: &Interface, property: &Property, midfix: &str) -> String {
    symbol::typedef_name(
        prefix,
        interface.symbol.as_deref(),
        Some(midfix),
        &property.symbol,
        Some("reply"),
    )
}

fn bind_value(property: &Property, direction: Direction, role: Role, frame: &Frame) -> Binding {
    bind(&[Argument::property_value(&property.ty, direction)], role, frame)
}

fn deprecated(func: TypeFunc, property: &Property) -> TypeFunc {
    if property.deprecated {
        func.attrib(Attribute::Deprecated)
    } else {
        func
    }
}

fn object_params(name: String) -> TypeFunc {
    TypeFunc::new(named("int"), name)
        .param(pointer("NihDBusObject"), "object")
        .param(pointer("NihDBusMessage"), "message")
        .param(pointer("DBusMessageIter"), "iter")
}

fn handler_call(handler: &str, call_args: &[String]) -> String {
    format!(
        "/* Call the handler function */\n\
         if ({handler} (object->data, message, {}) < 0)\n\
         \treturn -1;\n",
        call_args.join(", ")
    )
}

fn handler(name: &str, binding: &Binding) -> TypeFunc {
    TypeFunc::new(named("int"), name)
        .param(pointer("void"), "data")
        .param(pointer("NihDBusMessage"), "message")
        .params(binding.handler_params.iter().cloned())
        .attrib(Attribute::WarnUnusedResult)
}

fn target_locals() -> Vec<TypeVar> {
    vec![
        var(named("DBusMessageIter"), "variter"),
        var(pointer("char").to_const(), "interface"),
        var(pointer("char").to_const(), "property"),
    ]
}

/// Properties method call naming the interface and property.
fn properties_call(interface: &Interface, property: &Property, method: &str, failure: &str) -> String {
    let mut code = member::method_call_preamble(PROPERTIES_INTERFACE, method, failure);
    code.push_str(&member::append_string("interface", &interface.name, failure));
    code.push_str(&member::append_string("property", &property.name, failure));
    code
}

/// Wrap already generated `marshal` code in a variant on `&iter`.
fn variant(property: &Property, marshal: &str, failure: &str) -> String {
    let mut code = block(
        &format!(
            "if (! dbus_message_iter_open_container (&iter, DBUS_TYPE_VARIANT, \"{}\", &variter))",
            property.ty.signature()
        ),
        &member::proxy_oom(failure),
    );
    code.push('\n');
    code.push_str(marshal);
    code.push_str(&block(
        "if (! dbus_message_iter_close_container (&iter, &variter))",
        &member::proxy_oom(failure),
    ));
    code.push('\n');
    code
}

fn variant_oom(failure: &str) -> String {
    format!(
        "dbus_message_iter_abandon_container (&iter, &variter);\n{}",
        member::proxy_oom(failure)
    )
}

/// Check for and enter the variant holding the value.
fn recurse_variant(failure: &str) -> String {
    let mut code = String::from("/* Recurse into the variant */\n");
    code.push_str(&block(
        "if (dbus_message_iter_get_arg_type (&iter) != DBUS_TYPE_VARIANT)",
        failure,
    ));
    code.push_str("\ndbus_message_iter_recurse (&iter, &variter);\n\n");
    code
}

// ---------------------------------------------------------------------------
// Object side
// ---------------------------------------------------------------------------

/// Static getter appending the value to a Get reply.
pub fn object_get_function(prefix: &str, interface: &Interface, property: &Property) -> MemberOutput {
    let name = symbol::impl_name(prefix, &interface.name, &property.name, "get");
    let handler_name = extern_name(prefix, interface, property, "get", None);
    let oom = "nih_error_raise_no_memory ();\nreturn -1;\n";
    let frame = Frame {
        scope: scope(prefix, interface, property),
        iter: "variter",
        parent: "message",
        errors: Errors::new(oom, oom),
        oom_error: format!("dbus_message_iter_abandon_container (iter, &variter);\n{oom}"),
    };
    let binding = bind_value(property, Direction::Out, Role::Object { is_async: false }, &frame);

    let mut locals = vec![var(named("DBusMessageIter"), "variter")];
    locals.extend(binding.locals.iter().cloned());

    let mut body = declarations(&locals);
    body.push_str(
        "nih_assert (object != NULL);\n\
         nih_assert (message != NULL);\n\
         nih_assert (iter != NULL);\n\
         \n",
    );
    body.push_str(&handler_call(&handler_name, &binding.call_args));
    body.push_str("\n/* Append a variant onto the message to contain the property value. */\n");
    body.push_str(&block(
        &format!(
            "if (! dbus_message_iter_open_container (iter, DBUS_TYPE_VARIANT, \"{}\", &variter))",
            property.ty.signature()
        ),
        oom,
    ));
    body.push('\n');
    body.push_str(&binding.marshal);
    body.push_str("/* Finish the variant */\n");
    body.push_str(&block(
        "if (! dbus_message_iter_close_container (iter, &variter))",
        oom,
    ));
    body.push_str("\nreturn 0;\n");

    debug!(function = %name, handler = %handler_name, "generated property getter");

    let mut out = MemberOutput::default();
    out.push(GeneratedFunction {
        signature: object_params(name),
        linkage: Linkage::Static,
        body,
    });
    out.handlers.push(handler(&handler_name, &binding));
    out.add_structs(binding.structs);
    out
}

/// Static setter reading the value out of a Set call.
pub fn object_set_function(prefix: &str, interface: &Interface, property: &Property) -> MemberOutput {
    let name = symbol::impl_name(prefix, &interface.name, &property.name, "set");
    let handler_name = extern_name(prefix, interface, property, "set", None);
    let invalid = format!(
        "nih_dbus_error_raise_printf (DBUS_ERROR_INVALID_ARGS,\n\
         \x20                            _(\"Invalid arguments to %s property\"),\n\
         \x20                            \"{}\");\n\
         return -1;\n",
        property.name
    );
    let frame = Frame {
        scope: scope(prefix, interface, property),
        iter: "variter",
        parent: "message",
        errors: Errors::new("nih_error_raise_no_memory ();\nreturn -1;\n", invalid.clone()),
        oom_error: String::new(),
    };
    let binding = bind_value(property, Direction::In, Role::Object { is_async: false }, &frame);

    let mut locals = vec![var(named("DBusMessageIter"), "variter")];
    locals.extend(binding.locals.iter().cloned());

    let mut body = declarations(&locals);
    body.push_str(
        "nih_assert (object != NULL);\n\
         nih_assert (message != NULL);\n\
         nih_assert (iter != NULL);\n\
         \n\
         /* Recurse into the variant */\n",
    );
    body.push_str(&block(
        "if (dbus_message_iter_get_arg_type (iter) != DBUS_TYPE_VARIANT)",
        &invalid,
    ));
    body.push_str("\ndbus_message_iter_recurse (iter, &variter);\n\n");
    body.push_str(&binding.demarshal);
    body.push_str("dbus_message_iter_next (iter);\n\n");
    body.push_str(&block(
        "if (dbus_message_iter_get_arg_type (iter) != DBUS_TYPE_INVALID)",
        &invalid,
    ));
    body.push('\n');
    body.push_str(&handler_call(&handler_name, &binding.call_args));
    body.push_str("\nreturn 0;\n");

    debug!(function = %name, handler = %handler_name, "generated property setter");

    let mut out = MemberOutput::default();
    out.push(GeneratedFunction {
        signature: object_params(name),
        linkage: Linkage::Static,
        body,
    });
    out.handlers.push(handler(&handler_name, &binding));
    out.add_structs(binding.structs);
    out
}

// ---------------------------------------------------------------------------
// Proxy side
// ---------------------------------------------------------------------------

/// Public asynchronous Get; both callbacks are required.
pub fn proxy_get_function(prefix: &str, interface: &Interface, property: &Property) -> MemberOutput {
    let name = extern_name(prefix, interface, property, "get", None);
    let notify = symbol::impl_name(prefix, &interface.name, &property.name, "get_notify");
    let reply_type = reply_typedef_name(prefix, interface, property, "get");

    let mut locals = member::pending_call_locals();
    locals.extend(target_locals().into_iter().skip(1));

    let mut body = declarations(&locals);
    body.push_str(
        "nih_assert (proxy != NULL);\n\
         nih_assert ((handler != NULL) && (error_handler != NULL));\n\
         \n",
    );
    body.push_str(&properties_call(interface, property, "Get", "NULL"));
    body.push_str(&member::dispatch_pending_call(&notify, false));

    let signature = deprecated(
        TypeFunc::new(pointer("DBusPendingCall"), name.clone())
            .param(pointer("NihDBusProxy"), "proxy")
            .params(member::pending_call_params(&reply_type))
            .attrib(Attribute::WarnUnusedResult),
        property,
    );

    debug!(function = %name, "generated property get proxy");

    let mut out = MemberOutput::default();
    out.push(GeneratedFunction {
        signature,
        linkage: Linkage::Extern,
        body,
    });
    out
}

/// Static completion callback of an asynchronous Get, and its reply typedef.
pub fn proxy_get_notify_function(prefix: &str, interface: &Interface, property: &Property) -> MemberOutput {
    let name = symbol::impl_name(prefix, &interface.name, &property.name, "get_notify");
    let reply_type = reply_typedef_name(prefix, interface, property, "get");
    let frame = Frame {
        scope: scope(prefix, interface, property),
        iter: "variter",
        parent: "message",
        errors: Errors::new(member::notify_oom(), member::notify_invalid_args()),
        oom_error: String::new(),
    };
    let binding = bind_value(property, Direction::Out, Role::ProxyNotify, &frame);

    let mut locals = member::notify_locals();
    locals.push(var(named("DBusMessageIter"), "variter"));
    locals.extend(binding.locals.iter().cloned());

    let mut body = declarations(&locals);
    body.push_str(&member::notify_preamble());
    body.push_str(&recurse_variant(&member::notify_invalid_args()));
    body.push_str(&binding.demarshal);
    body.push_str("dbus_message_iter_next (&iter);\n\n");
    body.push_str(&member::trailing_check("iter", &member::notify_invalid_args()));
    body.push('\n');
    body.push_str(&member::notify_handler_call(&reply_type, &binding.call_args));

    let typedef = TypeFunc::new(named("void"), reply_type)
        .param(pointer("void"), "data")
        .param(pointer("NihDBusMessage"), "message")
        .params(binding.handler_params.iter().cloned());

    debug!(function = %name, "generated property get notify");

    let mut out = MemberOutput::default();
    out.push(GeneratedFunction {
        signature: notify_signature(name),
        linkage: Linkage::Static,
        body,
    });
    out.typedefs.push(typedef);
    out.add_structs(binding.structs);
    out
}

fn notify_signature(name: String) -> TypeFunc {
    TypeFunc::new(named("void"), name)
        .param(pointer("DBusPendingCall"), "pending_call")
        .param(pointer("NihDBusPendingData"), "pending_data")
}

fn sync_signature(name: String, binding: &Binding, property: &Property) -> TypeFunc {
    deprecated(
        TypeFunc::new(named("int"), name)
            .param(pointer("void").to_const(), "parent")
            .param(pointer("NihDBusProxy"), "proxy")
            .params(binding.params.iter().cloned())
            .attrib(Attribute::WarnUnusedResult),
        property,
    )
}

/// Public blocking Get.
pub fn proxy_get_sync_function(prefix: &str, interface: &Interface, property: &Property) -> MemberOutput {
    let name = extern_name(prefix, interface, property, "get", Some("sync"));
    let frame = Frame {
        scope: scope(prefix, interface, property),
        iter: "variter",
        parent: "parent",
        errors: Errors::new(member::sync_oom(), member::sync_invalid_args()),
        oom_error: String::new(),
    };
    let binding = bind_value(property, Direction::Out, Role::Sync, &frame);

    let mut locals = member::sync_locals();
    locals.extend(target_locals());
    locals.extend(binding.locals.iter().cloned());

    let mut body = declarations(&locals);
    body.push_str("nih_assert (proxy != NULL);\n");
    body.push_str(&binding.asserts);
    body.push('\n');
    body.push_str(&properties_call(interface, property, "Get", "-1"));
    body.push_str(&member::sync_send());
    body.push_str(&recurse_variant(&member::sync_invalid_args()));
    body.push_str(&binding.demarshal);
    body.push_str("dbus_message_iter_next (&iter);\n\n");
    body.push_str(&member::trailing_check(
        "iter",
        &format!("{}{}", binding.cleanup, member::sync_invalid_args()),
    ));
    body.push('\n');
    body.push_str(&binding.assign);
    body.push_str("\ndbus_message_unref (reply);\n\nreturn 0;\n");

    debug!(function = %name, "generated property get sync call");

    let mut out = MemberOutput::default();
    out.push(GeneratedFunction {
        signature: sync_signature(name, &binding, property),
        linkage: Linkage::Extern,
        body,
    });
    out.add_structs(binding.structs);
    out
}

/// Public asynchronous Set; fire-and-forget without callbacks.
pub fn proxy_set_function(prefix: &str, interface: &Interface, property: &Property) -> MemberOutput {
    let name = extern_name(prefix, interface, property, "set", None);
    let notify = symbol::impl_name(prefix, &interface.name, &property.name, "set_notify");
    let reply_type = reply_typedef_name(prefix, interface, property, "set");
    let frame = Frame {
        scope: scope(prefix, interface, property),
        iter: "variter",
        parent: "proxy",
        errors: Errors::new("return NULL;\n", "return NULL;\n"),
        oom_error: variant_oom("NULL"),
    };
    let binding = bind_value(property, Direction::In, Role::ProxyCall, &frame);

    let mut locals = member::pending_call_locals();
    locals.extend(target_locals());
    locals.extend(binding.locals.iter().cloned());

    let mut body = declarations(&locals);
    body.push_str("nih_assert (proxy != NULL);\n");
    body.push_str(&binding.asserts);
    body.push_str("nih_assert ((handler == NULL) || (error_handler != NULL));\n\n");
    body.push_str(&properties_call(interface, property, "Set", "NULL"));
    body.push_str(&variant(property, &binding.marshal, "NULL"));
    body.push_str(&member::dispatch_pending_call(&notify, true));

    let signature = deprecated(
        TypeFunc::new(pointer("DBusPendingCall"), name.clone())
            .param(pointer("NihDBusProxy"), "proxy")
            .params(binding.params.iter().cloned())
            .params(member::pending_call_params(&reply_type))
            .attrib(Attribute::WarnUnusedResult),
        property,
    );

    debug!(function = %name, "generated property set proxy");

    let mut out = MemberOutput::default();
    out.push(GeneratedFunction {
        signature,
        linkage: Linkage::Extern,
        body,
    });
    out.add_structs(binding.structs);
    out
}

/// Static completion callback of an asynchronous Set, and its reply typedef.
pub fn proxy_set_notify_function(prefix: &str, interface: &Interface, property: &Property) -> MemberOutput {
    let name = symbol::impl_name(prefix, &interface.name, &property.name, "set_notify");
    let reply_type = reply_typedef_name(prefix, interface, property, "set");

    let mut body = declarations(&member::notify_locals());
    body.push_str(&member::notify_preamble());
    body.push_str(&member::trailing_check("iter", &member::notify_invalid_args()));
    body.push('\n');
    body.push_str(&member::notify_handler_call(&reply_type, &[]));

    let typedef = TypeFunc::new(named("void"), reply_type)
        .param(pointer("void"), "data")
        .param(pointer("NihDBusMessage"), "message");

    debug!(function = %name, "generated property set notify");

    let mut out = MemberOutput::default();
    out.push(GeneratedFunction {
        signature: notify_signature(name),
        linkage: Linkage::Static,
        body,
    });
    out.typedefs.push(typedef);
    out
}

/// Public blocking Set.
pub fn proxy_set_sync_function(prefix: &str, interface: &Interface, property: &Property) -> MemberOutput {
    let name = extern_name(prefix, interface, property, "set", Some("sync"));
    let frame = Frame {
        scope: scope(prefix, interface, property),
        iter: "variter",
        parent: "parent",
        errors: Errors::new("return -1;\n", "return -1;\n"),
        oom_error: variant_oom("-1"),
    };
    let binding = bind_value(property, Direction::In, Role::Sync, &frame);

    let mut locals = member::sync_locals();
    locals.extend(target_locals());
    locals.extend(binding.locals.iter().cloned());

    let mut body = declarations(&locals);
    body.push_str("nih_assert (proxy != NULL);\n");
    body.push_str(&binding.asserts);
    body.push('\n');
    body.push_str(&properties_call(interface, property, "Set", "-1"));
    body.push_str(&variant(property, &binding.marshal, "-1"));
    body.push_str(&member::sync_send());
    body.push_str(&member::trailing_check("iter", &member::sync_invalid_args()));
    body.push_str("\ndbus_message_unref (reply);\n\nreturn 0;\n");

    debug!(function = %name, "generated property set sync call");

    let mut out = MemberOutput::default();
    out.push(GeneratedFunction {
        signature: sync_signature(name, &binding, property),
        linkage: Linkage::Extern,
        body,
    });
    out.add_structs(binding.structs);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Access;
    use crate::signature::TypeNode;

    fn interface() -> Interface {
        Interface {
            name: "com.netsplit.Nih.Test".to_string(),
            symbol: None,
            deprecated: false,
            methods: Vec::new(),
            signals: Vec::new(),
            properties: Vec::new(),
        }
    }

    fn property(access: Access) -> Property {
        Property {
            name: "name".to_string(),
            symbol: "name".to_string(),
            ty: TypeNode::parse("s").unwrap(),
            access,
            deprecated: false,
        }
    }

    fn names(out: &MemberOutput) -> Vec<&str> {
        out.functions.iter().map(|f| f.signature.name.as_str()).collect()
    }

    #[test]
    fn object_side() {
        let out = generate("my", &interface(), &property(Access::ReadWrite), Mode::Object);
        assert_eq!(
            names(&out),
            ["my_com_netsplit_Nih_Test_name_get", "my_com_netsplit_Nih_Test_name_set"]
        );
        let handlers: Vec<String> = out.handlers.iter().map(|h| h.prototype(None)).collect();
        assert_eq!(
            handlers,
            [
                "int my_get_name (void *data, NihDBusMessage *message, char **value)\n\t__attribute__ ((warn_unused_result));\n",
                "int my_set_name (void *data, NihDBusMessage *message, const char *value)\n\t__attribute__ ((warn_unused_result));\n",
            ]
        );
        assert!(out.functions[0].body.contains("if (my_get_name (object->data, message, &value) < 0)"));
        assert!(out.functions[0].body.contains("dbus_message_iter_append_basic (&variter, DBUS_TYPE_STRING, &value)"));
        assert!(out.functions[1].body.contains("value = nih_strdup (message, value_dbus);"));
    }

    #[test]
    fn read_only_has_no_setter() {
        let out = generate("my", &interface(), &property(Access::Read), Mode::Object);
        assert_eq!(names(&out), ["my_com_netsplit_Nih_Test_name_get"]);
        let out = generate("my", &interface(), &property(Access::Write), Mode::Proxy);
        assert_eq!(
            names(&out),
            ["my_set_name", "my_com_netsplit_Nih_Test_name_set_notify", "my_set_name_sync"]
        );
    }

    #[test]
    fn proxy_side() {
        let out = generate("my", &interface(), &property(Access::ReadWrite), Mode::Proxy);
        assert_eq!(
            names(&out),
            [
                "my_get_name",
                "my_com_netsplit_Nih_Test_name_get_notify",
                "my_get_name_sync",
                "my_set_name",
                "my_com_netsplit_Nih_Test_name_set_notify",
                "my_set_name_sync",
            ]
        );
        let typedefs: Vec<&str> = out.typedefs.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(typedefs, ["MyGetNameReply", "MySetNameReply"]);

        let get = &out.functions[0].body;
        assert!(get.contains("\"org.freedesktop.DBus.Properties\", \"Get\""));
        assert!(get.contains("interface = \"com.netsplit.Nih.Test\";"));
        assert!(get.contains("property = \"name\";"));
        assert!(!get.contains("fire-and-forget"));

        let set = &out.functions[3].body;
        assert!(set.contains("DBUS_TYPE_VARIANT, \"s\", &variter"));
        assert!(set.contains("fire-and-forget"));

        let get_sync = &out.functions[2];
        assert_eq!(get_sync.signature.params[2].inline(), "char **value");
        assert!(get_sync.body.contains("*value = value_local;"));
    }
}
