//! Signal builders: emit function on the object side, filter function and
//! handler typedef on the proxy side.

use tracing::debug;

use crate::argument::{Frame, Role, bind};
use crate::ctype::{Attribute, Scope, TypeFunc, block};
use crate::demarshal::Errors;
use crate::member::{
    self, GeneratedFunction, Linkage, MemberOutput, declarations, named, pointer, var,
};
use crate::model::{Interface, Mode, Signal};
use crate::symbol;

pub fn generate(prefix: &str, interface: &Interface, signal: &Signal, mode: Mode) -> MemberOutput {
    match mode {
        Mode::Object => emit_function(prefix, interface, signal),
        Mode::Proxy => filter_function(prefix, interface, signal),
    }
}

fn scope<'a>(prefix: &'a str, interface: &'a Interface, signal: &'a Signal) -> Scope<'a> {
    Scope {
        prefix,
        interface_symbol: interface.symbol.as_deref(),
        member_symbol: &signal.symbol,
    }
}

/// Name of the callback type a received signal is delivered to.
pub fn handler_typedef_name(prefix: &str, interface: &Interface, signal: &Signal) -> String {
    symbol::typedef_name(
        prefix,
        interface.symbol.as_deref(),
        None,
        &signal.symbol,
        Some("handler"),
    )
}

/// Public function emitting the signal from an object path.
pub fn emit_function(prefix: &str, interface: &Interface, signal: &Signal) -> MemberOutput {
    let name = symbol::extern_name(
        prefix,
        interface.symbol.as_deref(),
        Some("emit"),
        &signal.symbol,
        None,
    );
    let frame = Frame {
        scope: scope(prefix, interface, signal),
        iter: "iter",
        parent: "NULL",
        errors: Errors::new("return -1;\n", "return -1;\n"),
        oom_error: "dbus_message_unref (signal);\nreturn -1;\n".to_string(),
    };
    let binding = bind(&signal.args, Role::Emit, &frame);

    let mut locals = vec![
        var(pointer("DBusMessage"), "signal"),
        var(named("DBusMessageIter"), "iter"),
    ];
    locals.extend(binding.locals.iter().cloned());

    let mut body = declarations(&locals);
    body.push_str("nih_assert (connection != NULL);\nnih_assert (origin_path != NULL);\n");
    body.push_str(&binding.asserts);
    body.push('\n');
    body.push_str(&format!(
        "/* Construct the message. */\n\
         signal = dbus_message_new_signal (origin_path, \"{}\", \"{}\");\n\
         if (! signal)\n\
         \treturn -1;\n\
         \n\
         dbus_message_iter_init_append (signal, &iter);\n\
         \n",
        interface.name, signal.name
    ));
    body.push_str(&binding.marshal);
    body.push_str("/* Send the signal, appending it to the outgoing queue. */\n");
    body.push_str(&block(
        "if (! dbus_connection_send (connection, signal, NULL))",
        "dbus_message_unref (signal);\nreturn -1;\n",
    ));
    body.push_str("\ndbus_message_unref (signal);\n\nreturn 0;\n");

    let mut signature = TypeFunc::new(named("int"), name.clone())
        .param(pointer("DBusConnection"), "connection")
        .param(pointer("char").to_const(), "origin_path")
        .params(binding.params.iter().cloned())
        .attrib(Attribute::WarnUnusedResult);
    if signal.deprecated {
        signature = signature.attrib(Attribute::Deprecated);
    }

    debug!(function = %name, "generated signal emitter");

    let mut out = MemberOutput::default();
    out.push(GeneratedFunction {
        signature,
        linkage: Linkage::Extern,
        body,
    });
    out.add_structs(binding.structs);
    out
}

/// Static connection filter matching the signal for a proxy, and the
/// handler typedef it invokes.
pub fn filter_function(prefix: &str, interface: &Interface, signal: &Signal) -> MemberOutput {
    let name = symbol::impl_name(prefix, &interface.name, &signal.name, "signal");
    let handler_type = handler_typedef_name(prefix, interface, signal);
    let frame = Frame {
        scope: scope(prefix, interface, signal),
        iter: "iter",
        parent: "message",
        errors: Errors::new(
            "nih_free (message);\nreturn DBUS_HANDLER_RESULT_NEED_MEMORY;\n",
            "nih_free (message);\nreturn DBUS_HANDLER_RESULT_NOT_YET_HANDLED;\n",
        ),
        oom_error: String::new(),
    };
    let binding = bind(&signal.args, Role::Filter, &frame);

    let mut locals = vec![
        var(named("DBusMessageIter"), "iter"),
        var(pointer("NihDBusMessage"), "message"),
    ];
    locals.extend(binding.locals.iter().cloned());

    let mut args = String::from("proxied->data, message");
    for a in &binding.call_args {
        args.push_str(", ");
        args.push_str(a);
    }

    let mut body = declarations(&locals);
    body.push_str(
        "nih_assert (connection != NULL);\n\
         nih_assert (signal != NULL);\n\
         nih_assert (proxied != NULL);\n\
         nih_assert (connection == proxied->proxy->connection);\n\
         \n\
         if (! dbus_message_is_signal (signal, proxied->interface->name, proxied->signal->name))\n\
         \treturn DBUS_HANDLER_RESULT_NOT_YET_HANDLED;\n\
         \n\
         if (! dbus_message_has_path (signal, proxied->proxy->path))\n\
         \treturn DBUS_HANDLER_RESULT_NOT_YET_HANDLED;\n\
         \n\
         if (proxied->proxy->name)\n\
         \tif (! dbus_message_has_sender (signal, proxied->proxy->owner))\n\
         \t\treturn DBUS_HANDLER_RESULT_NOT_YET_HANDLED;\n\
         \n\
         message = nih_dbus_message_new (NULL, connection, signal);\n\
         if (! message)\n\
         \treturn DBUS_HANDLER_RESULT_NEED_MEMORY;\n\
         \n\
         /* Iterate the arguments to the signal and demarshal into arguments\n\
         \x20* for our own function call.\n\
         \x20*/\n\
         dbus_message_iter_init (message->message, &iter);\n\
         \n",
    );
    body.push_str(&binding.demarshal);
    body.push_str(&member::trailing_check(
        "iter",
        "nih_free (message);\nreturn DBUS_HANDLER_RESULT_NOT_YET_HANDLED;\n",
    ));
    body.push_str(&format!(
        "\n/* Call the handler function */\n\
         nih_error_push_context ();\n\
         (({handler_type})proxied->handler) ({args});\n\
         nih_error_pop_context ();\n\
         nih_free (message);\n\
         \n\
         return DBUS_HANDLER_RESULT_NOT_YET_HANDLED;\n"
    ));

    let typedef = TypeFunc::new(named("void"), handler_type)
        .param(pointer("void"), "data")
        .param(pointer("NihDBusMessage"), "message")
        .params(binding.handler_params.iter().cloned());

    debug!(function = %name, "generated signal filter");

    let mut out = MemberOutput::default();
    out.push(GeneratedFunction {
        signature: TypeFunc::new(named("DBusHandlerResult"), name)
            .param(pointer("DBusConnection"), "connection")
            .param(pointer("DBusMessage"), "signal")
            .param(pointer("NihDBusProxySignal"), "proxied"),
        linkage: Linkage::Static,
        body,
    });
    out.typedefs.push(typedef);
    out.add_structs(binding.structs);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Argument, Direction};
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

    fn signal() -> Signal {
        Signal {
            name: "Signal".to_string(),
            symbol: "signal".to_string(),
            deprecated: true,
            args: vec![
                Argument {
                    name: Some("msg".to_string()),
                    symbol: "msg".to_string(),
                    ty: TypeNode::parse("s").unwrap(),
                    direction: Direction::Out,
                },
                Argument {
                    name: None,
                    symbol: "arg2".to_string(),
                    ty: TypeNode::parse("au").unwrap(),
                    direction: Direction::Out,
                },
            ],
        }
    }

    #[test]
    fn emitter() {
        let out = generate("my", &interface(), &signal(), Mode::Object);
        let emit = &out.functions[0];
        assert_eq!(
            emit.signature.prototype(Some("extern")),
            "extern int my_emit_signal (DBusConnection *connection, const char *origin_path, const char *msg, const uint32_t *arg2, size_t arg2_len)\n\
             \t__attribute__ ((warn_unused_result, deprecated));\n"
        );
        assert!(emit.body.contains(
            "signal = dbus_message_new_signal (origin_path, \"com.netsplit.Nih.Test\", \"Signal\");"
        ));
        assert!(emit.body.contains("nih_assert ((arg2_len == 0) || (arg2 != NULL));"));
        assert!(out.prototypes.is_empty());
    }

    #[test]
    fn filter() {
        let out = generate("my", &interface(), &signal(), Mode::Proxy);
        let filter = &out.functions[0];
        assert_eq!(filter.signature.name, "my_com_netsplit_Nih_Test_Signal_signal");
        assert_eq!(filter.linkage, Linkage::Static);
        assert!(filter.body.contains("((MySignalHandler)proxied->handler) (proxied->data, message, msg, arg2, arg2_len);"));
        assert_eq!(
            out.typedefs[0].typedef(),
            "typedef void (*MySignalHandler) (void *data, NihDBusMessage *message, const char *msg, const uint32_t *arg2, size_t arg2_len);\n"
        );
    }
}
