//! Method builders: object dispatch, async reply, proxy call, proxy notify
//! and sync call.

use tracing::debug;

use crate::argument::{Frame, Role, bind};
use crate::ctype::{Attribute, Scope, TypeFunc, block};
use crate::demarshal::Errors;
use crate::member::{
    self, GeneratedFunction, Linkage, MemberOutput, declarations, named, pointer, var,
};
use crate::model::{Interface, Method, Mode};
use crate::symbol;

/// Every function a method needs in `mode`.
pub fn generate(prefix: &str, interface: &Interface, method: &Method, mode: Mode) -> MemberOutput {
    let mut out = MemberOutput::default();
    match mode {
        Mode::Object => {
            out.extend(object_function(prefix, interface, method));
            if method.is_async && !method.no_reply {
                out.extend(reply_function(prefix, interface, method));
            }
        }
        Mode::Proxy => {
            out.extend(proxy_function(prefix, interface, method));
            if !method.no_reply {
                out.extend(proxy_notify_function(prefix, interface, method));
                out.extend(proxy_sync_function(prefix, interface, method));
            }
        }
    }
    out
}

fn scope<'a>(prefix: &'a str, interface: &'a Interface, method: &'a Method) -> Scope<'a> {
    Scope {
        prefix,
        interface_symbol: interface.symbol.as_deref(),
        member_symbol: &method.symbol,
    }
}

fn deprecated(func: TypeFunc, method: &Method) -> TypeFunc {
    if method.deprecated {
        func.attrib(Attribute::Deprecated)
    } else {
        func
    }
}

/// Name of the callback type a proxy call's reply is delivered to.
pub fn reply_typedef_name(prefix: &str, interface: &Interface, method: &Method) -> String {
    symbol::typedef_name(
        prefix,
        interface.symbol.as_deref(),
        None,
        &method.symbol,
        Some("reply"),
    )
}

/// Static dispatch function called by the runtime for an incoming call,
/// and the handler prototype it calls.
pub fn object_function(prefix: &str, interface: &Interface, method: &Method) -> MemberOutput {
    let name = symbol::impl_name(prefix, &interface.name, &method.name, "method");
    let handler_name = symbol::extern_name(
        prefix,
        interface.symbol.as_deref(),
        None,
        &method.symbol,
        None,
    );

    let invalid_args = member::invalid_args_reply(&format!("{} method", method.name));
    let frame = Frame {
        scope: scope(prefix, interface, method),
        iter: "iter",
        parent: "message",
        errors: Errors::new("return DBUS_HANDLER_RESULT_NEED_MEMORY;\n", invalid_args.clone()),
        oom_error: "dbus_message_unref (reply);\nreturn DBUS_HANDLER_RESULT_NEED_MEMORY;\n".to_string(),
    };
    let binding = bind(
        &method.args,
        Role::Object {
            is_async: method.is_async,
        },
        &frame,
    );

    // Never deprecated, unlike the public functions.
    let handler = TypeFunc::new(named("int"), handler_name.clone())
        .param(pointer("void"), "data")
        .param(pointer("NihDBusMessage"), "message")
        .params(binding.handler_params.iter().cloned())
        .attrib(Attribute::WarnUnusedResult);

    let mut call = format!("{handler_name} (object->data, message");
    for arg in &binding.call_args {
        call.push_str(", ");
        call.push_str(arg);
    }
    call.push(')');

    let mut locals = vec![
        var(named("DBusMessageIter"), "iter"),
        var(pointer("DBusMessage"), "reply"),
    ];
    locals.extend(binding.locals.iter().cloned());

    let mut body = declarations(&locals);
    body.push_str("nih_assert (object != NULL);\nnih_assert (message != NULL);\n\n");
    body.push_str(
        "/* Iterate the arguments to the message and demarshal into arguments\n\
         \x20* for our own function call.\n\
         \x20*/\n\
         dbus_message_iter_init (message->message, &iter);\n\n",
    );
    body.push_str(&binding.demarshal);
    body.push_str(&member::trailing_check("iter", &invalid_args));
    body.push('\n');
    body.push_str(&member::object_handler_call(&call));
    body.push('\n');

    if method.is_async || method.no_reply {
        body.push_str("return DBUS_HANDLER_RESULT_HANDLED;\n");
    } else {
        body.push_str(&member::send_reply(
            &binding.marshal,
            "DBUS_HANDLER_RESULT_HANDLED",
            "DBUS_HANDLER_RESULT_NEED_MEMORY",
        ));
    }

    debug!(function = %name, handler = %handler_name, "generated method dispatch");

    let mut out = MemberOutput::default();
    out.push(GeneratedFunction {
        signature: TypeFunc::new(named("DBusHandlerResult"), name)
            .param(pointer("NihDBusObject"), "object")
            .param(pointer("NihDBusMessage"), "message"),
        linkage: Linkage::Static,
        body,
    });
    out.handlers.push(handler);
    out.add_structs(binding.structs);
    out
}

/// Public function an async handler calls to send its reply.
pub fn reply_function(prefix: &str, interface: &Interface, method: &Method) -> MemberOutput {
    let name = symbol::extern_name(
        prefix,
        interface.symbol.as_deref(),
        None,
        &method.symbol,
        Some("reply"),
    );
    let frame = Frame {
        scope: scope(prefix, interface, method),
        iter: "iter",
        parent: "message",
        errors: Errors::new("return -1;\n", "return -1;\n"),
        oom_error: "dbus_message_unref (reply);\nreturn -1;\n".to_string(),
    };
    let binding = bind(&method.args, Role::Reply, &frame);

    let mut locals = vec![
        var(pointer("DBusMessage"), "reply"),
        var(named("DBusMessageIter"), "iter"),
    ];
    locals.extend(binding.locals.iter().cloned());

    let mut body = declarations(&locals);
    body.push_str("nih_assert (message != NULL);\n");
    body.push_str(&binding.asserts);
    body.push('\n');
    body.push_str(&member::send_reply(&binding.marshal, "0", "-1"));

    let signature = deprecated(
        TypeFunc::new(named("int"), name.clone())
            .param(pointer("NihDBusMessage"), "message")
            .params(binding.params.iter().cloned())
            .attrib(Attribute::WarnUnusedResult),
        method,
    );

    debug!(function = %name, "generated method reply");

    let mut out = MemberOutput::default();
    out.push(GeneratedFunction {
        signature,
        linkage: Linkage::Extern,
        body,
    });
    out.add_structs(binding.structs);
    out
}

/// Public asynchronous call. Methods declared no-reply get a plain
/// send that never tracks a pending call.
pub fn proxy_function(prefix: &str, interface: &Interface, method: &Method) -> MemberOutput {
    let name = symbol::extern_name(
        prefix,
        interface.symbol.as_deref(),
        None,
        &method.symbol,
        None,
    );
    let failure = if method.no_reply { "-1" } else { "NULL" };
    let frame = Frame {
        scope: scope(prefix, interface, method),
        iter: "iter",
        parent: "proxy",
        errors: Errors::new("return NULL;\n", "return NULL;\n"),
        oom_error: member::proxy_oom(failure),
    };
    let binding = bind(&method.args, Role::ProxyCall, &frame);

    let signature;
    let mut body;

    if method.no_reply {
        let mut locals = vec![
            var(pointer("DBusMessage"), "method_call"),
            var(named("DBusMessageIter"), "iter"),
        ];
        locals.extend(binding.locals.iter().cloned());
        body = declarations(&locals);
        body.push_str("nih_assert (proxy != NULL);\n");
        body.push_str(&binding.asserts);
        body.push('\n');
        body.push_str(&member::method_call_preamble(&interface.name, &method.name, failure));
        body.push_str(&binding.marshal);
        body.push_str("dbus_message_set_no_reply (method_call, TRUE);\n\n");
        body.push_str(&block(
            "if (! dbus_connection_send (proxy->connection, method_call, NULL))",
            &member::proxy_oom(failure),
        ));
        body.push_str("\ndbus_message_unref (method_call);\n\nreturn 0;\n");

        signature = TypeFunc::new(named("int"), name.clone())
            .param(pointer("NihDBusProxy"), "proxy")
            .params(binding.params.iter().cloned());
    } else {
        let notify = symbol::impl_name(prefix, &interface.name, &method.name, "notify");
        let reply_type = reply_typedef_name(prefix, interface, method);

        let mut locals = member::pending_call_locals();
        locals.extend(binding.locals.iter().cloned());
        body = declarations(&locals);
        body.push_str("nih_assert (proxy != NULL);\n");
        body.push_str(&binding.asserts);
        body.push_str("nih_assert ((handler == NULL) || (error_handler != NULL));\n\n");
        body.push_str(&member::method_call_preamble(&interface.name, &method.name, failure));
        body.push_str(&binding.marshal);
        body.push_str(&member::dispatch_pending_call(&notify, true));

        signature = TypeFunc::new(pointer("DBusPendingCall"), name.clone())
            .param(pointer("NihDBusProxy"), "proxy")
            .params(binding.params.iter().cloned())
            .params(member::pending_call_params(&reply_type));
    }

    debug!(function = %name, no_reply = method.no_reply, "generated method proxy");

    let mut out = MemberOutput::default();
    out.push(GeneratedFunction {
        signature: deprecated(signature.attrib(Attribute::WarnUnusedResult), method),
        linkage: Linkage::Extern,
        body,
    });
    out.add_structs(binding.structs);
    out
}

/// Static completion callback for a proxy call, and the reply typedef it
/// invokes.
pub fn proxy_notify_function(prefix: &str, interface: &Interface, method: &Method) -> MemberOutput {
    let name = symbol::impl_name(prefix, &interface.name, &method.name, "notify");
    let reply_type = reply_typedef_name(prefix, interface, method);
    let frame = Frame {
        scope: scope(prefix, interface, method),
        iter: "iter",
        parent: "message",
        errors: Errors::new(member::notify_oom(), member::notify_invalid_args()),
        oom_error: String::new(),
    };
    let binding = bind(&method.args, Role::ProxyNotify, &frame);

    let mut locals = member::notify_locals();
    locals.extend(binding.locals.iter().cloned());

    let mut body = declarations(&locals);
    body.push_str(&member::notify_preamble());
    body.push_str(&binding.demarshal);
    body.push_str(&member::trailing_check("iter", &member::notify_invalid_args()));
    body.push('\n');
    body.push_str(&member::notify_handler_call(&reply_type, &binding.call_args));

    let typedef = TypeFunc::new(named("void"), reply_type)
        .param(pointer("void"), "data")
        .param(pointer("NihDBusMessage"), "message")
        .params(binding.handler_params.iter().cloned());

    debug!(function = %name, "generated method notify");

    let mut out = MemberOutput::default();
    out.push(GeneratedFunction {
        signature: TypeFunc::new(named("void"), name)
            .param(pointer("DBusPendingCall"), "pending_call")
            .param(pointer("NihDBusPendingData"), "pending_data"),
        linkage: Linkage::Static,
        body,
    });
    out.typedefs.push(typedef);
    out.add_structs(binding.structs);
    out
}

/// Public blocking call returning the outputs through pointers.
pub fn proxy_sync_function(prefix: &str, interface: &Interface, method: &Method) -> MemberOutput {
    let name = symbol::extern_name(
        prefix,
        interface.symbol.as_deref(),
        None,
        &method.symbol,
        Some("sync"),
    );
    let frame = Frame {
        scope: scope(prefix, interface, method),
        iter: "iter",
        parent: "parent",
        errors: Errors::new(member::sync_oom(), member::sync_invalid_args()),
        oom_error: member::proxy_oom("-1"),
    };
    let binding = bind(&method.args, Role::Sync, &frame);

    let mut locals = member::sync_locals();
    locals.extend(binding.locals.iter().cloned());

    let mut body = declarations(&locals);
    body.push_str("nih_assert (proxy != NULL);\n");
    body.push_str(&binding.asserts);
    body.push('\n');
    body.push_str(&member::method_call_preamble(&interface.name, &method.name, "-1"));
    body.push_str(&binding.marshal);
    body.push_str(&member::sync_send());
    body.push_str(&binding.demarshal);
    body.push_str(&member::trailing_check(
        "iter",
        &format!("{}{}", binding.cleanup, member::sync_invalid_args()),
    ));
    body.push('\n');
    if !binding.assign.is_empty() {
        body.push_str(&binding.assign);
        body.push('\n');
    }
    body.push_str("dbus_message_unref (reply);\n\nreturn 0;\n");

    let signature = deprecated(
        TypeFunc::new(named("int"), name.clone())
            .param(pointer("void").to_const(), "parent")
            .param(pointer("NihDBusProxy"), "proxy")
            .params(binding.params.iter().cloned())
            .attrib(Attribute::WarnUnusedResult),
        method,
    );

    debug!(function = %name, "generated method sync call");

    let mut out = MemberOutput::default();
    out.push(GeneratedFunction {
        signature,
        linkage: Linkage::Extern,
        body,
    });
    out.add_structs(binding.structs);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Argument, Direction};
    use crate::signature::TypeNode;

    fn arg(symbol: &str, sig: &str, direction: Direction) -> Argument {
        Argument {
            name: Some(symbol.to_string()),
            symbol: symbol.to_string(),
            ty: TypeNode::parse(sig).unwrap(),
            direction,
        }
    }

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

    fn method() -> Method {
        Method {
            name: "Method".to_string(),
            symbol: "method".to_string(),
            deprecated: false,
            is_async: false,
            no_reply: false,
            args: vec![
                arg("str", "s", Direction::In),
                arg("flags", "i", Direction::In),
                arg("output", "as", Direction::Out),
            ],
        }
    }

    fn names(out: &MemberOutput) -> Vec<&str> {
        out.functions.iter().map(|f| f.signature.name.as_str()).collect()
    }

    #[test]
    fn object_mode_functions() {
        let out = generate("my", &interface(), &method(), Mode::Object);
        assert_eq!(names(&out), ["my_com_netsplit_Nih_Test_Method_method"]);
        assert_eq!(out.prototypes.len(), 1);
        assert_eq!(
            out.handlers[0].prototype(Some("extern")),
            "extern int my_method (void *data, NihDBusMessage *message, const char *str, int32_t flags, char ***output)\n\
             \t__attribute__ ((warn_unused_result));\n"
        );

        let body = &out.functions[0].body;
        assert!(body.contains("if (my_method (object->data, message, str, flags, &output) < 0) {"));
        assert!(body.contains("\"Invalid arguments to Method method\""));
        assert!(body.contains("dbus_message_new_method_return (message->message)"));
    }

    #[test]
    fn async_method_gets_reply_function() {
        let mut m = method();
        m.name = "AsyncMethod".to_string();
        m.symbol = "async_method".to_string();
        m.is_async = true;
        m.deprecated = true;

        let out = generate("my", &interface(), &m, Mode::Object);
        assert_eq!(
            names(&out),
            ["my_com_netsplit_Nih_Test_AsyncMethod_method", "my_async_method_reply"]
        );
        assert!(!out.functions[0].body.contains("dbus_message_new_method_return"));
        assert_eq!(
            out.externs[0].attribs,
            [Attribute::WarnUnusedResult, Attribute::Deprecated]
        );
        // handlers of deprecated methods stay unmarked
        assert_eq!(out.handlers[0].attribs, [Attribute::WarnUnusedResult]);
        assert!(out.prototypes[0].attribs.is_empty());
    }

    #[test]
    fn no_reply_skips_reply() {
        let mut m = method();
        m.no_reply = true;
        m.args.truncate(2);
        let out = generate("my", &interface(), &m, Mode::Object);
        let body = &out.functions[0].body;
        assert!(!body.contains("dbus_message_new_method_return"));
        assert!(body.ends_with("nih_error_pop_context ();\n\nreturn DBUS_HANDLER_RESULT_HANDLED;\n"));
    }

    #[test]
    fn proxy_mode_functions() {
        let out = generate("my", &interface(), &method(), Mode::Proxy);
        assert_eq!(
            names(&out),
            [
                "my_method",
                "my_com_netsplit_Nih_Test_Method_notify",
                "my_method_sync"
            ]
        );
        assert_eq!(
            out.typedefs[0].typedef(),
            "typedef void (*MyMethodReply) (void *data, NihDBusMessage *message, char * const *output);\n"
        );

        let proxy = &out.functions[0];
        assert_eq!(proxy.signature.ret.to_string(), "DBusPendingCall *");
        let params: Vec<&str> = proxy.signature.params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            params,
            ["proxy", "str", "flags", "handler", "error_handler", "data", "timeout"]
        );
        assert!(proxy.body.contains("nih_assert ((handler == NULL) || (error_handler != NULL));"));
        assert!(proxy.body.contains("(DBusPendingCallNotifyFunction)my_com_netsplit_Nih_Test_Method_notify"));

        let sync = &out.functions[2];
        assert!(sync.body.contains("output_local = nih_alloc (parent, sizeof (char *));"));
        assert!(sync.body.contains("*output = output_local;"));
        assert_eq!(sync.signature.params[0].inline(), "const void *parent");
    }

    #[test]
    fn no_reply_proxy_never_waits() {
        let mut m = method();
        m.no_reply = true;
        m.args.truncate(2);
        let out = generate("my", &interface(), &m, Mode::Proxy);
        assert_eq!(names(&out), ["my_method"]);
        let proxy = &out.functions[0];
        assert_eq!(proxy.signature.ret.to_string(), "int");
        assert!(proxy.body.contains("dbus_message_set_no_reply (method_call, TRUE);"));
        assert!(!proxy.body.contains("pending_data"));
        assert!(out.typedefs.is_empty());
    }

    #[test]
    fn structs_are_reported_once() {
        let mut m = method();
        m.args = vec![arg("value", "(su)", Direction::In)];
        let out = generate("my", &interface(), &m, Mode::Proxy);
        assert_eq!(out.structs.len(), 1);
        assert_eq!(out.structs[0].name, "MyMethodValueStructure");
    }
}
