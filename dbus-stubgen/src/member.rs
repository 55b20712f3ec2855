//! Generated functions and the snippets shared by the method, signal and
//! property builders.

use crate::ctype::{CType, TypeFunc, TypeStruct, TypeVar, block, indent, var_layout};

/// Visibility of a generated function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linkage {
    /// Reached only through the interface tables.
    Static,
    /// Public entry point declared in the header.
    Extern,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFunction {
    pub signature: TypeFunc,
    pub linkage: Linkage,
    pub body: String,
}

impl GeneratedFunction {
    pub fn definition(&self) -> String {
        let storage = match self.linkage {
            Linkage::Static => Some("static"),
            Linkage::Extern => None,
        };
        self.signature.definition(storage, &self.body)
    }
}

/// Self-describing output of one generation entry point.
#[derive(Debug, Clone, Default)]
pub struct MemberOutput {
    pub functions: Vec<GeneratedFunction>,
    /// Prototypes of static functions, for the tables.
    pub prototypes: Vec<TypeFunc>,
    /// Functions the implementation must provide.
    pub handlers: Vec<TypeFunc>,
    /// Callback types callers pass in.
    pub typedefs: Vec<TypeFunc>,
    /// Public functions for the header.
    pub externs: Vec<TypeFunc>,
    pub structs: Vec<TypeStruct>,
}

impl MemberOutput {
    pub fn push(&mut self, function: GeneratedFunction) {
        match function.linkage {
            Linkage::Static => self.prototypes.push(function.signature.clone()),
            Linkage::Extern => self.externs.push(function.signature.clone()),
        }
        self.functions.push(function);
    }

    /// Add structs, skipping any already present; the call, notify and sync
    /// functions of one member all report the same definitions.
    pub fn add_structs(&mut self, structs: impl IntoIterator<Item = TypeStruct>) {
        for s in structs {
            if !self.structs.contains(&s) {
                self.structs.push(s);
            }
        }
    }

    pub fn extend(&mut self, other: MemberOutput) {
        self.functions.extend(other.functions);
        self.prototypes.extend(other.prototypes);
        self.handlers.extend(other.handlers);
        self.typedefs.extend(other.typedefs);
        self.externs.extend(other.externs);
        self.add_structs(other.structs);
    }
}

// ---------------------------------------------------------------------------
// Common types
// ---------------------------------------------------------------------------

pub(crate) fn named(name: &str) -> CType {
    CType::named(name)
}

pub(crate) fn pointer(name: &str) -> CType {
    CType::named(name).ptr()
}

pub(crate) fn var(ctype: CType, name: &str) -> TypeVar {
    TypeVar::new(ctype, name)
}

/// Locals block followed by a blank line, or nothing.
pub(crate) fn declarations(vars: &[TypeVar]) -> String {
    if vars.is_empty() {
        String::new()
    } else {
        format!("{}\n", var_layout(vars))
    }
}

/// Rejects anything after the last expected argument.
pub(crate) fn trailing_check(iter: &str, failure: &str) -> String {
    block(
        &format!("if (dbus_message_iter_get_arg_type (&{iter}) != DBUS_TYPE_INVALID)"),
        failure,
    )
}

// ---------------------------------------------------------------------------
// Object side
// ---------------------------------------------------------------------------

/// Reply with an invalid-arguments error; `what` completes
/// "Invalid arguments to …".
pub(crate) fn invalid_args_reply(what: &str) -> String {
    format!(
        "reply = dbus_message_new_error (message->message, DBUS_ERROR_INVALID_ARGS,\n\
         \x20                               \"Invalid arguments to {what}\");\n\
         if (! reply)\n\
         \treturn DBUS_HANDLER_RESULT_NEED_MEMORY;\n\
         \n\
         {}\
         \n\
         dbus_message_unref (reply);\n\
         return DBUS_HANDLER_RESULT_HANDLED;\n",
        send_or_retry()
    )
}

fn send_or_retry() -> String {
    block(
        "if (! dbus_connection_send (message->connection, reply, NULL))",
        "dbus_message_unref (reply);\nreturn DBUS_HANDLER_RESULT_NEED_MEMORY;\n",
    )
}

/// Invoke an object handler, turning a raised error into an error reply.
///
/// Out of memory is left unhandled so the runtime retries the message; a
/// D-Bus error keeps its name; anything else becomes a generic failure.
pub(crate) fn object_handler_call(call: &str) -> String {
    let forward = |error_name: &str, cleanup: &str| {
        format!(
            "{cleanup}reply = NIH_MUST (dbus_message_new_error (message->message,\n\
             \x20                                            {error_name}, err->message));\n\
             nih_free (err);\n\
             nih_error_pop_context ();\n\
             \n\
             NIH_MUST (dbus_connection_send (message->connection, reply, NULL));\n\
             \n\
             dbus_message_unref (reply);\n\
             return DBUS_HANDLER_RESULT_HANDLED;\n"
        )
    };

    let mut failure = String::from("NihError *err;\n\nerr = nih_error_get ();\n");
    failure.push_str(&format!(
        "if (err->number == ENOMEM) {{\n{}}} else if (err->number == NIH_DBUS_ERROR) {{\n{}}} else {{\n{}}}\n",
        indent(
            "nih_free (err);\nnih_error_pop_context ();\n\nreturn DBUS_HANDLER_RESULT_NEED_MEMORY;\n",
            1
        ),
        indent(
            &forward(
                "dbus_err->name",
                "NihDBusError *dbus_err = (NihDBusError *)err;\n\n"
            ),
            1
        ),
        indent(&forward("DBUS_ERROR_FAILED", ""), 1),
    ));

    let mut code = String::from("/* Call the handler function */\nnih_error_push_context ();\n");
    code.push_str(&block(&format!("if ({call} < 0)"), &failure));
    code.push_str("nih_error_pop_context ();\n");
    code
}

/// Construct a method return for `message`, run `marshal` and send it.
/// `failure` is returned when the reply cannot be built or queued.
pub(crate) fn send_reply(marshal: &str, handled: &str, failure: &str) -> String {
    let mut code = String::from(
        "/* If the sender doesn't care about a reply, don't bother wasting\n\
         \x20* effort constructing and sending one.\n\
         \x20*/\n",
    );
    code.push_str(&format!(
        "if (dbus_message_get_no_reply (message->message))\n\treturn {handled};\n\n"
    ));
    code.push_str("/* Construct the reply message. */\n");
    code.push_str("reply = dbus_message_new_method_return (message->message);\n");
    code.push_str(&format!("if (! reply)\n\treturn {failure};\n\n"));
    code.push_str("dbus_message_iter_init_append (reply, &iter);\n\n");
    code.push_str(marshal);
    code.push_str("/* Send the reply, appending it to the outgoing queue. */\n");
    code.push_str(&block(
        "if (! dbus_connection_send (message->connection, reply, NULL))",
        &format!("dbus_message_unref (reply);\nreturn {failure};\n"),
    ));
    code.push_str(&format!("\ndbus_message_unref (reply);\n\nreturn {handled};\n"));
    code
}

// ---------------------------------------------------------------------------
// Proxy side
// ---------------------------------------------------------------------------

/// Build `method_call` addressed to the proxy and start appending.
pub(crate) fn method_call_preamble(interface: &str, member: &str, failure: &str) -> String {
    format!(
        "/* Construct the method call message. */\n\
         method_call = dbus_message_new_method_call (proxy->name, proxy->path, \"{interface}\", \"{member}\");\n\
         if (! method_call)\n\
         \tnih_return_no_memory_error ({failure});\n\
         \n\
         dbus_message_set_auto_start (method_call, proxy->auto_start);\n\
         \n\
         dbus_message_iter_init_append (method_call, &iter);\n\
         \n"
    )
}

/// Marshal failure inside a proxy function.
pub(crate) fn proxy_oom(failure: &str) -> String {
    format!("dbus_message_unref (method_call);\nnih_return_no_memory_error ({failure});\n")
}

/// Append a string naming the target of a Properties call.
pub(crate) fn append_string(var: &str, value: &str, failure: &str) -> String {
    format!(
        "{var} = \"{value}\";\n{}\n",
        block(
            &format!("if (! dbus_message_iter_append_basic (&iter, DBUS_TYPE_STRING, &{var}))"),
            &proxy_oom(failure),
        )
    )
}

/// Locals of every pending-call proxy function.
pub(crate) fn pending_call_locals() -> Vec<TypeVar> {
    vec![
        var(pointer("DBusMessage"), "method_call"),
        var(named("DBusMessageIter"), "iter"),
        var(pointer("DBusPendingCall"), "pending_call"),
        var(pointer("NihDBusPendingData"), "pending_data"),
    ]
}

/// Trailing parameters of every pending-call proxy function.
pub(crate) fn pending_call_params(handler_type: &str) -> Vec<TypeVar> {
    vec![
        var(named(handler_type), "handler"),
        var(named("NihDBusErrorHandler"), "error_handler"),
        var(pointer("void"), "data"),
        var(named("int"), "timeout"),
    ]
}

/// Send `method_call` and arrange for `notify` to run on completion.
///
/// With `fire_and_forget`, a call without either callback is sent flagged
/// as expecting no reply and no pending call is tracked.
pub(crate) fn dispatch_pending_call(notify: &str, fire_and_forget: bool) -> String {
    let mut code = String::new();
    if fire_and_forget {
        code.push_str("/* Handle a fire-and-forget message */\n");
        code.push_str(&block(
            "if ((! handler) && (! error_handler))",
            &format!(
                "dbus_message_set_no_reply (method_call, TRUE);\n{}\n\
                 dbus_message_unref (method_call);\n\
                 return (DBusPendingCall *)TRUE;\n",
                block(
                    "if (! dbus_connection_send (proxy->connection, method_call, NULL))",
                    &proxy_oom("NULL"),
                )
            ),
        ));
        code.push('\n');
    }

    code.push_str("/* Send the message and set up the reply notification. */\n");
    code.push_str(
        "pending_data = nih_dbus_pending_data_new (NULL, proxy->connection,\n\
         \x20                                         (NihDBusReplyHandler)handler,\n\
         \x20                                         error_handler, data);\n",
    );
    code.push_str(&block("if (! pending_data)", &proxy_oom("NULL")));
    code.push('\n');
    code.push_str("pending_call = NULL;\n");
    code.push_str(&block(
        "if (! dbus_connection_send_with_reply (proxy->connection, method_call,\n\
         \x20                                      &pending_call, timeout))",
        "dbus_message_unref (method_call);\nnih_free (pending_data);\nnih_return_no_memory_error (NULL);\n",
    ));
    code.push_str("\ndbus_message_unref (method_call);\n\n");
    code.push_str(&block(
        "if (! pending_call)",
        "nih_dbus_error_raise (DBUS_ERROR_DISCONNECTED,\n\
         \x20                     \"Connection is closed\");\n\
         nih_free (pending_data);\n\
         return NULL;\n",
    ));
    code.push('\n');
    code.push_str(&format!(
        "NIH_MUST (dbus_pending_call_set_notify (pending_call, (DBusPendingCallNotifyFunction){notify},\n\
         \x20                                       pending_data, (DBusFreeFunction)nih_discard));\n\
         \n\
         return pending_call;\n"
    ));
    code
}

/// Locals of every notify function.
pub(crate) fn notify_locals() -> Vec<TypeVar> {
    vec![
        var(pointer("DBusMessage"), "reply"),
        var(named("DBusMessageIter"), "iter"),
        var(pointer("NihDBusMessage"), "message"),
        var(named("DBusError"), "error"),
    ]
}

/// Steal the reply; route error replies to the error handler.
pub(crate) fn notify_preamble() -> String {
    let mut code = String::from(
        "nih_assert (pending_call != NULL);\n\
         nih_assert (pending_data != NULL);\n\
         \n\
         nih_assert (dbus_pending_call_get_completed (pending_call));\n\
         \n\
         /* Steal the reply from the pending call. */\n\
         reply = dbus_pending_call_steal_reply (pending_call);\n\
         nih_assert (reply != NULL);\n\
         \n\
         /* Handle error replies */\n",
    );
    code.push_str(&block(
        "if (dbus_message_get_type (reply) == DBUS_MESSAGE_TYPE_ERROR)",
        "message = NIH_MUST (nih_dbus_message_new (pending_data, pending_data->connection, reply));\n\
         \n\
         dbus_error_init (&error);\n\
         dbus_set_error_from_message (&error, message->message);\n\
         \n\
         nih_error_push_context ();\n\
         nih_dbus_error_raise (error.name, error.message);\n\
         pending_data->error_handler (pending_data->data, message);\n\
         nih_error_pop_context ();\n\
         \n\
         dbus_error_free (&error);\n\
         nih_free (message);\n\
         dbus_message_unref (reply);\n\
         return;\n",
    ));
    code.push_str(
        "\nnih_assert (dbus_message_get_type (reply) == DBUS_MESSAGE_TYPE_METHOD_RETURN);\n\
         \n\
         /* Create a message context for the reply, and iterate\n\
         \x20* over its arguments.\n\
         \x20*/\n\
         message = NIH_MUST (nih_dbus_message_new (pending_data, pending_data->connection, reply));\n\
         \n\
         dbus_message_iter_init (message->message, &iter);\n\
         \n",
    );
    code
}

/// Raise a local error and hand it to the caller's error handler.
pub(crate) fn notify_error(raise: &str) -> String {
    format!(
        "nih_error_push_context ();\n\
         {raise}\n\
         pending_data->error_handler (pending_data->data, message);\n\
         nih_error_pop_context ();\n\
         \n\
         nih_free (message);\n\
         dbus_message_unref (reply);\n\
         return;\n"
    )
}

pub(crate) fn notify_invalid_args() -> String {
    notify_error("nih_error_raise (NIH_DBUS_INVALID_ARGS, _(NIH_DBUS_INVALID_ARGS_STR));")
}

pub(crate) fn notify_oom() -> String {
    notify_error("nih_error_raise_no_memory ();")
}

/// Call the typed reply handler, if one was given.
pub(crate) fn notify_handler_call(handler_type: &str, call_args: &[String]) -> String {
    let mut args = String::from("pending_data->data, message");
    for a in call_args {
        args.push_str(", ");
        args.push_str(a);
    }
    let mut code = String::from("/* Call the handler function */\n");
    code.push_str(&block(
        "if (pending_data->handler)",
        &format!(
            "nih_error_push_context ();\n\
             (({handler_type})pending_data->handler) ({args});\n\
             nih_error_pop_context ();\n"
        ),
    ));
    code.push_str("\nnih_free (message);\ndbus_message_unref (reply);\n");
    code
}

/// Locals of every sync function.
pub(crate) fn sync_locals() -> Vec<TypeVar> {
    vec![
        var(pointer("DBusMessage"), "method_call"),
        var(named("DBusMessageIter"), "iter"),
        var(named("DBusError"), "error"),
        var(pointer("DBusMessage"), "reply"),
    ]
}

/// Block until the reply arrives and start iterating it.
pub(crate) fn sync_send() -> String {
    let mut code = String::from(
        "/* Send the message, and wait for the reply. */\n\
         dbus_error_init (&error);\n\
         \n\
         reply = dbus_connection_send_with_reply_and_block (proxy->connection, method_call, -1, &error);\n",
    );
    code.push_str(&block(
        "if (! reply)",
        "dbus_message_unref (method_call);\n\
         \n\
         if (dbus_error_has_name (&error, DBUS_ERROR_NO_MEMORY)) {\n\
         \tnih_error_raise_no_memory ();\n\
         } else {\n\
         \tnih_dbus_error_raise (error.name, error.message);\n\
         }\n\
         \n\
         dbus_error_free (&error);\n\
         return -1;\n",
    ));
    code.push_str(
        "\ndbus_message_unref (method_call);\n\
         \n\
         /* Iterate the arguments of the reply */\n\
         dbus_message_iter_init (reply, &iter);\n\
         \n",
    );
    code
}

pub(crate) fn sync_invalid_args() -> String {
    "dbus_message_unref (reply);\nnih_return_error (-1, NIH_DBUS_INVALID_ARGS,\n                  _(NIH_DBUS_INVALID_ARGS_STR));\n"
        .to_string()
}

pub(crate) fn sync_oom() -> String {
    "dbus_message_unref (reply);\nnih_return_no_memory_error (-1);\n".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_call_translates_errors() {
        let code = object_handler_call("my_method (object->data, message)");
        assert!(code.starts_with("/* Call the handler function */\nnih_error_push_context ();\n"));
        assert!(code.contains("if (my_method (object->data, message) < 0) {"));
        assert!(code.contains("\t\treturn DBUS_HANDLER_RESULT_NEED_MEMORY;"));
        assert!(code.contains("dbus_err->name, err->message"));
        assert!(code.contains("DBUS_ERROR_FAILED, err->message"));
        assert!(code.ends_with("}\nnih_error_pop_context ();\n"));
    }

    #[test]
    fn fire_and_forget_is_optional() {
        let with = dispatch_pending_call("notify", true);
        assert!(with.contains("dbus_message_set_no_reply (method_call, TRUE);"));
        assert!(with.contains("return (DBusPendingCall *)TRUE;"));
        let without = dispatch_pending_call("notify", false);
        assert!(!without.contains("set_no_reply"));
        assert!(without.contains("DBUS_ERROR_DISCONNECTED"));
        assert!(without.contains("(DBusPendingCallNotifyFunction)notify"));
    }

    #[test]
    fn sync_send_raises_remote_errors() {
        let code = sync_send();
        assert!(code.contains("\t} else {\n\t\tnih_dbus_error_raise (error.name, error.message);\n\t}\n"));
    }

    #[test]
    fn output_deduplicates_structs() {
        let s = TypeStruct {
            name: "MyMethodValueStructure".to_string(),
            members: Vec::new(),
        };
        let mut out = MemberOutput::default();
        out.add_structs([s.clone(), s]);
        assert_eq!(out.structs.len(), 1);
    }
}
