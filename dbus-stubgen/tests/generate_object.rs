//! Object-mode integration test: generate test.toml → check the dispatch
//! stubs, handler prototypes, tables and header.

use std::path::Path;
use std::sync::LazyLock;

use dbus_stubgen::GeneratedFiles;

static TEST_OBJECT: LazyLock<GeneratedFiles> = LazyLock::new(|| {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../tests/fixtures/test.toml");
    dbus_stubgen::generate(&path).expect("generate object stubs")
});

/// Definition of the function `name`, from its name line to the closing brace.
fn function<'a>(source: &'a str, name: &str) -> &'a str {
    let start = source
        .find(&format!("\n{name} ("))
        .unwrap_or_else(|| panic!("{name} not defined"));
    let len = source[start..].find("\n}\n").expect("function end");
    &source[start..start + len]
}

#[test]
fn object_no_errors() {
    assert!(TEST_OBJECT.errors.is_empty(), "{:?}", TEST_OBJECT.errors);
}

#[test]
fn object_source_layout() {
    let source = &TEST_OBJECT.source;
    assert!(source.starts_with("/* test-object.c\n"));
    assert!(source.contains("#include \"test-object.h\"\n"));

    let statics = source.find("/* Prototypes for static functions */").unwrap();
    let handlers = source
        .find("/* Prototypes for externally implemented handler functions */")
        .unwrap();
    let tables = source.find("static const NihDBusArg").unwrap();
    let node = source.find("const NihDBusInterface *my_interfaces[]").unwrap();
    let first_def = source.find("\nmy_com_netsplit_Nih_Test_Method_method (").unwrap();
    assert!(statics < handlers && handlers < tables && tables < node && node < first_def);

    assert!(source.contains(
        "const NihDBusInterface *my_interfaces[] = {\n\
         \t&my_com_netsplit_Nih_Test,\n\
         \t&my_com_netsplit_Nih_Other,\n\
         \tNULL\n\
         };\n"
    ));
}

#[test]
fn object_method_dispatch() {
    let source = &TEST_OBJECT.source;
    assert!(source.contains(
        "extern int my_method (void *data, NihDBusMessage *message, const char *str, int32_t flags, char ***output)\n\
         \t__attribute__ ((warn_unused_result));\n"
    ));

    let dispatch = function(source, "my_com_netsplit_Nih_Test_Method_method");
    let str_check = dispatch.find("!= DBUS_TYPE_STRING)").unwrap();
    let flags_check = dispatch.find("!= DBUS_TYPE_INT32)").unwrap();
    let trailing = dispatch.find("!= DBUS_TYPE_INVALID)").unwrap();
    let call = dispatch
        .find("if (my_method (object->data, message, str, flags, &output) < 0) {")
        .unwrap();
    let reply = dispatch.find("dbus_message_new_method_return (message->message)").unwrap();
    assert!(str_check < flags_check && flags_check < trailing && trailing < call && call < reply);

    // a missing or surplus argument is answered before the handler runs
    assert!(dispatch.contains("\"Invalid arguments to Method method\""));
    assert!(dispatch.contains("DBUS_ERROR_INVALID_ARGS"));
}

#[test]
fn object_handler_errors_are_forwarded() {
    let dispatch = function(&TEST_OBJECT.source, "my_com_netsplit_Nih_Test_Method_method");
    assert!(dispatch.contains("if (err->number == ENOMEM) {"));
    assert!(dispatch.contains("return DBUS_HANDLER_RESULT_NEED_MEMORY;"));
    assert!(dispatch.contains("dbus_err->name, err->message));"));
    assert!(dispatch.contains("DBUS_ERROR_FAILED, err->message));"));
}

#[test]
fn object_async_method() {
    let dispatch = function(&TEST_OBJECT.source, "my_com_netsplit_Nih_Test_AsyncMethod_method");
    assert!(!dispatch.contains("dbus_message_new_method_return"));
    assert!(dispatch.contains("return DBUS_HANDLER_RESULT_HANDLED;"));

    assert!(TEST_OBJECT.header.contains(
        "int my_async_method_reply (NihDBusMessage *message, char * const *output)\n\
         \t__attribute__ ((warn_unused_result));\n"
    ));
    let reply = function(&TEST_OBJECT.source, "my_async_method_reply");
    assert!(reply.contains("if (dbus_message_get_no_reply (message->message))"));
}

#[test]
fn object_no_reply_and_zero_argument_methods() {
    let source = &TEST_OBJECT.source;
    assert!(source.contains(
        "extern int my_poke (void *data, NihDBusMessage *message, uint32_t value)"
    ));
    let poke = function(source, "my_com_netsplit_Nih_Test_Poke_method");
    assert!(!poke.contains("dbus_message_new_method_return"));
    assert!(!TEST_OBJECT.header.contains("my_poke_reply"));

    assert!(source.contains("extern int my_ping (void *data, NihDBusMessage *message)\n"));
    let ping = function(source, "my_com_netsplit_Nih_Test_Ping_method");
    assert!(!ping.contains("dbus_message_iter_get_basic"));
    let init = ping.find("dbus_message_iter_init (message->message, &iter);").unwrap();
    let trailing = ping.find("!= DBUS_TYPE_INVALID)").unwrap();
    assert!(init < trailing);
}

#[test]
fn object_structures() {
    let header = &TEST_OBJECT.header;
    assert!(header.contains(
        "typedef struct my_struct_arg_value_structure {\n\
         \tchar *   item0;\n\
         \tuint32_t item1;\n\
         } MyStructArgValueStructure;\n"
    ));
    assert!(header.contains("} MyDictArgValueElementStructure;\n"));
    assert!(TEST_OBJECT.source.contains(
        "extern int my_struct_arg (void *data, NihDBusMessage *message, const MyStructArgValueStructure *value)"
    ));
}

#[test]
fn object_deprecated_handlers_stay_unmarked() {
    let source = &TEST_OBJECT.source;
    let start = source.find("extern int my_dict_arg (").unwrap();
    let proto = &source[start..start + source[start..].find(";\n").unwrap()];
    assert!(!proto.contains("deprecated"), "{proto}");
}

#[test]
fn object_signal_emitter() {
    assert!(TEST_OBJECT.header.contains(
        "int my_emit_signal (DBusConnection *connection, const char *origin_path, const char *msg, const uint32_t *arg2, size_t arg2_len)\n\
         \t__attribute__ ((warn_unused_result));\n"
    ));
    assert!(TEST_OBJECT.source.contains(
        "\t{ \"msg\", \"s\",  NIH_DBUS_ARG_OUT },\n\
         \t{ NULL,  \"au\", NIH_DBUS_ARG_OUT },\n\
         \t{ NULL }\n"
    ));
}

#[test]
fn object_properties() {
    let source = &TEST_OBJECT.source;
    assert!(source.contains("\nmy_com_netsplit_Nih_Test_name_get ("));
    assert!(source.contains("\nmy_com_netsplit_Nih_Test_name_set ("));
    assert!(source.contains("\nmy_com_netsplit_Nih_Test_size_get ("));
    assert!(!source.contains("my_com_netsplit_Nih_Test_size_set"));

    assert!(source.contains("extern int my_get_name ("));
    assert!(source.contains("extern int my_set_name ("));
    assert!(source.contains("extern int my_get_size ("));
    assert!(!source.contains("my_set_size"));
    assert!(source.contains("NIH_DBUS_READWRITE"));
}

#[test]
fn object_interface_symbol() {
    let source = &TEST_OBJECT.source;
    assert!(source.contains(
        "extern int my_other_method (void *data, NihDBusMessage *message, int32_t *value)"
    ));
    assert!(source.contains("const NihDBusInterface my_com_netsplit_Nih_Other = {\n"));
}

#[test]
fn object_header_layout() {
    let header = &TEST_OBJECT.header;
    assert!(header.starts_with("/* test-object.h\n"));
    assert!(header.contains("#ifndef DBUS_STUBGEN_TEST_OBJECT_H\n#define DBUS_STUBGEN_TEST_OBJECT_H\n"));
    let begin = header.find("NIH_BEGIN_EXTERN").unwrap();
    let structs = header.find("typedef struct").unwrap();
    assert!(structs < begin);
    assert!(header.contains("extern const NihDBusInterface my_com_netsplit_Nih_Test;\n"));
    assert!(header.contains("extern const NihDBusInterface *my_interfaces[];\n"));
    assert!(header.ends_with("NIH_END_EXTERN\n\n#endif /* DBUS_STUBGEN_TEST_OBJECT_H */\n"));
}
