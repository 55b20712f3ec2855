//! Proxy-mode integration test: generate test.toml with the mode switched
//! to proxy → check the call, notify and sync functions and signal filters.

use std::path::Path;
use std::sync::LazyLock;

use dbus_stubgen::GeneratedFiles;
use dbus_stubgen::model::Mode;

static TEST_PROXY: LazyLock<GeneratedFiles> = LazyLock::new(|| {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../tests/fixtures/test.toml");
    let mut cfg = dbus_stubgen::config::load_config(&path).expect("load config");
    cfg.output.mode = Mode::Proxy;
    dbus_stubgen::generate_from_config(&cfg).expect("generate proxy stubs")
});

fn function<'a>(source: &'a str, name: &str) -> &'a str {
    let start = source
        .find(&format!("\n{name} ("))
        .unwrap_or_else(|| panic!("{name} not defined"));
    let len = source[start..].find("\n}\n").expect("function end");
    &source[start..start + len]
}

#[test]
fn proxy_method_functions() {
    let source = &TEST_PROXY.source;
    assert!(TEST_PROXY.errors.is_empty());
    assert!(source.contains("DBusPendingCall *\nmy_method ("));
    assert!(source.contains("\nmy_com_netsplit_Nih_Test_Method_notify ("));
    assert!(source.contains("int\nmy_method_sync ("));

    // no dispatch functions or handler prototypes in proxy mode
    assert!(!source.contains("my_com_netsplit_Nih_Test_Method_method ("));
    assert!(!source.contains("Prototypes for externally implemented handler functions"));

    assert!(TEST_PROXY.header.contains(
        "typedef void (*MyMethodReply) (void *data, NihDBusMessage *message, char * const *output);\n"
    ));
}

#[test]
fn proxy_call_without_callbacks_is_fire_and_forget() {
    let call = function(&TEST_PROXY.source, "my_method");
    let check = call.find("if ((! handler) && (! error_handler)) {").unwrap();
    let no_reply = call.find("dbus_message_set_no_reply (method_call, TRUE);").unwrap();
    let early = call.find("return (DBusPendingCall *)TRUE;").unwrap();
    let pending = call.find("nih_dbus_pending_data_new").unwrap();
    assert!(check < no_reply && no_reply < early && early < pending);
}

#[test]
fn proxy_notify_checks_reply() {
    let notify = function(&TEST_PROXY.source, "my_com_netsplit_Nih_Test_Method_notify");
    assert!(notify.contains("if (dbus_message_get_type (reply) == DBUS_MESSAGE_TYPE_ERROR) {"));
    assert!(notify.contains("NIH_DBUS_INVALID_ARGS"));
    let array = notify.find("!= DBUS_TYPE_ARRAY)").unwrap();
    let trailing = notify.rfind("(&iter) != DBUS_TYPE_INVALID)").unwrap();
    assert!(array < trailing);
}

#[test]
fn proxy_sync_call() {
    let sync = function(&TEST_PROXY.source, "my_method_sync");
    assert!(sync.contains("*output = output_local;"));
    assert!(sync.contains("nih_assert (output != NULL);"));
}

#[test]
fn proxy_no_reply_method() {
    let source = &TEST_PROXY.source;
    assert!(source.contains("int\nmy_poke ("));
    let poke = function(source, "my_poke");
    assert!(poke.contains("dbus_message_set_no_reply (method_call, TRUE);"));
    assert!(!poke.contains("pending_call"));
    assert!(!source.contains("my_poke_sync"));
    assert!(!TEST_PROXY.header.contains("MyPokeReply"));
}

#[test]
fn proxy_deprecated_functions() {
    assert!(TEST_PROXY.header.contains(
        "DBusPendingCall *my_dict_arg (NihDBusProxy *proxy, MyDictArgReply handler, NihDBusErrorHandler error_handler, void *data, int timeout)\n\
         \t__attribute__ ((warn_unused_result, deprecated));\n"
    ));
    let header = &TEST_PROXY.header;
    let start = header.find("int my_dict_arg_sync (").unwrap();
    let proto = &header[start..start + header[start..].find(";\n").unwrap()];
    assert!(proto.ends_with("__attribute__ ((warn_unused_result, deprecated))"), "{proto}");
}

#[test]
fn proxy_signal_filter() {
    let source = &TEST_PROXY.source;
    let filter = function(source, "my_com_netsplit_Nih_Test_Signal_signal");
    assert!(filter.contains("((MySignalHandler)proxied->handler) (proxied->data, message, msg, arg2, arg2_len);"));
    assert!(TEST_PROXY.header.contains(
        "typedef void (*MySignalHandler) (void *data, NihDBusMessage *message, const char *msg, const uint32_t *arg2, size_t arg2_len);\n"
    ));
    assert!(!source.contains("my_emit_signal"));
}

#[test]
fn proxy_properties() {
    let header = &TEST_PROXY.header;
    for name in [
        "my_get_name (",
        "my_get_name_sync (",
        "my_set_name (",
        "my_set_name_sync (",
        "my_get_size (",
        "my_get_size_sync (",
    ] {
        assert!(header.contains(name), "{name} missing");
    }
    assert!(!header.contains("my_set_size"));
    assert!(header.contains("(*MyGetNameReply)"));
    assert!(header.contains("(*MySetNameReply)"));

    let get = function(&TEST_PROXY.source, "my_get_name");
    assert!(get.contains("\"org.freedesktop.DBus.Properties\", \"Get\""));
    assert!(get.contains("nih_assert ((handler != NULL) && (error_handler != NULL));"));
}

#[test]
fn proxy_tables_have_no_dispatch() {
    let source = &TEST_PROXY.source;
    // the longest name sets the column width
    assert!(source.contains("my_com_netsplit_Nih_Test_AsyncMethod_method_args, NULL },"));
    assert!(source.contains(
        "my_com_netsplit_Nih_Test_Signal_signal_args, my_com_netsplit_Nih_Test_Signal_signal },"
    ));
}
