//! Wire codec against the declared argument types of test.toml: the same
//! acceptance rules the generated dispatch code applies.

use std::path::Path;
use std::sync::LazyLock;

use dbus_stubgen::model::{Direction, Method, Node};
use dbus_stubgen::signature::{StrKind, TypeNode};
use dbus_stubgen::wire::{self, Value, WireError};

static NODE: LazyLock<Node> = LazyLock::new(|| {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../tests/fixtures/test.toml");
    let cfg = dbus_stubgen::config::load_config(&path).expect("load config");
    let extraction = dbus_stubgen::extract::extract_node(&cfg.interface);
    assert!(extraction.errors.is_empty());
    extraction.node
});

fn method(name: &str) -> &'static Method {
    NODE.interfaces[0]
        .methods
        .iter()
        .find(|m| m.name == name)
        .unwrap_or_else(|| panic!("no method {name}"))
}

fn types(method: &Method, direction: Direction) -> Vec<TypeNode> {
    method
        .args
        .iter()
        .filter(|a| a.direction == direction)
        .map(|a| a.ty.clone())
        .collect()
}

#[test]
fn method_call_and_reply() {
    let m = method("Method");
    let call = wire::marshal(&[Value::String("this is a test".to_string()), Value::Int32(0)]).unwrap();
    assert_eq!(call.signature, "si");

    let values = wire::demarshal(&call, &types(m, Direction::In)).unwrap();
    let Value::String(text) = &values[0] else {
        panic!("expected a string, got {values:?}");
    };
    let words = text
        .split(' ')
        .map(|w| Value::String(w.to_string()))
        .collect();

    let reply = wire::marshal(&[Value::Array {
        element: TypeNode::Str(StrKind::String),
        items: words,
    }])
    .unwrap();
    let output = wire::demarshal(&reply, &types(m, Direction::Out)).unwrap();
    assert_eq!(
        output,
        [Value::Array {
            element: TypeNode::Str(StrKind::String),
            items: ["this", "is", "a", "test"]
                .iter()
                .map(|w| Value::String(w.to_string()))
                .collect(),
        }]
    );
}

#[test]
fn missing_argument_is_invalid() {
    let call = wire::marshal(&[Value::String("this is a test".to_string())]).unwrap();
    let err = wire::demarshal(&call, &types(method("Method"), Direction::In)).unwrap_err();
    assert!(matches!(err, WireError::InvalidArgs(_)));
}

#[test]
fn extra_argument_is_invalid() {
    let call = wire::marshal(&[
        Value::String("this is a test".to_string()),
        Value::Int32(0),
        Value::Int32(1),
    ])
    .unwrap();
    let err = wire::demarshal(&call, &types(method("Method"), Direction::In)).unwrap_err();
    assert!(matches!(err, WireError::InvalidArgs(ref r) if r.contains("trailing")));
}

#[test]
fn zero_argument_method() {
    let ping = method("Ping");
    let call = wire::marshal(&[]).unwrap();
    assert!(wire::demarshal(&call, &types(ping, Direction::In)).unwrap().is_empty());

    let stray = wire::marshal(&[Value::Byte(1)]).unwrap();
    assert!(wire::demarshal(&stray, &types(ping, Direction::In)).is_err());
}

#[test]
fn structure_and_dictionary_arguments() {
    let value = Value::Struct(vec![Value::String("name".to_string()), Value::UInt32(7)]);
    let call = wire::marshal(std::slice::from_ref(&value)).unwrap();
    let back = wire::demarshal(&call, &types(method("StructArg"), Direction::In)).unwrap();
    assert_eq!(back, [value]);

    let dict_types = types(method("DictArg"), Direction::Out);
    let TypeNode::Array(entry) = &dict_types[0] else {
        panic!("expected an array type");
    };
    let dict = Value::Array {
        element: (**entry).clone(),
        items: vec![
            Value::DictEntry(
                Box::new(Value::String("one".to_string())),
                Box::new(Value::UInt32(1)),
            ),
            Value::DictEntry(
                Box::new(Value::String("two".to_string())),
                Box::new(Value::UInt32(2)),
            ),
        ],
    };
    let reply = wire::marshal(std::slice::from_ref(&dict)).unwrap();
    assert_eq!(reply.signature, "a{su}");
    assert_eq!(wire::demarshal(&reply, &dict_types).unwrap(), [dict]);
}
