//! Reference wire codec.
//!
//! Marshals and demarshals little-endian D-Bus message bodies with the same
//! rules the generated C applies: per-argument type checks, no coercion,
//! trailing arguments rejected.

use byteorder::{ByteOrder, LE};
use tracing::trace;

use crate::signature::{self, Scalar, StrKind, TypeNode};

/// Longest array payload accepted, in bytes.
pub const MAX_ARRAY_LENGTH: usize = 1 << 26;

pub type Result<T> = std::result::Result<T, WireError>;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    /// Anything the receiving side answers with
    /// `org.freedesktop.DBus.Error.InvalidArgs`.
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("value does not match type `{expected}`")]
    Mismatch { expected: String },

    #[error("{0}")]
    Unrepresentable(String),
}

fn invalid(reason: impl Into<String>) -> WireError {
    WireError::InvalidArgs(reason.into())
}

/// One argument value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Byte(u8),
    Boolean(bool),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Double(f64),
    /// Index into the message's file descriptor list.
    UnixFd(u32),
    String(String),
    ObjectPath(String),
    Signature(String),
    Array { element: TypeNode, items: Vec<Value> },
    Struct(Vec<Value>),
    DictEntry(Box<Value>, Box<Value>),
}

impl Value {
    pub fn type_node(&self) -> TypeNode {
        match self {
            Value::Byte(_) => TypeNode::Scalar(Scalar::Byte),
            Value::Boolean(_) => TypeNode::Scalar(Scalar::Boolean),
            Value::Int16(_) => TypeNode::Scalar(Scalar::Int16),
            Value::UInt16(_) => TypeNode::Scalar(Scalar::UInt16),
            Value::Int32(_) => TypeNode::Scalar(Scalar::Int32),
            Value::UInt32(_) => TypeNode::Scalar(Scalar::UInt32),
            Value::Int64(_) => TypeNode::Scalar(Scalar::Int64),
            Value::UInt64(_) => TypeNode::Scalar(Scalar::UInt64),
            Value::Double(_) => TypeNode::Scalar(Scalar::Double),
            Value::UnixFd(_) => TypeNode::Scalar(Scalar::UnixFd),
            Value::String(_) => TypeNode::Str(StrKind::String),
            Value::ObjectPath(_) => TypeNode::Str(StrKind::ObjectPath),
            Value::Signature(_) => TypeNode::Str(StrKind::Signature),
            Value::Array { element, .. } => TypeNode::Array(Box::new(element.clone())),
            Value::Struct(items) => TypeNode::Struct(items.iter().map(Value::type_node).collect()),
            Value::DictEntry(key, value) => {
                TypeNode::DictEntry(Box::new(key.type_node()), Box::new(value.type_node()))
            }
        }
    }
}

/// A message body: its signature plus the marshalled bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Body {
    pub signature: String,
    pub data: Vec<u8>,
}

fn align(ix: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    (ix + alignment - 1) & !(alignment - 1)
}

/// `/`, or `/`-separated non-empty elements of `[A-Za-z0-9_]`.
pub fn valid_object_path(path: &str) -> bool {
    if path == "/" {
        return true;
    }
    match path.strip_prefix('/') {
        Some(rest) => rest.split('/').all(|element| {
            !element.is_empty()
                && element.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
        }),
        None => false,
    }
}

// ---------------------------------------------------------------------------
// Marshal
// ---------------------------------------------------------------------------

/// Marshal `values` in order into a new body.
pub fn marshal(values: &[Value]) -> Result<Body> {
    let types: Vec<TypeNode> = values.iter().map(Value::type_node).collect();
    let signature: String = types.iter().map(TypeNode::signature).collect();
    // Only bodies `demarshal` would accept: no empty structs, nesting and
    // length within limits.
    signature::parse_all(&signature).map_err(|e| WireError::Unrepresentable(e.to_string()))?;

    let mut writer = Writer::default();
    for (value, ty) in values.iter().zip(&types) {
        writer.write(value, ty)?;
    }
    trace!(signature = %signature, size = writer.data.len(), "marshalled body");
    Ok(Body {
        signature,
        data: writer.data,
    })
}

#[derive(Default)]
struct Writer {
    data: Vec<u8>,
}

impl Writer {
    fn pad(&mut self, alignment: usize) {
        let aligned = align(self.data.len(), alignment);
        self.data.resize(aligned, 0);
    }

    fn u32(&mut self, v: u32) {
        let mut buf = [0; 4];
        LE::write_u32(&mut buf, v);
        self.pad(4);
        self.data.extend_from_slice(&buf);
    }

    fn text(&mut self, s: &str, kind: StrKind) -> Result<()> {
        if s.contains('\0') {
            return Err(WireError::Unrepresentable(format!(
                "string {s:?} contains a NUL byte"
            )));
        }
        match kind {
            StrKind::Signature => {
                let len = u8::try_from(s.len())
                    .map_err(|_| WireError::Unrepresentable("signature too long".to_string()))?;
                self.data.push(len);
            }
            StrKind::ObjectPath if !valid_object_path(s) => {
                return Err(WireError::Unrepresentable(format!(
                    "`{s}` is not an object path"
                )));
            }
            _ => {
                let len = u32::try_from(s.len())
                    .map_err(|_| WireError::Unrepresentable("string too long".to_string()))?;
                self.u32(len);
            }
        }
        self.data.extend_from_slice(s.as_bytes());
        self.data.push(0);
        Ok(())
    }

    fn write(&mut self, value: &Value, ty: &TypeNode) -> Result<()> {
        let mismatch = || WireError::Mismatch {
            expected: ty.signature(),
        };

        if let TypeNode::Scalar(scalar) = ty {
            let size = scalar.size();
            let mut buf = [0u8; 8];
            match (value, scalar) {
                (Value::Byte(v), Scalar::Byte) => buf[0] = *v,
                (Value::Boolean(v), Scalar::Boolean) => LE::write_u32(&mut buf, u32::from(*v)),
                (Value::Int16(v), Scalar::Int16) => LE::write_i16(&mut buf, *v),
                (Value::UInt16(v), Scalar::UInt16) => LE::write_u16(&mut buf, *v),
                (Value::Int32(v), Scalar::Int32) => LE::write_i32(&mut buf, *v),
                (Value::UInt32(v), Scalar::UInt32) => LE::write_u32(&mut buf, *v),
                (Value::UnixFd(v), Scalar::UnixFd) => LE::write_u32(&mut buf, *v),
                (Value::Int64(v), Scalar::Int64) => LE::write_i64(&mut buf, *v),
                (Value::UInt64(v), Scalar::UInt64) => LE::write_u64(&mut buf, *v),
                (Value::Double(v), Scalar::Double) => LE::write_f64(&mut buf, *v),
                _ => return Err(mismatch()),
            }
            self.pad(size);
            self.data.extend_from_slice(&buf[..size]);
            return Ok(());
        }

        match (value, ty) {
            (Value::String(s), TypeNode::Str(kind @ StrKind::String))
            | (Value::ObjectPath(s), TypeNode::Str(kind @ StrKind::ObjectPath))
            | (Value::Signature(s), TypeNode::Str(kind @ StrKind::Signature)) => {
                self.text(s, *kind)?;
            }
            (Value::Array { element, items }, TypeNode::Array(expected))
                if element == expected.as_ref() =>
            {
                self.u32(0);
                let len_at = self.data.len() - 4;
                self.pad(element.alignment());
                let start = self.data.len();
                for item in items {
                    self.write(item, element)?;
                }
                let len = self.data.len() - start;
                if len > MAX_ARRAY_LENGTH {
                    return Err(WireError::Unrepresentable(format!(
                        "array of {len} bytes is too long"
                    )));
                }
                // Checked against MAX_ARRAY_LENGTH above.
                LE::write_u32(&mut self.data[len_at..len_at + 4], len as u32);
            }
            (Value::Struct(items), TypeNode::Struct(members)) if items.len() == members.len() => {
                self.pad(8);
                for (item, member) in items.iter().zip(members) {
                    self.write(item, member)?;
                }
            }
            (Value::DictEntry(key, value), TypeNode::DictEntry(key_ty, value_ty)) => {
                self.pad(8);
                self.write(key, key_ty)?;
                self.write(value, value_ty)?;
            }
            _ => return Err(mismatch()),
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Demarshal
// ---------------------------------------------------------------------------

/// Demarshal a body that must hold exactly the `expected` arguments.
pub fn demarshal(body: &Body, expected: &[TypeNode]) -> Result<Vec<Value>> {
    let actual =
        signature::parse_all(&body.signature).map_err(|e| invalid(e.to_string()))?;

    let mut reader = Reader {
        data: &body.data,
        pos: 0,
    };
    let mut values = Vec::with_capacity(expected.len());
    for (i, ty) in expected.iter().enumerate() {
        match actual.get(i) {
            None => return Err(invalid(format!("missing argument {}", i + 1))),
            Some(found) if found != ty => {
                return Err(invalid(format!(
                    "argument {} has type `{found}`, expected `{ty}`",
                    i + 1
                )));
            }
            Some(_) => values.push(reader.read(ty)?),
        }
    }
    if actual.len() > expected.len() {
        return Err(invalid(format!(
            "{} unexpected trailing argument(s)",
            actual.len() - expected.len()
        )));
    }
    if reader.pos != body.data.len() {
        return Err(invalid(format!(
            "{} bytes of trailing data",
            body.data.len() - reader.pos
        )));
    }
    Ok(values)
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn align(&mut self, alignment: usize) -> Result<()> {
        let next = align(self.pos, alignment);
        let padding = self
            .data
            .get(self.pos..next)
            .ok_or_else(|| invalid("body ends inside padding"))?;
        if padding.iter().any(|&b| b != 0) {
            return Err(invalid("non-zero padding"));
        }
        self.pos = next;
        Ok(())
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let bytes = self
            .data
            .get(self.pos..self.pos + n)
            .ok_or_else(|| invalid(format!("body ends before {n} more bytes at offset {}", self.pos)))?;
        self.pos += n;
        Ok(bytes)
    }

    fn u32(&mut self) -> Result<u32> {
        self.align(4)?;
        Ok(LE::read_u32(self.take(4)?))
    }

    fn text(&mut self, kind: StrKind) -> Result<String> {
        let len = match kind {
            StrKind::Signature => usize::from(self.take(1)?[0]),
            _ => self.u32()? as usize,
        };
        let bytes = self.take(len)?;
        if self.take(1)?[0] != 0 {
            return Err(invalid("string is not NUL-terminated"));
        }
        if bytes.contains(&0) {
            return Err(invalid("string contains a NUL byte"));
        }
        let s = std::str::from_utf8(bytes)
            .map_err(|e| invalid(format!("string is not UTF-8: {e}")))?;
        if kind == StrKind::ObjectPath && !valid_object_path(s) {
            return Err(invalid(format!("`{s}` is not an object path")));
        }
        Ok(s.to_string())
    }

    fn read(&mut self, ty: &TypeNode) -> Result<Value> {
        let value = match ty {
            TypeNode::Scalar(scalar) => {
                self.align(scalar.size())?;
                let b = self.take(scalar.size())?;
                match scalar {
                    Scalar::Byte => Value::Byte(b[0]),
                    Scalar::Boolean => match LE::read_u32(b) {
                        0 => Value::Boolean(false),
                        1 => Value::Boolean(true),
                        n => return Err(invalid(format!("{n} is not a boolean"))),
                    },
                    Scalar::Int16 => Value::Int16(LE::read_i16(b)),
                    Scalar::UInt16 => Value::UInt16(LE::read_u16(b)),
                    Scalar::Int32 => Value::Int32(LE::read_i32(b)),
                    Scalar::UInt32 => Value::UInt32(LE::read_u32(b)),
                    Scalar::UnixFd => Value::UnixFd(LE::read_u32(b)),
                    Scalar::Int64 => Value::Int64(LE::read_i64(b)),
                    Scalar::UInt64 => Value::UInt64(LE::read_u64(b)),
                    Scalar::Double => Value::Double(LE::read_f64(b)),
                }
            }
            TypeNode::Str(kind) => {
                let s = self.text(*kind)?;
                match kind {
                    StrKind::String => Value::String(s),
                    StrKind::ObjectPath => Value::ObjectPath(s),
                    StrKind::Signature => Value::Signature(s),
                }
            }
            TypeNode::Array(element) => {
                let len = self.u32()? as usize;
                if len > MAX_ARRAY_LENGTH {
                    return Err(invalid(format!("array of {len} bytes is too long")));
                }
                self.align(element.alignment())?;
                let end = self.pos + len;
                if end > self.data.len() {
                    return Err(invalid("array overruns the body"));
                }
                let mut items = Vec::new();
                while self.pos < end {
                    items.push(self.read(element)?);
                }
                if self.pos != end {
                    return Err(invalid("array element overruns the array"));
                }
                Value::Array {
                    element: (**element).clone(),
                    items,
                }
            }
            TypeNode::Struct(members) => {
                self.align(8)?;
                let items = members
                    .iter()
                    .map(|m| self.read(m))
                    .collect::<Result<Vec<_>>>()?;
                Value::Struct(items)
            }
            TypeNode::DictEntry(key, value) => {
                self.align(8)?;
                let key = self.read(key)?;
                let value = self.read(value)?;
                Value::DictEntry(Box::new(key), Box::new(value))
            }
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types(sig: &str) -> Vec<TypeNode> {
        signature::parse_all(sig).unwrap()
    }

    fn strings(items: &[&str]) -> Value {
        Value::Array {
            element: TypeNode::Str(StrKind::String),
            items: items.iter().map(|s| Value::String(s.to_string())).collect(),
        }
    }

    #[test]
    fn alignment() {
        assert_eq!(align(23, 4), 24);
        assert_eq!(align(32, 4), 32);
        assert_eq!(align(31, 1), 31);
        assert_eq!(align(0, 8), 0);
        assert_eq!(align(9, 8), 16);
    }

    #[test]
    fn marshal_rejects_what_demarshal_would() {
        let empty = marshal(&[Value::Struct(Vec::new())]).unwrap_err();
        assert!(matches!(empty, WireError::Unrepresentable(ref r) if r.contains("empty structure")));

        let mut deep = Value::Int32(1);
        for _ in 0..=signature::MAX_NESTING {
            deep = Value::Struct(vec![deep]);
        }
        assert!(matches!(marshal(&[deep]), Err(WireError::Unrepresentable(_))));

        let mut limit = Value::Int32(1);
        for _ in 0..signature::MAX_NESTING {
            limit = Value::Struct(vec![limit]);
        }
        let body = marshal(std::slice::from_ref(&limit)).unwrap();
        assert_eq!(demarshal(&body, &types(&body.signature)).unwrap(), [limit]);
    }

    #[test]
    fn string_then_integer_layout() {
        let body = marshal(&[Value::String("hi".to_string()), Value::UInt32(7)]).unwrap();
        assert_eq!(body.signature, "su");
        assert_eq!(body.data, [2, 0, 0, 0, b'h', b'i', 0, 0, 7, 0, 0, 0]);
    }

    #[test]
    fn empty_array_still_pads_to_element() {
        let body = marshal(&[
            Value::Byte(1),
            Value::Array {
                element: TypeNode::Scalar(Scalar::Int64),
                items: Vec::new(),
            },
        ])
        .unwrap();
        assert_eq!(body.signature, "yax");
        assert_eq!(body.data, [1, 0, 0, 0, 0, 0, 0, 0]);
        let values = demarshal(&body, &types("yax")).unwrap();
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn round_trips() {
        let nested = Value::Array {
            element: TypeNode::Array(Box::new(TypeNode::Scalar(Scalar::Int32))),
            items: vec![
                Value::Array {
                    element: TypeNode::Scalar(Scalar::Int32),
                    items: vec![Value::Int32(4), Value::Int32(-5)],
                },
                Value::Array {
                    element: TypeNode::Scalar(Scalar::Int32),
                    items: Vec::new(),
                },
            ],
        };
        let structure = Value::Struct(vec![
            Value::String("x".to_string()),
            Value::Struct(vec![Value::Int16(-2), Value::Double(1.5)]),
            strings(&["a", "b"]),
        ]);
        let dict = Value::Array {
            element: TypeNode::DictEntry(
                Box::new(TypeNode::Str(StrKind::String)),
                Box::new(TypeNode::Scalar(Scalar::UInt32)),
            ),
            items: vec![Value::DictEntry(
                Box::new(Value::String("key".to_string())),
                Box::new(Value::UInt32(42)),
            )],
        };
        let values = vec![
            Value::Boolean(true),
            Value::UInt64(u64::MAX),
            Value::ObjectPath("/com/netsplit/Nih".to_string()),
            Value::Signature("a{sv}".to_string()),
            nested,
            structure,
            dict,
        ];

        let body = marshal(&values).unwrap();
        assert_eq!(body.signature, "btoga(ai)(s(nd)as)a{su}");
        let back = demarshal(&body, &types(&body.signature)).unwrap();
        assert_eq!(back, values);
    }

    #[test]
    fn zero_arguments() {
        let body = marshal(&[]).unwrap();
        assert_eq!(body, Body::default());
        assert_eq!(demarshal(&body, &[]).unwrap(), Vec::new());
    }

    #[test]
    fn rejects_trailing_argument() {
        let body = marshal(&[Value::String("str".to_string()), Value::Int32(42)]).unwrap();
        let err = demarshal(&body, &types("s")).unwrap_err();
        assert!(matches!(err, WireError::InvalidArgs(ref r) if r.contains("trailing")));
    }

    #[test]
    fn rejects_missing_argument() {
        let body = marshal(&[Value::String("str".to_string())]).unwrap();
        let err = demarshal(&body, &types("si")).unwrap_err();
        assert_eq!(err, WireError::InvalidArgs("missing argument 2".to_string()));
    }

    #[test]
    fn never_coerces() {
        let body = marshal(&[Value::UInt32(1)]).unwrap();
        assert!(matches!(
            demarshal(&body, &types("i")),
            Err(WireError::InvalidArgs(_))
        ));
    }

    #[test]
    fn rejects_malformed_data() {
        let bad_bool = Body {
            signature: "b".to_string(),
            data: vec![2, 0, 0, 0],
        };
        assert!(demarshal(&bad_bool, &types("b")).is_err());

        let bad_utf8 = Body {
            signature: "s".to_string(),
            data: vec![1, 0, 0, 0, 0xff, 0],
        };
        assert!(demarshal(&bad_utf8, &types("s")).is_err());

        let overrun = Body {
            signature: "ay".to_string(),
            data: vec![9, 0, 0, 0, 1, 2],
        };
        assert!(demarshal(&overrun, &types("ay")).is_err());

        let extra = Body {
            signature: "y".to_string(),
            data: vec![1, 2],
        };
        assert!(demarshal(&extra, &types("y")).is_err());
    }

    #[test]
    fn marshal_checks_values() {
        let mixed = Value::Array {
            element: TypeNode::Scalar(Scalar::Int32),
            items: vec![Value::Int32(1), Value::String("no".to_string())],
        };
        assert_eq!(
            marshal(&[mixed]),
            Err(WireError::Mismatch {
                expected: "i".to_string()
            })
        );
        assert!(marshal(&[Value::ObjectPath("relative".to_string())]).is_err());
        assert!(marshal(&[Value::String("nul\0".to_string())]).is_err());
    }

    #[test]
    fn object_paths() {
        assert!(valid_object_path("/"));
        assert!(valid_object_path("/com/netsplit/Nih_1"));
        assert!(!valid_object_path(""));
        assert!(!valid_object_path("/trailing/"));
        assert!(!valid_object_path("/a//b"));
        assert!(!valid_object_path("/a-b"));
    }
}
