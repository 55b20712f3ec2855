//! Type classifier: D-Bus signature text to a [`TypeNode`] tree.
//!
//! Covers the basic and container grammar only: variants (`v`) and any
//! other code are rejected with [`Error::InvalidSignature`].

use crate::error::{Error, Result};

/// Longest signature accepted on the wire.
pub const MAX_SIGNATURE_LENGTH: usize = 255;

/// Maximum nesting of arrays, and separately of structs.
pub const MAX_NESTING: usize = 32;

/// Fixed-size value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scalar {
    Byte,
    Boolean,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Double,
    UnixFd,
}

/// Length-prefixed text types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrKind {
    String,
    ObjectPath,
    Signature,
}

/// One complete D-Bus type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeNode {
    Scalar(Scalar),
    Str(StrKind),
    Array(Box<TypeNode>),
    Struct(Vec<TypeNode>),
    /// Only ever appears as the element of an [`TypeNode::Array`].
    DictEntry(Box<TypeNode>, Box<TypeNode>),
}

impl Scalar {
    pub fn code(self) -> char {
        match self {
            Scalar::Byte => 'y',
            Scalar::Boolean => 'b',
            Scalar::Int16 => 'n',
            Scalar::UInt16 => 'q',
            Scalar::Int32 => 'i',
            Scalar::UInt32 => 'u',
            Scalar::Int64 => 'x',
            Scalar::UInt64 => 't',
            Scalar::Double => 'd',
            Scalar::UnixFd => 'h',
        }
    }

    /// C type used to hold a value of this type.
    pub fn c_type(self) -> &'static str {
        match self {
            Scalar::Byte => "uint8_t",
            Scalar::Boolean => "int",
            Scalar::Int16 => "int16_t",
            Scalar::UInt16 => "uint16_t",
            Scalar::Int32 => "int32_t",
            Scalar::UInt32 => "uint32_t",
            Scalar::Int64 => "int64_t",
            Scalar::UInt64 => "uint64_t",
            Scalar::Double => "double",
            Scalar::UnixFd => "int",
        }
    }

    pub fn dbus_const(self) -> &'static str {
        match self {
            Scalar::Byte => "DBUS_TYPE_BYTE",
            Scalar::Boolean => "DBUS_TYPE_BOOLEAN",
            Scalar::Int16 => "DBUS_TYPE_INT16",
            Scalar::UInt16 => "DBUS_TYPE_UINT16",
            Scalar::Int32 => "DBUS_TYPE_INT32",
            Scalar::UInt32 => "DBUS_TYPE_UINT32",
            Scalar::Int64 => "DBUS_TYPE_INT64",
            Scalar::UInt64 => "DBUS_TYPE_UINT64",
            Scalar::Double => "DBUS_TYPE_DOUBLE",
            Scalar::UnixFd => "DBUS_TYPE_UNIX_FD",
        }
    }

    /// Wire alignment and size in bytes (booleans travel as 32-bit).
    pub fn size(self) -> usize {
        match self {
            Scalar::Byte => 1,
            Scalar::Int16 | Scalar::UInt16 => 2,
            Scalar::Boolean | Scalar::Int32 | Scalar::UInt32 | Scalar::UnixFd => 4,
            Scalar::Int64 | Scalar::UInt64 | Scalar::Double => 8,
        }
    }
}

impl StrKind {
    pub fn code(self) -> char {
        match self {
            StrKind::String => 's',
            StrKind::ObjectPath => 'o',
            StrKind::Signature => 'g',
        }
    }

    pub fn dbus_const(self) -> &'static str {
        match self {
            StrKind::String => "DBUS_TYPE_STRING",
            StrKind::ObjectPath => "DBUS_TYPE_OBJECT_PATH",
            StrKind::Signature => "DBUS_TYPE_SIGNATURE",
        }
    }
}

impl TypeNode {
    /// Parse a signature that must hold exactly one complete type.
    pub fn parse(signature: &str) -> Result<TypeNode> {
        let mut types = parse_all(signature)?;
        match types.len() {
            1 => Ok(types.remove(0)),
            0 => Err(Error::signature(signature, "empty signature")),
            n => Err(Error::signature(
                signature,
                format!("expected a single complete type, found {n}"),
            )),
        }
    }

    /// The `DBUS_TYPE_*` constant naming this node's type code.
    pub fn dbus_const(&self) -> &'static str {
        match self {
            TypeNode::Scalar(s) => s.dbus_const(),
            TypeNode::Str(s) => s.dbus_const(),
            TypeNode::Array(_) => "DBUS_TYPE_ARRAY",
            TypeNode::Struct(_) => "DBUS_TYPE_STRUCT",
            TypeNode::DictEntry(..) => "DBUS_TYPE_DICT_ENTRY",
        }
    }

    /// Scalars and strings: the types `append_basic`/`get_basic` handle.
    pub fn is_basic(&self) -> bool {
        matches!(self, TypeNode::Scalar(_) | TypeNode::Str(_))
    }

    /// Members of a struct-shaped node, in order.
    pub fn members(&self) -> Vec<&TypeNode> {
        match self {
            TypeNode::Struct(members) => members.iter().collect(),
            TypeNode::DictEntry(key, value) => vec![key.as_ref(), value.as_ref()],
            _ => Vec::new(),
        }
    }

    /// Wire alignment in bytes.
    pub fn alignment(&self) -> usize {
        match self {
            TypeNode::Scalar(s) => s.size(),
            TypeNode::Str(StrKind::Signature) => 1,
            TypeNode::Str(_) | TypeNode::Array(_) => 4,
            TypeNode::Struct(_) | TypeNode::DictEntry(..) => 8,
        }
    }

    /// Render back to signature text.
    pub fn signature(&self) -> String {
        let mut out = String::new();
        self.write_signature(&mut out);
        out
    }

    fn write_signature(&self, out: &mut String) {
        match self {
            TypeNode::Scalar(s) => out.push(s.code()),
            TypeNode::Str(s) => out.push(s.code()),
            TypeNode::Array(element) => {
                out.push('a');
                element.write_signature(out);
            }
            TypeNode::Struct(members) => {
                out.push('(');
                for m in members {
                    m.write_signature(out);
                }
                out.push(')');
            }
            TypeNode::DictEntry(key, value) => {
                out.push('{');
                key.write_signature(out);
                value.write_signature(out);
                out.push('}');
            }
        }
    }
}

impl std::fmt::Display for TypeNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.signature())
    }
}

/// Parse a signature holding any number of complete types.
pub fn parse_all(signature: &str) -> Result<Vec<TypeNode>> {
    if signature.len() > MAX_SIGNATURE_LENGTH {
        return Err(Error::signature(signature, "signature too long"));
    }
    let mut cursor = Cursor::new(signature);
    let mut types = Vec::new();
    while !cursor.at_end() {
        types.push(cursor.next_type()?);
    }
    Ok(types)
}

/// Walks a signature one complete type at a time.
pub struct Cursor<'a> {
    signature: &'a str,
    bytes: &'a [u8],
    pos: usize,
    arrays: usize,
    structs: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(signature: &'a str) -> Self {
        Cursor {
            signature,
            bytes: signature.as_bytes(),
            pos: 0,
            arrays: 0,
            structs: 0,
        }
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn fail(&self, reason: impl Into<String>) -> Error {
        Error::signature(self.signature, reason)
    }

    /// Consume exactly one complete type.
    pub fn next_type(&mut self) -> Result<TypeNode> {
        let Some(&code) = self.bytes.get(self.pos) else {
            return Err(self.fail("unexpected end of signature"));
        };
        self.pos += 1;

        let node = match code {
            b'y' => TypeNode::Scalar(Scalar::Byte),
            b'b' => TypeNode::Scalar(Scalar::Boolean),
            b'n' => TypeNode::Scalar(Scalar::Int16),
            b'q' => TypeNode::Scalar(Scalar::UInt16),
            b'i' => TypeNode::Scalar(Scalar::Int32),
            b'u' => TypeNode::Scalar(Scalar::UInt32),
            b'x' => TypeNode::Scalar(Scalar::Int64),
            b't' => TypeNode::Scalar(Scalar::UInt64),
            b'd' => TypeNode::Scalar(Scalar::Double),
            b'h' => TypeNode::Scalar(Scalar::UnixFd),
            b's' => TypeNode::Str(StrKind::String),
            b'o' => TypeNode::Str(StrKind::ObjectPath),
            b'g' => TypeNode::Str(StrKind::Signature),
            b'a' => {
                if self.at_end() {
                    return Err(self.fail("array has no element type"));
                }
                self.arrays += 1;
                if self.arrays > MAX_NESTING {
                    return Err(self.fail("arrays nested too deeply"));
                }
                let element = if self.bytes[self.pos] == b'{' {
                    self.pos += 1;
                    self.dict_entry()?
                } else {
                    self.next_type()?
                };
                self.arrays -= 1;
                TypeNode::Array(Box::new(element))
            }
            b'(' => {
                self.structs += 1;
                if self.structs > MAX_NESTING {
                    return Err(self.fail("structures nested too deeply"));
                }
                let mut members = Vec::new();
                loop {
                    match self.bytes.get(self.pos) {
                        None => return Err(self.fail("unterminated structure")),
                        Some(b')') => {
                            self.pos += 1;
                            break;
                        }
                        Some(_) => members.push(self.next_type()?),
                    }
                }
                if members.is_empty() {
                    return Err(self.fail("empty structure"));
                }
                self.structs -= 1;
                TypeNode::Struct(members)
            }
            b'{' => return Err(self.fail("dict entry outside of an array")),
            b')' | b'}' => return Err(self.fail("unbalanced container close")),
            b'v' => return Err(self.fail("variants are not supported")),
            other => {
                return Err(self.fail(format!("unknown type code `{}`", other as char)));
            }
        };
        Ok(node)
    }

    /// Body of `{kv}` after the opening brace.
    fn dict_entry(&mut self) -> Result<TypeNode> {
        self.structs += 1;
        if self.structs > MAX_NESTING {
            return Err(self.fail("structures nested too deeply"));
        }
        if self.at_end() {
            return Err(self.fail("unterminated dict entry"));
        }
        let key = self.next_type()?;
        if !key.is_basic() {
            return Err(self.fail("dict entry key must be a basic type"));
        }
        if self.at_end() || self.bytes[self.pos] == b'}' {
            return Err(self.fail("dict entry must have exactly two members"));
        }
        let value = self.next_type()?;
        match self.bytes.get(self.pos) {
            Some(b'}') => self.pos += 1,
            None => return Err(self.fail("unterminated dict entry")),
            Some(_) => return Err(self.fail("dict entry must have exactly two members")),
        }
        self.structs -= 1;
        Ok(TypeNode::DictEntry(Box::new(key), Box::new(value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scalars_and_strings() {
        assert_eq!(
            TypeNode::parse("i").unwrap(),
            TypeNode::Scalar(Scalar::Int32)
        );
        assert_eq!(
            TypeNode::parse("o").unwrap(),
            TypeNode::Str(StrKind::ObjectPath)
        );
    }

    #[test]
    fn parses_nested_containers() {
        let node = TypeNode::parse("a(sa{su})").unwrap();
        let TypeNode::Array(element) = &node else {
            panic!("expected array, got {node:?}");
        };
        let TypeNode::Struct(members) = element.as_ref() else {
            panic!("expected struct element");
        };
        assert_eq!(members.len(), 2);
        assert!(matches!(&members[1], TypeNode::Array(e) if matches!(e.as_ref(), TypeNode::DictEntry(..))));
        assert_eq!(node.signature(), "a(sa{su})");
    }

    #[test]
    fn rejects_malformed_signatures() {
        for bad in ["", "!", "a", "(si", "()", "{su}", "a{s}", "a{sus}", "a{(s)u}", "v", "s)", "ii"] {
            assert!(
                matches!(TypeNode::parse(bad), Err(Error::InvalidSignature { .. })),
                "`{bad}` should be rejected"
            );
        }
    }

    #[test]
    fn parse_all_splits_complete_types() {
        let types = parse_all("sia(ii)as").unwrap();
        let sigs: Vec<String> = types.iter().map(|t| t.signature()).collect();
        assert_eq!(sigs, ["s", "i", "a(ii)", "as"]);
    }

    #[test]
    fn nesting_limit_enforced() {
        let deep = "a".repeat(MAX_NESTING + 1) + "i";
        assert!(TypeNode::parse(&deep).is_err());
        let ok = "a".repeat(MAX_NESTING) + "i";
        assert!(TypeNode::parse(&ok).is_ok());
    }
}
