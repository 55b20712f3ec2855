//! Intermediate model: the validated interface tree the generators walk.
//!
//! Built by [`crate::extract`] from declarations; independent of both the
//! declaration format and the generated C.

use crate::signature::TypeNode;

/// Which side of the bus the generated code serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Exported objects: dispatch functions, replies, signal emitters.
    Object,
    /// Remote objects: proxy calls, notifies, sync calls, signal filters.
    Proxy,
}

/// Root of the tree: every interface of one object.
#[derive(Debug, Clone, Default)]
pub struct Node {
    pub interfaces: Vec<Interface>,
}

#[derive(Debug, Clone)]
pub struct Interface {
    /// Dotted wire name (`com.netsplit.Nih.Test`).
    pub name: String,
    /// Optional symbol inserted into public C names.
    pub symbol: Option<String>,
    pub deprecated: bool,
    pub methods: Vec<Method>,
    pub signals: Vec<Signal>,
    pub properties: Vec<Property>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    /// Wire name, if the declaration gave one.
    pub name: Option<String>,
    /// C symbol; `argN` for unnamed arguments.
    pub symbol: String,
    pub ty: TypeNode,
    pub direction: Direction,
}

impl Argument {
    /// The implicit argument carrying a property value.
    pub fn property_value(ty: &TypeNode, direction: Direction) -> Self {
        Argument {
            name: Some("value".to_string()),
            symbol: "value".to_string(),
            ty: ty.clone(),
            direction,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Method {
    pub name: String,
    pub symbol: String,
    pub deprecated: bool,
    /// Handler returns before the reply exists; the reply is sent later
    /// through the generated reply function.
    pub is_async: bool,
    /// No reply is ever sent. Never set alongside output arguments.
    pub no_reply: bool,
    pub args: Vec<Argument>,
}

impl Method {
    pub fn inputs(&self) -> impl Iterator<Item = &Argument> {
        self.args.iter().filter(|a| a.direction == Direction::In)
    }

    pub fn outputs(&self) -> impl Iterator<Item = &Argument> {
        self.args.iter().filter(|a| a.direction == Direction::Out)
    }
}

#[derive(Debug, Clone)]
pub struct Signal {
    pub name: String,
    pub symbol: String,
    pub deprecated: bool,
    /// All outbound from the emitting object.
    pub args: Vec<Argument>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

impl Access {
    pub fn readable(self) -> bool {
        matches!(self, Access::Read | Access::ReadWrite)
    }

    pub fn writable(self) -> bool {
        matches!(self, Access::Write | Access::ReadWrite)
    }

    /// Runtime table constant.
    pub fn nih_const(self) -> &'static str {
        match self {
            Access::Read => "NIH_DBUS_READ",
            Access::Write => "NIH_DBUS_WRITE",
            Access::ReadWrite => "NIH_DBUS_READWRITE",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Property {
    pub name: String,
    pub symbol: String,
    pub ty: TypeNode,
    pub access: Access,
    pub deprecated: bool,
}
