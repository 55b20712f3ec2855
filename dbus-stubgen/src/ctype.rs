//! C-side types and the type mapper from [`TypeNode`] to native descriptors.
//!
//! Also holds the text layout helpers used to render declarations,
//! prototypes and struct definitions.

use std::fmt;

use crate::signature::TypeNode;
use crate::symbol;

/// A C type expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CType {
    /// A plain type name: `int32_t`, `char`, `DBusMessage`.
    Named(String),
    /// `const`-qualified inner type.
    Const(Box<CType>),
    /// Pointer to the inner type.
    Ptr(Box<CType>),
}

impl CType {
    pub fn named(name: impl Into<String>) -> Self {
        CType::Named(name.into())
    }

    pub fn ptr(self) -> Self {
        CType::Ptr(Box::new(self))
    }

    pub fn is_pointer(&self) -> bool {
        match self {
            CType::Ptr(_) => true,
            CType::Const(inner) => inner.is_pointer(),
            CType::Named(_) => false,
        }
    }

    /// Make the pointed-to level immutable: `char *` → `const char *`,
    /// `char **` → `char * const *`. Non-pointers are returned unchanged.
    pub fn to_const(&self) -> Self {
        match self {
            CType::Ptr(inner) => match inner.as_ref() {
                CType::Const(_) => self.clone(),
                _ => CType::Ptr(Box::new(CType::Const(inner.clone()))),
            },
            _ => self.clone(),
        }
    }

    /// One more level of indirection, for output parameters.
    pub fn to_pointer(&self) -> Self {
        self.clone().ptr()
    }
}

impl fmt::Display for CType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CType::Named(name) => f.write_str(name),
            CType::Const(inner) => match inner.as_ref() {
                CType::Named(name) => write!(f, "const {name}"),
                CType::Ptr(_) => write!(f, "{inner} const"),
                CType::Const(_) => write!(f, "{inner}"),
            },
            CType::Ptr(inner) => {
                let rendered = inner.to_string();
                if rendered.ends_with('*') {
                    write!(f, "{rendered}*")
                } else {
                    write!(f, "{rendered} *")
                }
            }
        }
    }
}

/// A typed name: local variable, parameter, or struct member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeVar {
    pub ctype: CType,
    pub name: String,
    /// Declared as `name[]`.
    pub array: bool,
}

impl TypeVar {
    pub fn new(ctype: CType, name: impl Into<String>) -> Self {
        TypeVar {
            ctype,
            name: name.into(),
            array: false,
        }
    }

    pub fn array(ctype: CType, name: impl Into<String>) -> Self {
        TypeVar {
            ctype,
            name: name.into(),
            array: true,
        }
    }

    fn declarator(&self) -> String {
        if self.array {
            format!("{}[]", self.name)
        } else {
            self.name.clone()
        }
    }

    /// `type name` with the star hugging the name for pointers.
    pub fn inline(&self) -> String {
        let ty = self.ctype.to_string();
        if ty.ends_with('*') {
            format!("{ty}{}", self.declarator())
        } else {
            format!("{ty} {}", self.declarator())
        }
    }
}

/// Function attributes emitted as GCC `__attribute__` lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    WarnUnusedResult,
    Deprecated,
}

impl Attribute {
    fn as_str(self) -> &'static str {
        match self {
            Attribute::WarnUnusedResult => "warn_unused_result",
            Attribute::Deprecated => "deprecated",
        }
    }
}

/// A function signature: used for definitions, prototypes and typedefs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeFunc {
    pub ret: CType,
    pub name: String,
    pub params: Vec<TypeVar>,
    pub attribs: Vec<Attribute>,
}

impl TypeFunc {
    pub fn new(ret: CType, name: impl Into<String>) -> Self {
        TypeFunc {
            ret,
            name: name.into(),
            params: Vec::new(),
            attribs: Vec::new(),
        }
    }

    pub fn param(mut self, ctype: CType, name: &str) -> Self {
        self.params.push(TypeVar::new(ctype, name));
        self
    }

    pub fn params(mut self, params: impl IntoIterator<Item = TypeVar>) -> Self {
        self.params.extend(params);
        self
    }

    pub fn attrib(mut self, attrib: Attribute) -> Self {
        if !self.attribs.contains(&attrib) {
            self.attribs.push(attrib);
        }
        self
    }

    fn inline_params(&self) -> String {
        if self.params.is_empty() {
            return "void".to_string();
        }
        self.params
            .iter()
            .map(TypeVar::inline)
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn attrib_suffix(&self) -> String {
        if self.attribs.is_empty() {
            return String::new();
        }
        let list: Vec<&str> = self.attribs.iter().map(|a| a.as_str()).collect();
        format!("\n\t__attribute__ (({}))", list.join(", "))
    }

    /// `[storage ]ret name (params)[ attribs];`
    pub fn prototype(&self, storage: Option<&str>) -> String {
        let ret = self.ret.to_string();
        let sep = if ret.ends_with('*') { "" } else { " " };
        let storage = storage.map(|s| format!("{s} ")).unwrap_or_default();
        format!(
            "{storage}{ret}{sep}{} ({}){};\n",
            self.name,
            self.inline_params(),
            self.attrib_suffix()
        )
    }

    /// `typedef ret (*Name) (params);`
    pub fn typedef(&self) -> String {
        let ret = self.ret.to_string();
        let sep = if ret.ends_with('*') { "" } else { " " };
        format!(
            "typedef {ret}{sep}(*{}) ({});\n",
            self.name,
            self.inline_params()
        )
    }

    /// Full definition with the parameter list laid out one per line.
    pub fn definition(&self, storage: Option<&str>, body: &str) -> String {
        let mut out = String::new();
        if let Some(storage) = storage {
            out.push_str(storage);
            out.push(' ');
        }
        out.push_str(&self.ret.to_string());
        out.push('\n');

        let lead = format!("{} (", self.name);
        out.push_str(&lead);
        if self.params.is_empty() {
            out.push_str("void");
        } else {
            let width = decl_width(&self.params);
            let continuation = " ".repeat(lead.len());
            for (i, param) in self.params.iter().enumerate() {
                if i > 0 {
                    out.push_str(",\n");
                    out.push_str(&continuation);
                }
                out.push_str(&format!(
                    "{:<width$}{}",
                    param.ctype.to_string(),
                    param.declarator()
                ));
            }
        }
        out.push_str(")\n{\n");
        out.push_str(&indent(body, 1));
        out.push_str("}\n");
        out
    }
}

/// A synthesized C struct for a struct-shaped D-Bus type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeStruct {
    pub name: String,
    pub members: Vec<TypeVar>,
}

impl TypeStruct {
    pub fn definition(&self) -> String {
        format!(
            "typedef struct {} {{\n{}}} {};\n",
            symbol::from_name(&self.name),
            indent(&var_layout(&self.members), 1),
            self.name
        )
    }
}

fn decl_width(vars: &[TypeVar]) -> usize {
    vars.iter()
        .map(|v| {
            let ty = v.ctype.to_string();
            if ty.ends_with('*') { ty.len() } else { ty.len() + 1 }
        })
        .max()
        .unwrap_or(0)
}

/// Declarations with names aligned in one column.
pub fn var_layout(vars: &[TypeVar]) -> String {
    let width = decl_width(vars);
    let mut out = String::new();
    for v in vars {
        out.push_str(&format!(
            "{:<width$}{};\n",
            v.ctype.to_string(),
            v.declarator()
        ));
    }
    out
}

/// Indent every non-empty line by `level` tabs.
pub fn indent(code: &str, level: usize) -> String {
    let tabs = "\t".repeat(level);
    let mut out = String::with_capacity(code.len() + level * 8);
    for line in code.split_inclusive('\n') {
        if line.trim().is_empty() {
            out.push_str(line.trim_start_matches([' ', '\t']));
        } else {
            out.push_str(&tabs);
            out.push_str(line);
        }
    }
    out
}

/// `if (cond) {` … `}` with the body indented one level.
pub fn block(head: &str, body: &str) -> String {
    format!("{head} {{\n{}}}\n", indent(body, 1))
}

// ---------------------------------------------------------------------------
// Type mapper
// ---------------------------------------------------------------------------

/// Where a value lives; arrays of strings only carry a terminator at
/// argument level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Argument,
    Member,
}

/// Naming context for synthesized structs of one member.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub prefix: &'a str,
    pub interface_symbol: Option<&'a str>,
    pub member_symbol: &'a str,
}

impl Scope<'_> {
    /// `<Prefix><Interface><Member><Path>Structure`, where `path` starts at
    /// the argument symbol and grows with `_element` / `_itemN`.
    pub fn struct_name(&self, path: &str) -> String {
        symbol::typedef_name(
            self.prefix,
            self.interface_symbol,
            None,
            &format!("{}_{}", self.member_symbol, path),
            Some("structure"),
        )
    }
}

/// Native representation of one D-Bus value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeType {
    pub ctype: CType,
    /// Companion length variables as `(suffix, type)`; the first, when
    /// present, is the element count `_len`.
    pub lens: Vec<(String, CType)>,
    pub null_terminated: bool,
    pub struct_name: Option<String>,
}

impl NativeType {
    fn plain(ctype: CType) -> Self {
        NativeType {
            ctype,
            lens: Vec::new(),
            null_terminated: false,
            struct_name: None,
        }
    }

    pub fn is_pointer(&self) -> bool {
        self.ctype.is_pointer()
    }

    pub fn needs_len(&self) -> bool {
        !self.lens.is_empty()
    }

    /// Variables holding a value called `name`: the value itself followed
    /// by its lengths.
    pub fn vars(&self, name: &str) -> Vec<TypeVar> {
        let mut vars = vec![TypeVar::new(self.ctype.clone(), name)];
        for (suffix, ctype) in &self.lens {
            vars.push(TypeVar::new(ctype.clone(), format!("{name}{suffix}")));
        }
        vars
    }
}

pub fn size_t() -> CType {
    CType::named("size_t")
}

/// Map a D-Bus type to its C representation.
///
/// `path` names the value for struct synthesis (see [`Scope::struct_name`]).
pub fn native_type(node: &TypeNode, path: &str, placement: Placement, scope: &Scope) -> NativeType {
    match node {
        TypeNode::Scalar(s) => NativeType::plain(CType::named(s.c_type())),
        TypeNode::Str(_) => NativeType::plain(CType::named("char").ptr()),
        TypeNode::Array(element) => {
            let elem = native_type(element, &format!("{path}_element"), placement, scope);
            let ctype = elem.ctype.clone().ptr();
            if matches!(element.as_ref(), TypeNode::Str(_)) && placement == Placement::Argument {
                return NativeType {
                    ctype,
                    lens: Vec::new(),
                    null_terminated: true,
                    struct_name: None,
                };
            }
            let mut lens = vec![("_len".to_string(), size_t())];
            for (suffix, len_type) in &elem.lens {
                lens.push((format!("_element{suffix}s"), len_type.clone().ptr()));
            }
            NativeType {
                ctype,
                lens,
                null_terminated: false,
                struct_name: elem.struct_name,
            }
        }
        TypeNode::Struct(_) | TypeNode::DictEntry(..) => {
            let name = scope.struct_name(path);
            NativeType {
                ctype: CType::named(name.clone()).ptr(),
                lens: Vec::new(),
                null_terminated: false,
                struct_name: Some(name),
            }
        }
    }
}
