//! Symbol namer: C identifiers derived from D-Bus names.

/// Derive a C symbol from a D-Bus name: `GetName` → `get_name`,
/// `com.example.Foo` → `com_example_foo`.
///
/// Already-derived symbols come back unchanged.
pub fn from_name(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                let prev = chars[i - 1];
                let next_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
                if prev.is_ascii_lowercase()
                    || prev.is_ascii_digit()
                    || (prev.is_ascii_uppercase() && next_lower)
                {
                    out.push('_');
                }
            }
            out.push(c.to_ascii_lowercase());
        } else if c == '.' || c == '-' {
            out.push('_');
        } else {
            out.push(c);
        }
    }
    out
}

/// Whether `symbol` is usable as a C identifier.
pub fn valid(symbol: &str) -> bool {
    let mut chars = symbol.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// D-Bus member (method, signal) name rules; property names follow them too.
pub fn valid_member_name(name: &str) -> bool {
    name.len() <= 255 && valid(name)
}

/// D-Bus interface name rules: at least two dot-separated elements, none
/// empty or starting with a digit.
pub fn valid_interface_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 255 {
        return false;
    }
    let elements: Vec<&str> = name.split('.').collect();
    elements.len() >= 2 && elements.iter().all(|e| valid(e))
}

/// Name of a function the runtime calls through a table:
/// `prefix_com_example_Test_Method_method`.
pub fn impl_name(prefix: &str, interface_name: &str, member_name: &str, postfix: &str) -> String {
    format!(
        "{}_{}_{}_{}",
        prefix,
        interface_name.replace('.', "_"),
        member_name,
        postfix
    )
}

/// Name of the interface definition itself: `prefix_com_example_Test`.
pub fn interface_name(prefix: &str, interface_name: &str) -> String {
    format!("{}_{}", prefix, interface_name.replace('.', "_"))
}

/// Name of a function visible to (or provided by) user code:
/// `prefix[_interface]_[midfix_]symbol[_postfix]`.
pub fn extern_name(
    prefix: &str,
    interface_symbol: Option<&str>,
    midfix: Option<&str>,
    symbol: &str,
    postfix: Option<&str>,
) -> String {
    [Some(prefix), interface_symbol, midfix, Some(symbol), postfix]
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// CamelCase type name from the same components as [`extern_name`]:
/// `("my", None, Some("get"), "name", Some("reply"))` → `MyGetNameReply`.
pub fn typedef_name(
    prefix: &str,
    interface_symbol: Option<&str>,
    midfix: Option<&str>,
    symbol: &str,
    postfix: Option<&str>,
) -> String {
    let joined = extern_name(prefix, interface_symbol, midfix, symbol, postfix);
    let mut out = String::with_capacity(joined.len());
    for word in joined.split('_').filter(|w| !w.is_empty()) {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            out.push(first.to_ascii_uppercase());
            out.extend(chars);
        }
    }
    out
}
