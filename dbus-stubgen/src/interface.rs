//! Interface assembler: every member's functions plus the runtime tables
//! describing the interface.

use tracing::info;

use crate::member::MemberOutput;
use crate::model::{Argument, Direction, Interface, Mode};
use crate::{method, property, signal, symbol};

/// Generated output for one interface.
#[derive(Debug, Clone)]
pub struct InterfaceOutput {
    /// C name of the `NihDBusInterface` definition.
    pub name: String,
    pub members: MemberOutput,
    /// Argument, member and interface tables.
    pub tables: String,
}

pub fn generate(prefix: &str, interface: &Interface, mode: Mode) -> InterfaceOutput {
    info!(
        interface = %interface.name,
        methods = interface.methods.len(),
        signals = interface.signals.len(),
        properties = interface.properties.len(),
        "generating interface"
    );

    let mut members = MemberOutput::default();
    for m in &interface.methods {
        members.extend(method::generate(prefix, interface, m, mode));
    }
    for s in &interface.signals {
        members.extend(signal::generate(prefix, interface, s, mode));
    }
    for p in &interface.properties {
        members.extend(property::generate(prefix, interface, p, mode));
    }

    InterfaceOutput {
        name: symbol::interface_name(prefix, &interface.name),
        members,
        tables: tables(prefix, interface, mode),
    }
}

fn quoted(s: &str) -> String {
    format!("\"{s}\"")
}

/// Rows of a `{ NULL }`-terminated initializer, columns aligned.
fn table_rows(rows: &[Vec<String>]) -> String {
    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
    let widths: Vec<usize> = (0..columns)
        .map(|c| {
            rows.iter()
                .filter_map(|r| r.get(c))
                .map(String::len)
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = String::new();
    for row in rows {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                if i + 1 < row.len() {
                    format!("{:<w$}", format!("{cell},"), w = widths[i] + 1)
                } else {
                    format!("{:<w$}", cell, w = widths[i])
                }
            })
            .collect();
        out.push_str(&format!("\t{{ {} }},\n", cells.join(" ")));
    }
    out.push_str("\t{ NULL }\n");
    out
}

fn table(ctype: &str, name: &str, rows: &[Vec<String>]) -> String {
    format!(
        "static const {ctype} {name}[] = {{\n{}}};\n",
        table_rows(rows)
    )
}

fn arg_table(name: &str, args: &[Argument]) -> String {
    let rows: Vec<Vec<String>> = args
        .iter()
        .map(|a| {
            vec![
                a.name.as_deref().map_or_else(|| "NULL".to_string(), quoted),
                quoted(&a.ty.signature()),
                match a.direction {
                    Direction::In => "NIH_DBUS_ARG_IN".to_string(),
                    Direction::Out => "NIH_DBUS_ARG_OUT".to_string(),
                },
            ]
        })
        .collect();
    table("NihDBusArg", name, &rows)
}

fn or_null(present: bool, name: String) -> String {
    if present { name } else { "NULL".to_string() }
}

fn tables(prefix: &str, interface: &Interface, mode: Mode) -> String {
    let base = symbol::interface_name(prefix, &interface.name);
    let object = mode == Mode::Object;
    let mut out = String::new();

    let mut method_rows = Vec::new();
    for m in &interface.methods {
        let args = symbol::impl_name(prefix, &interface.name, &m.name, "method_args");
        out.push_str(&arg_table(&args, &m.args));
        out.push('\n');
        method_rows.push(vec![
            quoted(&m.name),
            args,
            or_null(object, symbol::impl_name(prefix, &interface.name, &m.name, "method")),
        ]);
    }

    let mut signal_rows = Vec::new();
    for s in &interface.signals {
        let args = symbol::impl_name(prefix, &interface.name, &s.name, "signal_args");
        out.push_str(&arg_table(&args, &s.args));
        out.push('\n');
        signal_rows.push(vec![
            quoted(&s.name),
            args,
            or_null(!object, symbol::impl_name(prefix, &interface.name, &s.name, "signal")),
        ]);
    }

    let property_rows: Vec<Vec<String>> = interface
        .properties
        .iter()
        .map(|p| {
            vec![
                quoted(&p.name),
                quoted(&p.ty.signature()),
                p.access.nih_const().to_string(),
                or_null(
                    object && p.access.readable(),
                    symbol::impl_name(prefix, &interface.name, &p.name, "get"),
                ),
                or_null(
                    object && p.access.writable(),
                    symbol::impl_name(prefix, &interface.name, &p.name, "set"),
                ),
            ]
        })
        .collect();

    out.push_str(&table("NihDBusMethod", &format!("{base}_methods"), &method_rows));
    out.push('\n');
    out.push_str(&table("NihDBusSignal", &format!("{base}_signals"), &signal_rows));
    out.push('\n');
    out.push_str(&table(
        "NihDBusProperty",
        &format!("{base}_properties"),
        &property_rows,
    ));
    out.push('\n');
    out.push_str(&format!(
        "const NihDBusInterface {base} = {{\n\
         \t\"{}\",\n\
         \t{base}_methods,\n\
         \t{base}_signals,\n\
         \t{base}_properties\n\
         }};\n",
        interface.name
    ));
    out
}
