//! Output assembler: lays generated interfaces out as a C source file and
//! its header.

use crate::ctype::{TypeFunc, TypeStruct};
use crate::interface::InterfaceOutput;

const SOURCE_INCLUDES: &str = "\
#ifdef HAVE_CONFIG_H
# include <config.h>
#endif /* HAVE_CONFIG_H */


#include <dbus/dbus.h>

#include <errno.h>
#include <stdint.h>
#include <string.h>

#include <nih/macros.h>
#include <nih/alloc.h>
#include <nih/string.h>
#include <nih/logging.h>
#include <nih/error.h>

#include <nih-dbus/dbus_error.h>
#include <nih-dbus/dbus_message.h>
#include <nih-dbus/dbus_object.h>
#include <nih-dbus/dbus_pending_data.h>
#include <nih-dbus/dbus_proxy.h>
#include <nih-dbus/errors.h>
";

const HEADER_INCLUDES: &str = "\
#include <dbus/dbus.h>

#include <stdint.h>

#include <nih/macros.h>

#include <nih-dbus/dbus_interface.h>
#include <nih-dbus/dbus_message.h>
#include <nih-dbus/dbus_pending_data.h>
#include <nih-dbus/dbus_proxy.h>
";

fn banner(file_name: &str) -> String {
    format!(
        "/* {file_name}\n\
         \x20*\n\
         \x20* Generated by dbus-stubgen; changes will be lost.\n\
         \x20*/\n\n"
    )
}

/// Include guard for a header file name: `test-object.h` → `DBUS_STUBGEN_TEST_OBJECT_H`.
pub fn include_guard(header_name: &str) -> String {
    let sanitized: String = header_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("DBUS_STUBGEN_{sanitized}")
}

fn node_name(prefix: &str) -> String {
    format!("{prefix}_interfaces")
}

fn prototypes<'a>(funcs: impl Iterator<Item = &'a TypeFunc>, storage: Option<&str>) -> String {
    funcs
        .map(|f| f.prototype(storage))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_source(
    prefix: &str,
    source_name: &str,
    header_name: &str,
    interfaces: &[InterfaceOutput],
) -> String {
    let mut out = banner(source_name);
    out.push_str(SOURCE_INCLUDES);
    out.push_str(&format!("\n#include \"{header_name}\"\n\n\n"));

    let statics = prototypes(
        interfaces.iter().flat_map(|i| i.members.prototypes.iter()),
        Some("static"),
    );
    if !statics.is_empty() {
        out.push_str("/* Prototypes for static functions */\n");
        out.push_str(&statics);
        out.push_str("\n\n");
    }

    let handlers = prototypes(
        interfaces.iter().flat_map(|i| i.members.handlers.iter()),
        Some("extern"),
    );
    if !handlers.is_empty() {
        out.push_str("/* Prototypes for externally implemented handler functions */\n");
        out.push_str(&handlers);
        out.push_str("\n\n");
    }

    for iface in interfaces {
        out.push_str(&iface.tables);
        out.push('\n');
    }

    out.push_str(&format!(
        "const NihDBusInterface *{}[] = {{\n",
        node_name(prefix)
    ));
    for iface in interfaces {
        out.push_str(&format!("\t&{},\n", iface.name));
    }
    out.push_str("\tNULL\n};\n");

    for iface in interfaces {
        for func in &iface.members.functions {
            out.push_str("\n\n");
            out.push_str(&func.definition());
        }
    }
    out
}

pub fn render_header(prefix: &str, header_name: &str, interfaces: &[InterfaceOutput]) -> String {
    let guard = include_guard(header_name);
    let mut out = banner(header_name);
    out.push_str(&format!("#ifndef {guard}\n#define {guard}\n\n"));
    out.push_str(HEADER_INCLUDES);
    out.push('\n');

    let mut structs: Vec<&TypeStruct> = Vec::new();
    for iface in interfaces {
        for s in &iface.members.structs {
            if !structs.contains(&s) {
                structs.push(s);
            }
        }
    }
    for s in &structs {
        out.push('\n');
        out.push_str(&s.definition());
    }
    if !structs.is_empty() {
        out.push('\n');
    }

    let typedefs: Vec<String> = interfaces
        .iter()
        .flat_map(|i| i.members.typedefs.iter())
        .map(TypeFunc::typedef)
        .collect();
    if !typedefs.is_empty() {
        out.push('\n');
        out.push_str(&typedefs.join("\n"));
        out.push('\n');
    }

    out.push_str("\nNIH_BEGIN_EXTERN\n\n");
    for iface in interfaces {
        out.push_str(&format!("extern const NihDBusInterface {};\n", iface.name));
    }
    out.push_str(&format!(
        "extern const NihDBusInterface *{}[];\n",
        node_name(prefix)
    ));

    let externs = prototypes(
        interfaces.iter().flat_map(|i| i.members.externs.iter()),
        None,
    );
    if !externs.is_empty() {
        out.push('\n');
        out.push_str(&externs);
    }

    out.push_str(&format!("\nNIH_END_EXTERN\n\n#endif /* {guard} */\n"));
    out
}
