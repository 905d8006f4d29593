//! Wire type-tag strings of OSC argument lists
//!
//! The characters match [`param_map::Variant::type_tag`], so a message's
//! tags can be compared directly with a parameter's stored type string.

use rosc::OscType;

fn write_tag(arg: &OscType, out: &mut String) {
    match arg {
        OscType::Int(_) => out.push('i'),
        OscType::Float(_) => out.push('f'),
        OscType::String(_) => out.push('s'),
        OscType::Blob(_) => out.push('b'),
        OscType::Time(_) => out.push('t'),
        OscType::Long(_) => out.push('h'),
        OscType::Double(_) => out.push('d'),
        OscType::Char(_) => out.push('c'),
        OscType::Color(_) => out.push('r'),
        OscType::Midi(_) => out.push('m'),
        OscType::Bool(true) => out.push('T'),
        OscType::Bool(false) => out.push('F'),
        OscType::Nil => out.push('N'),
        OscType::Inf => out.push('I'),
        OscType::Array(array) => {
            out.push('[');
            for item in &array.content {
                write_tag(item, out);
            }
            out.push(']');
        }
    }
}

/// Concatenated type tags of `args`, without the leading `,`
pub fn osc_type_tags(args: &[OscType]) -> String {
    let mut out = String::new();
    for arg in args {
        write_tag(arg, &mut out);
    }
    out
}
