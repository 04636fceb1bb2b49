//! Engine text formats: the graph description we write and the line-oriented
//! "plain" output we read back.

mod description;
mod plain;

pub use description::to_dot;
pub use plain::{parse_plain, PlainLayout};

/// Wraps an identifier in double quotes, escaping quotes and backslashes.
pub(crate) fn quote(id: &str) -> String {
    let mut quoted = String::with_capacity(id.len() + 2);
    quoted.push('"');
    for ch in id.chars() {
        if ch == '"' || ch == '\\' {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}
