//! Debug traces over promise graphs.
//!
//! A trace is a newline-separated list of node type names, produced by
//! walking from a node down through its dependencies. Traces have no
//! semantic effect; they exist so that a stuck promise can be asked what it
//! is waiting on.

/// Walkable participant in a promise graph.
///
/// Implementors push their own (shortened) type name and then recurse into
/// whatever node they are currently waiting on.
pub(crate) trait Trace {
    fn append_trace(&self, out: &mut Vec<&'static str>);
}

/// Strip the module path from a `std::any::type_name` rendering.
///
/// Generic arguments keep their full paths; only the leading path of the
/// outer type is removed.
pub(crate) fn short_name(full: &'static str) -> &'static str {
    let end = full.find('<').unwrap_or(full.len());
    match full[..end].rfind("::") {
        Some(idx) => &full[idx + 2..],
        None => full,
    }
}

pub(crate) fn format_trace(parts: &[&'static str]) -> String {
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_module_paths() {
        assert_eq!(short_name("pledge::node::chain::ChainNode<i32>"), "ChainNode<i32>");
        assert_eq!(short_name("alloc::string::String"), "String");
        assert_eq!(short_name("u64"), "u64");
    }
}
