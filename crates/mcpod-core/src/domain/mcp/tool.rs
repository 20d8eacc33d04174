//! Tools discovered on running MCP servers.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Separator between the server and tool parts of a derived tool name.
pub const TOOL_NAME_SEPARATOR: char = '-';

/// A persisted tool discovered on an MCP server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub id: String,
    /// Server the tool was discovered on.
    pub server_id: String,
    /// Globally unique name, see [`derive_tool_name`].
    pub name: String,
    /// Name as reported by the server; used when calling the tool.
    pub raw_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON schema for the tool's arguments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// A tool to be persisted by discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewToolDefinition {
    pub server_id: String,
    pub name: String,
    pub raw_name: String,
    pub description: Option<String>,
    pub input_schema: Option<serde_json::Value>,
}

/// Lowercase `input`, collapsing every run of non-alphanumeric characters
/// into a single `-` and trimming leading/trailing separators.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_separator = false;

    for ch in input.chars() {
        if ch.is_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push(TOOL_NAME_SEPARATOR);
            }
            pending_separator = false;
            slug.extend(ch.to_lowercase());
        } else {
            pending_separator = true;
        }
    }

    slug
}

/// Slug of `input`, or the hex of its bytes when it has no letters or
/// digits, so punctuation-only names stay distinct and non-empty.
fn name_part(input: &str) -> String {
    let slug = slugify(input);
    if !slug.is_empty() {
        return slug;
    }
    let mut hex = String::with_capacity(input.len() * 2);
    for byte in input.bytes() {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

/// Derive the globally unique name of `tool_name` on `server_name`.
///
/// `derive_tool_name("X", "ping") == "x-ping"`. Names are unique across
/// servers as long as no two server names clash, see [`server_names_clash`].
pub fn derive_tool_name(server_name: &str, tool_name: &str) -> String {
    format!(
        "{}{TOOL_NAME_SEPARATOR}{}",
        name_part(server_name),
        name_part(tool_name)
    )
}

/// Whether tools of two servers could derive the same name.
///
/// True when the server prefixes are equal or one extends the other at a
/// separator (`"a"` and `"a b"`). Otherwise `prefix + "-"` of one server is
/// never a prefix of a name derived for the other.
pub fn server_names_clash(a: &str, b: &str) -> bool {
    let (a, b) = (name_part(a), name_part(b));
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    long.strip_prefix(short.as_str())
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(TOOL_NAME_SEPARATOR))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("X"), "x");
        assert_eq!(slugify("GitHub Server"), "github-server");
        assert_eq!(slugify("  read__file  "), "read-file");
        assert_eq!(slugify("a.b/c"), "a-b-c");
        assert_eq!(slugify("---"), "");
    }

    #[test]
    fn test_derive_tool_name() {
        assert_eq!(derive_tool_name("X", "ping"), "x-ping");
        assert_eq!(derive_tool_name("My Files", "list_dir"), "my-files-list-dir");
    }

    #[test]
    fn test_punctuation_only_names_fall_back_to_hex() {
        assert_eq!(derive_tool_name("X", "!!"), "x-2121");
        assert_ne!(derive_tool_name("X", "!!"), derive_tool_name("X", "??"));
        assert_eq!(derive_tool_name("---", "ping"), "2d2d2d-ping");
    }

    #[test]
    fn test_server_names_clash() {
        assert!(server_names_clash("X", "x"));
        assert!(server_names_clash("X", "X!"));
        assert!(server_names_clash("a", "a b"));
        assert!(server_names_clash("a b", "a"));
        assert!(!server_names_clash("a", "ab"));
        assert!(!server_names_clash("GitHub", "Files"));
    }

    #[test]
    fn test_non_clashing_servers_never_share_tool_names() {
        // ("a", "b-c") and ("a b", "c") derive the same name, which is why
        // "a" and "a b" clash.
        assert_eq!(derive_tool_name("a", "b-c"), derive_tool_name("a b", "c"));
        assert!(server_names_clash("a", "a b"));
        assert_ne!(derive_tool_name("a", "b-c"), derive_tool_name("ab", "c"));
    }

    #[test]
    fn test_raw_names_differing_only_in_punctuation_collide() {
        assert_eq!(
            derive_tool_name("fs", "read_file"),
            derive_tool_name("fs", "read-file")
        );
    }
}
