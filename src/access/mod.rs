//! Access level, namespace-scoped name resolution, and the access matrix
//! (spec §4.4 "Access & Namespace"), grounded in
//! `examples/original_source/src/client.cpp`'s `ResolveName`/`CanControl`.

use crate::error::{DaemonError, ErrorCode};

/// The most permissive operation allowed to a client inside its origin
/// container; propagated as the minimum down the ancestor chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AccessLevel {
    None,
    ReadOnly,
    Normal,
    SelfIsolate,
    SuperUser,
    Internal,
}

impl AccessLevel {
    pub fn can_read(self) -> bool {
        self >= AccessLevel::ReadOnly
    }

    pub fn can_write(self) -> bool {
        self > AccessLevel::ReadOnly
    }

    pub fn is_superuser(self) -> bool {
        self >= AccessLevel::SuperUser
    }
}

/// Resolve a client-supplied relative name against the client's porto
/// namespace prefix and origin container, per spec §4.4's four-clause
/// grammar:
///
/// - `/` is root.
/// - `self` (or `self/<rest>`) is rooted at the origin container, unless
///   the origin is root, in which case it's just `<rest>`.
/// - `.` is the parent of the namespace.
/// - names starting with `/porto/` are rooted absolute.
/// - everything else is prefixed by the namespace.
///
/// The resolved name must then lie within the namespace, within the
/// origin container's subtree, be an ancestor of the origin container, or
/// be root — otherwise this returns `Permission`.
pub fn resolve_name(raw: &str, namespace: &str, origin: &str) -> Result<String, DaemonError> {
    let rewritten = if raw == "/" {
        "/".to_string()
    } else if raw == "self" {
        origin.to_string()
    } else if let Some(rest) = raw.strip_prefix("self/") {
        if origin == "/" {
            rest.to_string()
        } else {
            format!("{}/{}", origin, rest)
        }
    } else if raw == "." {
        parent_of(namespace).unwrap_or_else(|| "/".to_string())
    } else if let Some(rest) = raw.strip_prefix("/porto/") {
        format!("/{}", rest)
    } else if raw.starts_with('/') {
        raw.to_string()
    } else {
        join(namespace, raw)
    };

    let resolved = normalize(&rewritten);

    let in_namespace = namespace == "/" || resolved == namespace || is_subtree_of(&resolved, namespace);
    let in_origin_subtree = resolved == origin || is_subtree_of(&resolved, origin);
    let ancestor_of_origin = is_subtree_of(origin, &resolved) || resolved == "/";

    if in_namespace || in_origin_subtree || ancestor_of_origin || resolved == "/" {
        Ok(resolved)
    } else {
        Err(DaemonError::new(ErrorCode::Permission, format!("{} is out of namespace", raw)))
    }
}

/// `child` lies strictly under `ancestor` (`ancestor` followed by `/`).
pub fn is_subtree_of(child: &str, ancestor: &str) -> bool {
    if ancestor == "/" {
        return child != "/";
    }
    child.starts_with(ancestor) && child.as_bytes().get(ancestor.len()) == Some(&b'/')
}

pub fn parent_of(name: &str) -> Option<String> {
    if name == "/" {
        return None;
    }
    match name.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(idx) => Some(name[..idx].to_string()),
        None => Some("/".to_string()),
    }
}

fn join(namespace: &str, rest: &str) -> String {
    if namespace == "/" {
        format!("/{}", rest)
    } else {
        format!("{}/{}", namespace, rest)
    }
}

/// Collapse `.`/`..` path segments the way a dotted container name would
/// be normalized.
fn normalize(name: &str) -> String {
    if name == "/" {
        return "/".to_string();
    }
    let mut stack: Vec<&str> = Vec::new();
    for seg in name.trim_start_matches('/').split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            s => stack.push(s),
        }
    }
    if stack.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", stack.join("/"))
    }
}

/// Required access level per operation (spec §4.4 access control matrix).
pub fn required_level_for_read() -> AccessLevel {
    AccessLevel::ReadOnly
}

pub fn required_level_for_write() -> AccessLevel {
    AccessLevel::Normal
}

/// Whether a caller with the given credential and group memberships may
/// modify a resource it does not own.
pub fn can_modify_foreign(
    caller_uid: u32,
    caller_groups: &[String],
    owner_uid: u32,
    privileged_groups: &[String],
    is_superuser: bool,
) -> bool {
    if is_superuser || caller_uid == owner_uid {
        return true;
    }
    caller_groups.iter().any(|g| privileged_groups.contains(g))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_rewrites_to_origin() {
        assert_eq!(resolve_name("self", "/", "/a/b").unwrap(), "/a/b");
    }

    #[test]
    fn self_slash_rest_roots_at_origin() {
        assert_eq!(resolve_name("self/c", "/", "/a/b").unwrap(), "/a/b/c");
    }

    #[test]
    fn self_slash_rest_from_root_origin_is_just_rest() {
        assert_eq!(resolve_name("self/c", "/", "/").unwrap(), "/c");
    }

    #[test]
    fn bare_name_is_prefixed_by_namespace() {
        assert_eq!(resolve_name("x", "/ns", "/ns/origin").unwrap(), "/ns/x");
    }

    #[test]
    fn ancestor_of_origin_is_reachable() {
        assert_eq!(resolve_name("/ns", "/ns", "/ns/origin").unwrap(), "/ns");
    }

    #[test]
    fn outside_namespace_and_not_ancestor_is_permission_error() {
        let err = resolve_name("/other", "/ns", "/ns/origin").unwrap_err();
        assert_eq!(err.code(), ErrorCode::Permission);
    }

    #[test]
    fn dot_resolves_to_namespace_parent() {
        assert_eq!(resolve_name(".", "/ns/sub", "/ns/sub/origin").unwrap(), "/ns");
    }
}
