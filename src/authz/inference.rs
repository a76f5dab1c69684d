use axum::http::Method;

use super::{actions, resources};

/// Priority-ordered mapping from URL path segments to canonical resource
/// names. Scanned in declaration order and the first entry whose segment
/// occurs anywhere in the path wins, so this slice is an explicit
/// priority list rather than a lookup map. Child resources that nest
/// under a parent URL (`/organizations/:id/employees`) are registered
/// before their parent so the nested segment takes precedence.
const RESOURCE_SEGMENTS: &[(&str, &str)] = &[
    ("users", resources::USERS),
    ("employees", resources::EMPLOYEES),
    ("organizations", resources::ORGANIZATIONS),
    ("roles", resources::ROLES),
    ("resources", resources::RESOURCES),
    ("actions", resources::ACTIONS),
    ("campaigns", resources::CAMPAIGNS),
    ("contact-lists", resources::CONTACT_LISTS),
    ("contacts", resources::CONTACTS),
    ("templates", resources::TEMPLATES),
    ("assets", resources::ASSETS),
];

/// The `(resource, action)` pair a request maps to. Either side may be
/// absent: an unknown path or method is a valid outcome, and the guard
/// treats it as "cannot classify, skip authorization" rather than an
/// error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteTarget {
    pub resource: Option<&'static str>,
    pub action: Option<&'static str>,
}

pub fn infer(method: &Method, path: &str) -> RouteTarget {
    RouteTarget {
        resource: infer_resource(path),
        action: infer_action(method, path),
    }
}

/// First registered resource whose segment literal appears as a
/// `/`-delimited segment anywhere in the path.
pub fn infer_resource(path: &str) -> Option<&'static str> {
    RESOURCE_SEGMENTS
        .iter()
        .find(|(segment, _)| path.split('/').any(|part| part == *segment))
        .map(|(_, resource)| *resource)
}

/// Action for a method + path. Path-pattern overrides come first and win
/// over the plain method mapping regardless of the verb used.
pub fn infer_action(method: &Method, path: &str) -> Option<&'static str> {
    if path.contains("/restore") {
        return Some(actions::UPDATE);
    }
    if path.contains("/force") {
        return Some(actions::DELETE);
    }
    if path.contains("/export") {
        return Some(actions::EXPORT);
    }
    if path.contains("/import") {
        return Some(actions::IMPORT);
    }

    match method.as_str() {
        "GET" => {
            if is_collection_get(path) {
                Some(actions::LIST)
            } else {
                Some(actions::READ)
            }
        }
        "POST" => Some(actions::CREATE),
        "PUT" | "PATCH" => Some(actions::UPDATE),
        "DELETE" => Some(actions::DELETE),
        _ => None,
    }
}

/// Collection endpoints (`GET /users`) are told apart from
/// single-resource endpoints (`GET /users/:id`) by URL shape alone, since
/// no route metadata is available at this layer. The last path segment is
/// treated as an id when it is purely numeric or longer than ten
/// characters; UUID-style ids pass the length test. The flip side is that
/// a non-id trailing segment longer than ten characters also reads as an
/// id - a known limitation of the heuristic.
fn is_collection_get(path: &str) -> bool {
    let path = strip_query(path);
    let last = path.rsplit('/').next().unwrap_or("");
    !is_identifier(last)
}

fn is_identifier(segment: &str) -> bool {
    let numeric = !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit());
    numeric || segment.len() > 10
}

fn strip_query(path: &str) -> &str {
    match path.split_once('?') {
        Some((path, _)) => path,
        None => path,
    }
}
