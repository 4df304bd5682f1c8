//! Slash-separated object path algebra. Paths are kept in canonical form: no leading or
//! trailing slash and no empty segments; the empty string is the bucket root.

pub fn normalize(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

pub fn parent(path: &str) -> Option<String> {
    if path.is_empty() {
        return None;
    }
    match path.rfind('/') {
        Some(index) => Some(path[..index].to_string()),
        None => Some(String::new()),
    }
}

pub fn child(path: &str, child_path: &str) -> String {
    let canonical_child = normalize(child_path);
    if path.is_empty() {
        canonical_child
    } else if canonical_child.is_empty() {
        path.to_string()
    } else {
        format!("{path}/{canonical_child}")
    }
}

pub fn last_component(path: &str) -> &str {
    match path.rfind('/') {
        Some(index) => &path[index + 1..],
        None => path,
    }
}
