// Path utilities for remote tree paths.
// All keys in the cache and index are normalized slash-separated paths.

/// Normalize a remote path: leading `/`, no trailing `/`, no empty or `.`
/// segments. `..` segments pop the previous segment. The root is `"/"`.
pub fn normalize(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// Parent of a normalized path, or `None` for the root.
pub fn parent(path: &str) -> Option<String> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(idx) => Some(path[..idx].to_string()),
        None => None,
    }
}

/// Final segment of a normalized path. The root's name is `""`.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or("")
}

/// Join a normalized directory path with a child name.
pub fn join(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Whether `path` equals `prefix` or lies underneath it.
pub fn is_within(prefix: &str, path: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    path == prefix
        || (path.len() > prefix.len()
            && path.starts_with(prefix)
            && path.as_bytes()[prefix.len()] == b'/')
}

/// Number of segments below the root (`"/"` is depth 0, `"/a/b"` is depth 2).
pub fn depth(path: &str) -> usize {
    if path == "/" {
        0
    } else {
        path.matches('/').count()
    }
}

/// Extension of the final segment, lowercased, if any.
pub fn extension(path: &str) -> Option<String> {
    let name = file_name(path);
    let idx = name.rfind('.')?;
    if idx == 0 || idx + 1 == name.len() {
        return None;
    }
    Some(name[idx + 1..].to_ascii_lowercase())
}

/// Heuristic for paths of unknown kind: a final segment with an extension
/// is assumed to be a file, anything else a directory.
pub fn looks_like_file(path: &str) -> bool {
    extension(path).is_some()
}
