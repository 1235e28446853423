//! Path helpers shared by route registration and lookup.

/// Split a pathname into its non-empty `/`-delimited segments.
///
/// `"/api//dogs/"` yields `["api", "dogs"]`; `"/"` yields nothing.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|segment| !segment.is_empty()).collect()
}

/// Join a controller base path and a handler path into a route path.
///
/// The base loses its trailing `/`, the handler path loses its leading and trailing `/`.
pub fn join_route_path(base_path: &str, path: &str) -> String {
    let base = base_path.strip_suffix('/').unwrap_or(base_path);
    let path = path.strip_prefix('/').unwrap_or(path);
    let path = path.strip_suffix('/').unwrap_or(path);

    let joined = format!("{base}/{path}");
    if joined.starts_with('/') {
        joined
    } else {
        format!("/{joined}")
    }
}

/// Percent-decode a captured path segment, keeping the raw text when it is not valid UTF-8.
pub fn decode_segment(segment: &str) -> String {
    urlencoding::decode(segment)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| segment.to_string())
}
