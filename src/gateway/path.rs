//! Request path classification and breadcrumb derivation

/// Separator between key components
pub const SEPARATOR: char = '/';

/// What a request path addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Directory,
    File,
}

/// How a directory is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    /// Directory-browser page from the asset host
    Html,
    /// JSON snapshot
    Api,
}

/// Classify a store key: empty or separator-terminated keys are directories
pub fn classify(path: &str) -> Target {
    if path.is_empty() || path.ends_with(SEPARATOR) {
        Target::Directory
    } else {
        Target::File
    }
}

/// A request path resolved into a store key on both decision axes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub key: String,
    pub target: Target,
    pub view: View,
}

impl Route {
    /// Resolve a decoded request path (without the leading `/`)
    ///
    /// `api_query` is set when the request carried `?api`. When `api_prefix`
    /// is configured, paths under it select the JSON view with the prefix
    /// stripped from the key.
    pub fn resolve(path: &str, api_query: bool, api_prefix: Option<&str>) -> Self {
        let (key, via_prefix) = match api_prefix.and_then(|p| strip_api_prefix(path, p)) {
            Some(rest) => (rest, true),
            None => (path, false),
        };

        Self {
            key: key.to_string(),
            target: classify(key),
            view: if api_query || via_prefix { View::Api } else { View::Html },
        }
    }
}

fn strip_api_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        return Some(rest);
    }
    rest.strip_prefix(SEPARATOR)
}

/// Display name of a common prefix: its last non-empty segment
///
/// `docs/img/` is named `img`; a prefix whose second-to-last segment is
/// empty is named by itself.
pub fn directory_name(prefix: &str) -> &str {
    let segments: Vec<&str> = prefix.split(SEPARATOR).collect();
    let name = if segments.len() >= 2 {
        segments[segments.len() - 2]
    } else {
        segments[0]
    };
    if name.is_empty() { prefix } else { name }
}

/// Display name of an object: its final segment, or the key itself
pub fn object_name(key: &str) -> &str {
    match key.rsplit(SEPARATOR).next() {
        Some(name) if !name.is_empty() => name,
        _ => key,
    }
}

/// Absolute display form of a key
pub fn display_path(key: &str) -> String {
    format!("{}{}", SEPARATOR, key)
}

/// Parent of a directory prefix in display form
///
/// `""` has no parent, a single-segment prefix's parent is `/`, and
/// `a/b/c/` climbs to `/a/b/`.
pub fn parent_of(prefix: &str) -> Option<String> {
    if prefix.is_empty() {
        return None;
    }

    let non_empty = prefix.split(SEPARATOR).filter(|s| !s.is_empty()).count();
    if non_empty <= 1 {
        return Some(SEPARATOR.to_string());
    }

    let segments: Vec<&str> = prefix.split(SEPARATOR).collect();
    let kept = &segments[..segments.len().saturating_sub(2)];
    Some(format!("{}{}{}", SEPARATOR, kept.join("/"), SEPARATOR))
}

/// Key prefixes hidden from browsing and retrieval
#[derive(Debug, Clone, Default)]
pub struct DenyList {
    prefixes: Vec<String>,
}

impl DenyList {
    pub fn new(prefixes: impl IntoIterator<Item = String>) -> Self {
        Self {
            prefixes: prefixes.into_iter().filter(|p| !p.is_empty()).collect(),
        }
    }

    /// Check whether a key or prefix falls under a denied prefix
    pub fn is_denied(&self, key: &str) -> bool {
        self.prefixes.iter().any(|p| key.starts_with(p.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}
