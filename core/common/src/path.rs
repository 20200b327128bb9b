//! Mapping between logical paths and backend-absolute keys.

/// Path literal meaning the process's standard input or output.
pub const STDIO_PATH: &str = "-";

/// Resolves logical paths against a work directory.
///
/// The work directory is normalized once by dropping a single leading `/`;
/// absolute keys are that prefix concatenated with the logical path. No
/// separator is inserted, callers place separators the way the backend
/// joins keys.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PathResolver {
    prefix: String,
}

impl PathResolver {
    /// Resolver for `work_dir`, with one leading `/` removed.
    pub fn new(work_dir: &str) -> Self {
        Self {
            prefix: normalize(work_dir).to_string(),
        }
    }

    /// The normalized work directory prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Backend key for a logical path. `-` passes through unchanged.
    pub fn to_absolute(&self, path: &str) -> String {
        if path == STDIO_PATH {
            return path.to_string();
        }
        format!("{}{}", self.prefix, path)
    }

    /// Logical path for a backend key.
    ///
    /// Keys outside the work directory come back unchanged.
    pub fn to_logical(&self, path: &str) -> String {
        if path == STDIO_PATH {
            return path.to_string();
        }
        path.strip_prefix(self.prefix.as_str())
            .unwrap_or(path)
            .to_string()
    }
}

fn normalize(work_dir: &str) -> &str {
    work_dir.strip_prefix('/').unwrap_or(work_dir)
}

/// Resolve `path` against `work_dir`.
pub fn to_absolute(work_dir: &str, path: &str) -> String {
    PathResolver::new(work_dir).to_absolute(path)
}

/// Reverse of [`to_absolute`].
pub fn to_logical(work_dir: &str, path: &str) -> String {
    PathResolver::new(work_dir).to_logical(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_to_absolute_strips_one_leading_slash() {
        assert_eq!(to_absolute("/data/", "a/b.txt"), "data/a/b.txt");
        assert_eq!(to_absolute("//data/", "x"), "/data/x");
        assert_eq!(to_absolute("", "x"), "x");
        assert_eq!(to_absolute("/", "x"), "x");
    }

    #[test]
    fn test_to_logical_missing_prefix_is_unchanged() {
        assert_eq!(to_logical("/data/", "data/a.txt"), "a.txt");
        assert_eq!(to_logical("/data/", "other/a.txt"), "other/a.txt");
    }

    #[test]
    fn test_stdio_path_is_never_prefixed() {
        let resolver = PathResolver::new("/data/");
        assert_eq!(resolver.to_absolute(STDIO_PATH), "-");
        assert_eq!(resolver.to_logical(STDIO_PATH), "-");
    }

    proptest! {
        #[test]
        fn prop_round_trip(work_dir in "/?[a-z]{0,8}/?", path in "[a-z0-9/._]{0,24}") {
            prop_assume!(path != STDIO_PATH);
            let resolver = PathResolver::new(&work_dir);
            let abs = resolver.to_absolute(&path);
            prop_assert_eq!(resolver.to_logical(&abs), path);
        }
    }
}
