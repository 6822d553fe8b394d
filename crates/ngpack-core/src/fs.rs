use rustc_hash::FxHashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;

/// File system access used by the compiler host and transformation workers
pub trait FileSystem: Send + Sync {
    fn read_file(&self, path: &Path) -> io::Result<String>;
    fn exists(&self, path: &Path) -> bool;

    fn read_bytes(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.read_file(path).map(String::into_bytes)
    }

    /// Follows symlinks unless the caller preserves them
    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        Ok(path.to_path_buf())
    }
}

/// Production file system backed by `std::fs`
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFileSystem;

impl RealFileSystem {
    pub fn new() -> Self {
        RealFileSystem
    }
}

impl FileSystem for RealFileSystem {
    fn read_file(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn read_bytes(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        std::fs::canonicalize(path)
    }
}

/// In-memory file system for tests. Files may be replaced between builds.
#[derive(Debug, Default)]
pub struct MockFileSystem {
    files: RwLock<FxHashMap<PathBuf, String>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: impl Into<PathBuf>, content: impl Into<String>) {
        self.files
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(path.into(), content.into());
    }

    pub fn remove_file(&self, path: &Path) -> bool {
        self.files
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(path)
            .is_some()
    }
}

impl FileSystem for MockFileSystem {
    fn read_file(&self, path: &Path) -> io::Result<String> {
        self.files
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(path)
            .cloned()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("File not found: {}", path.display()),
                )
            })
    }

    fn exists(&self, path: &Path) -> bool {
        self.files
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(path)
    }
}

/// Replace Windows separators so every cache key uses `/`
pub fn normalize_path(path: &Path) -> PathBuf {
    let text = path.to_string_lossy();
    if text.contains('\\') {
        PathBuf::from(text.replace('\\', "/"))
    } else {
        path.to_path_buf()
    }
}

/// `base` joined with `relative`, resolving `.` and `..` without touching
/// the file system
pub fn lexical_join(base: &Path, relative: &str) -> PathBuf {
    let mut joined = PathBuf::new();
    for component in base.join(relative).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                joined.pop();
            }
            other => joined.push(other.as_os_str()),
        }
    }
    joined
}

/// `file://` URL of an absolute path, used as the key of emitted modules
pub fn path_to_file_url(path: &Path) -> String {
    let normalized = normalize_path(path);
    let text = normalized.to_string_lossy();
    if text.starts_with('/') {
        format!("file://{}", text)
    } else {
        format!("file:///{}", text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lexical_join_resolves_dot_segments() {
        assert_eq!(
            lexical_join(Path::new("/src/app"), "./app.component.html"),
            PathBuf::from("/src/app/app.component.html")
        );
        assert_eq!(
            lexical_join(Path::new("/src/app"), "../styles/_theme.scss"),
            PathBuf::from("/src/styles/_theme.scss")
        );
    }

    #[test]
    fn test_mock_file_system() {
        let fs = MockFileSystem::new();
        fs.add_file("/src/main.ts", "export {};");

        assert!(fs.exists(Path::new("/src/main.ts")));
        assert_eq!(fs.read_file(Path::new("/src/main.ts")).unwrap(), "export {};");

        let missing = fs.read_file(Path::new("/src/other.ts")).unwrap_err();
        assert_eq!(missing.kind(), io::ErrorKind::NotFound);

        assert!(fs.remove_file(Path::new("/src/main.ts")));
        assert!(!fs.exists(Path::new("/src/main.ts")));
    }

    #[test]
    fn test_real_file_system_reads_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.js");
        std::fs::write(&path, "let a;").unwrap();

        let fs = RealFileSystem::new();
        assert!(fs.exists(&path));
        assert_eq!(fs.read_bytes(&path).unwrap(), b"let a;");
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("C:\\app\\main.ts")),
            PathBuf::from("C:/app/main.ts")
        );
        assert_eq!(normalize_path(Path::new("/app/main.ts")), PathBuf::from("/app/main.ts"));
    }

    #[test]
    fn test_path_to_file_url() {
        assert_eq!(path_to_file_url(Path::new("/app/main.ts")), "file:///app/main.ts");
        assert_eq!(
            path_to_file_url(Path::new("C:\\app\\main.ts")),
            "file:///C:/app/main.ts"
        );
    }
}
