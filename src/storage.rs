use std::path::PathBuf;

pub trait StorageManager: Send + Sync {
    fn write(&self, ident: &str, data: &[u8]) -> std::io::Result<()>;
    fn read(&self, ident: &str) -> std::io::Result<Vec<u8>>;
    fn exists(&self, ident: &str) -> bool;
    fn delete(&self, ident: &str) -> std::io::Result<()>;
    fn list(&self) -> Vec<String>;
}

#[derive(Clone)]
pub struct BackendLocal {
    pub base_dir: PathBuf,
}

impl BackendLocal {
    pub fn new(storage_dir: &str) -> std::io::Result<Self> {
        let path = PathBuf::from(storage_dir);
        std::fs::create_dir_all(&path)?;
        Ok(BackendLocal { base_dir: path })
    }
}

impl StorageManager for BackendLocal {
    fn exists(&self, ident: &str) -> bool {
        std::fs::metadata(self.base_dir.join(ident)).is_ok()
    }

    fn read(&self, ident: &str) -> std::io::Result<Vec<u8>> {
        std::fs::read(self.base_dir.join(ident))
    }

    fn write(&self, ident: &str, data: &[u8]) -> std::io::Result<()> {
        let path = self.base_dir.join(ident);
        // unique temp name so concurrent writers never clobber each other
        let temp_path = self
            .base_dir
            .join(format!("{}-{ident}", rusty_ulid::generate_ulid_string()));

        std::fs::write(&temp_path, data)?;

        std::fs::rename(&temp_path, &path)
    }

    fn delete(&self, ident: &str) -> std::io::Result<()> {
        std::fs::remove_file(self.base_dir.join(ident))
    }

    fn list(&self) -> Vec<String> {
        std::fs::read_dir(&self.base_dir)
            .map(|entries| {
                entries
                    .filter_map(|entry| entry.ok())
                    .filter_map(|entry| {
                        let path = entry.path();
                        if path.is_file() {
                            path.file_name()
                                .and_then(|name| name.to_str())
                                .map(|s| s.to_string())
                        } else {
                            None
                        }
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = BackendLocal::new(dir.path().to_str().unwrap()).unwrap();

        backend.write("snapshot.json", b"{\"posts\":[]}").unwrap();
        assert!(backend.exists("snapshot.json"));
        assert_eq!(backend.read("snapshot.json").unwrap(), b"{\"posts\":[]}");
    }

    #[test]
    fn test_write_replaces_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let backend = BackendLocal::new(dir.path().to_str().unwrap()).unwrap();

        backend.write("state", b"old").unwrap();
        backend.write("state", b"new").unwrap();
        assert_eq!(backend.read("state").unwrap(), b"new");

        // no stray temp files left behind
        assert_eq!(backend.list(), vec!["state".to_string()]);
    }

    #[test]
    fn test_delete_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let backend = BackendLocal::new(dir.path().to_str().unwrap()).unwrap();

        backend.write("a", b"1").unwrap();
        backend.write("b", b"2").unwrap();

        let mut names = backend.list();
        names.sort();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);

        backend.delete("a").unwrap();
        assert!(!backend.exists("a"));
        assert!(backend.exists("b"));
    }
}
