//! The Role Store: a small `Storage` abstraction over a key/value
//! layer, plus typed accessors that re-run Config/Role validation on
//! every write.

use std::collections::HashMap;
use std::io;
use std::sync::Mutex;

use crate::config::Config;
use crate::error::CoreError;
use crate::role::Role;

/// The key/value layer backing persisted Config and Role records.
pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> io::Result<Option<Vec<u8>>>;
    fn put(&self, key: &str, bytes: &[u8]) -> io::Result<()>;
    fn delete(&self, key: &str) -> io::Result<()>;
    fn list(&self, prefix: &str) -> io::Result<Vec<String>>;
}

/// An in-memory `Storage`, for unit tests and examples.
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().expect("memory storage mutex poisoned").get(key).cloned())
    }

    fn put(&self, key: &str, bytes: &[u8]) -> io::Result<()> {
        self.entries
            .lock()
            .expect("memory storage mutex poisoned")
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> io::Result<()> {
        self.entries.lock().expect("memory storage mutex poisoned").remove(key);
        Ok(())
    }

    fn list(&self, prefix: &str) -> io::Result<Vec<String>> {
        Ok(self
            .entries
            .lock()
            .expect("memory storage mutex poisoned")
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// A `Storage` backed by one file per key under a state directory, one
/// JSON object per role. Writes are atomic: the new content lands in a
/// `tempfile` in the same directory, then is renamed over the target.
pub struct FileStorage {
    root: camino::Utf8PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<camino::Utf8PathBuf>) -> io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Escape `key` into a filesystem-safe file name: `/` becomes `_`, so
    /// `role/alpha` lands at `<root>/role_alpha`.
    fn path_for(&self, key: &str) -> camino::Utf8PathBuf {
        let escaped: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
            .collect();
        self.root.join(escaped)
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        match std::fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn put(&self, key: &str, bytes: &[u8]) -> io::Result<()> {
        let target = self.path_for(key);
        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)?;
        use std::io::Write;
        tmp.write_all(bytes)?;
        tmp.persist(target.as_std_path()).map_err(|e| e.error)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> io::Result<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn list(&self, prefix: &str) -> io::Result<Vec<String>> {
        let escaped_prefix: String = prefix
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
            .collect();
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(&escaped_prefix) {
                out.push(name.into_owned());
            }
        }
        Ok(out)
    }
}

const CONFIG_KEY: &str = "config";
const ROLE_PREFIX: &str = "role_";

/// Typed access to `Config`/`Role` records over a `Storage`, re-validating
/// every write before it reaches storage.
pub struct RoleStore {
    storage: Box<dyn Storage>,
}

impl RoleStore {
    pub fn new(storage: impl Storage + 'static) -> Self {
        Self { storage: Box::new(storage) }
    }

    pub fn get_config(&self) -> Result<Option<Config>, CoreError> {
        let Some(bytes) = self.storage.get(CONFIG_KEY).map_err(io_err)? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes).map(Some).map_err(deserialize_err)
    }

    pub fn put_config(&self, config: &Config) -> Result<(), CoreError> {
        config.validate()?;
        let bytes = serde_json::to_vec(config).map_err(serialize_err)?;
        self.storage.put(CONFIG_KEY, &bytes).map_err(io_err)
    }

    pub fn delete_config(&self) -> Result<(), CoreError> {
        self.storage.delete(CONFIG_KEY).map_err(io_err)
    }

    pub fn get_role(&self, name: &str) -> Result<Option<Role>, CoreError> {
        let Some(bytes) = self.storage.get(&role_key(name)).map_err(io_err)? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes).map(Some).map_err(deserialize_err)
    }

    pub fn put_role(&self, role: &Role) -> Result<(), CoreError> {
        role.validate()?;
        let bytes = serde_json::to_vec(role).map_err(serialize_err)?;
        self.storage.put(&role_key(&role.name), &bytes).map_err(io_err)
    }

    pub fn delete_role(&self, name: &str) -> Result<(), CoreError> {
        self.storage.delete(&role_key(name)).map_err(io_err)
    }

    pub fn list_roles(&self) -> Result<Vec<String>, CoreError> {
        let keys = self.storage.list(ROLE_PREFIX).map_err(io_err)?;
        Ok(keys.into_iter().filter_map(|k| k.strip_prefix(ROLE_PREFIX).map(str::to_string)).collect())
    }
}

fn role_key(name: &str) -> String {
    format!("{ROLE_PREFIX}{name}")
}

fn io_err(e: io::Error) -> CoreError {
    CoreError::internal(format!("persistence I/O error: {e}"))
}

fn serialize_err(e: serde_json::Error) -> CoreError {
    CoreError::internal(format!("serialization error: {e}"))
}

fn deserialize_err(e: serde_json::Error) -> CoreError {
    CoreError::internal(format!("deserialization error: {e}"))
}
