use std::fs;
use std::io;
use std::path::{ Path, PathBuf };

use log::debug;
use serde::{ Serialize, Deserialize };

/// The globally selected chatbot, persisted so it survives restarts. Drives
/// which feed subscription is open and which REST calls are scoped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedChatbot {
    pub id: String,
    pub name: String,
}

/// Durable storage for the selection: one small JSON file.
pub struct SelectionStore {
    path: PathBuf,
}

impl SelectionStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    /// A missing or unreadable file just means no prior selection.
    pub fn load(&self) -> Option<SelectedChatbot> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) => {
                debug!("No persisted selection at {}: {}", self.path.display(), e);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(selection) => Some(selection),
            Err(e) => {
                debug!("Ignoring corrupt selection file {}: {}", self.path.display(), e);
                None
            }
        }
    }

    pub fn save(&self, selection: &SelectedChatbot) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(selection)?;
        fs::write(&self.path, json)
    }

    pub fn clear(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("veritas-selection-{}-{}", name, uuid::Uuid::new_v4()))
    }

    #[test]
    fn save_then_load_round_trips() {
        let path = temp_path("roundtrip");
        let store = SelectionStore::new(&path);
        let selection = SelectedChatbot { id: "bot-1".to_string(), name: "Support".to_string() };
        store.save(&selection).unwrap();
        assert_eq!(store.load().unwrap(), selection);
        store.clear().unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn missing_file_loads_as_none() {
        let store = SelectionStore::new(temp_path("missing"));
        assert!(store.load().is_none());
    }

    #[test]
    fn corrupt_file_loads_as_none() {
        let path = temp_path("corrupt");
        fs::write(&path, "not json").unwrap();
        let store = SelectionStore::new(&path);
        assert!(store.load().is_none());
        store.clear().unwrap();
    }
}
