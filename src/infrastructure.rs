pub mod flat_file;
pub mod journal;

use std::{fs, io, path::Path};

use tracing::warn;

use crate::domain::DataAccessError;

impl From<serde_json::Error> for DataAccessError {
    fn from(value: serde_json::Error) -> Self {
        DataAccessError::ClientSideError(Box::new(value))
    }
}

/// Contents of `path`, or `None` when the file does not exist yet.
fn read_optional(path: &Path) -> Result<Option<String>, DataAccessError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "file not found, starting empty");
            Ok(None)
        }
        Err(e) => Err(DataAccessError::ReadError(Box::new(e))),
    }
}

fn create_parent(path: &Path) -> Result<(), DataAccessError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| DataAccessError::WriteError(Box::new(e)))
        }
        _ => Ok(()),
    }
}

fn write_file(path: &Path, content: &str) -> Result<(), DataAccessError> {
    create_parent(path)?;
    fs::write(path, content).map_err(|e| DataAccessError::WriteError(Box::new(e)))
}
