use serde::de::DeserializeOwned;
use serde::Serialize;
use smartpick_core::{SmartpickError, SmartpickResult};
use std::path::Path;

/// Load a JSON document, creating it from `T::default()` when absent.
///
/// A document that exists but does not parse is a configuration error.
pub(crate) fn load_or_create<T>(path: &Path, what: &str) -> SmartpickResult<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    match std::fs::read_to_string(path) {
        Ok(raw) if raw.trim().is_empty() => Ok(T::default()),
        Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
            SmartpickError::Config(format!("Corrupt {what} '{}': {e}", path.display()))
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let fresh = T::default();
            write_atomic(path, &fresh)?;
            Ok(fresh)
        }
        Err(e) => Err(e.into()),
    }
}

/// Serialize `value` to a sibling temp file, then rename it over `path`.
pub(crate) fn write_atomic<T: Serialize>(path: &Path, value: &T) -> SmartpickResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    std::fs::write(&tmp, serde_json::to_vec(value)?)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
