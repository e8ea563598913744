//! JSON export of a finished atlas.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::info;

use crate::error::GenError;
use crate::world::WorldMap;

/// Write `map` as compact JSON to `path`.
pub fn export_json(map: &WorldMap, path: impl AsRef<Path>) -> Result<(), GenError> {
    let path = path.as_ref();
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, map)?;
    writer.flush()?;
    info!(path = %path.display(), "atlas exported");
    Ok(())
}

/// The same document as [`export_json`], in memory.
pub fn to_json_string(map: &WorldMap) -> Result<String, GenError> {
    Ok(serde_json::to_string(map)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::generate;

    #[test]
    fn test_export_writes_parseable_json() {
        let map = generate(48, 48, 7).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("atlas.json");
        export_json(&map, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["width"], 48);
        assert_eq!(value["heights"]["data"].as_array().map(|a| a.len()), Some(48 * 48));
        assert_eq!(value["cities"]["cities"].as_array().map(|a| a.len()), Some(map.cities.len()));
    }

    #[test]
    fn test_export_to_missing_directory_fails() {
        let map = generate(32, 32, 2).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope").join("atlas.json");
        assert!(matches!(export_json(&map, &path), Err(GenError::Io(_))));
    }

    #[test]
    fn test_string_matches_seed() {
        let a = to_json_string(&generate(32, 32, 4).unwrap()).unwrap();
        assert!(a.contains("\"master\":4"));
    }
}
