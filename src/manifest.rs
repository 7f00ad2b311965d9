use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

/// Param key prefix of manifest chunks, followed by the 1-based chunk index.
pub const CHUNK_KEY_PREFIX: &str = "__artifacts__";

/// One uploaded file, identified by its path relative to the artifact root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRecord {
    pub relative_path: String,
    pub remote_id: String,
    pub size_bytes: Option<u64>,
}

impl ArtifactRecord {
    pub fn new(relative_path: &str, remote_id: &str, size_bytes: Option<u64>) -> Self {
        ArtifactRecord {
            relative_path: relative_path.to_string(),
            remote_id: remote_id.to_string(),
            size_bytes,
        }
    }
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("empty artifact path")]
    EmptyPath,
}

// On the wire a record is the array [path, remote_id, size]
#[derive(Deserialize)]
struct WireRecord(String, String, Option<u64>);

pub fn encode(record: &ArtifactRecord) -> String {
    json!([record.relative_path, record.remote_id, record.size_bytes]).to_string()
}

pub fn decode(value: &str) -> Result<ArtifactRecord, DecodeError> {
    let WireRecord(relative_path, remote_id, size_bytes) = serde_json::from_str(value)?;
    if relative_path.is_empty() {
        return Err(DecodeError::EmptyPath);
    }

    Ok(ArtifactRecord {
        relative_path,
        remote_id,
        size_bytes,
    })
}

pub fn chunk_key(index: usize) -> String {
    debug_assert!(index >= 1, "manifest chunks are numbered from 1");
    format!("{}{}", CHUNK_KEY_PREFIX, index)
}

/// Every record logged for a run, in chunk order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    records: Vec<ArtifactRecord>,
}

impl Manifest {
    pub fn new() -> Self {
        Manifest::default()
    }

    pub fn push(&mut self, record: ArtifactRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[ArtifactRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ArtifactRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl From<Vec<ArtifactRecord>> for Manifest {
    fn from(records: Vec<ArtifactRecord>) -> Self {
        Manifest { records }
    }
}

impl<'a> IntoIterator for &'a Manifest {
    type Item = &'a ArtifactRecord;
    type IntoIter = std::slice::Iter<'a, ArtifactRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_layout() {
        let r = ArtifactRecord::new("model/w.bin", "f3a9", Some(1024));
        assert_eq!(encode(&r), r#"["model/w.bin","f3a9",1024]"#);

        let r = ArtifactRecord::new("notes.txt", "x", None);
        assert_eq!(encode(&r), r#"["notes.txt","x",null]"#);
    }

    #[test]
    fn decode_encoded() {
        for r in [
            ArtifactRecord::new("a/b.txt", "id-1", Some(10)),
            ArtifactRecord::new("quote\"d/ü.txt", "id-2", Some(0)),
            ArtifactRecord::new("d.txt", "id-3", None),
        ] {
            assert_eq!(decode(&encode(&r)).unwrap(), r);
        }
    }

    #[test]
    fn decode_python_json_dumps() {
        // Written by json.dumps, spaces after the commas
        let r = decode(r#"["model/MLmodel", "5e1c0d", 352]"#).unwrap();
        assert_eq!(r, ArtifactRecord::new("model/MLmodel", "5e1c0d", Some(352)));
    }

    #[test]
    fn decode_rejects() {
        for bad in [
            "",
            "not json",
            r#"{"path": "a"}"#,
            r#"["a", "id"]"#,
            r#"["a", "id", 1, 2]"#,
            r#"["a", "id", -1]"#,
            r#"["a", 7, 1]"#,
            r#"["", "id", 1]"#,
        ] {
            assert!(decode(bad).is_err(), "{} decoded", bad);
        }
    }

    #[test]
    fn chunk_keys() {
        assert_eq!(chunk_key(1), "__artifacts__1");
        assert_eq!(chunk_key(12), "__artifacts__12");
    }
}
