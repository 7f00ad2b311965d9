use std::collections::BTreeSet;

use log::{debug, warn};

use remote::{MetadataStore, RunRow};

use crate::error::{Error, Result};
use crate::manifest::{self, ArtifactRecord, Manifest};
use crate::uri::ArtifactUri;

/// Reads and appends manifest chunks through the tracker's run params.
///
/// The tracker has no list type and caps the size of a param value, so the
/// manifest is a contiguous run of `__artifacts__<n>` params, one record each.
/// A run's manifest is assumed to have a single writer, which takes indices
/// from [`ManifestStore::slots`] and passes them to [`ManifestStore::append`].
pub struct ManifestStore<'a, M: MetadataStore> {
    metadata: &'a M,
}

impl<'a, M: MetadataStore> ManifestStore<'a, M> {
    pub fn new(metadata: &'a M) -> Self {
        ManifestStore { metadata }
    }

    /// The single run row matching the uri's experiment and run.
    pub fn find_run(&self, uri: &ArtifactUri) -> Result<RunRow> {
        let mut runs: Vec<RunRow> = self
            .metadata
            .search_runs(&uri.experiment_id)
            .map_err(Error::Metadata)?
            .into_iter()
            .filter(|row| row.run_id == uri.run_id)
            .collect();

        match runs.len() {
            0 => Err(Error::RunNotFound {
                experiment_id: uri.experiment_id.clone(),
                run_id: uri.run_id.clone(),
            }),
            1 => Ok(runs.remove(0)),
            matches => Err(Error::AmbiguousRun {
                experiment_id: uri.experiment_id.clone(),
                run_id: uri.run_id.clone(),
                matches,
            }),
        }
    }

    /// Reassembles the manifest, stopping at the first missing chunk.
    ///
    /// A corrupt first chunk is an error, a corrupt later chunk ends the view
    /// there like a gap does.
    pub fn load(&self, uri: &ArtifactUri) -> Result<Manifest> {
        let run = self.find_run(uri)?;
        let mut manifest = Manifest::new();

        for index in 1.. {
            let key = manifest::chunk_key(index);
            let value = match run.param(&key) {
                Some(v) => v,
                None => break,
            };

            match manifest::decode(value) {
                Ok(record) => {
                    debug!("{}: {}", key, record.relative_path);
                    manifest.push(record);
                }
                Err(source) if index == 1 => {
                    return Err(Error::CorruptManifestEntry { key, source });
                }
                Err(err) => {
                    warn!(
                        "Run {} manifest truncated at {}: {}",
                        run.run_id, key, err
                    );
                    break;
                }
            }
        }

        Ok(manifest)
    }

    /// Free chunk indices of the run, in ascending order.
    ///
    /// Every existing `__artifacts__<n>` key is taken, whether or not it
    /// decodes and whether or not it sits behind a gap.
    pub fn slots(&self, uri: &ArtifactUri) -> Result<ChunkSlots> {
        let run = self.find_run(uri)?;
        let taken = run
            .params
            .keys()
            .filter_map(|key| key.strip_prefix(manifest::CHUNK_KEY_PREFIX))
            .filter_map(|index| index.parse::<usize>().ok())
            .collect();
        Ok(ChunkSlots { next: 1, taken })
    }

    /// First free chunk index, so an append never lands on an existing key.
    pub fn next_index(&self, uri: &ArtifactUri) -> Result<usize> {
        Ok(self.slots(uri)?.allocate())
    }

    pub fn append(&self, run_id: &str, record: &ArtifactRecord, next_index: usize) -> Result<()> {
        let key = manifest::chunk_key(next_index);
        self.metadata
            .log_param(run_id, &key, &manifest::encode(record))
            .map_err(Error::Metadata)?;
        debug!("Run {} {} = {}", run_id, key, record.relative_path);
        Ok(())
    }
}

/// Chunk index allocator for one writer, see [`ManifestStore::slots`].
#[derive(Debug)]
pub struct ChunkSlots {
    next: usize,
    taken: BTreeSet<usize>,
}

impl ChunkSlots {
    pub fn allocate(&mut self) -> usize {
        while self.taken.contains(&self.next) {
            self.next += 1;
        }
        let index = self.next;
        self.next += 1;
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remote::sql::SqlRemote;
    use std::cell::RefCell;
    use std::collections::BTreeMap;

    fn setup() -> (SqlRemote, ArtifactUri) {
        let remote = SqlRemote::in_memory().unwrap();
        let run = remote.create_run("1").unwrap();
        (remote, ArtifactUri::new("host", "1", &run))
    }

    fn record(i: usize) -> ArtifactRecord {
        ArtifactRecord::new(&format!("f{}.txt", i), &format!("id{}", i), Some(i as u64))
    }

    #[test]
    fn append_then_load() {
        let (remote, uri) = setup();
        let store = ManifestStore::new(&remote);

        assert!(store.load(&uri).unwrap().is_empty());
        assert_eq!(store.next_index(&uri).unwrap(), 1);

        for i in 1..=3 {
            store.append(&uri.run_id, &record(i), i).unwrap();
        }

        let manifest = store.load(&uri).unwrap();
        assert_eq!(manifest.records(), &[record(1), record(2), record(3)]);
        assert_eq!(store.next_index(&uri).unwrap(), 4);
    }

    #[test]
    fn gap_stops_scan() {
        let (remote, uri) = setup();
        let store = ManifestStore::new(&remote);

        for i in [1, 2, 3, 5, 6] {
            store.append(&uri.run_id, &record(i), i).unwrap();
        }

        let manifest = store.load(&uri).unwrap();
        assert_eq!(manifest.records(), &[record(1), record(2), record(3)]);
        assert_eq!(store.next_index(&uri).unwrap(), 4);
    }

    #[test]
    fn slots_skip_chunks_behind_gap() {
        let (remote, uri) = setup();
        let store = ManifestStore::new(&remote);

        for i in [1, 2, 3, 5, 7] {
            store.append(&uri.run_id, &record(i), i).unwrap();
        }
        remote.log_param(&uri.run_id, "__artifacts__x", "[]").unwrap();

        let mut slots = store.slots(&uri).unwrap();
        let allocated: Vec<usize> = (0..3).map(|_| slots.allocate()).collect();
        assert_eq!(allocated, [4, 6, 8]);
    }

    #[test]
    fn corrupt_chunk_truncates() {
        let (remote, uri) = setup();
        let store = ManifestStore::new(&remote);

        store.append(&uri.run_id, &record(1), 1).unwrap();
        remote
            .log_param(&uri.run_id, &manifest::chunk_key(2), "{broken")
            .unwrap();
        store.append(&uri.run_id, &record(3), 3).unwrap();

        let manifest = store.load(&uri).unwrap();
        assert_eq!(manifest.records(), &[record(1)]);
        // The corrupt chunk still occupies its index
        assert_eq!(store.next_index(&uri).unwrap(), 4);
    }

    #[test]
    fn corrupt_first_chunk() {
        let (remote, uri) = setup();
        remote
            .log_param(&uri.run_id, &manifest::chunk_key(1), r#"["a", "b"]"#)
            .unwrap();

        match ManifestStore::new(&remote).load(&uri) {
            Err(Error::CorruptManifestEntry { key, .. }) => assert_eq!(key, "__artifacts__1"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn run_not_found() {
        let (remote, _) = setup();
        let store = ManifestStore::new(&remote);

        for uri in [
            ArtifactUri::new("host", "1", "missing"),
            ArtifactUri::new("host", "2", "missing"),
        ] {
            assert!(matches!(store.load(&uri), Err(Error::RunNotFound { .. })));
        }
    }

    #[test]
    fn run_in_other_experiment() {
        let (remote, uri) = setup();
        let other = ArtifactUri::new("host", "9", &uri.run_id);
        assert!(matches!(
            ManifestStore::new(&remote).load(&other),
            Err(Error::RunNotFound { .. })
        ));
    }

    // Tracker that reports the same run twice
    struct DuplicateRuns;

    impl MetadataStore for DuplicateRuns {
        fn search_runs(&self, experiment_id: &str) -> std::result::Result<Vec<RunRow>, String> {
            let row = RunRow {
                run_id: "r".to_string(),
                experiment_id: experiment_id.to_string(),
                params: BTreeMap::new(),
            };
            Ok(vec![row.clone(), row])
        }

        fn log_param(&self, _: &str, _: &str, _: &str) -> std::result::Result<(), String> {
            Ok(())
        }
    }

    #[test]
    fn ambiguous_run() {
        let uri = ArtifactUri::new("host", "1", "r");
        match ManifestStore::new(&DuplicateRuns).load(&uri) {
            Err(Error::AmbiguousRun { matches, .. }) => assert_eq!(matches, 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    // Tracker whose every call fails
    struct Offline(RefCell<usize>);

    impl MetadataStore for Offline {
        fn search_runs(&self, _: &str) -> std::result::Result<Vec<RunRow>, String> {
            *self.0.borrow_mut() += 1;
            Err("connection refused".to_string())
        }

        fn log_param(&self, _: &str, _: &str, _: &str) -> std::result::Result<(), String> {
            *self.0.borrow_mut() += 1;
            Err("connection refused".to_string())
        }
    }

    #[test]
    fn metadata_failures_surface() {
        let offline = Offline(RefCell::new(0));
        let store = ManifestStore::new(&offline);
        let uri = ArtifactUri::new("host", "1", "r");

        assert!(matches!(store.load(&uri), Err(Error::Metadata(_))));
        assert!(matches!(
            store.append("r", &record(1), 1),
            Err(Error::Metadata(_))
        ));
        // No retries
        assert_eq!(*offline.0.borrow(), 2);
    }
}
