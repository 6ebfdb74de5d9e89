//! Versioned vectorizer + classifier pair: on-disk store and in-memory handle.
//!
//! On disk:
//! ```text
//! <dir>/CURRENT                 "gen-000007"
//! <dir>/gen-000007/vectorizer.json
//! <dir>/gen-000007/classifier.json
//! <dir>/.retrain.lock
//! ```
//! A generation directory is complete before `CURRENT` is renamed to point at
//! it, so a reader sees either the old pair or the new pair, never a mix.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

use crate::classifier::Classifier;
use crate::error::{Error, Result};
use crate::vectorizer::Vectorizer;

const CURRENT_FILE: &str = "CURRENT";
const VECTORIZER_FILE: &str = "vectorizer.json";
const CLASSIFIER_FILE: &str = "classifier.json";
const LOCK_FILE: &str = ".retrain.lock";

/// One fitted generation. Never partially updated.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactPair {
    pub generation: u64,
    pub vectorizer: Vectorizer,
    pub classifier: Classifier,
}

#[derive(Serialize, Deserialize)]
struct VectorizerBlob {
    generation: u64,
    vectorizer: Vectorizer,
}

#[derive(Serialize, Deserialize)]
struct ClassifierBlob {
    generation: u64,
    classifier: Classifier,
}

fn generation_dir_name(generation: u64) -> String {
    format!("gen-{generation:06}")
}

fn parse_generation_dir_name(name: &str) -> Option<u64> {
    name.strip_prefix("gen-")?.parse().ok()
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Generation `CURRENT` points at, `None` before the first commit.
    pub fn current_generation(&self) -> Result<Option<u64>> {
        let path = self.dir.join(CURRENT_FILE);
        match fs::read_to_string(&path) {
            Ok(s) => parse_generation_dir_name(s.trim())
                .map(Some)
                .ok_or_else(|| Error::Artifacts(format!("malformed {}: {:?}", path.display(), s.trim()))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Artifacts(format!("reading {}: {e}", path.display()))),
        }
    }

    /// Read both blobs of the current generation together.
    pub fn load_current(&self) -> Result<ArtifactPair> {
        let generation = self
            .current_generation()?
            .ok_or_else(|| Error::Artifacts(format!("no generation committed in {}", self.dir.display())))?;
        self.load_generation(generation)
    }

    fn load_generation(&self, generation: u64) -> Result<ArtifactPair> {
        let gdir = self.dir.join(generation_dir_name(generation));
        let vz: VectorizerBlob = read_json(&gdir.join(VECTORIZER_FILE))?;
        let clf: ClassifierBlob = read_json(&gdir.join(CLASSIFIER_FILE))?;

        if vz.generation != generation || clf.generation != generation {
            return Err(Error::Artifacts(format!(
                "generation mismatch in {}: vectorizer {}, classifier {}, expected {}",
                gdir.display(),
                vz.generation,
                clf.generation,
                generation
            )));
        }
        vz.vectorizer
            .check_consistency()
            .map_err(|m| Error::Artifacts(format!("inconsistent vectorizer in {}: {m}", gdir.display())))?;
        clf.classifier
            .check_consistency()
            .map_err(|m| Error::Artifacts(format!("inconsistent classifier in {}: {m}", gdir.display())))?;
        if vz.vectorizer.dim() != clf.classifier.n_features() {
            return Err(Error::Artifacts(format!(
                "dimension mismatch in {}: vectorizer {}, classifier {}",
                gdir.display(),
                vz.vectorizer.dim(),
                clf.classifier.n_features()
            )));
        }

        Ok(ArtifactPair {
            generation,
            vectorizer: vz.vectorizer,
            classifier: clf.classifier,
        })
    }

    /// Persist a freshly fitted pair as the next generation and switch `CURRENT` to it.
    /// Any failure before the final rename leaves the previous generation serving.
    pub fn commit(&self, vectorizer: Vectorizer, classifier: Classifier) -> Result<ArtifactPair> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| Error::persistence(format!("creating {}", self.dir.display()), e))?;

        let previous = self.current_generation()?;
        let generation = previous.map_or(1, |g| g + 1);
        let name = generation_dir_name(generation);
        let final_dir = self.dir.join(&name);
        let tmp_dir = self.dir.join(format!("{name}.tmp"));

        // Leftovers from an interrupted commit are never referenced by CURRENT.
        for stale in [&tmp_dir, &final_dir] {
            if stale.exists() {
                fs::remove_dir_all(stale)
                    .map_err(|e| Error::persistence(format!("removing stale {}", stale.display()), e))?;
            }
        }

        fs::create_dir_all(&tmp_dir)
            .map_err(|e| Error::persistence(format!("creating {}", tmp_dir.display()), e))?;

        let vz = VectorizerBlob {
            generation,
            vectorizer,
        };
        let clf = ClassifierBlob {
            generation,
            classifier,
        };
        write_json(&tmp_dir.join(VECTORIZER_FILE), &vz)?;
        write_json(&tmp_dir.join(CLASSIFIER_FILE), &clf)?;
        sync_dir(&tmp_dir);

        fs::rename(&tmp_dir, &final_dir)
            .map_err(|e| Error::persistence(format!("publishing {}", final_dir.display()), e))?;
        sync_dir(&self.dir);

        let current_tmp = self.dir.join(format!("{CURRENT_FILE}.tmp"));
        write_atomic(&current_tmp, &self.dir.join(CURRENT_FILE), name.as_bytes())?;
        sync_dir(&self.dir);

        info!(target: "artifacts", generation, dir = %self.dir.display(), "committed artifact generation");

        if let Some(prev) = previous {
            self.prune_older_than(prev);
        }

        Ok(ArtifactPair {
            generation,
            vectorizer: vz.vectorizer,
            classifier: clf.classifier,
        })
    }

    /// Best-effort removal of generations older than `keep_from` (the previous one stays for rollback).
    fn prune_older_than(&self, keep_from: u64) {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return;
        };
        for e in entries.flatten() {
            let name = e.file_name();
            let Some(g) = name.to_str().and_then(parse_generation_dir_name) else {
                continue;
            };
            if g < keep_from {
                if let Err(err) = fs::remove_dir_all(e.path()) {
                    warn!(target: "artifacts", generation = g, error = %err, "failed to prune old generation");
                }
            }
        }
    }

    /// sha256 over `CURRENT` and both blobs of the current generation.
    /// Changes iff the served pair changes.
    pub fn fingerprint(&self) -> Result<Option<String>> {
        let Some(generation) = self.current_generation()? else {
            return Ok(None);
        };
        let gdir = self.dir.join(generation_dir_name(generation));
        let mut hasher = Sha256::new();
        for path in [
            self.dir.join(CURRENT_FILE),
            gdir.join(VECTORIZER_FILE),
            gdir.join(CLASSIFIER_FILE),
        ] {
            let bytes = fs::read(&path)
                .map_err(|e| Error::Artifacts(format!("reading {}: {e}", path.display())))?;
            hasher.update(&bytes);
        }
        Ok(Some(
            hasher.finalize().iter().map(|b| format!("{b:02x}")).collect(),
        ))
    }

    /// Advisory lock guarding the single-writer retrain job.
    pub fn retrain_lock(&self) -> Result<RetrainLock> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| Error::persistence(format!("creating {}", self.dir.display()), e))?;
        let path = self.dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| Error::persistence(format!("opening {}", path.display()), e))?;
        Ok(RetrainLock {
            lock_file: fd_lock::RwLock::new(file),
            lock_path: path,
        })
    }
}

/// Cross-process exclusive lock on `<dir>/.retrain.lock`.
pub struct RetrainLock {
    lock_file: fd_lock::RwLock<File>,
    lock_path: PathBuf,
}

impl RetrainLock {
    /// Non-blocking; a held lock means another retrain is running.
    pub fn try_acquire(&mut self) -> Result<fd_lock::RwLockWriteGuard<'_, File>> {
        self.lock_file.try_write().map_err(|e| {
            if e.kind() == io::ErrorKind::WouldBlock {
                Error::RetrainInProgress
            } else {
                Error::persistence(format!("locking {}", self.lock_path.display()), e)
            }
        })
    }
}

/// Shared, swappable reference to the active pair.
/// Readers clone the inner `Arc` and keep using it even if a swap happens mid-request.
#[derive(Clone, Default)]
pub struct ArtifactHandle {
    inner: Arc<RwLock<Option<Arc<ArtifactPair>>>>,
}

impl ArtifactHandle {
    pub fn new(pair: ArtifactPair) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(Arc::new(pair)))),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Result<Arc<ArtifactPair>> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        guard
            .clone()
            .ok_or_else(|| Error::Artifacts("no artifact generation loaded".into()))
    }

    pub fn generation(&self) -> Option<u64> {
        self.current().ok().map(|p| p.generation)
    }

    /// Replace the active pair wholesale; returns the previous one.
    pub fn swap(&self, pair: ArtifactPair) -> Option<Arc<ArtifactPair>> {
        let fresh = Arc::new(pair);
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        guard.replace(fresh)
    }

    /// Load the store's current generation and swap it in.
    pub fn reload_from(&self, store: &ArtifactStore) -> Result<u64> {
        let pair = store.load_current()?;
        let generation = pair.generation;
        let previous = self.swap(pair).map(|p| p.generation);
        info!(target: "artifacts", generation, ?previous, "artifact pair swapped in");
        Ok(generation)
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let bytes =
        fs::read(path).map_err(|e| Error::Artifacts(format!("reading {}: {e}", path.display())))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| Error::Artifacts(format!("decoding {}: {e}", path.display())))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec(value).map_err(|e| {
        Error::persistence(
            format!("encoding {}", path.display()),
            io::Error::new(io::ErrorKind::InvalidData, e),
        )
    })?;
    let mut f = File::create(path)
        .map_err(|e| Error::persistence(format!("creating {}", path.display()), e))?;
    f.write_all(&bytes)
        .and_then(|_| f.sync_all())
        .map_err(|e| Error::persistence(format!("writing {}", path.display()), e))
}

fn write_atomic(tmp: &Path, dest: &Path, bytes: &[u8]) -> Result<()> {
    let mut f = File::create(tmp)
        .map_err(|e| Error::persistence(format!("creating {}", tmp.display()), e))?;
    f.write_all(bytes)
        .and_then(|_| f.sync_all())
        .map_err(|e| Error::persistence(format!("writing {}", tmp.display()), e))?;
    fs::rename(tmp, dest).map_err(|e| Error::persistence(format!("renaming onto {}", dest.display()), e))
}

fn sync_dir(dir: &Path) {
    // Directory fsync is not supported everywhere; the renames are what matter.
    if let Ok(d) = File::open(dir) {
        let _ = d.sync_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{Class, DEFAULT_ALPHA};
    use crate::normalize::normalize;

    fn fitted(docs: &[(&str, Class)]) -> (Vectorizer, Classifier) {
        let texts: Vec<_> = docs.iter().map(|(t, _)| normalize(t)).collect();
        let classes: Vec<_> = docs.iter().map(|(_, c)| *c).collect();
        let vz = Vectorizer::fit(&texts, 100);
        let vecs: Vec<_> = texts.iter().map(|t| vz.transform(t)).collect();
        (vz, Classifier::fit(&vecs, &classes, DEFAULT_ALPHA).unwrap())
    }

    fn sample() -> (Vectorizer, Classifier) {
        fitted(&[("berita resmi", Class::Valid), ("hoaks viral", Class::Hoax)])
    }

    #[test]
    fn empty_store_has_no_generation() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path());
        assert_eq!(store.current_generation().unwrap(), None);
        assert!(matches!(store.load_current(), Err(Error::Artifacts(_))));
        assert_eq!(store.fingerprint().unwrap(), None);
    }

    #[test]
    fn commit_then_load_round_trips_pair() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path());
        let (vz, clf) = sample();
        let committed = store.commit(vz.clone(), clf.clone()).unwrap();
        assert_eq!(committed.generation, 1);

        let loaded = store.load_current().unwrap();
        assert_eq!(loaded.vectorizer, vz);
        assert_eq!(loaded.classifier, clf);
    }

    #[test]
    fn generations_increase_and_old_ones_are_pruned() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path());
        for _ in 0..3 {
            let (vz, clf) = sample();
            store.commit(vz, clf).unwrap();
        }
        assert_eq!(store.current_generation().unwrap(), Some(3));
        assert!(!tmp.path().join("gen-000001").exists());
        assert!(tmp.path().join("gen-000002").exists());
        assert!(tmp.path().join("gen-000003").exists());
    }

    #[test]
    fn mixed_generation_blobs_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path());
        let (vz, clf) = sample();
        store.commit(vz.clone(), clf.clone()).unwrap();
        store.commit(vz, clf).unwrap();

        // Podstrčíme classifier ze starší generace.
        fs::copy(
            tmp.path().join("gen-000001").join(CLASSIFIER_FILE),
            tmp.path().join("gen-000002").join(CLASSIFIER_FILE),
        )
        .unwrap();
        let err = store.load_current().unwrap_err();
        assert!(matches!(err, Error::Artifacts(m) if m.contains("generation mismatch")));
    }

    fn rewrite_blob(path: &Path, edit: impl FnOnce(&mut serde_json::Value)) {
        let mut v: serde_json::Value = serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
        edit(&mut v);
        fs::write(path, serde_json::to_vec(&v).unwrap()).unwrap();
    }

    #[test]
    fn vocabulary_pointing_past_idf_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path());
        let (vz, clf) = sample();
        store.commit(vz, clf).unwrap();

        rewrite_blob(&tmp.path().join("gen-000001").join(VECTORIZER_FILE), |v| {
            v["vectorizer"]["idf"].as_array_mut().unwrap().pop();
        });
        let err = store.load_current().unwrap_err();
        assert!(matches!(err, Error::Artifacts(m) if m.contains("inconsistent vectorizer")));
    }

    #[test]
    fn short_feature_row_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path());
        let (vz, clf) = sample();
        store.commit(vz, clf).unwrap();

        rewrite_blob(&tmp.path().join("gen-000001").join(CLASSIFIER_FILE), |v| {
            v["classifier"]["feature_log_prob"][1].as_array_mut().unwrap().pop();
        });
        let err = store.load_current().unwrap_err();
        assert!(matches!(err, Error::Artifacts(m) if m.contains("inconsistent classifier")));

        // The handle keeps refusing rather than serving a half-valid pair.
        let handle = ArtifactHandle::empty();
        assert!(handle.reload_from(&store).is_err());
        assert!(handle.current().is_err());
    }

    #[test]
    fn fingerprint_changes_only_on_commit() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path());
        let (vz, clf) = sample();
        store.commit(vz.clone(), clf.clone()).unwrap();
        let a = store.fingerprint().unwrap();
        assert_eq!(a, store.fingerprint().unwrap());
        store.commit(vz, clf).unwrap();
        assert_ne!(a, store.fingerprint().unwrap());
    }

    #[test]
    fn second_lock_holder_is_refused() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path());
        let mut first = store.retrain_lock().unwrap();
        let _held = first.try_acquire().unwrap();

        let mut second = store.retrain_lock().unwrap();
        assert!(matches!(second.try_acquire(), Err(Error::RetrainInProgress)));
    }

    #[test]
    fn handle_swap_replaces_whole_pair() {
        let (vz, clf) = sample();
        let handle = ArtifactHandle::new(ArtifactPair {
            generation: 1,
            vectorizer: vz.clone(),
            classifier: clf.clone(),
        });
        let held = handle.current().unwrap();
        let prev = handle.swap(ArtifactPair {
            generation: 2,
            vectorizer: vz,
            classifier: clf,
        });
        assert_eq!(prev.map(|p| p.generation), Some(1));
        assert_eq!(held.generation, 1);
        assert_eq!(handle.generation(), Some(2));
    }

    #[test]
    fn empty_handle_reports_artifacts_error() {
        assert!(matches!(ArtifactHandle::empty().current(), Err(Error::Artifacts(_))));
    }
}
