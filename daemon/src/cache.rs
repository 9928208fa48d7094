//! Loaded model cache
//!
//! Keeps up to `capacity` models in memory. On a miss the least recently used
//! entries are dropped before the new model is loaded, so the cache never holds
//! more than `capacity` models even mid-load. Every (checkpoint, adapter) pair is its own
//! entry. Loads are serialized so two requests for the same model never load
//! it twice. All methods block and belong on the blocking pool.

use pixelforge_runtime_api::{DiffusionModel, GenerateError, ModelKey, ModelLoader, ModelSpec};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

type Entry = (ModelKey, Arc<dyn DiffusionModel>);

pub struct ModelCache {
    loader: Arc<dyn ModelLoader>,
    capacity: usize,
    /// Most recently used last
    entries: Mutex<VecDeque<Entry>>,
    load_lock: Mutex<()>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ModelCache {
    pub fn new(loader: Arc<dyn ModelLoader>, capacity: usize) -> Self {
        Self {
            loader,
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::new()),
            load_lock: Mutex::new(()),
        }
    }

    /// Keys of the loaded models, least recently used first
    pub fn loaded(&self) -> Vec<ModelKey> {
        lock(&self.entries).iter().map(|(key, _)| key.clone()).collect()
    }

    fn touch(&self, key: &ModelKey) -> Option<Arc<dyn DiffusionModel>> {
        let mut entries = lock(&self.entries);
        let index = entries.iter().position(|(k, _)| k == key)?;
        let entry = entries.remove(index)?;
        let model = entry.1.clone();
        entries.push_back(entry);
        Some(model)
    }

    /// Return the model for `key`, loading it from `spec` on a miss
    pub fn get_or_load(
        &self,
        key: &ModelKey,
        spec: &ModelSpec,
    ) -> Result<Arc<dyn DiffusionModel>, GenerateError> {
        if let Some(model) = self.touch(key) {
            return Ok(model);
        }

        let _loading = lock(&self.load_lock);
        // Another request may have loaded it while we waited
        if let Some(model) = self.touch(key) {
            return Ok(model);
        }

        let evicted: Vec<Entry> = {
            let mut entries = lock(&self.entries);
            let excess = (entries.len() + 1).saturating_sub(self.capacity);
            entries.drain(..excess).collect()
        };
        for (evicted, _) in &evicted {
            tracing::info!("Unloading model {}", evicted);
        }
        drop(evicted);

        tracing::info!("Loading model {}", key);
        let model = self.loader.load(spec)?;

        let mut entries = lock(&self.entries);
        entries.push_back((key.clone(), model.clone()));
        tracing::info!("Model {} loaded ({}/{} slots)", key, entries.len(), self.capacity);

        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixelforge_runtime_api::{CheckpointSource, GenerationRequest, ImageGenResponse};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    struct Stub(String);

    impl DiffusionModel for Stub {
        fn generate(&self, _: &GenerationRequest) -> Result<ImageGenResponse, GenerateError> {
            Err(GenerateError::Inference("stub".into()))
        }

        fn name(&self) -> &str {
            &self.0
        }
    }

    #[derive(Default)]
    struct CountingLoader {
        loads: AtomicUsize,
    }

    impl ModelLoader for CountingLoader {
        fn load(&self, spec: &ModelSpec) -> Result<Arc<dyn DiffusionModel>, GenerateError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
            match &spec.checkpoint {
                CheckpointSource::Local(path) if path.ends_with("broken") => {
                    Err(GenerateError::Load("corrupt weights".into()))
                }
                CheckpointSource::Local(path) => Ok(Arc::new(Stub(path.display().to_string()))),
                CheckpointSource::Hub(repo) => Ok(Arc::new(Stub(repo.clone()))),
            }
        }
    }

    /// Tracks how many of its models are alive at once
    #[derive(Default)]
    struct LiveLoader {
        live: Arc<AtomicUsize>,
        peak: AtomicUsize,
    }

    struct Tracked {
        name: String,
        live: Arc<AtomicUsize>,
    }

    impl DiffusionModel for Tracked {
        fn generate(&self, _: &GenerationRequest) -> Result<ImageGenResponse, GenerateError> {
            Err(GenerateError::Inference("tracked".into()))
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl ModelLoader for LiveLoader {
        fn load(&self, spec: &ModelSpec) -> Result<Arc<dyn DiffusionModel>, GenerateError> {
            let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(live, Ordering::SeqCst);
            let name = match &spec.checkpoint {
                CheckpointSource::Local(path) => path.display().to_string(),
                CheckpointSource::Hub(repo) => repo.clone(),
            };
            Ok(Arc::new(Tracked {
                name,
                live: self.live.clone(),
            }))
        }
    }

    fn model(name: &str) -> (ModelKey, ModelSpec) {
        let key = ModelKey {
            checkpoint: name.to_string(),
            adapter: None,
        };
        let spec = ModelSpec {
            checkpoint: CheckpointSource::Local(PathBuf::from(name)),
            adapter: None,
            width: 512,
            height: 512,
        };
        (key, spec)
    }

    #[test]
    fn hit_does_not_reload() {
        let loader = Arc::new(CountingLoader::default());
        let cache = ModelCache::new(loader.clone(), 2);
        let (key, spec) = model("a");

        let first = cache.get_or_load(&key, &spec).unwrap();
        let second = cache.get_or_load(&key, &spec).unwrap();
        assert_eq!(first.name(), second.name());
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn least_recently_used_is_evicted() {
        let loader = Arc::new(CountingLoader::default());
        let cache = ModelCache::new(loader.clone(), 2);
        let (a, a_spec) = model("a");
        let (b, b_spec) = model("b");
        let (c, c_spec) = model("c");

        cache.get_or_load(&a, &a_spec).unwrap();
        cache.get_or_load(&b, &b_spec).unwrap();
        cache.get_or_load(&a, &a_spec).unwrap();
        cache.get_or_load(&c, &c_spec).unwrap();

        assert_eq!(cache.loaded(), vec![a, c]);
        assert_eq!(loader.loads.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn eviction_happens_before_the_next_load() {
        let loader = Arc::new(LiveLoader::default());
        let cache = ModelCache::new(loader.clone(), 1);

        for name in ["a", "b", "c"] {
            let (key, spec) = model(name);
            cache.get_or_load(&key, &spec).unwrap();
        }

        assert_eq!(loader.peak.load(Ordering::SeqCst), 1);
        assert_eq!(loader.live.load(Ordering::SeqCst), 1);
        assert_eq!(cache.loaded(), vec![model("c").0]);
    }

    #[test]
    fn adapter_pairs_are_separate_entries() {
        let loader = Arc::new(CountingLoader::default());
        let cache = ModelCache::new(loader.clone(), 2);
        let (plain, spec) = model("a");
        let styled = ModelKey {
            adapter: Some("8bit.safetensors".into()),
            ..plain.clone()
        };

        cache.get_or_load(&plain, &spec).unwrap();
        cache.get_or_load(&styled, &spec).unwrap();
        assert_eq!(cache.loaded().len(), 2);
        assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn concurrent_misses_load_once() {
        let loader = Arc::new(CountingLoader::default());
        let cache = Arc::new(ModelCache::new(loader.clone(), 1));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                thread::spawn(move || {
                    let (key, spec) = model("shared");
                    cache.get_or_load(&key, &spec).map(|m| m.name().to_string())
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), "shared");
        }
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_load_is_not_cached() {
        let loader = Arc::new(CountingLoader::default());
        let cache = ModelCache::new(loader.clone(), 2);
        let (key, spec) = model("broken");

        assert!(matches!(cache.get_or_load(&key, &spec), Err(GenerateError::Load(_))));
        assert!(cache.get_or_load(&key, &spec).is_err());
        assert!(cache.loaded().is_empty());
        assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
    }
}
