//! A handle to a local cache of sample data files.
//!
//! Files are copied from a mounted source directory into the cache directory on first use. The
//! handle is an ordinary value passed to whoever needs data, so several caches (for different
//! directories or registries) can coexist.
use fxhash::FxHashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use super::error::CacheError;

/// Environment variable overriding the cache directory
pub const CACHE_DIR_ENV: &str = "YMIR_DATA_DIR";
pub const DATA_VERSION: &str = "1";
pub const DEFAULT_RETRIES: u32 = 3;

pub const YMIR_IMAGES_FILE: &str = "small_ymir_images.hdf";
pub const MCSTAS_OB_IMAGES_FILE: &str = "small_mcstas_ob_images.h5";
pub const MCSTAS_SAMPLE_IMAGES_FILE: &str = "small_mcstas_sample_images.h5";
pub const FE_TIMEPIX_IMAGE_FILE: &str = "small_fe_timepix_image.tiff";
pub const OB_TIMEPIX_IMAGE_FILE: &str = "small_ob_timepix_image.tiff";

/// Where the cache lives when nothing overrides it
fn default_cache_dir(env_value: Option<OsString>) -> PathBuf {
    match env_value {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => std::env::temp_dir().join("ymir_reduce").join(DATA_VERSION),
    }
}

fn file_size(path: &Path) -> Result<u64, CacheError> {
    Ok(path.metadata()?.len())
}

#[derive(Debug, Clone)]
pub struct DataCache {
    cache_dir: PathBuf,
    source_dir: PathBuf,
    retry_if_failed: u32,
    /// File name -> expected size in bytes, if known
    registry: FxHashMap<String, Option<u64>>,
}

impl DataCache {
    pub fn new(
        cache_dir: &Path,
        source_dir: &Path,
        retry_if_failed: u32,
        registry: FxHashMap<String, Option<u64>>,
    ) -> Self {
        Self {
            cache_dir: cache_dir.to_path_buf(),
            source_dir: source_dir.to_path_buf(),
            retry_if_failed,
            registry,
        }
    }

    /// Cache in the directory named by `YMIR_DATA_DIR`, or a per-version directory under the
    /// system temporary directory
    pub fn from_env(source_dir: &Path, registry: FxHashMap<String, Option<u64>>) -> Self {
        let cache_dir = default_cache_dir(std::env::var_os(CACHE_DIR_ENV));
        Self::new(&cache_dir, source_dir, DEFAULT_RETRIES, registry)
    }

    /// The imaging sample files, sizes unchecked
    pub fn imaging_registry() -> FxHashMap<String, Option<u64>> {
        [
            YMIR_IMAGES_FILE,
            MCSTAS_OB_IMAGES_FILE,
            MCSTAS_SAMPLE_IMAGES_FILE,
            FE_TIMEPIX_IMAGE_FILE,
            OB_TIMEPIX_IMAGE_FILE,
        ]
        .iter()
        .map(|name| (name.to_string(), None))
        .collect()
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.registry.contains_key(name)
    }

    /// Register (or re-register) a file
    pub fn register(&mut self, name: &str, size: Option<u64>) {
        self.registry.insert(name.to_string(), size);
    }

    fn is_cached(&self, path: &Path, expected: Option<u64>) -> Result<bool, CacheError> {
        if !path.is_file() {
            return Ok(false);
        }
        match expected {
            Some(size) => Ok(file_size(path)? == size),
            None => Ok(true),
        }
    }

    /// Copy `src` to `dst`, retrying on IO errors. The copy lands in a partial file first so an
    /// interrupted copy is never mistaken for a cached file.
    fn copy_with_retries(&self, name: &str, src: &Path, dst: &Path) -> Result<u64, CacheError> {
        let partial = dst.with_extension("part");
        let attempts = self.retry_if_failed + 1;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match std::fs::copy(src, &partial).and_then(|bytes| {
                std::fs::rename(&partial, dst)?;
                Ok(bytes)
            }) {
                Ok(bytes) => return Ok(bytes),
                Err(e) if attempt < attempts => {
                    spdlog::warn!("Copy of {name} failed (attempt {attempt}/{attempts}): {e}");
                }
                Err(e) => {
                    let _ = std::fs::remove_file(&partial);
                    return Err(CacheError::RetriesExhausted {
                        name: name.to_string(),
                        attempts,
                        source: e,
                    });
                }
            }
        }
    }

    /// Path to the cached copy of `name`, copying it into the cache first if needed
    pub fn fetch(&self, name: &str) -> Result<PathBuf, CacheError> {
        let expected = *self
            .registry
            .get(name)
            .ok_or_else(|| CacheError::UnknownFile(name.to_string()))?;
        let target = self.cache_dir.join(name);
        if self.is_cached(&target, expected)? {
            spdlog::debug!("Using cached {}", target.to_string_lossy());
            return Ok(target);
        }

        let src = self.source_dir.join(name);
        if !src.exists() {
            return Err(CacheError::BadFilePath(src));
        }
        std::fs::create_dir_all(&self.cache_dir)?;
        let bytes = self.copy_with_retries(name, &src, &target)?;
        if let Some(size) = expected {
            if bytes != size {
                std::fs::remove_file(&target)?;
                return Err(CacheError::SizeMismatch {
                    name: name.to_string(),
                    found: bytes,
                    expected: size,
                });
            }
        }
        spdlog::info!(
            "Cached {} ({})",
            name,
            human_bytes::human_bytes(bytes as f64)
        );
        Ok(target)
    }

    pub fn ymir_images_path(&self) -> Result<PathBuf, CacheError> {
        self.fetch(YMIR_IMAGES_FILE)
    }

    pub fn mcstas_ob_images_path(&self) -> Result<PathBuf, CacheError> {
        self.fetch(MCSTAS_OB_IMAGES_FILE)
    }

    pub fn mcstas_sample_images_path(&self) -> Result<PathBuf, CacheError> {
        self.fetch(MCSTAS_SAMPLE_IMAGES_FILE)
    }

    pub fn fe_timepix_image_path(&self) -> Result<PathBuf, CacheError> {
        self.fetch(FE_TIMEPIX_IMAGE_FILE)
    }

    pub fn ob_timepix_image_path(&self) -> Result<PathBuf, CacheError> {
        self.fetch(OB_TIMEPIX_IMAGE_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(size: Option<u64>) -> (tempfile::TempDir, DataCache) {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source");
        std::fs::create_dir(&source).unwrap();
        std::fs::write(source.join(YMIR_IMAGES_FILE), b"ymir images").unwrap();
        let mut registry = FxHashMap::default();
        registry.insert(YMIR_IMAGES_FILE.to_string(), size);
        let cache = DataCache::new(&dir.path().join("cache"), &source, 2, registry);
        (dir, cache)
    }

    #[test]
    fn test_fetch_copies_once() {
        let (_dir, cache) = setup(Some(11));
        let path = cache.ymir_images_path().unwrap();
        assert_eq!(path, cache.cache_dir().join(YMIR_IMAGES_FILE));
        assert_eq!(std::fs::read(&path).unwrap(), b"ymir images");
        assert!(!path.with_extension("part").exists());

        // A cached file is returned without touching the source
        std::fs::write(&path, b"YMIR IMAGES").unwrap();
        let again = cache.fetch(YMIR_IMAGES_FILE).unwrap();
        assert_eq!(std::fs::read(again).unwrap(), b"YMIR IMAGES");
    }

    #[test]
    fn test_wrong_size_in_cache_is_refetched() {
        let (_dir, cache) = setup(Some(11));
        std::fs::create_dir_all(cache.cache_dir()).unwrap();
        std::fs::write(cache.cache_dir().join(YMIR_IMAGES_FILE), b"stale").unwrap();
        let path = cache.fetch(YMIR_IMAGES_FILE).unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"ymir images");
    }

    #[test]
    fn test_size_mismatch() {
        let (_dir, cache) = setup(Some(4));
        match cache.fetch(YMIR_IMAGES_FILE) {
            Err(CacheError::SizeMismatch {
                found, expected, ..
            }) => {
                assert_eq!(found, 11);
                assert_eq!(expected, 4);
            }
            other => panic!("Expected SizeMismatch, got {other:?}"),
        }
        assert!(!cache.cache_dir().join(YMIR_IMAGES_FILE).exists());
    }

    #[test]
    fn test_unknown_and_missing_files() {
        let (_dir, mut cache) = setup(None);
        assert!(matches!(
            cache.fetch("not_registered.h5"),
            Err(CacheError::UnknownFile(_))
        ));
        cache.register(MCSTAS_OB_IMAGES_FILE, None);
        assert!(cache.is_registered(MCSTAS_OB_IMAGES_FILE));
        assert!(matches!(
            cache.mcstas_ob_images_path(),
            Err(CacheError::BadFilePath(_))
        ));
    }

    #[test]
    fn test_retries_exhausted() {
        let (_dir, cache) = setup(None);
        // A directory where the cache expects a file makes every rename fail
        let blocked = cache.cache_dir().join(YMIR_IMAGES_FILE).join("child");
        std::fs::create_dir_all(blocked).unwrap();
        match cache.fetch(YMIR_IMAGES_FILE) {
            Err(CacheError::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("Expected RetriesExhausted, got {other:?}"),
        }
    }

    #[test]
    fn test_default_cache_dir() {
        assert_eq!(
            default_cache_dir(Some(OsString::from("/data/ymir"))),
            PathBuf::from("/data/ymir")
        );
        let fallback = default_cache_dir(None);
        assert!(fallback.ends_with(Path::new("ymir_reduce").join(DATA_VERSION)));
        assert_eq!(default_cache_dir(Some(OsString::new())), fallback);
        assert_eq!(DataCache::imaging_registry().len(), 5);
    }
}
