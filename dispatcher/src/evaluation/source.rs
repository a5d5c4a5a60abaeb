use std::{
    fmt::{self, Display},
    fs, io,
    path::{Path, PathBuf},
    time::UNIX_EPOCH,
};

use model::{Geometry, WeightSet};

use crate::Result;

/// The name of the file holding the identity of the current weight set inside a
/// `DirectorySource`.
pub const BEST_NETWORK_POINTER: &str = "best-network-hash";

/// The identity of one published weight set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WeightId(String);

impl WeightId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for WeightId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A place where new weight sets get published.
pub trait WeightSource: Send + Sync {
    /// Returns the identity of the latest published weight set, cheap enough to poll.
    fn latest(&self) -> io::Result<WeightId>;

    /// Reads the weight file of the weight set named `id`.
    fn fetch(&self, id: &WeightId) -> io::Result<String>;
}

/// A single weight file that gets overwritten in place, identified by its size and
/// modification time.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl WeightSource for FileSource {
    fn latest(&self) -> io::Result<WeightId> {
        let metadata = fs::metadata(&self.path)?;
        let modified = metadata
            .modified()?
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();

        Ok(WeightId(format!("{}-{modified}", metadata.len())))
    }

    fn fetch(&self, _id: &WeightId) -> io::Result<String> {
        fs::read_to_string(&self.path)
    }
}

/// A directory of weight files named `<hash>.txt` plus a `best-network-hash` file naming the
/// current one.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl WeightSource for DirectorySource {
    fn latest(&self) -> io::Result<WeightId> {
        let hash = fs::read_to_string(self.dir.join(BEST_NETWORK_POINTER))?;
        let hash = hash.trim();

        let valid = !hash.is_empty()
            && hash != ".."
            && !hash.contains(|c: char| c == '/' || c == '\\' || c.is_whitespace());

        if !valid {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid network hash {hash:?}"),
            ));
        }

        Ok(WeightId::new(hash))
    }

    fn fetch(&self, id: &WeightId) -> io::Result<String> {
        fs::read_to_string(self.dir.join(format!("{id}.txt")))
    }
}

/// Reads, parses and validates the latest weight set of `source`.
///
/// # Arguments
/// * `source` - Where to read the weight set from.
/// * `geometry` - The dimensions the weight set must match.
///
/// # Returns
/// The identity and the weight set, or an error if any of the steps fails.
pub fn load_weights(
    source: &dyn WeightSource,
    geometry: &Geometry,
) -> Result<(WeightId, WeightSet)> {
    let id = source.latest()?;
    let text = source.fetch(&id)?;

    let set = WeightSet::parse(&text)?;
    set.validate(geometry)?;

    Ok((id, set))
}
