//! Content hashing and byte-identity checks.

use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Read buffer used while streaming a file through the hasher.
const BUFFER_SIZE: usize = 64 * 1024;

/// SHA-256 digest of a file's full byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentDigest([u8; 32]);

impl ContentDigest {
    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Streams `path` through SHA-256.
pub fn hash_file(path: &Path) -> io::Result<ContentDigest> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(BUFFER_SIZE, file);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(ContentDigest(hasher.finalize().into()))
}

/// Returns true if both files have exactly the same bytes.
///
/// Files of different sizes are rejected from metadata alone, without reading
/// either file.
///
/// # Examples
///
/// ```no_run
/// use datetidy::hasher::files_identical;
/// use std::path::Path;
///
/// let same = files_identical(Path::new("a.jpg"), Path::new("b.jpg")).unwrap();
/// println!("identical: {}", same);
/// ```
pub fn files_identical(a: &Path, b: &Path) -> io::Result<bool> {
    files_identical_with(a, b, hash_file)
}

/// [`files_identical`] with a caller-supplied digest function.
pub fn files_identical_with<F>(a: &Path, b: &Path, mut digest: F) -> io::Result<bool>
where
    F: FnMut(&Path) -> io::Result<ContentDigest>,
{
    if fs::metadata(a)?.len() != fs::metadata(b)?.len() {
        return Ok(false);
    }
    Ok(digest(a)? == digest(b)?)
}
