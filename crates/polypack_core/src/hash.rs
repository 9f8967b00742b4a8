use std::hash::Hasher;

use xxhash_rust::xxh3::Xxh3;

/// Hasher used for module and bundle identifiers.
///
/// Not cryptographic; stable across processes so hashes can be compared
/// between builds and across worker boundaries.
#[derive(Default)]
pub struct IdentifierHasher {
  hasher: Xxh3,
}

impl IdentifierHasher {
  pub fn new() -> Self {
    Self::default()
  }
}

impl Hasher for IdentifierHasher {
  fn finish(&self) -> u64 {
    self.hasher.finish()
  }

  fn write(&mut self, bytes: &[u8]) {
    self.hasher.write(bytes)
  }
}

/// Digest arbitrary bytes into the canonical 16-hex-digit form used for
/// content and bundle hashes.
pub fn hash_bytes(bytes: &[u8]) -> String {
  format!("{:016x}", xxhash_rust::xxh3::xxh3_64(bytes))
}
