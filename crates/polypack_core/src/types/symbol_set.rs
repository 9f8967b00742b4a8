use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

/// The set of symbols an import site pulls in, or a module exports.
///
/// A wildcard (`*`) dominates any finite list: once a wildcard enters the
/// set it absorbs everything, and a finite list only grows until a
/// wildcard arrives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolSet {
  All,
  Named(BTreeSet<String>),
}

impl Default for SymbolSet {
  fn default() -> Self {
    SymbolSet::Named(BTreeSet::new())
  }
}

impl SymbolSet {
  /// Build a set from raw symbol names. A literal `"*"` collapses the
  /// whole set to the wildcard.
  pub fn from_symbols<I, S>(symbols: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let mut named = BTreeSet::new();
    for symbol in symbols {
      let symbol = symbol.into();
      if symbol == "*" {
        return SymbolSet::All;
      }
      named.insert(symbol);
    }
    SymbolSet::Named(named)
  }

  pub fn is_empty(&self) -> bool {
    match self {
      SymbolSet::All => false,
      SymbolSet::Named(named) => named.is_empty(),
    }
  }

  pub fn is_wildcard(&self) -> bool {
    matches!(self, SymbolSet::All)
  }

  /// Wildcard-dominant union.
  pub fn merge(&mut self, other: &SymbolSet) {
    match (&mut *self, other) {
      (SymbolSet::All, _) => {}
      (_, SymbolSet::All) => *self = SymbolSet::All,
      (SymbolSet::Named(mine), SymbolSet::Named(theirs)) => {
        mine.extend(theirs.iter().cloned());
      }
    }
  }

  /// Sorted symbol names; the wildcard renders as a single `"*"`.
  ///
  /// Used when a stable ordering is needed, e.g. bundle signature hashing.
  pub fn to_sorted_vec(&self) -> Vec<String> {
    match self {
      SymbolSet::All => vec![String::from("*")],
      SymbolSet::Named(named) => named.iter().cloned().collect(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn wildcard_dominates_in_either_order() {
    let mut first = SymbolSet::from_symbols(["a", "b"]);
    first.merge(&SymbolSet::from_symbols(["*"]));
    assert_eq!(first, SymbolSet::All);

    let mut second = SymbolSet::from_symbols(["*"]);
    second.merge(&SymbolSet::from_symbols(["a", "b"]));
    assert_eq!(second, SymbolSet::All);
  }

  #[test]
  fn named_sets_union() {
    let mut symbols = SymbolSet::from_symbols(["a"]);
    symbols.merge(&SymbolSet::from_symbols(["b"]));
    assert_eq!(symbols.to_sorted_vec(), vec!["a", "b"]);
  }

  #[test]
  fn literal_star_collapses_to_wildcard() {
    let symbols = SymbolSet::from_symbols(["a", "*", "b"]);
    assert_eq!(symbols, SymbolSet::All);
    assert_eq!(symbols.to_sorted_vec(), vec!["*"]);
  }
}
