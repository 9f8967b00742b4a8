use serde::Deserialize;

/// The subset of a package descriptor the resolver consults
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PackageJson {
  #[serde(default)]
  pub name: Option<String>,

  /// Preferred over `main` when both are present
  #[serde(default)]
  pub browser: Option<String>,

  #[serde(default)]
  pub main: Option<String>,
}

impl PackageJson {
  pub fn parse(contents: &str) -> serde_json::Result<Self> {
    serde_json::from_str(contents)
  }

  /// The entry file this package points at, browser-field first.
  pub fn entry(&self) -> Option<&str> {
    self.browser.as_deref().or(self.main.as_deref())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn browser_field_is_preferred() {
    let pkg = PackageJson::parse(r#"{"browser": "web.js", "main": "node.js"}"#).unwrap();
    assert_eq!(pkg.entry(), Some("web.js"));
  }

  #[test]
  fn main_is_the_fallback() {
    let pkg = PackageJson::parse(r#"{"main": "node.js"}"#).unwrap();
    assert_eq!(pkg.entry(), Some("node.js"));
  }

  #[test]
  fn missing_fields_yield_no_entry() {
    let pkg = PackageJson::parse(r#"{"name": "thing"}"#).unwrap();
    assert_eq!(pkg.entry(), None);
  }
}
