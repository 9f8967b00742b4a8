use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

/// Template for deriving bundle output locations
///
/// The template string may contain `${name}`, `${ext}`, `${hash}` and
/// arbitrary `${options.*}` placeholders. Unknown placeholders resolve to
/// the empty string.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputPathTemplate {
  pub template: String,

  /// Prefix the public path is served from
  #[serde(default = "default_public_root")]
  pub public_root: String,
}

fn default_public_root() -> String {
  String::from("/")
}

impl Default for OutputPathTemplate {
  fn default() -> Self {
    Self {
      template: String::from("${name}.${hash}.${ext}"),
      public_root: default_public_root(),
    }
  }
}

/// Per-bundle parameters substituted into an [`OutputPathTemplate`]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OutputPathParams {
  pub name: String,
  pub ext: String,
  pub hash: String,
  pub options: BTreeMap<String, String>,
}

/// The resolved output locations for one bundle
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputPaths {
  pub output_path: PathBuf,
  pub output_parent_path: PathBuf,
  pub output_public_path: String,
  pub asset_name: String,
}

impl OutputPathTemplate {
  pub fn resolve(&self, params: &OutputPathParams) -> OutputPaths {
    let mut rendered = String::with_capacity(self.template.len());
    let mut rest = self.template.as_str();

    while let Some(start) = rest.find("${") {
      rendered.push_str(&rest[..start]);
      let after = &rest[start + 2..];
      let Some(end) = after.find('}') else {
        // Unterminated placeholder, emit verbatim
        rendered.push_str(&rest[start..]);
        rest = "";
        break;
      };
      rendered.push_str(&self.lookup(&after[..end], params));
      rest = &after[end + 1..];
    }
    rendered.push_str(rest);

    let output_path = PathBuf::from(&rendered);
    let output_parent_path = output_path
      .parent()
      .map(Path::to_path_buf)
      .unwrap_or_default();
    let asset_name = output_path
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .unwrap_or_default();
    let output_public_path = if self.public_root.ends_with('/') {
      format!("{}{}", self.public_root, rendered)
    } else {
      format!("{}/{}", self.public_root, rendered)
    };

    OutputPaths {
      output_path,
      output_parent_path,
      output_public_path,
      asset_name,
    }
  }

  fn lookup(&self, key: &str, params: &OutputPathParams) -> String {
    match key {
      "name" => params.name.clone(),
      "ext" => params.ext.clone(),
      "hash" => params.hash.clone(),
      _ => match key.strip_prefix("options.") {
        Some(option) => params.options.get(option).cloned().unwrap_or_default(),
        None => String::new(),
      },
    }
  }
}
