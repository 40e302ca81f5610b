use std::path::{Path, PathBuf};

use serde::Deserialize;

pub const MANIFEST_FILE: &str = "Oak.toml";

/// The parsed Oak.toml manifest.
#[derive(Debug, Clone, Default)]
pub struct OakManifest {
    pub project: ProjectSection,
    pub generator: GeneratorConfig,
    pub evaluator: EvaluatorConfig,
    /// The directory containing the Oak.toml file.
    pub root_dir: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectSection {
    #[serde(default)]
    pub name: Option<String>,
}

/// Settings for the assembly generator.
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorConfig {
    /// Emit `#` documentation comments into the instruction stream.
    #[serde(default = "default_comments")]
    pub comments: bool,
    /// Largest element count for which array fill and copy are unrolled.
    #[serde(default = "default_unroll_limit")]
    pub unroll_limit: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            comments: default_comments(),
            unroll_limit: default_unroll_limit(),
        }
    }
}

/// Settings for the tree-walking evaluator.
#[derive(Debug, Clone, Deserialize)]
pub struct EvaluatorConfig {
    /// Stop at the first failing top-level statement instead of continuing.
    #[serde(default)]
    pub abort_on_error: bool,
    #[serde(default = "default_max_call_depth")]
    pub max_call_depth: usize,
    /// Largest element count a sized array declaration may allocate.
    #[serde(default = "default_max_array_length")]
    pub max_array_length: usize,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            abort_on_error: false,
            max_call_depth: default_max_call_depth(),
            max_array_length: default_max_array_length(),
        }
    }
}

fn default_comments() -> bool {
    true
}
fn default_unroll_limit() -> u32 {
    16
}
fn default_max_call_depth() -> usize {
    256
}
fn default_max_array_length() -> usize {
    1 << 24
}

/// Raw TOML structure for deserialization.
#[derive(Deserialize)]
struct RawManifest {
    #[serde(default)]
    project: ProjectSection,
    #[serde(default)]
    generator: GeneratorConfig,
    #[serde(default)]
    evaluator: EvaluatorConfig,
}

/// Errors that can occur when loading a manifest.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("failed to read Oak.toml: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("invalid Oak.toml: {0}")]
    ParseError(String),
    #[error("invalid Oak.toml: [generator] unroll_limit must be at least 1")]
    ZeroUnrollLimit,
    #[error("invalid Oak.toml: [evaluator] max_call_depth must be at least 1")]
    ZeroCallDepth,
    #[error("invalid Oak.toml: [evaluator] max_array_length must be at least 1")]
    ZeroArrayLength,
}

/// Walk up from `start_dir` looking for `Oak.toml`.
/// Returns the path to the manifest file if found.
pub fn find_manifest(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir.to_path_buf();
    loop {
        let candidate = current.join(MANIFEST_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Load and validate an Oak.toml manifest from a file path.
pub fn load_manifest(path: &Path) -> Result<OakManifest, ManifestError> {
    let content = std::fs::read_to_string(path)?;
    let root_dir = path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    parse_manifest(&content, root_dir)
}

/// Parse and validate an Oak.toml manifest from a string.
pub fn parse_manifest(content: &str, root_dir: PathBuf) -> Result<OakManifest, ManifestError> {
    let raw: RawManifest =
        toml::from_str(content).map_err(|e| ManifestError::ParseError(e.to_string()))?;

    if raw.generator.unroll_limit == 0 {
        return Err(ManifestError::ZeroUnrollLimit);
    }
    if raw.evaluator.max_call_depth == 0 {
        return Err(ManifestError::ZeroCallDepth);
    }
    if raw.evaluator.max_array_length == 0 {
        return Err(ManifestError::ZeroArrayLength);
    }

    Ok(OakManifest {
        project: raw.project,
        generator: raw.generator,
        evaluator: raw.evaluator,
        root_dir,
    })
}

/// Find and load the manifest starting from an input file's directory.
///
/// A missing manifest is not an error: the defaults apply.
pub fn find_and_load_manifest(input_file: &Path) -> Result<OakManifest, ManifestError> {
    let start_dir = input_file.parent().unwrap_or_else(|| Path::new("."));
    match find_manifest(start_dir) {
        Some(path) => load_manifest(&path),
        None => Ok(OakManifest {
            root_dir: start_dir.to_path_buf(),
            ..OakManifest::default()
        }),
    }
}
