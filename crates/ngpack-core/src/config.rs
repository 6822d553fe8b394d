use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::errors::CompilationError;

/// Environment variable overriding the worker count of both pools
pub const MAX_WORKERS_ENV: &str = "NG_BUILD_MAX_WORKERS";

/// ECMAScript language level of emitted code
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ScriptTarget {
    Es5,
    Es2015,
    Es2016,
    Es2017,
    Es2018,
    Es2019,
    Es2020,
    Es2021,
    Es2022,
    EsNext,
}

impl Default for ScriptTarget {
    fn default() -> Self {
        ScriptTarget::Es2022
    }
}

impl FromStr for ScriptTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "es5" => Ok(ScriptTarget::Es5),
            "es6" | "es2015" => Ok(ScriptTarget::Es2015),
            "es2016" => Ok(ScriptTarget::Es2016),
            "es2017" => Ok(ScriptTarget::Es2017),
            "es2018" => Ok(ScriptTarget::Es2018),
            "es2019" => Ok(ScriptTarget::Es2019),
            "es2020" => Ok(ScriptTarget::Es2020),
            "es2021" => Ok(ScriptTarget::Es2021),
            "es2022" => Ok(ScriptTarget::Es2022),
            "esnext" => Ok(ScriptTarget::EsNext),
            other => Err(format!("unknown script target '{}'", other)),
        }
    }
}

impl TryFrom<String> for ScriptTarget {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ScriptTarget> for String {
    fn from(target: ScriptTarget) -> Self {
        target.to_string()
    }
}

impl fmt::Display for ScriptTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScriptTarget::Es5 => "ES5",
            ScriptTarget::Es2015 => "ES2015",
            ScriptTarget::Es2016 => "ES2016",
            ScriptTarget::Es2017 => "ES2017",
            ScriptTarget::Es2018 => "ES2018",
            ScriptTarget::Es2019 => "ES2019",
            ScriptTarget::Es2020 => "ES2020",
            ScriptTarget::Es2021 => "ES2021",
            ScriptTarget::Es2022 => "ES2022",
            ScriptTarget::EsNext => "ESNext",
        };
        f.write_str(name)
    }
}

/// Type-checker options as found in the `compilerOptions` object of a project file.
///
/// Only the options this crate reads are typed; everything else is preserved in
/// `extra` and handed to the program factory untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilerOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ScriptTarget>,

    #[serde(default)]
    pub source_map: bool,

    #[serde(default)]
    pub inline_source_map: bool,

    #[serde(default)]
    pub inline_sources: bool,

    /// Emit `.d.ts` files (always disabled for ahead-of-time builds)
    #[serde(default)]
    pub declaration: bool,

    #[serde(default)]
    pub no_emit_on_error: bool,

    #[serde(default)]
    pub isolated_modules: bool,

    #[serde(default)]
    pub allow_js: bool,

    #[serde(default)]
    pub preserve_symlinks: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_define_for_class_fields: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incremental: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts_build_info_file: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<PathBuf>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl CompilerOptions {
    /// Parse and validate a raw `compilerOptions` object
    pub fn from_value(value: &serde_json::Value) -> Result<Self, CompilationError> {
        if !value.is_object() {
            return Err(CompilationError::ConfigError(
                "'compilerOptions' must be an object".to_string(),
            ));
        }

        let options: CompilerOptions = serde_json::from_value(value.clone())?;
        options.validate()?;
        Ok(options)
    }

    /// Reject option combinations the type checker cannot honor
    pub fn validate(&self) -> Result<(), CompilationError> {
        if self.source_map && self.inline_source_map {
            return Err(CompilationError::InvalidOption {
                option: "sourceMap".to_string(),
                reason: "cannot be specified together with 'inlineSourceMap'".to_string(),
            });
        }

        if let Some(info) = &self.ts_build_info_file {
            if self.incremental == Some(false) {
                return Err(CompilationError::InvalidOption {
                    option: "tsBuildInfoFile".to_string(),
                    reason: format!(
                        "'{}' requires 'incremental' to be enabled",
                        info.display()
                    ),
                });
            }
        }

        Ok(())
    }

    pub fn effective_target(&self) -> ScriptTarget {
        self.target.unwrap_or_default()
    }
}

/// Options controlling the plugin and both worker pools
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginOptions {
    /// Generate source maps for application code (default: false)
    #[serde(default)]
    pub sourcemap: bool,

    /// Keep source maps of third-party code (default: false)
    #[serde(default)]
    pub third_party_sourcemaps: bool,

    /// Apply pure-call annotation and metadata elision (default: false)
    #[serde(default)]
    pub advanced_optimizations: bool,

    /// Use the just-in-time compilation strategy (default: false)
    #[serde(default)]
    pub jit: bool,

    /// Keep parsed files and transform results between builds (default: true)
    #[serde(default = "default_true")]
    pub incremental: bool,

    /// Upper bound for worker threads; derived from the CPU count when absent
    #[serde(default)]
    pub max_workers: Option<usize>,

    /// Requested path -> replacement path
    #[serde(default)]
    pub file_replacements: FxHashMap<PathBuf, PathBuf>,

    #[serde(default)]
    pub preserve_symlinks: bool,

    /// Language of inline component styles (default: "css")
    #[serde(default = "default_inline_style_language")]
    pub inline_style_language: String,
}

fn default_true() -> bool {
    true
}

fn default_inline_style_language() -> String {
    "css".to_string()
}

impl Default for PluginOptions {
    fn default() -> Self {
        Self {
            sourcemap: false,
            third_party_sourcemaps: false,
            advanced_optimizations: false,
            jit: false,
            incremental: true,
            max_workers: None,
            file_replacements: FxHashMap::default(),
            preserve_symlinks: false,
            inline_style_language: default_inline_style_language(),
        }
    }
}

impl PluginOptions {
    /// Load plugin options from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, CompilationError> {
        let content = std::fs::read_to_string(path)?;
        let options: PluginOptions = serde_json::from_str(&content)?;
        Ok(options)
    }

    /// Worker count used by both pools
    pub fn resolved_max_workers(&self) -> usize {
        if let Some(max) = self.max_workers {
            return max.max(1);
        }

        std::env::var(MAX_WORKERS_ENV)
            .ok()
            .and_then(|value| value.trim().parse::<usize>().ok())
            .filter(|max| *max > 0)
            .unwrap_or_else(default_max_workers)
    }
}

/// One thread is left for the coordinator; more than four rarely pays off
pub fn default_max_workers() -> usize {
    let parallelism = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (parallelism.min(4).saturating_sub(1)).max(1)
}
