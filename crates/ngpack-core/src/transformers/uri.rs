use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

/// Prefix shared by every virtual resource specifier
pub const JIT_NAMESPACE_PREFIX: &str = "angular:jit:";

static JIT_URI_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^angular:jit:(template|style):(file|inline);(.*)$").expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JitResourceKind {
    Template,
    Style,
}

impl fmt::Display for JitResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JitResourceKind::Template => f.write_str("template"),
            JitResourceKind::Style => f.write_str("style"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JitResourceOrigin {
    File,
    Inline,
}

/// A parsed virtual resource specifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JitResource {
    pub kind: JitResourceKind,
    pub origin: JitResourceOrigin,
    /// URL for file resources, base64 data for inline ones
    pub specifier: String,
}

impl JitResource {
    /// Decoded content of an inline resource
    pub fn inline_contents(&self) -> Option<String> {
        if self.origin != JitResourceOrigin::Inline {
            return None;
        }
        let bytes = STANDARD.decode(&self.specifier).ok()?;
        String::from_utf8(bytes).ok()
    }
}

/// `angular:jit:<kind>:file;<url>`
pub fn generate_jit_file_uri(url: &str, kind: JitResourceKind) -> String {
    format!("{}{}:file;{}", JIT_NAMESPACE_PREFIX, kind, url)
}

/// `angular:jit:<kind>:inline;<base64 data>`
pub fn generate_jit_inline_uri(data: &str, kind: JitResourceKind) -> String {
    format!(
        "{}{}:inline;{}",
        JIT_NAMESPACE_PREFIX,
        kind,
        STANDARD.encode(data.as_bytes())
    )
}

pub fn parse_jit_uri(uri: &str) -> Option<JitResource> {
    let captures = JIT_URI_REGEX.captures(uri)?;
    let kind = match &captures[1] {
        "template" => JitResourceKind::Template,
        _ => JitResourceKind::Style,
    };
    let origin = match &captures[2] {
        "file" => JitResourceOrigin::File,
        _ => JitResourceOrigin::Inline,
    };
    Some(JitResource {
        kind,
        origin,
        specifier: captures[3].to_string(),
    })
}
