//! Emit transformers applied by the compilation strategies

pub mod ctor_parameters;
pub mod jit_resources;
pub mod replace_bootstrap;
pub mod symbols;
pub mod uri;
pub mod visit;

pub use ctor_parameters::CtorParametersTransformer;
pub use jit_resources::{JitResourceTransformer, RESOURCE_IMPORT_PREFIX};
pub use replace_bootstrap::ReplaceBootstrapTransformer;
pub use symbols::{ImportSymbols, SymbolOrigin, FRAMEWORK_CORE_MODULE};
pub use uri::{
    generate_jit_file_uri, generate_jit_inline_uri, parse_jit_uri, JitResource,
    JitResourceKind, JitResourceOrigin, JIT_NAMESPACE_PREFIX,
};
