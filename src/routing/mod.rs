//! Request routing: version resolution, rule matching, path rewriting.

pub mod matcher;
pub mod rewrite;
pub mod router;
pub mod version;

pub use matcher::CompiledRule;
pub use rewrite::rewrite;
pub use router::{ResolvedRoute, RouteBuildError, RouteTable};
pub use version::{normalize_version, resolve_version};
