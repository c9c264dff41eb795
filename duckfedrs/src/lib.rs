pub mod backends;
pub mod casts;
pub mod compiler;
pub mod config;
pub mod dialect;
pub mod error;
pub mod executor;
pub mod federation;
pub mod metadata;
pub mod router;
pub mod sql_tokens;
pub mod sql_ast;
pub mod types;
pub mod visual_query;

use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

pub use backends::{BackendResponse, BackendRows, ExecutionBackend, ExecutionContext};
#[cfg(feature = "duckdb")]
pub use backends::{AttachTarget, DuckDbBackend};
pub use casts::{CastResolver, ColumnPair, ColumnRef, ResolvedCasts, TypeConflict};
pub use compiler::{compile, CompileOutput, SqlCompiler};
pub use config::DuckfedConfig;
pub use error::{DuckfedError, ExecutionError, Result};
pub use executor::QueryResult;
pub use federation::{
    AttachDatabase, ConnectionInfo, ConnectionRegistry, DatabaseType, Detection,
    FederatedQueryDetector, SelectedTable, TableSource,
};
pub use metadata::{parse_column_metadata, ColumnMetadataProvider, MetadataCache};
pub use router::{QueryRouter, QueryState};
pub use types::{normalize_type, ColumnProfile, TypeCategory};
pub use visual_query::VisualQueryConfig;
