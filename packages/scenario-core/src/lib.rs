//! Record dependency resolution and materialization engine.
//!
//! Turns directories of CSV scenario files into ordered create/update
//! operations against a record store, resolving aliases across files,
//! capturing values populated by server-side automation, and reversing the
//! whole thing for cleanup.
//!
//! ```text
//! Scenario -> HeaderPlan -> RowDraft -> resolve_draft -> RecordHandler -> RecordStore
//!                                           ^                                  |
//!                                           +---------- AliasRegistry <--------+
//! ```

pub mod alias;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod handler;
pub mod lint;
pub mod materializer;
pub mod report;
pub mod resolver;
pub mod source;
pub mod split;
pub mod store;
pub mod transform;

pub use alias::{AliasEntry, AliasExpr, AliasRegistry};
pub use cleanup::CleanupEngine;
pub use config::{FactoryConfig, PollPolicy};
pub use error::{
    FactoryError, RegistryError, ResolveError, ScenarioFailure, SourceError, StoreError,
    TransformError,
};
pub use handler::{HandlerRegistry, RecordHandler, WriteMode};
pub use materializer::{ScenarioMaterializer, WriteJournal};
pub use report::{CleanupReport, FileReport, FileState, ScenarioReport, Warning};
pub use source::{FileMode, Scenario, SourceFile};
pub use store::{Fields, MemoryStore, Record, RecordFilter, RecordId, RecordStore};
