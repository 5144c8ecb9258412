// Path and File Name : /root/crate/gateway/src/kb/mod.rs
// Details of functionality of this file: module wiring for the knowledge-base compilation
// pipeline (Catalog Introspector -> Semantic Store -> Join Graph -> Rules Compiler -> Scheduler).

pub mod join_graph;
pub mod rules_compiler;
pub mod scheduler;
pub mod schema_introspector;
pub mod semantic_store;
pub mod types;

pub use rules_compiler::RulesCompiler;
pub use scheduler::{KbScheduler, KbState};
pub use schema_introspector::SchemaIntrospector;
pub use semantic_store::SemanticStore;
pub use types::CompiledRules;
