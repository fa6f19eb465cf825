#![deny(clippy::all)]

/**
 * Reactive View Engine
 *
 * Definition-driven view runtime: immutable view definitions, per-instance
 * view data, two-phase change detection, scoped dependency injection and
 * bloom-filtered queries.
 */
pub mod definition;
pub mod element;
pub mod errors;
pub mod ng_content;
pub mod provider;
pub mod pure_expression;
pub mod query;
pub mod refs;
pub mod services;
pub mod text;
pub mod types;
pub mod view;

pub use definition::{
    anchor_def, directive_def, element_def, ng_content_def, pipe_def, provider_def,
    pure_array_def, pure_object_def, pure_pipe_def, query_def, text_def, view_def, DirectiveOpts,
    ElementOpts,
};
pub use errors::EngineError;
pub use services::{DebugNodeSnapshot, DebugViewSnapshot};
pub use types::*;
pub use view::{CheckContext, CheckMode, CheckPhase, EventContext, ViewEngine};
