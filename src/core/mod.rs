//! Core graph logic: values, expressions, schemas, the graph, planning, state.

pub mod expression;
pub mod graph;
pub mod parser;
pub mod path;
pub mod planner;
pub mod registry;
pub mod schema;
pub mod state;
pub mod types;
pub mod value;
