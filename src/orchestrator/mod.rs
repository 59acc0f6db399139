//! Orchestration core
//!
//! Turns a natural-language question about financial disclosures into an
//! ordered plan of retrieval steps, executes the steps one at a time
//! against the registered tools, and revises the plan (a bounded number
//! of times) when it stops being viable. Accumulated results live in a
//! per-query context store and are never recomputed or overwritten.

pub mod context;
pub mod coordinator;
pub mod evaluator;
pub mod intent;
pub mod invoker;
pub mod plan;
pub mod planner;
pub mod router;
