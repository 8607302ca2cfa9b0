//! # dealflow-domain
//!
//! Pure domain model for the dealflow transaction automation engine.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define **Transactions** and the records hanging off them (tasks, documents)
//! - Define **Automation rules** (trigger event + trigger condition → workflow template)
//! - Define the **Trigger context** handed to rule evaluation
//! - Define the **Workflow execution** state machine and its retry bookkeeping
//! - Define **Audit entries**, **Notifications** and inbound **Domain events**
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod audit;
pub mod context;
pub mod event;
pub mod execution;
pub mod notification;
pub mod rule;
pub mod template;
pub mod transaction;
