//! Domain types for a subject-oriented process engine
//!
//! A process is described from the point of view of its **subjects**: the
//! roles that take part in it. Each subject runs its own state machine and
//! subjects coordinate by exchanging messages.
//!
//! # Key Concepts
//!
//! - **ProcessModel**: A validated, immutable graph of subjects, their
//!   states (FUNCTION, SEND, RECEIVE, END) and the transitions between them.
//! - **SchemaTree**: The resolved attribute schema that instance data must
//!   satisfy, built by the [`AttributeSchemaEngine`].
//! - **ProcessInstance**: A running execution of a model. It tracks the
//!   position of every subject, the business data and pending messages.
//! - **Task**: The work a subject has to do in its current state, with the
//!   legal next states.
//! - **AuditEntry**: An immutable record of one applied transition.

#![deny(unsafe_code)]

mod attribute;
mod audit;
mod error;
mod instance;
mod model;
mod schema;
mod task;

pub use attribute::*;
pub use audit::*;
pub use error::*;
pub use instance::*;
pub use model::*;
pub use schema::*;
pub use task::*;
