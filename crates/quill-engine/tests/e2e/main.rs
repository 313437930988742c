//! End-to-end tests for the Quill engine
//!
//! These tests compile script source through the full pipeline, load the
//! resulting code unit and execute it, checking the values and exceptions
//! the host sees.

mod harness;

mod bindings;
mod control_flow;
mod exceptions;
mod expressions;
mod functions;
mod optimizer;
mod patterns;
mod sandbox;
