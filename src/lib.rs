// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Dockhand Reconcile
//!
//! Declarative, idempotent management of Docker resources through the
//! Dockhand HTTP API.
//!
//! ## Overview
//!
//! Containers, Compose stacks, environments, networks, volumes and images
//! are declared in `dockhand.yaml`. Each `apply` compares the declaration
//! with the local state file and converges Dockhand towards it, choosing
//! per field between an in-place update and a replace.
//!
//! ## Architecture
//!
//! 1. **Desired state**: declared in `dockhand.yaml`
//! 2. **Persisted state**: last known server view, in `.dockhand/state.json`
//! 3. **Reconciler**: one generic Create/Read/Update/Delete state machine
//!    driven by a static per-kind field policy table
//!
//! ## Modules
//!
//! - [`resource`]: resource records and the field policy table
//! - [`gateway`]: the Dockhand API surface and its HTTP client
//! - [`reconciler`]: lifecycle engine and drift merge
//! - [`config`]: configuration parsing, validation and hashing
//! - [`state`]: state file and storage
//! - [`planner`]: diff computation, plans and plan execution
//! - [`cli`]: command-line interface
//!
//! ## Example
//!
//! ```yaml
//! provider:
//!   endpoint: https://dockhand.example.com
//!
//! volumes:
//!   data:
//!     environment_id: "1"
//!
//! containers:
//!   web:
//!     environment_id: "1"
//!     image: nginx:1.27
//!     env: ["MODE=prod"]
//!     mounts:
//!       - type: volume
//!         source: data
//!         destination: /usr/share/nginx/html
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod planner;
pub mod reconciler;
pub mod resource;
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigHasher, ConfigParser, ConfigValidator, DockhandConfig};
pub use error::{DockhandError, Result};
pub use gateway::{DockhandClient, Gateway, HealthChecker, Inventory};
pub use planner::{DeploymentPlan, DiffEngine, PlanExecutor};
pub use reconciler::{Phase, ReconcileAction, Reconciler, Reconciliation, drift_merge};
pub use resource::{Action, KindPolicy, ResourceKind, ResourceRecord};
pub use state::{LocalStateStore, StateFile, StateStore};
