//! Component Harness: environment-agnostic test harnesses for UI components
//!
//! A harness wraps one component's host element and exposes intent-level
//! operations ("select the second option", "is the button disabled?") instead
//! of raw DOM access. The same harness code runs against an in-process test
//! bed or a real browser; only the [`Backend`] chosen at setup differs.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  Component Harness Architecture                  │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌────────────┐    ┌────────────┐            │
//! │   │ Harness    │    │ Harness    │    │ Backend    │            │
//! │   │ (typed     │───►│ Environment│───►│ testbed or │            │
//! │   │  queries)  │    │ + Element  │    │ CDP page   │            │
//! │   └────────────┘    └────────────┘    └────────────┘            │
//! │         ▲                 │                                     │
//! │         └── Predicate ◄───┘  (filters, ancestor, cardinality)   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every query and every element operation first waits for the backend to
//! settle, so tests never observe a half-updated tree.

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::large_stack_arrays, clippy::large_stack_frames))]

/// Backend boundary and the shipped backends
pub mod backend;
mod config;
mod element;
mod environment;
mod event;
mod geometry;
mod harness;
/// Tracing subscriber setup
pub mod logging;
mod parallel;
mod predicate;
mod query;
mod result;

#[cfg(feature = "browser")]
pub use backend::cdp::CdpBackend;
pub use backend::testbed::{element, ElementBuilder, TestBedBackend};
pub use backend::{Backend, ElementAction, ElementRead, MouseButton, NodeRef};
pub use config::{
    HarnessConfig, ENV_LOG_QUERIES, ENV_MAX_STABILIZE_CYCLES, ENV_STABILIZE_AFTER_ACTIONS,
    ENV_STABILIZE_TIMEOUT_MS,
};
pub use element::TestElement;
pub use environment::HarnessEnvironment;
pub use event::{EventData, KeyInput, ModifierKeys, TestKey};
pub use geometry::{BoundingBox, Point};
pub use harness::{
    BaseHarnessFilters, ComponentHarness, HarnessBase, HarnessFilters, StandardFilters,
};
pub use parallel::parallel;
pub use predicate::{HarnessPredicate, TextMatcher};
pub use query::{compose_selector, Cardinality, HarnessQuery};
pub use result::{HarnessError, HarnessResult};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::{
        element, parallel, Backend, ComponentHarness, HarnessBase, HarnessConfig,
        HarnessEnvironment, HarnessError, HarnessFilters, HarnessPredicate, HarnessResult,
        KeyInput, ModifierKeys, StandardFilters, TestBedBackend, TestElement, TestKey,
        TextMatcher,
    };
}
