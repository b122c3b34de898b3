//! Module data model, dependency resolution, and reusable step interceptors.
//!
//! ## Contents
//! - [`Module`], [`SystemMap`] — module definitions (deps, opaque state, tags,
//!   named update functions, export, plugin overlays) and the full collection
//!   treated as one value;
//! - [`Selector`], [`Plugin`], [`Update`] — update-function lookup and the
//!   wrap-the-previous plugin fold;
//! - [`resolve_order`] — dependency-closure ordering with cycle detection;
//! - [`steps`] — the tag guards and the `step` interceptor consumed by the
//!   transition orchestrator.
//!
//! ## Quick wiring
//! ```text
//! SystemMap ──► resolve_order(keys) ──► [k1, k2, …]   (deps before dependents)
//!      └─► steps::step(selector) resolves each module's update function
//!          against its plugin-extended definition and injects dependency
//!          exports into the call.
//! ```

mod module;
mod resolver;
pub mod steps;

pub use module::{
    Arg, Args, Export, ExportFn, Exports, Module, ModuleKey, Plugin, Selector, State, SystemMap,
    Update, UpdateFn, WrapFn,
};
pub use resolver::resolve_order;
