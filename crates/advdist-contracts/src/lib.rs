//! Contracts for the two external collaborators in this system: the
//! perturber (driven by the worker) and the data-loader (driven by the
//! coordinator). Both are opaque numerical/IO routines; this crate only
//! models the surface each side actually calls, plus in-memory reference
//! implementations for tests and demo runs.

pub mod data_loader;
pub mod perturber;

pub use data_loader::{DataLoader, InMemoryDataLoader};
pub use perturber::{NullPerturber, Perturber};
