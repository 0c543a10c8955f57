//! Specialist agents and the fan-out executor.
//!
//! This module provides the specialist contract, its HTTP implementation,
//! deterministic stubs for test runs and the concurrent dispatcher.

pub mod executor;
pub mod http;
pub mod specialist;
pub mod stub;

pub use executor::FanOutExecutor;
pub use http::HttpSpecialist;
pub use specialist::{Specialist, SpecialistRegistry};
