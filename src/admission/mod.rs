//! Admission of identity commitments into groups.

/// The admission service
pub mod service;
/// Receipts, proofs and errors
pub mod types;

pub use service::AdmissionService;
