// Price series domain
pub mod market;

// Feature schema, scaling, datasets and metrics
pub mod ml;

// Port interfaces
pub mod ports;

// Raw series validation
pub mod validation;

// Domain-specific error types
pub mod errors;
