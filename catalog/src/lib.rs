pub mod error;
pub mod ident;
pub mod mover;
pub mod partition;
pub mod query;
pub mod refdata;
pub mod service;
