pub mod catalog;
pub mod lot;
