pub mod criteria;
pub mod facets;
pub mod pg;
pub mod scatter;
pub mod sql;
