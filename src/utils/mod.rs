pub mod atomic;
pub mod filters;
