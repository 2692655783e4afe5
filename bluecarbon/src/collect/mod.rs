pub mod engine;
pub mod global_variables;
pub mod image;
pub mod local_engine;
pub mod vector;
