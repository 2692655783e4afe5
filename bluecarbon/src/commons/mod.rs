pub mod albers;
pub mod basic_functions;
