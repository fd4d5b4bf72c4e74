pub mod filter;
pub mod generator;

pub use filter::SerialFilter;
pub use generator::SerialNumberGenerator;
