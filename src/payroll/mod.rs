pub mod derive;
pub mod events;
pub mod machine;
pub mod service;
pub mod settlement;

pub use machine::Trigger;
pub use service::PayrollService;
