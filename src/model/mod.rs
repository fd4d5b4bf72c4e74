pub mod audit;
pub mod payroll;
pub mod role;
pub mod serial;
pub mod staff;
