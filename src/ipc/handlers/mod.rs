pub mod attendance;
pub mod backup;
pub mod behaviors;
pub mod classes;
pub mod core;
pub mod dashboard;
pub mod honor;
pub mod reports;
pub mod students;
pub mod tasks;
