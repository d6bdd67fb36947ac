pub mod backup_exchange;
pub mod core;
pub mod programs;
pub mod schedule;
pub mod syllabus;
pub mod users;
