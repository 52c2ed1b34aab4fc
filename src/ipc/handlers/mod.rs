pub mod classes;
pub mod core;
pub mod grades;
pub mod rollover;
pub mod setup;
pub mod students;
pub mod teachers;
