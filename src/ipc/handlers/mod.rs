pub mod codes;
pub mod core;
pub mod entities;
pub mod lecturers;
pub mod maintenance;
pub mod records;
