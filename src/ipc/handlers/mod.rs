pub mod backup;
pub mod comments;
pub mod core;
pub mod marks;
pub mod reports;
pub mod results;
pub mod students;
pub mod subjects;
