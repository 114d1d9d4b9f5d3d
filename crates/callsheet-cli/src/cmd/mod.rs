pub mod allocate;
pub mod dashboard;
pub mod init;
pub mod reallocate;
pub mod report;
pub mod rows;
pub mod submit;
pub mod user;
