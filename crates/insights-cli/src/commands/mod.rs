pub mod analyze;
pub mod compare;
pub mod generate;
pub mod init;
pub mod validate;
