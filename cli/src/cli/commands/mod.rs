pub mod check_path;
pub mod start;
pub mod status;
