pub mod config;
pub mod dat;
pub mod organize;
pub mod scan;
pub mod status;
