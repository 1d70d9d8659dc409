pub mod logger;
pub mod preprocessing;
