pub mod app;
pub mod convert;
pub mod scan;
