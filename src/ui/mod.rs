pub mod indicator;
pub mod reader;
