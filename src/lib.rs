pub mod config;
pub mod describe;
pub mod merge;
pub mod model;
pub mod output;
pub mod parser;
pub mod pipeline;
