pub mod builder;
pub mod config;
pub mod content;
pub mod feed;
pub mod output;
pub mod pipeline;
pub mod util;
