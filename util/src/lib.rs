pub mod archive;
pub mod config;
pub mod logging;
pub mod paths;
pub mod test_helpers;
