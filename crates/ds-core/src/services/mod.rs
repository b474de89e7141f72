pub mod backup;
pub mod bootstrap;
pub mod cluster;
pub mod compose;
pub mod config_loader;
pub mod output;
pub mod process;
pub mod profile_resolver;
pub mod vault;
pub mod vm;
