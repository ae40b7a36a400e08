pub mod environment;
pub mod export;
pub mod import;
pub mod mapping;
pub mod migrate;
pub mod rollback;

pub use export::ExportCommand;
pub use import::ImportCommand;
pub use mapping::MappingCommand;
pub use migrate::MigrateCommand;
pub use rollback::RollbackCommand;
