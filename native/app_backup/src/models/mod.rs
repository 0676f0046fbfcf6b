mod app_record;
pub use app_record::*;
mod backup_mode;
pub use backup_mode::*;
mod metadata;
pub use metadata::*;
mod settings;
pub use settings::*;
