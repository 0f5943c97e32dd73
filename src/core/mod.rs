pub mod errors;
pub mod http;
pub mod models;
pub mod utils;

pub use errors::{
    Result,
    SyncError,
};
pub use models::{
    AnkiSettings,
    CardId,
    FieldMappings,
    SyncStatus,
};
