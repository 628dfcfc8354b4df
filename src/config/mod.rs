pub mod fields;
pub mod loader;
pub mod schema;
pub mod tenant;

pub use fields::{FieldDefinition, FieldKind, default_fields, parse_fields, validate_fields};
pub use loader::{get_config_path, load_config, save_config};
pub use schema::{AdminApiConfig, BotConfig, Config, ExpiryConfig, StorageConfig};
pub use tenant::{LinkButton, TenantSettings, merge_override};
