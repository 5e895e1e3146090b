pub mod config;
pub mod credentials;
pub mod fsload_toml;
pub mod logger;

pub use config::*;
pub use credentials::{MASKED_PASSWORD, resolve_smb_password};
pub use fsload_toml::{FsloadToml, apply_file_to_opts, load_fsload_toml, parse_fsload_toml};
pub use logger::setup_logging;
