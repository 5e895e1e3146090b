//! Load `fsload.toml`. Keys are flat; the two mapping tables are TOML tables.
//!
//! ```toml
//! protocol = "nfs"
//! host = "10.0.0.1"
//! root_directory = "/export/docs"
//! mount_point = "/mnt/docs"
//! exclude = ["*.tmp"]
//!
//! [user_ids_to_names]
//! 1000 = "alice"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::Opts;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FsloadToml {
    pub protocol: Option<String>,
    pub host: Option<String>,
    pub root_directory: Option<String>,
    pub mount_point: Option<String>,
    pub mount_options: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub workgroup: Option<String>,
    pub user_ids_to_names: Option<BTreeMap<String, String>>,
    pub group_ids_to_names: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub include: Vec<String>,
    pub skip_non_readable_files: Option<bool>,
    pub secured: Option<bool>,
    pub verbose: Option<bool>,
    pub db_path: Option<String>,
    pub mapping_miss_threshold: Option<usize>,
}

pub fn parse_fsload_toml(s: &str) -> Result<FsloadToml> {
    toml::from_str(s).context("parse configuration")
}

/// Read and parse `path`. A run cannot start without one.
pub fn load_fsload_toml(path: &Path) -> Result<FsloadToml> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("read configuration {}", path.display()))?;
    parse_fsload_toml(&s).with_context(|| path.display().to_string())
}

/// Overwrite opts field from file when present.
macro_rules! apply_file_opt {
    ($file:expr, $opts:expr, $file_field:ident => $opts_field:ident) => {
        if $file.$file_field.is_some() {
            $opts.$opts_field = $file.$file_field;
        }
    };
}

/// File values for run flags. Call before applying CLI flags, which win.
pub fn apply_file_to_opts(file: &FsloadToml, opts: &mut Opts) {
    if let Some(ref p) = file.db_path {
        opts.db_path = Some(p.into());
    }
    apply_file_opt!(file, opts, secured => secured);
    apply_file_opt!(file, opts, verbose => verbose);
}
