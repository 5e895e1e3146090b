//! Validated run configuration, built from `fsload.toml` plus CLI flags.

use anyhow::{Context, Result};
use log::{info, warn};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::FsError;
use crate::filter::PathFilter;
use crate::security::{AclBuilder, IdMapping, PrincipalKind, SidMapping};
use crate::types::{CrawlOpts, Opts, Protocol};
use crate::url::Resolver;
use crate::utils::{
    FsloadToml, MASKED_PASSWORD, PackagePaths, apply_file_to_opts, load_fsload_toml,
    resolve_smb_password,
};

#[derive(Debug, Clone)]
pub struct MountConfig {
    pub host: String,
    /// Exported path on the server, no trailing slash.
    pub remote_root: String,
    /// Local attachment point, no trailing slash.
    pub mount_point: String,
    pub mount_options: Option<String>,
    pub users: IdMapping,
    pub groups: IdMapping,
}

impl MountConfig {
    pub fn resolver(&self) -> Resolver {
        Resolver::Mount {
            host: self.host.clone(),
            remote_root: self.remote_root.clone(),
            mount_point: self.mount_point.clone(),
        }
    }
}

#[derive(Clone)]
pub struct SmbConfig {
    pub host: String,
    pub share: String,
    pub user: String,
    pub password: String,
    pub workgroup: Option<String>,
    /// Where the CIFS client attaches the share.
    pub mount_point: String,
    pub sids: SidMapping,
}

impl std::fmt::Debug for SmbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmbConfig")
            .field("host", &self.host)
            .field("share", &self.share)
            .field("user", &self.user)
            .field("password", &MASKED_PASSWORD)
            .field("workgroup", &self.workgroup)
            .field("mount_point", &self.mount_point)
            .finish()
    }
}

/// Backend selection with its own payload.
#[derive(Debug, Clone)]
pub enum FsConfig {
    Mount(MountConfig),
    Smb(SmbConfig),
}

impl FsConfig {
    pub fn protocol(&self) -> Protocol {
        match self {
            FsConfig::Mount(_) => Protocol::Nfs,
            FsConfig::Smb(_) => Protocol::Smb,
        }
    }

    pub fn resolver(&self) -> Resolver {
        match self {
            FsConfig::Mount(cfg) => cfg.resolver(),
            FsConfig::Smb(cfg) => Resolver::Smb {
                host: cfg.host.clone(),
                share: cfg.share.clone(),
            },
        }
    }

    /// Shares compare paths case-insensitively; mounted exports do not.
    pub fn case_sensitive(&self) -> bool {
        matches!(self, FsConfig::Mount(_))
    }

    pub fn acl_builder(&self) -> AclBuilder {
        match self {
            FsConfig::Mount(cfg) => AclBuilder::for_mount(cfg.users.clone(), cfg.groups.clone()),
            FsConfig::Smb(cfg) => AclBuilder::for_smb(cfg.sids.clone()),
        }
    }

    /// Validate file values. `dir` is where `.env` is looked up; `ask_password` allows a prompt.
    pub fn from_file(file: &FsloadToml, dir: &Path, ask_password: bool) -> Result<FsConfig> {
        let raw_protocol = required(&file.protocol, "protocol")?;
        let protocol: Protocol = raw_protocol
            .parse()
            .map_err(|_| FsError::Config(format!("unrecognized protocol '{raw_protocol}'")))?;
        let host = required(&file.host, "host")?.to_string();
        let root = required(&file.root_directory, "root_directory")?;

        let config = match protocol {
            Protocol::Nfs => {
                let remote_root = root.trim_end_matches('/').to_string();
                if !root.starts_with('/') {
                    return Err(FsError::Config(format!(
                        "root_directory must be absolute: {root}"
                    ))
                    .into());
                }
                let mount_point = required(&file.mount_point, "mount_point")?
                    .trim_end_matches('/')
                    .to_string();
                if mount_point.is_empty() || !Path::new(&mount_point).is_absolute() {
                    return Err(FsError::Config(format!(
                        "invalid mount_point '{}'",
                        file.mount_point.as_deref().unwrap_or_default()
                    ))
                    .into());
                }
                FsConfig::Mount(MountConfig {
                    host,
                    remote_root,
                    mount_point,
                    mount_options: file.mount_options.clone().filter(|o| !o.is_empty()),
                    users: IdMapping::from_config(mapping_or_warn(
                        &file.user_ids_to_names,
                        "user_ids_to_names",
                    ))?,
                    groups: IdMapping::from_config(mapping_or_warn(
                        &file.group_ids_to_names,
                        "group_ids_to_names",
                    ))?,
                })
            }
            Protocol::Smb => {
                let share = root.trim_matches('/').to_string();
                if share.is_empty() || share.contains('/') {
                    return Err(FsError::Config(format!("invalid share name '{root}'")).into());
                }
                let user = required(&file.user, "user")?.to_string();
                let password =
                    resolve_smb_password(file.password.as_deref(), &user, dir, ask_password)?
                        .ok_or_else(|| FsError::Config("missing option: password".into()))?;
                let mount_point = match &file.mount_point {
                    Some(mp) => mp.trim_end_matches('/').to_string(),
                    None => std::env::temp_dir()
                        .join(format!("{}-{}-{}", PackagePaths::get().pkg_name(), host, share))
                        .to_string_lossy()
                        .to_string(),
                };
                let mut sids = SidMapping::default();
                sids.add_mappings(
                    mapping_or_warn(&file.user_ids_to_names, "user_ids_to_names"),
                    PrincipalKind::User,
                );
                sids.add_mappings(
                    mapping_or_warn(&file.group_ids_to_names, "group_ids_to_names"),
                    PrincipalKind::Group,
                );
                FsConfig::Smb(SmbConfig {
                    host,
                    share,
                    user,
                    password,
                    workgroup: file.workgroup.clone().filter(|w| !w.is_empty()),
                    mount_point,
                    sids,
                })
            }
        };
        config.log_summary();
        Ok(config)
    }

    fn log_summary(&self) {
        match self {
            FsConfig::Mount(cfg) => info!(
                "Protocol: nfs, host: {}, root: {}, mount point: {}, options: {}",
                cfg.host,
                cfg.remote_root,
                cfg.mount_point,
                cfg.mount_options.as_deref().unwrap_or("-")
            ),
            FsConfig::Smb(cfg) => info!(
                "Protocol: smb, host: {}, share: {}, user: {}, password: {}, workgroup: {}",
                cfg.host,
                cfg.share,
                cfg.user,
                MASKED_PASSWORD,
                cfg.workgroup.as_deref().unwrap_or("-")
            ),
        }
    }
}

/// Everything a run needs, validated.
#[derive(Debug)]
pub struct Settings {
    pub fs: FsConfig,
    pub filter: PathFilter,
    pub crawl: CrawlOpts,
    pub db_path: PathBuf,
    pub mapping_miss_threshold: Option<usize>,
}

impl Settings {
    /// Parsed config file named by `opts` (or the default) and the directory it lives in.
    pub fn read_file(opts: &Opts) -> Result<(FsloadToml, PathBuf)> {
        let path = opts
            .config_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(PackagePaths::get().config_filename()));
        let file = load_fsload_toml(&path)?;
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .to_path_buf();
        Ok((file, dir))
    }

    pub fn from_file(file: &FsloadToml, dir: &Path, cli: &Opts) -> Result<Settings> {
        let mut merged = Opts::default();
        apply_file_to_opts(file, &mut merged);
        if cli.db_path.is_some() {
            merged.db_path = cli.db_path.clone();
        }
        merged.secured = cli.secured.or(merged.secured);
        merged.verbose = cli.verbose.or(merged.verbose);

        let fs = FsConfig::from_file(file, dir, cli.ask_password)?;

        let mut filter = PathFilter::new(fs.case_sensitive());
        filter
            .set_excluded_patterns(&file.exclude)
            .context("exclude patterns")?;
        filter
            .set_included_patterns(&file.include)
            .context("include patterns")?;

        let crawl = CrawlOpts {
            secured: merged.secured.unwrap_or(false),
            skip_non_readable_files: file.skip_non_readable_files.unwrap_or(true),
            verbose: merged.verbose.unwrap_or(false),
        };
        let db_path = merged
            .db_path
            .unwrap_or_else(|| PathBuf::from(PackagePaths::get().db_filename()));

        Ok(Settings {
            fs,
            filter,
            crawl,
            db_path,
            mapping_miss_threshold: file.mapping_miss_threshold,
        })
    }
}

fn required<'a>(value: &'a Option<String>, key: &str) -> Result<&'a str, FsError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| FsError::Config(format!("missing option: {key}")))
}

fn mapping_or_warn<'a>(
    map: &'a Option<BTreeMap<String, String>>,
    key: &str,
) -> &'a BTreeMap<String, String> {
    static EMPTY: BTreeMap<String, String> = BTreeMap::new();
    match map {
        Some(m) => m,
        None => {
            warn!("No {} mapping configured", key);
            &EMPTY
        }
    }
}
