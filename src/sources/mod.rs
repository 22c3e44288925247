//! Built-in source adapters
//!
//! [`NamingScheme`] knows how the upstream products used by the radar app
//! encode their observation time. [`local`] provides a runnable collaborator
//! set for archives mirrored onto a local or network filesystem.

pub mod local;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use crate::core::collaborator::Layout;

pub use local::{local_collaborators, CopyTransfer, DirectoryCatalog, PassthroughTransform};

/// How a product family encodes its observation time in file names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamingScheme {
    /// MRMS mosaics: `<product>_YYYYMMDD-HHMMSS.grib2.gz`
    #[default]
    Mrms,
    /// GMGSI satellite mosaics: `<product>_nc.YYYYMMDDHH`
    Satellite,
    /// IMERG precipitation: `.YYYYMMDD.HHMMSS.` anywhere in the name
    Gpm,
}

impl NamingScheme {
    pub fn parse(&self, name: &str) -> Option<DateTime<Utc>> {
        match self {
            NamingScheme::Mrms => parse_mrms(name),
            NamingScheme::Satellite => parse_satellite(name),
            NamingScheme::Gpm => parse_gpm(name),
        }
    }
}

impl fmt::Display for NamingScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamingScheme::Mrms => write!(f, "mrms"),
            NamingScheme::Satellite => write!(f, "satellite"),
            NamingScheme::Gpm => write!(f, "gpm"),
        }
    }
}

impl Layout for NamingScheme {
    fn parse_observation_time(&self, entry_name: &str) -> Option<DateTime<Utc>> {
        self.parse(entry_name)
    }
}

fn mrms_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"_(\d{8}-\d{6})(?:\.|$)").expect("static regex"))
}

fn satellite_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"_nc\.(\d{10})(?:\D|$)").expect("static regex"))
}

fn gpm_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\.(\d{8})\.(\d{6})(?:\.|$)").expect("static regex"))
}

fn parse_utc(text: &str, format: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(text, format)
        .ok()
        .map(|naive| naive.and_utc())
}

fn parse_mrms(name: &str) -> Option<DateTime<Utc>> {
    // Product names may themselves contain underscores; the stamp is the last match
    let stamp = mrms_pattern().captures_iter(name).last()?;
    parse_utc(&stamp[1], "%Y%m%d-%H%M%S")
}

fn parse_satellite(name: &str) -> Option<DateTime<Utc>> {
    let caps = satellite_pattern().captures(name)?;
    // Hourly product: minutes are implied
    parse_utc(&format!("{}00", &caps[1]), "%Y%m%d%H%M")
}

fn parse_gpm(name: &str) -> Option<DateTime<Utc>> {
    let caps = gpm_pattern().captures(name)?;
    parse_utc(&format!("{}{}", &caps[1], &caps[2]), "%Y%m%d%H%M%S")
}
