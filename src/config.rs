//! TOML configuration loading and input-file discovery.
//!
//! The config file names an input directory, an output file, and a list of
//! filename masks. Discovery scans the input directory for regular files
//! whose name matches a mask (case-insensitive, `.csv` suffix) and hands
//! the pipeline a sorted, deduplicated path list.
//!
//! ```toml
//! [main]
//! input = "./data"
//! output = "./out/median.csv"
//! filename_mask = ["trades"]
//! streaming_mode = false
//! digest_compression = 25
//! extra_values = ["mean", "p95"]
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use log::warn;
use regex::RegexBuilder;
use serde::Deserialize;

use crate::error::{MedianStreamError, Result};
use crate::tdigest::{TDigest, DEFAULT_COMPRESSION};

#[derive(Debug, Deserialize)]
struct RawConfig {
    main: RawMain,
}

#[derive(Debug, Deserialize)]
struct RawMain {
    input: String,
    output: String,

    #[serde(default)]
    filename_mask: Vec<String>,

    #[serde(default)]
    streaming_mode: bool,

    #[serde(default = "default_compression")]
    digest_compression: usize,

    #[serde(default)]
    extra_values: Vec<String>,
}

fn default_compression() -> usize {
    DEFAULT_COMPRESSION
}

/// Resolved pipeline configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Discovered input files, sorted and deduplicated
    pub input_files: Vec<PathBuf>,

    /// Output CSV path, created on first write if absent
    pub output_file: PathBuf,

    /// Keep tailing inputs after end-of-file
    pub streaming_mode: bool,

    /// T-digest compression parameter
    pub digest_compression: usize,

    /// Recognized extra statistic names, in emission order
    pub extra_quantiles: Vec<String>,
}

impl Config {
    /// Load and validate a configuration file.
    ///
    /// # Errors
    ///
    /// [`MedianStreamError::InvalidConfig`] for a missing or unparsable
    /// file, an invalid mask, no matching input files, an empty output
    /// path, or a zero compression parameter.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            MedianStreamError::invalid_config(format!(
                "cannot read config file {}: {e}",
                path.display()
            ))
        })?;

        let raw: RawConfig = toml::from_str(&content).map_err(|e| {
            MedianStreamError::invalid_config(format!(
                "cannot parse config file {}: {e}",
                path.display()
            ))
        })?;

        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self> {
        let main = raw.main;

        if main.output.trim().is_empty() {
            return Err(MedianStreamError::invalid_config("output path is empty"));
        }
        if main.digest_compression == 0 {
            return Err(MedianStreamError::invalid_config(
                "digest_compression must be at least 1",
            ));
        }

        let input_dir = PathBuf::from(&main.input);
        if !input_dir.is_dir() {
            return Err(MedianStreamError::invalid_config(format!(
                "input directory does not exist: {}",
                input_dir.display()
            )));
        }

        let input_files = find_csv_files(&input_dir, &main.filename_mask)?;
        if input_files.is_empty() {
            return Err(MedianStreamError::invalid_config(format!(
                "no input files matched under {}",
                input_dir.display()
            )));
        }

        let mut extra_quantiles = Vec::new();
        for name in main.extra_values {
            if TDigest::is_recognized_extra(&name) {
                extra_quantiles.push(name);
            } else {
                warn!("ignoring unrecognized extra value name {name:?}");
            }
        }

        Ok(Self {
            input_files,
            output_file: PathBuf::from(main.output),
            streaming_mode: main.streaming_mode,
            digest_compression: main.digest_compression,
            extra_quantiles,
        })
    }
}

/// Scan `dir` for regular `.csv` files whose name matches any of `masks`
/// (case-insensitive substring patterns). An empty mask list matches every
/// `.csv` file.
fn find_csv_files(dir: &Path, masks: &[String]) -> Result<Vec<PathBuf>> {
    let effective: Vec<String> = if masks.is_empty() {
        vec![String::new()]
    } else {
        masks.to_vec()
    };

    let mut files = Vec::new();
    for mask in &effective {
        let pattern = format!(".*{mask}.*\\.csv$");
        let regex = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| {
                MedianStreamError::invalid_config(format!("invalid filename mask {mask:?}: {e}"))
            })?;

        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if regex.is_match(name) {
                    files.push(path);
                }
            }
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}
