use bincode::{deserialize_from, serialize_into};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use log::debug;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::Result;
use crate::logframe::Logframe;
use crate::portfolio::PortfolioStore;

/// Write `value` as a gzip-compressed bincode snapshot.
///
/// The parent directory is created when missing. The snapshot is written to
/// a sibling `.tmp` file first and renamed over `path`, so a crash mid-write
/// never leaves a truncated snapshot behind.
pub fn save_snapshot<T: Serialize>(value: &T, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp = path.with_extension("tmp");
    {
        let file = File::create(&tmp)?;
        let encoder = GzEncoder::new(file, Compression::default());
        let mut writer = BufWriter::new(encoder);
        serialize_into(&mut writer, value)?;
        writer.flush()?;
        let encoder = writer.into_inner().map_err(|e| e.into_error())?;
        encoder.finish()?;
    }
    fs::rename(&tmp, path)?;

    debug!("snapshot written to {}", path.display());
    Ok(())
}

pub fn load_snapshot<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let file = File::open(path.as_ref())?;
    let decoder = GzDecoder::new(file);
    let mut reader = BufReader::new(decoder);

    let value: T = deserialize_from(&mut reader)?;
    Ok(value)
}

pub fn save_logframe(logframe: &Logframe, path: impl AsRef<Path>) -> Result<()> {
    save_snapshot(logframe, path)
}

pub fn load_logframe(path: impl AsRef<Path>) -> Result<Logframe> {
    load_snapshot(path)
}

pub fn save_portfolio(store: &PortfolioStore, path: impl AsRef<Path>) -> Result<()> {
    save_snapshot(store, path)
}

/// Load the portfolio snapshot, or an empty store when none was saved yet.
pub fn load_portfolio_or_default(path: impl AsRef<Path>) -> Result<PortfolioStore> {
    let path = path.as_ref();
    if !path.exists() {
        debug!("no portfolio snapshot at {}, starting empty", path.display());
        return Ok(PortfolioStore::default());
    }
    load_snapshot(path)
}
