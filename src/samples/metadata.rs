use futures::{stream, StreamExt};
use serde::Serialize;
use std::{fs::File, path::Path};
use symphonia::core::{
    formats::FormatOptions, io::MediaSourceStream, meta::MetadataOptions, probe::Hint,
};
use thiserror::Error;
use tracing::{debug, warn};

use super::SampleEntry;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Failed to open sample: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported or corrupt audio: {0}")]
    Format(#[from] symphonia::core::errors::Error),

    #[error("No default audio track")]
    NoTrack,
}

/// Datos técnicos leídos del contenedor
#[derive(Debug, Clone, PartialEq)]
pub struct AudioInfo {
    pub duration: Option<f64>,
    pub format: Option<String>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
}

/// Outcome of probing one sample.
///
/// Both variants become a [`MetadataRecord`]; keeping them apart lets callers
/// tell a real reading from a fallback.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Probed(AudioInfo),
    Degraded { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataRecord {
    pub id: String,
    pub path: String,
    pub duration: Option<f64>,
    pub format: Option<String>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    pub size: u64,
}

impl MetadataRecord {
    pub fn from_extraction(entry: &SampleEntry, extraction: &Extraction) -> Self {
        let fallback_format = extension_format(&entry.absolute_path);
        let (duration, format, sample_rate, channels) = match extraction {
            Extraction::Probed(info) => (
                info.duration,
                info.format.clone().or(fallback_format),
                info.sample_rate,
                info.channels,
            ),
            Extraction::Degraded { .. } => (None, fallback_format, None, None),
        };

        Self {
            id: entry.id.clone(),
            path: entry.relative_path.clone(),
            duration,
            format,
            sample_rate,
            channels,
            size: entry.size,
        }
    }
}

/// Probes one sample; never fails, errors become [`Extraction::Degraded`].
pub fn probe(entry: &SampleEntry) -> Extraction {
    match read_audio_info(&entry.absolute_path) {
        Ok(info) => Extraction::Probed(info),
        Err(err) => {
            warn!(path = %entry.absolute_path.display(), error = %err, "Metadata extraction failed, using fallback");
            Extraction::Degraded {
                reason: err.to_string(),
            }
        }
    }
}

/// Probes every entry, at most `concurrency` at a time.
///
/// Always returns one record per entry, in the same order.
pub async fn extract_batch(entries: &[SampleEntry], concurrency: usize) -> Vec<MetadataRecord> {
    let records: Vec<MetadataRecord> = stream::iter(entries.iter().cloned())
        .map(|entry| async move {
            let target = entry.clone();
            let extraction = match tokio::task::spawn_blocking(move || probe(&target)).await {
                Ok(extraction) => extraction,
                Err(err) => {
                    warn!(path = %entry.absolute_path.display(), error = %err, "Metadata task failed");
                    Extraction::Degraded {
                        reason: err.to_string(),
                    }
                }
            };
            MetadataRecord::from_extraction(&entry, &extraction)
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    debug!("Metadata extraída para {} samples", records.len());
    records
}

fn read_audio_info(path: &Path) -> Result<AudioInfo, ProbeError> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let track = probed.format.default_track().ok_or(ProbeError::NoTrack)?;
    let params = &track.codec_params;

    let duration = match (params.n_frames, params.sample_rate) {
        (Some(frames), Some(rate)) if rate > 0 => Some(frames as f64 / f64::from(rate)),
        _ => None,
    };
    let format = symphonia::default::get_codecs()
        .get_codec(params.codec)
        .map(|descriptor| descriptor.short_name.to_string());

    Ok(AudioInfo {
        duration,
        format,
        sample_rate: params.sample_rate,
        channels: params.channels.map(|channels| channels.count() as u16),
    })
}

fn extension_format(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(str::to_ascii_lowercase)
}
