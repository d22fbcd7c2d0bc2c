//! Gain tables for the two sensor types
//!
//! Both tables yield volts per ADC count for every saved channel:
//! `conversion = int_to_volts / channel_gain`. Which table applies is
//! decided by the header's declared `typeThis`, never by inspecting data.

use serde::{Deserialize, Serialize};

use super::meta::MetaData;
use crate::error::{SyncError, SyncResult};

/// Full-scale count of the NI-DAQ 16-bit ADC
const NI_MAX_INT: f64 = 32768.0;

/// Full-scale count of 10-bit Neuropixels 1.0 headstages
const IMEC_DEFAULT_MAX_INT: f64 = 512.0;

/// Fixed gain of Neuropixels 2.0 probes
const NP2_GAIN: f64 = 80.0;

/// Declared sensor type of an acquisition stream.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorType {
    /// High-channel-count probe; corrected signals are reported in µV
    Imec,
    /// Generic analog-input DAQ; corrected signals are reported in mV
    Nidq,
}

impl SensorType {
    /// Read `typeThis` from the header
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Header`] if the key is missing or unknown.
    pub fn from_meta(meta: &MetaData) -> SyncResult<Self> {
        match meta.get("typeThis")? {
            "imec" => Ok(Self::Imec),
            "nidq" => Ok(Self::Nidq),
            other => Err(SyncError::header(meta.path(), format!("unknown typeThis {other:?}"))),
        }
    }

    /// Sample-rate header key
    #[must_use]
    pub const fn sample_rate_key(self) -> &'static str {
        match self {
            Self::Imec => "imSampRate",
            Self::Nidq => "niSampRate",
        }
    }
}

/// Volts per count for every saved channel of `meta`
///
/// # Errors
///
/// Returns [`SyncError::Header`] if a required gain key is missing or
/// malformed.
pub fn conversions(meta: &MetaData, sensor: SensorType) -> SyncResult<Vec<f64>> {
    match sensor {
        SensorType::Imec => imec_conversions(meta),
        SensorType::Nidq => nidq_conversions(meta),
    }
}

/// NI-DAQ: multiplexed-neural (MN) channels use `niMNGain`, multiplexed
/// auxiliary (MA) channels `niMAGain`, everything else unity gain.
fn nidq_conversions(meta: &MetaData) -> SyncResult<Vec<f64>> {
    let range_max: f64 = meta.parse_value("niAiRangeMax")?;
    let int_to_volts = range_max / NI_MAX_INT;

    let counts = meta.parse_list("snsMnMaXaDw")?;
    let (mn, ma) = match counts.as_slice() {
        [mn, ma, ..] => (*mn, *ma),
        _ => return Err(SyncError::header(meta.path(), "snsMnMaXaDw needs at least two entries")),
    };
    let mn_gain: f64 = meta.parse_value("niMNGain")?;
    let ma_gain: f64 = meta.parse_value("niMAGain")?;

    meta.original_channels()?
        .into_iter()
        .map(|chan| {
            let gain = if chan < mn {
                mn_gain
            } else if chan < mn + ma {
                ma_gain
            } else {
                1.0
            };
            Ok(int_to_volts / gain)
        })
        .collect()
}

/// Imec: AP channels, then LF channels, then sync; AP/LF gains come from
/// the per-channel `imroTbl` entries.
fn imec_conversions(meta: &MetaData) -> SyncResult<Vec<f64>> {
    let range_max: f64 = meta.parse_value("imAiRangeMax")?;
    let max_int = if meta.contains("imMaxInt") {
        meta.parse_value("imMaxInt")?
    } else {
        IMEC_DEFAULT_MAX_INT
    };
    let int_to_volts = range_max / max_int;

    let (ap_gains, lf_gains) = imro_gains(meta)?;
    let n_ap = ap_gains.len();

    meta.original_channels()?
        .into_iter()
        .map(|chan| {
            let gain = if chan < n_ap {
                ap_gains[chan]
            } else if chan < 2 * n_ap {
                lf_gains[chan - n_ap]
            } else {
                1.0
            };
            if gain == 0.0 {
                return Err(SyncError::header(meta.path(), format!("zero gain for channel {chan}")));
            }
            Ok(int_to_volts / gain)
        })
        .collect()
}

/// Per-channel AP and LF gains from `imroTbl`:
/// `(type,nChan)(chan bank ref apGain lfGain hp)...`
fn imro_gains(meta: &MetaData) -> SyncResult<(Vec<f64>, Vec<f64>)> {
    let table = meta.get("imroTbl")?;
    let entries: Vec<&str> = table
        .split(')')
        .map(|e| e.trim_start_matches('('))
        .filter(|e| !e.is_empty())
        .collect();
    // first entry is the table header
    let channels = entries.get(1..).unwrap_or_default();

    let probe_type = if meta.contains("imDatPrb_type") { meta.get("imDatPrb_type")? } else { "0" };
    if matches!(probe_type, "21" | "24") {
        return Ok((vec![NP2_GAIN; channels.len()], vec![NP2_GAIN; channels.len()]));
    }

    let bad = |entry: &str| SyncError::header(meta.path(), format!("invalid imroTbl entry ({entry})"));
    let mut ap = Vec::with_capacity(channels.len());
    let mut lf = Vec::with_capacity(channels.len());
    for entry in channels {
        let fields: Vec<&str> = entry.split_whitespace().collect();
        let (Some(ap_gain), Some(lf_gain)) = (fields.get(3), fields.get(4)) else {
            return Err(bad(entry));
        };
        ap.push(ap_gain.parse().map_err(|_| bad(entry))?);
        lf.push(lf_gain.parse().map_err(|_| bad(entry))?);
    }
    Ok((ap, lf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn meta(text: &str) -> MetaData {
        MetaData::parse(PathBuf::from("test.meta"), text)
    }

    #[test]
    fn test_sensor_type() {
        assert_eq!(SensorType::from_meta(&meta("typeThis=imec")).unwrap(), SensorType::Imec);
        assert_eq!(SensorType::from_meta(&meta("typeThis=nidq")).unwrap(), SensorType::Nidq);
        assert!(SensorType::from_meta(&meta("typeThis=obx")).is_err());
    }

    #[test]
    fn test_nidq_gains() {
        let m = meta(
            "typeThis=nidq\nnSavedChans=4\nsnsSaveChanSubset=all\nniAiRangeMax=5\n\
             snsMnMaXaDw=1,1,1,1\nniMNGain=200\nniMAGain=10",
        );
        let conv = conversions(&m, SensorType::Nidq).unwrap();
        let fi2v = 5.0 / 32768.0;
        assert_eq!(conv.len(), 4);
        assert!((conv[0] - fi2v / 200.0).abs() < 1e-15);
        assert!((conv[1] - fi2v / 10.0).abs() < 1e-15);
        assert!((conv[2] - fi2v).abs() < 1e-15);
        assert!((conv[3] - fi2v).abs() < 1e-15);
    }

    #[test]
    fn test_imec_gains_from_imro() {
        let m = meta(
            "typeThis=imec\nnSavedChans=5\nsnsSaveChanSubset=0:1,2:3,4\nimAiRangeMax=0.6\n\
             ~imroTbl=(0,2)(0 0 0 500 250 1)(1 0 0 1000 125 1)",
        );
        let conv = conversions(&m, SensorType::Imec).unwrap();
        let fi2v = 0.6 / 512.0;
        assert!((conv[0] - fi2v / 500.0).abs() < 1e-15);
        assert!((conv[1] - fi2v / 1000.0).abs() < 1e-15);
        assert!((conv[2] - fi2v / 250.0).abs() < 1e-15);
        assert!((conv[3] - fi2v / 125.0).abs() < 1e-15);
        assert!((conv[4] - fi2v).abs() < 1e-15);
    }

    #[test]
    fn test_imec_np2_fixed_gain() {
        let m = meta(
            "typeThis=imec\nnSavedChans=2\nimAiRangeMax=0.5\nimMaxInt=8192\nimDatPrb_type=21\n\
             ~imroTbl=(21,1)(0 1 0 0)",
        );
        let conv = conversions(&m, SensorType::Imec).unwrap();
        assert!((conv[0] - 0.5 / 8192.0 / 80.0).abs() < 1e-15);
    }

    #[test]
    fn test_malformed_imro() {
        let m = meta("typeThis=imec\nnSavedChans=1\nimAiRangeMax=0.6\n~imroTbl=(0,1)(0 0 0)");
        assert!(matches!(conversions(&m, SensorType::Imec), Err(SyncError::Header { .. })));
    }
}
