//! Photostimulation protocols and their target laterality
//!
//! A protocol owns one or more stimulation sites. Downstream anatomy
//! reports need a single (brain area, laterality) pair per protocol, which
//! [`resolve_laterality`] derives and [`LateralityCache`] memoises.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::string::String;
use alloc::vec::Vec;

use serde::{Deserialize, Serialize};

use crate::error::{AmbiguityError, AvailabilityError, ConfigError, EngineResult};
use crate::types::{Laterality, SessionKey};

/// A photostimulation protocol of a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Photostim {
    /// Owning session
    pub session: SessionKey,
    /// Protocol number
    pub photo_stim: u16,
    /// Stimulation device
    pub device: String,
    /// Duration in seconds
    #[serde(default)]
    pub duration: Option<f64>,
    /// Waveform normalized to maximal power
    #[serde(default)]
    pub waveform: Option<Vec<f64>>,
    /// Stimulation sites
    pub locations: Vec<PhotostimLocation>,
}

/// One stimulation site.
///
/// Coordinates are in µm relative to the skull reference; `ml_location` is
/// positive to the right of midline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhotostimLocation {
    /// Skull reference point, e.g. `Bregma`
    pub skull_reference: String,
    /// Anterior-posterior (µm), more anterior is positive
    pub ap_location: f64,
    /// Medial-lateral (µm), more right is positive
    pub ml_location: f64,
    /// Depth (µm), more ventral is negative
    pub depth: f64,
    /// Elevation (deg)
    #[serde(default)]
    pub theta: f64,
    /// Azimuth (deg)
    #[serde(default)]
    pub phi: f64,
    /// Target brain area
    pub brain_area: String,
}

/// Derived target of a photostim protocol.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotostimBrainRegion {
    /// Target brain area
    pub stim_brain_area: String,
    /// Stimulated side(s)
    pub stim_laterality: Laterality,
}

/// Reduce a protocol's stimulation sites to one brain area and laterality.
///
/// # Errors
///
/// - [`AvailabilityError::NoPhotostimLocations`] if `locations` is empty
/// - [`ConfigError::MultipleBrainAreas`] if the sites disagree on the area
/// - [`AmbiguityError::AmbiguousHemisphere`] if every ML coordinate is 0
pub fn resolve_laterality(
    photo_stim: u16,
    locations: &[PhotostimLocation],
) -> EngineResult<PhotostimBrainRegion> {
    let first = locations
        .first()
        .ok_or(AvailabilityError::NoPhotostimLocations { photo_stim })?;

    let areas: BTreeSet<&str> = locations.iter().map(|l| l.brain_area.as_str()).collect();
    if areas.len() > 1 {
        return Err(ConfigError::MultipleBrainAreas {
            areas: areas.into_iter().map(String::from).collect(),
        }
        .into());
    }

    let any_right = locations.iter().any(|l| l.ml_location > 0.0);
    let any_left = locations.iter().any(|l| l.ml_location < 0.0);

    let stim_laterality = match (any_left, any_right) {
        (true, true) => Laterality::Both,
        (false, true) if locations.iter().all(|l| l.ml_location > 0.0) => Laterality::Right,
        (true, false) if locations.iter().all(|l| l.ml_location < 0.0) => Laterality::Left,
        // one side mixed with midline sites, or everything on the midline
        _ => return Err(AmbiguityError::AmbiguousHemisphere { photo_stim }.into()),
    };

    Ok(PhotostimBrainRegion { stim_brain_area: first.brain_area.clone(), stim_laterality })
}

/// Resolved regions per protocol, computed once.
#[derive(Clone, Debug, Default)]
pub struct LateralityCache {
    regions: BTreeMap<(SessionKey, u16), PhotostimBrainRegion>,
}

impl LateralityCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached region of `protocol`, resolving it on first access
    ///
    /// # Errors
    ///
    /// Propagates [`resolve_laterality`] errors; failures are not cached.
    pub fn get_or_resolve(&mut self, protocol: &Photostim) -> EngineResult<&PhotostimBrainRegion> {
        let key = (protocol.session, protocol.photo_stim);
        if !self.regions.contains_key(&key) {
            let region = resolve_laterality(protocol.photo_stim, &protocol.locations)?;
            self.regions.insert(key, region);
        }
        Ok(&self.regions[&key])
    }

    /// Number of cached protocols
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Whether nothing has been resolved yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn site(ml: f64, area: &str) -> PhotostimLocation {
        PhotostimLocation {
            skull_reference: "Bregma".into(),
            ap_location: 2500.0,
            ml_location: ml,
            depth: -300.0,
            theta: 15.0,
            phi: 0.0,
            brain_area: area.into(),
        }
    }

    fn laterality(mls: &[f64]) -> EngineResult<Laterality> {
        let sites: Vec<_> = mls.iter().map(|&ml| site(ml, "ALM")).collect();
        resolve_laterality(1, &sites).map(|r| r.stim_laterality)
    }

    #[test]
    fn test_laterality_rules() {
        assert_eq!(laterality(&[5.0, -3.0]), Ok(Laterality::Both));
        assert_eq!(laterality(&[5.0, 7.0]), Ok(Laterality::Right));
        assert_eq!(laterality(&[-1.0]), Ok(Laterality::Left));
    }

    #[test]
    fn test_midline_is_ambiguous() {
        assert_eq!(
            laterality(&[0.0, 0.0]),
            Err(AmbiguityError::AmbiguousHemisphere { photo_stim: 1 }.into())
        );
    }

    #[test]
    fn test_one_side_plus_midline_is_ambiguous() {
        assert!(matches!(
            laterality(&[0.0, 1500.0]),
            Err(crate::error::EngineError::Ambiguity(_))
        ));
    }

    #[test]
    fn test_multiple_brain_areas() {
        let sites = vec![site(1500.0, "ALM"), site(-1500.0, "M2")];
        assert_eq!(
            resolve_laterality(3, &sites),
            Err(ConfigError::MultipleBrainAreas { areas: vec!["ALM".into(), "M2".into()] }.into())
        );
    }

    #[test]
    fn test_no_locations() {
        assert_eq!(
            resolve_laterality(9, &[]),
            Err(AvailabilityError::NoPhotostimLocations { photo_stim: 9 }.into())
        );
    }

    #[test]
    fn test_cache_resolves_once() {
        let protocol = Photostim {
            session: SessionKey::new(1, 1),
            photo_stim: 2,
            device: "OBIS470".into(),
            duration: Some(0.5),
            waveform: None,
            locations: vec![site(-1500.0, "ALM")],
        };
        let mut cache = LateralityCache::new();
        let region = cache.get_or_resolve(&protocol).map(|r| r.stim_laterality);
        assert_eq!(region, Ok(Laterality::Left));
        assert_eq!(cache.len(), 1);

        let again = cache.get_or_resolve(&protocol).map(|r| r.stim_brain_area.clone());
        assert_eq!(again, Ok(String::from("ALM")));
        assert_eq!(cache.len(), 1);
    }
}
