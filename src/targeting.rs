use crate::constants::{DEFAULT_AGE_MAX, DEFAULT_AGE_MIN, FALLBACK_COUNTRIES, PUBLISHER_PLATFORMS};
use crate::models::Segmentation;
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoLocations {
    pub countries: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetingEntity {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetingSpec {
    pub age_min: u32,
    pub age_max: u32,
    pub geo_locations: GeoLocations,
    pub publisher_platforms: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub interests: Vec<TargetingEntity>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub behaviors: Vec<TargetingEntity>,
}

/// Base translation. Pure and infallible.
pub fn translate(segmentation: &Segmentation) -> TargetingSpec {
    TargetingSpec {
        age_min: segmentation
            .age_range
            .first()
            .copied()
            .unwrap_or(DEFAULT_AGE_MIN),
        age_max: segmentation
            .age_range
            .get(1)
            .copied()
            .unwrap_or(DEFAULT_AGE_MAX),
        geo_locations: GeoLocations {
            countries: FALLBACK_COUNTRIES.iter().map(|c| c.to_string()).collect(),
        },
        publisher_platforms: PUBLISHER_PLATFORMS.iter().map(|p| p.to_string()).collect(),
        interests: Vec::new(),
        behaviors: Vec::new(),
    }
}

pub trait TargetingExtension: Send + Sync {
    fn apply(&self, segmentation: &Segmentation, spec: &mut TargetingSpec);
}

/// Uses the segmentation's ISO country codes instead of the fallback set.
/// Entries that are not two ASCII letters are ignored.
#[derive(Debug, Default)]
pub struct SegmentLocations;

impl TargetingExtension for SegmentLocations {
    fn apply(&self, segmentation: &Segmentation, spec: &mut TargetingSpec) {
        let mut seen = HashSet::new();
        let countries: Vec<String> = segmentation
            .locations
            .iter()
            .map(|l| l.trim())
            .filter(|l| l.len() == 2 && l.chars().all(|c| c.is_ascii_alphabetic()))
            .map(|l| l.to_ascii_uppercase())
            .filter(|code| seen.insert(code.clone()))
            .collect();

        if !countries.is_empty() {
            spec.geo_locations.countries = countries;
        }
    }
}

#[derive(Default)]
pub struct TargetingTranslator {
    extensions: Vec<Box<dyn TargetingExtension>>,
}

impl TargetingTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extension(mut self, extension: impl TargetingExtension + 'static) -> Self {
        self.extensions.push(Box::new(extension));
        self
    }

    pub fn translate(&self, segmentation: &Segmentation) -> TargetingSpec {
        let mut spec = translate(segmentation);
        for extension in &self.extensions {
            extension.apply(segmentation, &mut spec);
        }
        spec
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn empty_segmentation_gets_defaults() {
        let spec = translate(&Segmentation::default());

        assert_eq!(spec.age_min, 18);
        assert_eq!(spec.age_max, 65);
        assert_eq!(spec.geo_locations.countries, vec!["TH", "US"]);
        assert_eq!(spec.publisher_platforms, vec!["facebook", "instagram"]);
    }

    #[test]
    fn age_range_is_used_when_present() {
        let spec = translate(&Segmentation {
            age_range: vec![25, 40],
            ..Default::default()
        });
        assert_eq!((spec.age_min, spec.age_max), (25, 40));

        let spec = translate(&Segmentation {
            age_range: vec![30],
            ..Default::default()
        });
        assert_eq!((spec.age_min, spec.age_max), (30, 65));
    }

    #[test]
    fn base_translation_ignores_locations_and_interests() {
        let segmentation = Segmentation {
            locations: vec!["JP".to_string()],
            interests: vec!["coffee".to_string()],
            behaviors: vec!["frequent travelers".to_string()],
            ..Default::default()
        };
        let spec = TargetingTranslator::new().translate(&segmentation);

        assert_eq!(spec.geo_locations.countries, vec!["TH", "US"]);
        assert!(spec.interests.is_empty());
        assert!(spec.behaviors.is_empty());
    }

    #[test]
    fn location_extension_replaces_fallback_countries() {
        let translator = TargetingTranslator::new().with_extension(SegmentLocations);
        let spec = translator.translate(&Segmentation {
            locations: vec!["jp".to_string(), "Bangkok".to_string(), "SG".to_string()],
            ..Default::default()
        });
        assert_eq!(spec.geo_locations.countries, vec!["JP", "SG"]);

        let spec = translator.translate(&Segmentation {
            locations: vec!["Bangkok".to_string()],
            ..Default::default()
        });
        assert_eq!(spec.geo_locations.countries, vec!["TH", "US"]);
    }

    #[test]
    fn repeated_countries_are_sent_once() {
        let translator = TargetingTranslator::new().with_extension(SegmentLocations);
        let spec = translator.translate(&Segmentation {
            locations: vec!["JP".to_string(), "SG".to_string(), "jp".to_string()],
            ..Default::default()
        });
        assert_eq!(spec.geo_locations.countries, vec!["JP", "SG"]);
    }

    #[test]
    fn serialized_spec_omits_empty_lists() {
        let value = serde_json::to_value(translate(&Segmentation::default())).unwrap();
        assert_eq!(
            value,
            json!({
                "age_min": 18,
                "age_max": 65,
                "geo_locations": { "countries": ["TH", "US"] },
                "publisher_platforms": ["facebook", "instagram"]
            })
        );
    }
}
