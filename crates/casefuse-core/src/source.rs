use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One of the three upstream pipelines that deliver text for the same case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    StructuredMarkup,
    OpticalScan,
    WordProcessor,
}

impl SourceKind {
    pub const ALL: [Self; 3] = [Self::StructuredMarkup, Self::OpticalScan, Self::WordProcessor];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StructuredMarkup => "structured_markup",
            Self::OpticalScan => "optical_scan",
            Self::WordProcessor => "word_processor",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "structured_markup" | "markup" => Ok(Self::StructuredMarkup),
            "optical_scan" | "ocr" | "scan" => Ok(Self::OpticalScan),
            "word_processor" | "document" | "docx" => Ok(Self::WordProcessor),
            _ => Err(Error::UnknownSourceKind(s.to_string())),
        }
    }
}

/// Per-source reliability weights, fixed for the duration of a fusion run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, f64>", into = "BTreeMap<String, f64>")]
pub struct SourceReliability {
    structured_markup: f64,
    optical_scan: f64,
    word_processor: f64,
}

impl Default for SourceReliability {
    fn default() -> Self {
        Self {
            structured_markup: 0.90,
            optical_scan: 0.70,
            word_processor: 0.80,
        }
    }
}

impl SourceReliability {
    pub fn new(structured_markup: f64, optical_scan: f64, word_processor: f64) -> Result<Self> {
        let weights = Self {
            structured_markup,
            optical_scan,
            word_processor,
        };
        weights.validate()?;
        Ok(weights)
    }

    #[must_use]
    pub fn get(&self, source: SourceKind) -> f64 {
        match source {
            SourceKind::StructuredMarkup => self.structured_markup,
            SourceKind::OpticalScan => self.optical_scan,
            SourceKind::WordProcessor => self.word_processor,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for source in SourceKind::ALL {
            let value = self.get(source);
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::ReliabilityOutOfRange {
                    source_kind: source.to_string(),
                    value,
                });
            }
        }
        Ok(())
    }
}

impl TryFrom<BTreeMap<String, f64>> for SourceReliability {
    type Error = Error;

    fn try_from(map: BTreeMap<String, f64>) -> Result<Self> {
        let mut parsed = BTreeMap::new();
        for (name, value) in map {
            let kind: SourceKind = name.parse()?;
            parsed.insert(kind, value);
        }

        let lookup = |kind: SourceKind| {
            parsed
                .get(&kind)
                .copied()
                .ok_or_else(|| Error::MissingReliability(kind.to_string()))
        };

        Self::new(
            lookup(SourceKind::StructuredMarkup)?,
            lookup(SourceKind::OpticalScan)?,
            lookup(SourceKind::WordProcessor)?,
        )
    }
}

impl From<SourceReliability> for BTreeMap<String, f64> {
    fn from(weights: SourceReliability) -> Self {
        SourceKind::ALL
            .iter()
            .map(|kind| (kind.as_str().to_string(), weights.get(*kind)))
            .collect()
    }
}
