//! Aggregation temporality selection.
//!
//! # Responsibilities
//! - Enumerate the instrument kinds the SDK meter aggregates
//! - Map each kind to the temporality its exported points carry
//! - Reject unknown kind/temporality names coming from configuration
//! - Resolve the table to the exporter preference the SDK meter applies
//!
//! # Design Decisions
//! - Selection is a pure function of kind, evaluated once when the metric
//!   exporter is built
//! - Non-monotonic sums stay cumulative; everything else exports deltas

use opentelemetry_sdk::metrics::Temporality as ExporterTemporality;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::telemetry::error::TelemetryError;

/// The fixed kind of an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentKind {
    Counter,
    UpDownCounter,
    Histogram,
    ObservableGauge,
    ObservableCounter,
    ObservableUpDownCounter,
}

impl InstrumentKind {
    pub const ALL: [InstrumentKind; 6] = [
        InstrumentKind::Counter,
        InstrumentKind::UpDownCounter,
        InstrumentKind::Histogram,
        InstrumentKind::ObservableGauge,
        InstrumentKind::ObservableCounter,
        InstrumentKind::ObservableUpDownCounter,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            InstrumentKind::Counter => "counter",
            InstrumentKind::UpDownCounter => "up_down_counter",
            InstrumentKind::Histogram => "histogram",
            InstrumentKind::ObservableGauge => "observable_gauge",
            InstrumentKind::ObservableCounter => "observable_counter",
            InstrumentKind::ObservableUpDownCounter => "observable_up_down_counter",
        }
    }
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstrumentKind {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        InstrumentKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| TelemetryError::UnknownInstrumentKind(s.to_string()))
    }
}

/// Whether exported values are increments since the last export or running totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Temporality {
    Delta,
    Cumulative,
}

impl FromStr for Temporality {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "delta" => Ok(Temporality::Delta),
            "cumulative" => Ok(Temporality::Cumulative),
            _ => Err(TelemetryError::UnknownTemporality(s.to_string())),
        }
    }
}

/// Delta-preferred selection.
///
/// A non-monotonic sum exported as a delta loses its sign and magnitude across
/// export gaps, so both up-down counters stay cumulative.
pub fn temporality_for(kind: InstrumentKind) -> Temporality {
    match kind {
        InstrumentKind::UpDownCounter | InstrumentKind::ObservableUpDownCounter => {
            Temporality::Cumulative
        }
        InstrumentKind::Counter
        | InstrumentKind::Histogram
        | InstrumentKind::ObservableCounter
        | InstrumentKind::ObservableGauge => Temporality::Delta,
    }
}

/// Resolve a configured kind name to its delta-preferred temporality.
pub fn temporality_for_name(kind: &str) -> Result<Temporality, TelemetryError> {
    kind.parse().map(temporality_for)
}

/// Base policy applied to every instrument kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalityPolicy {
    /// [`temporality_for`].
    #[default]
    Delta,
    /// Every kind cumulative.
    Cumulative,
}

/// Temporality table fixed at meter construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemporalitySelector {
    table: HashMap<InstrumentKind, Temporality>,
}

impl TemporalitySelector {
    pub fn new(policy: TemporalityPolicy) -> Self {
        let table = InstrumentKind::ALL
            .into_iter()
            .map(|kind| {
                let temporality = match policy {
                    TemporalityPolicy::Delta => temporality_for(kind),
                    TemporalityPolicy::Cumulative => Temporality::Cumulative,
                };
                (kind, temporality)
            })
            .collect();
        Self { table }
    }

    /// Build from a policy plus per-kind overrides keyed by configured names.
    ///
    /// Any unknown kind or temporality name fails the whole build.
    pub fn from_config(
        policy: TemporalityPolicy,
        overrides: &HashMap<String, String>,
    ) -> Result<Self, TelemetryError> {
        let mut selector = Self::new(policy);
        for (kind, temporality) in overrides {
            let kind: InstrumentKind = kind.parse()?;
            let temporality: Temporality = temporality.parse()?;
            selector.table.insert(kind, temporality);
        }
        Ok(selector)
    }

    pub fn select(&self, kind: InstrumentKind) -> Temporality {
        // Every kind is inserted by `new`; the fallback is unreachable.
        self.table
            .get(&kind)
            .copied()
            .unwrap_or_else(|| temporality_for(kind))
    }

    /// The exporter preference whose per-kind selection equals this table.
    ///
    /// A metric exporter carries a single preference, so a table none of them
    /// reproduces is a configuration error.
    pub fn exporter_temporality(&self) -> Result<ExporterTemporality, TelemetryError> {
        [
            ExporterTemporality::Delta,
            ExporterTemporality::Cumulative,
            ExporterTemporality::LowMemory,
        ]
        .into_iter()
        .find(|&preference| {
            InstrumentKind::ALL
                .into_iter()
                .all(|kind| self.select(kind) == exporter_selection(preference, kind))
        })
        .ok_or_else(|| TelemetryError::UnsupportedTemporality(self.describe()))
    }

    fn describe(&self) -> String {
        InstrumentKind::ALL
            .into_iter()
            .map(|kind| format!("{}={:?}", kind, self.select(kind)).to_ascii_lowercase())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Per-kind temporality the SDK aggregates with for an exporter preference.
fn exporter_selection(preference: ExporterTemporality, kind: InstrumentKind) -> Temporality {
    match preference {
        ExporterTemporality::Delta => temporality_for(kind),
        ExporterTemporality::LowMemory => match kind {
            InstrumentKind::Counter | InstrumentKind::Histogram => Temporality::Delta,
            _ => Temporality::Cumulative,
        },
        _ => Temporality::Cumulative,
    }
}

impl Default for TemporalitySelector {
    fn default() -> Self {
        Self::new(TemporalityPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temporality_table() {
        let cases = [
            (InstrumentKind::Counter, Temporality::Delta),
            (InstrumentKind::UpDownCounter, Temporality::Cumulative),
            (InstrumentKind::Histogram, Temporality::Delta),
            (InstrumentKind::ObservableGauge, Temporality::Delta),
            (InstrumentKind::ObservableCounter, Temporality::Delta),
            (InstrumentKind::ObservableUpDownCounter, Temporality::Cumulative),
        ];
        assert_eq!(cases.len(), InstrumentKind::ALL.len());
        for (kind, expected) in cases {
            assert_eq!(temporality_for(kind), expected, "kind {}", kind);
        }
    }

    #[test]
    fn test_selection_is_stable() {
        for kind in InstrumentKind::ALL {
            assert_eq!(temporality_for(kind), temporality_for(kind));
            assert_eq!(TemporalitySelector::default().select(kind), temporality_for(kind));
        }
    }

    #[test]
    fn test_unknown_kind_is_configuration_error() {
        let err = temporality_for_name("summary").unwrap_err();
        assert!(matches!(err, TelemetryError::UnknownInstrumentKind(ref k) if k == "summary"));
    }

    #[test]
    fn test_kind_names_parse() {
        assert_eq!(
            temporality_for_name("up-down-counter").unwrap(),
            Temporality::Cumulative
        );
        assert_eq!(temporality_for_name("Histogram").unwrap(), Temporality::Delta);
        for kind in InstrumentKind::ALL {
            assert_eq!(kind.as_str().parse::<InstrumentKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_cumulative_policy() {
        let selector = TemporalitySelector::new(TemporalityPolicy::Cumulative);
        for kind in InstrumentKind::ALL {
            assert_eq!(selector.select(kind), Temporality::Cumulative);
        }
    }

    #[test]
    fn test_overrides() {
        let mut overrides = HashMap::new();
        overrides.insert("histogram".to_string(), "cumulative".to_string());
        let selector = TemporalitySelector::from_config(TemporalityPolicy::Delta, &overrides).unwrap();
        assert_eq!(selector.select(InstrumentKind::Histogram), Temporality::Cumulative);
        assert_eq!(selector.select(InstrumentKind::Counter), Temporality::Delta);

        overrides.insert("gauge".to_string(), "delta".to_string());
        assert!(TemporalitySelector::from_config(TemporalityPolicy::Delta, &overrides).is_err());

        let mut bad = HashMap::new();
        bad.insert("counter".to_string(), "sometimes".to_string());
        assert!(matches!(
            TemporalitySelector::from_config(TemporalityPolicy::Delta, &bad),
            Err(TelemetryError::UnknownTemporality(_))
        ));
    }

    #[test]
    fn test_policies_map_to_exporter_preference() {
        let delta = TemporalitySelector::new(TemporalityPolicy::Delta);
        assert!(matches!(delta.exporter_temporality(), Ok(ExporterTemporality::Delta)));

        let cumulative = TemporalitySelector::new(TemporalityPolicy::Cumulative);
        assert!(matches!(
            cumulative.exporter_temporality(),
            Ok(ExporterTemporality::Cumulative)
        ));
    }

    #[test]
    fn test_overrides_resolving_to_low_memory() {
        let mut overrides = HashMap::new();
        overrides.insert("observable_counter".to_string(), "cumulative".to_string());
        overrides.insert("observable_gauge".to_string(), "cumulative".to_string());
        let selector = TemporalitySelector::from_config(TemporalityPolicy::Delta, &overrides).unwrap();
        assert!(matches!(
            selector.exporter_temporality(),
            Ok(ExporterTemporality::LowMemory)
        ));
    }

    #[test]
    fn test_unreproducible_table_is_rejected() {
        let mut overrides = HashMap::new();
        overrides.insert("counter".to_string(), "cumulative".to_string());
        let selector = TemporalitySelector::from_config(TemporalityPolicy::Delta, &overrides).unwrap();
        let err = selector.exporter_temporality().unwrap_err();
        let TelemetryError::UnsupportedTemporality(table) = err else {
            panic!("expected unsupported temporality, got {:?}", err);
        };
        assert!(table.contains("counter=cumulative"));
        assert!(table.contains("histogram=delta"));
    }
}
