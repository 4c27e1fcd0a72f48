//! Read result records

use serde::{Deserialize, Serialize};

/// What a decoded reading measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ResultKind {
    /// Pressure
    Pressure,
    /// Temperature
    Temperature,
    /// Volumetric or mass flow
    Flow,
    /// Resistance
    Resistance,
    /// Frequency
    Frequency,
    /// Current
    Current,
    /// Generic unitless value
    Value,
    /// Valve drive or power output
    #[serde(alias = "Valve")]
    Power,
    /// Anything else
    #[default]
    Other,
}

/// Plot axis a reading is grouped under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AxisType {
    /// Main axis
    #[default]
    Primary,
    /// Secondary axis
    Secondary,
}

/// One decoded reading. The template a device is configured with only fixes
/// `kind` and `axis`; `value` is filled in on each read.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ReadResult {
    /// Latest decoded value
    #[serde(skip)]
    pub value: f64,
    /// What the value measures
    #[serde(default)]
    pub kind: ResultKind,
    /// Axis it is plotted on
    #[serde(default)]
    pub axis: AxisType,
}

impl ReadResult {
    /// Template entry on the primary axis
    pub fn new(kind: ResultKind) -> Self {
        Self {
            value: 0.0,
            kind,
            axis: AxisType::Primary,
        }
    }

    /// Decoded reading on the primary axis
    pub fn with_value(value: f64, kind: ResultKind) -> Self {
        Self {
            value,
            kind,
            axis: AxisType::Primary,
        }
    }

    /// Same reading on `axis`
    pub fn on_axis(mut self, axis: AxisType) -> Self {
        self.axis = axis;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let r = ReadResult::default();
        assert_eq!(r.value, 0.0);
        assert_eq!(r.kind, ResultKind::Other);
        assert_eq!(r.axis, AxisType::Primary);
    }

    #[test]
    fn test_template_deserializes_without_value() {
        let r: ReadResult =
            serde_json::from_str(r#"{"kind": "Temperature", "axis": "Secondary"}"#).unwrap();
        assert_eq!(r, ReadResult::new(ResultKind::Temperature).on_axis(AxisType::Secondary));
    }

    #[test]
    fn test_valve_alias() {
        let r: ReadResult = serde_json::from_str(r#"{"kind": "Valve"}"#).unwrap();
        assert_eq!(r.kind, ResultKind::Power);
    }

    #[test]
    fn test_value_not_serialized() {
        let json = serde_json::to_string(&ReadResult::with_value(4.2, ResultKind::Flow)).unwrap();
        assert_eq!(json, r#"{"kind":"Flow","axis":"Primary"}"#);
    }
}
