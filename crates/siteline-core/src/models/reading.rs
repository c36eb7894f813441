//! Room reading model

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

use super::ids::{ProjectId, ReadingId, RoomId};

/// Kind of environmental reading taken in a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingKind {
    /// Ambient temperature (degrees Celsius)
    Temperature,
    /// Relative humidity (percent)
    RelativeHumidity,
    /// Material moisture content (percent)
    MoistureContent,
}

impl fmt::Display for ReadingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Temperature => "temperature",
            Self::RelativeHumidity => "relative_humidity",
            Self::MoistureContent => "moisture_content",
        };
        write!(f, "{label}")
    }
}

/// A single environmental reading recorded for a room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Unique identifier
    pub id: ReadingId,
    /// Owning project identifier
    pub project_id: ProjectId,
    /// Owning room identifier
    pub room_id: RoomId,
    /// What was measured
    pub kind: ReadingKind,
    /// Measured value, unit implied by `kind`
    pub value: f64,
    /// When the reading was taken (Unix ms)
    pub taken_at: i64,
}

impl Reading {
    /// Create a new reading taken now.
    pub fn new(
        project_id: ProjectId,
        room_id: RoomId,
        kind: ReadingKind,
        value: f64,
    ) -> Result<Self> {
        if !value.is_finite() {
            return Err(Error::InvalidInput(
                "Reading value must be finite".to_string(),
            ));
        }
        if kind == ReadingKind::RelativeHumidity && !(0.0..=100.0).contains(&value) {
            return Err(Error::InvalidInput(
                "Relative humidity must be between 0 and 100".to_string(),
            ));
        }

        Ok(Self {
            id: ReadingId::new(),
            project_id,
            room_id,
            kind,
            value,
            taken_at: chrono::Utc::now().timestamp_millis(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_new() {
        let reading = Reading::new(
            ProjectId::new(),
            RoomId::new(),
            ReadingKind::Temperature,
            21.5,
        )
        .unwrap();
        assert_eq!(reading.kind, ReadingKind::Temperature);
        assert!((reading.value - 21.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_reading_rejects_non_finite() {
        let err = Reading::new(
            ProjectId::new(),
            RoomId::new(),
            ReadingKind::MoistureContent,
            f64::NAN,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_humidity_range() {
        let project = ProjectId::new();
        let room = RoomId::new();
        assert!(Reading::new(project, room, ReadingKind::RelativeHumidity, 55.0).is_ok());
        assert!(Reading::new(project, room, ReadingKind::RelativeHumidity, 101.0).is_err());
        assert!(Reading::new(project, room, ReadingKind::RelativeHumidity, -1.0).is_err());
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ReadingKind::RelativeHumidity).unwrap();
        assert_eq!(json, "\"relative_humidity\"");
    }
}
