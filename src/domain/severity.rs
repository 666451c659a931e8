use serde::{Deserialize, Serialize};

use super::Reading;

/// Weather conditions that always count as severe
pub const SEVERE_CONDITIONS: [&str; 5] = ["Thunderstorm", "Tornado", "Hurricane", "Blizzard", "Hail"];

/// Alert level derived from a severity score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertLevel {
    /// Fixed thresholds: critical >= 0.8, high >= 0.6, medium >= 0.3
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            Self::Critical
        } else if score >= 0.6 {
            Self::High
        } else if score >= 0.3 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Normalized hazard score in [0, 1].
///
/// Missing inputs contribute nothing.
pub fn severity_score(reading: &Reading) -> f64 {
    let mut score: f64 = 0.0;

    let temp = reading.temperature;
    if temp < 0.0 || temp > 35.0 {
        score += 0.3;
    }

    let wind = reading.wind_speed;
    if wind > 20.0 {
        score += 0.4;
    } else if wind > 15.0 {
        score += 0.2;
    }

    let visibility = reading.visibility;
    if visibility < 2.0 {
        score += 0.3;
    } else if visibility < 5.0 {
        score += 0.1;
    }

    score.clamp(0.0, 1.0)
}

/// Rule-based severe weather label used as the classification target
pub fn is_severe(reading: &Reading) -> bool {
    reading.temperature < -5.0
        || reading.temperature > 40.0
        || reading.wind_speed > 20.0
        || reading.visibility < 2.0
        || SEVERE_CONDITIONS.contains(&reading.weather_condition.as_str())
}

/// Reading enriched with severity for the alerting/storage collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityRecord {
    #[serde(flatten)]
    pub reading: Reading,
    pub severity_score: f64,
    pub alert_level: AlertLevel,
}

impl SeverityRecord {
    pub fn from_reading(reading: Reading) -> Self {
        let severity_score = severity_score(&reading);
        Self {
            reading,
            severity_score,
            alert_level: AlertLevel::from_score(severity_score),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;
    use rstest::rstest;

    fn reading() -> Reading {
        Reading::new("north", Utc::now())
    }

    #[rstest]
    #[case(0.0, AlertLevel::Low)]
    #[case(0.29, AlertLevel::Low)]
    #[case(0.3, AlertLevel::Medium)]
    #[case(0.6, AlertLevel::High)]
    #[case(0.79, AlertLevel::High)]
    #[case(0.8, AlertLevel::Critical)]
    #[case(1.0, AlertLevel::Critical)]
    fn test_alert_level_thresholds(#[case] score: f64, #[case] expected: AlertLevel) {
        assert_eq!(AlertLevel::from_score(score), expected);
    }

    #[test]
    fn test_cold_reading_is_severe() {
        let mut r = reading();
        r.temperature = -10.0;
        assert!(is_severe(&r));
    }

    #[test]
    fn test_calm_reading_is_benign() {
        let mut r = reading();
        r.temperature = 20.0;
        r.wind_speed = 5.0;
        r.visibility = 10.0;
        r.weather_condition = "Clear".to_string();
        assert!(!is_severe(&r));
        assert_eq!(severity_score(&r), 0.0);
    }

    #[test]
    fn test_condition_alone_is_severe() {
        let mut r = reading();
        r.weather_condition = "Hail".to_string();
        assert!(is_severe(&r));
    }

    #[test]
    fn test_storm_record() {
        let mut r = reading();
        r.temperature = -2.0;
        r.wind_speed = 25.0;
        r.visibility = 1.0;
        let record = SeverityRecord::from_reading(r);
        assert!((record.severity_score - 1.0).abs() < 1e-12);
        assert_eq!(record.alert_level, AlertLevel::Critical);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["alert_level"], "critical");
        assert_eq!(json["region"], "north");
    }

    proptest! {
        #[test]
        fn prop_severity_score_in_unit_range(
            temp in -60.0f64..60.0,
            wind in 0.0f64..60.0,
            vis in 0.0f64..30.0,
        ) {
            let mut r = reading();
            r.temperature = temp;
            r.wind_speed = wind;
            r.visibility = vis;
            let score = severity_score(&r);
            prop_assert!((0.0..=1.0).contains(&score));
            prop_assert_eq!(AlertLevel::from_score(score), SeverityRecord::from_reading(r).alert_level);
        }
    }
}
