//! Tempest UDP 报文结构与类型化观测值。

use crate::DecodeError;
use serde::Deserialize;
use std::fmt;

/// `obs_st` 观测数组的最少槽位数。
pub const OBS_ST_FIELDS: usize = 18;
/// `rapid_wind` 数组的槽位数。
pub const RAPID_WIND_FIELDS: usize = 3;

/// 按 `type` 区分的原始报文。
///
/// 数组中的 `null`（传感器缺失）按 0 处理。
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub(crate) enum Report {
    #[serde(rename = "obs_st")]
    Observation {
        #[serde(default)]
        serial_number: String,
        #[serde(default)]
        obs: Vec<Vec<Option<f64>>>,
    },
    #[serde(rename = "rapid_wind")]
    RapidWind {
        #[serde(default)]
        serial_number: String,
        #[serde(default)]
        ob: Vec<Option<f64>>,
    },
    #[serde(rename = "hub_status")]
    HubStatus,
    #[serde(rename = "evt_precip")]
    PrecipitationEvent,
    #[serde(rename = "evt_strike")]
    StrikeEvent,
    #[serde(other)]
    Unsupported,
}

/// 降水类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrecipType {
    None,
    Rain,
    Hail,
    RainHail,
}

impl PrecipType {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::Rain),
            2 => Some(Self::Hail),
            3 => Some(Self::RainHail),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Rain => "rain",
            Self::Hail => "hail",
            Self::RainHail => "rain+hail",
        }
    }

    /// 仅用于展示：未知编码显示为 `unknown`。
    pub fn display_name(code: i64) -> &'static str {
        Self::from_code(code)
            .map(|precip| precip.as_str())
            .unwrap_or("unknown")
    }
}

impl fmt::Display for PrecipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `obs_st` 完整观测。
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// 秒
    pub timestamp: i64,
    /// m/s
    pub wind_lull: f64,
    pub wind_avg: f64,
    pub wind_gust: f64,
    /// 度
    pub wind_direction: i64,
    /// 秒
    pub wind_sample_interval: i64,
    /// MB
    pub station_pressure: f64,
    /// 摄氏度
    pub air_temperature: f64,
    /// %
    pub relative_humidity: f64,
    /// Lux
    pub illuminance: i64,
    pub uv: f64,
    /// W/m²
    pub solar_radiation: i64,
    /// mm
    pub precipitation_accumulation: f64,
    pub precipitation_type: i64,
    /// km
    pub strike_avg_distance: i64,
    pub strike_count: i64,
    /// 伏
    pub battery: f64,
    /// 分钟
    pub interval: i64,
}

impl Observation {
    pub fn from_slots(slots: &[Option<f64>]) -> Result<Self, DecodeError> {
        if slots.len() < OBS_ST_FIELDS {
            return Err(DecodeError::InsufficientData {
                report: "obs_st",
                expected: OBS_ST_FIELDS,
                actual: slots.len(),
            });
        }
        let real = |index: usize| slots[index].unwrap_or(0.0);
        let whole = |index: usize| real(index).round() as i64;

        Ok(Self {
            timestamp: real(0) as i64,
            wind_lull: real(1),
            wind_avg: real(2),
            wind_gust: real(3),
            wind_direction: whole(4),
            wind_sample_interval: whole(5),
            station_pressure: real(6),
            air_temperature: real(7),
            relative_humidity: real(8),
            illuminance: whole(9),
            uv: real(10),
            solar_radiation: whole(11),
            precipitation_accumulation: real(12),
            precipitation_type: whole(13),
            strike_avg_distance: whole(14),
            strike_count: whole(15),
            battery: real(16),
            interval: whole(17),
        })
    }

    pub fn precip_type(&self) -> Option<PrecipType> {
        PrecipType::from_code(self.precipitation_type)
    }
}

/// `rapid_wind` 高频风速采样。
#[derive(Debug, Clone, PartialEq)]
pub struct RapidWind {
    pub timestamp: i64,
    /// m/s
    pub wind_speed: f64,
    /// 度
    pub wind_direction: i64,
}

impl RapidWind {
    pub fn from_slots(slots: &[Option<f64>]) -> Result<Self, DecodeError> {
        if slots.len() != RAPID_WIND_FIELDS {
            return Err(DecodeError::InsufficientData {
                report: "rapid_wind",
                expected: RAPID_WIND_FIELDS,
                actual: slots.len(),
            });
        }
        let real = |index: usize| slots[index].unwrap_or(0.0);
        Ok(Self {
            timestamp: real(0) as i64,
            wind_speed: real(1),
            wind_direction: real(2).round() as i64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precip_type_names() {
        assert_eq!(PrecipType::display_name(0), "none");
        assert_eq!(PrecipType::display_name(3), "rain+hail");
        assert_eq!(PrecipType::display_name(7), "unknown");
        assert_eq!(PrecipType::display_name(-1), "unknown");
        assert_eq!(PrecipType::Hail.to_string(), "hail");
    }

    #[test]
    fn observation_rounds_integer_slots() {
        let mut slots = vec![Some(0.0); OBS_ST_FIELDS];
        slots[0] = Some(1_500_000_000.0);
        slots[4] = Some(179.6);
        slots[9] = Some(999.4);
        slots[15] = Some(2.5);
        let observation = Observation::from_slots(&slots).expect("observation");
        assert_eq!(observation.timestamp, 1_500_000_000);
        assert_eq!(observation.wind_direction, 180);
        assert_eq!(observation.illuminance, 999);
        assert_eq!(observation.strike_count, 3);
        assert_eq!(observation.precip_type(), Some(PrecipType::None));
    }

    #[test]
    fn missing_sensor_values_read_as_zero() {
        let mut slots = vec![None; OBS_ST_FIELDS];
        slots[0] = Some(1.0);
        let observation = Observation::from_slots(&slots).expect("observation");
        assert_eq!(observation.air_temperature, 0.0);
        assert_eq!(observation.wind_direction, 0);
    }

    #[test]
    fn rapid_wind_requires_three_slots() {
        let err = RapidWind::from_slots(&[Some(1.0), Some(2.0)]).expect_err("short");
        assert!(matches!(
            err,
            DecodeError::InsufficientData { expected: 3, actual: 2, .. }
        ));
    }
}
