//! Tempest 报文解码：UDP JSON → `DataPoint`。

mod dew_point;
mod report;

use domain::DataPoint;
use report::Report;
use std::net::SocketAddr;
use tempest_config::RelayConfig;
use tracing::{debug, warn};

pub use dew_point::{DewPointError, dew_point};
pub use report::{OBS_ST_FIELDS, Observation, PrecipType, RAPID_WIND_FIELDS, RapidWind};

/// 所有报文写入的 measurement 名称。
pub const MEASUREMENT: &str = "weather";

/// 解码错误。
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("could not unmarshal {bytes} bytes from {remote_addr}: {reason}: {payload}")]
    Malformed {
        bytes: usize,
        remote_addr: SocketAddr,
        reason: String,
        payload: String,
    },
    #[error("insufficient {report} data: expected {expected} fields, got {actual}")]
    InsufficientData {
        report: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// 报文解码器。
///
/// `Ok(None)` 表示该类型报文不转发（hub_status、事件报文、未启用的 rapid_wind），不是错误。
#[derive(Debug, Clone)]
pub struct ReportDecoder {
    bucket: String,
    rapid_wind_bucket: String,
    rapid_wind: bool,
}

impl ReportDecoder {
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            bucket: config.influx_bucket.clone(),
            rapid_wind_bucket: config.rapid_wind_bucket().to_string(),
            rapid_wind: config.rapid_wind,
        }
    }

    pub fn decode(
        &self,
        payload: &[u8],
        remote_addr: SocketAddr,
    ) -> Result<Option<DataPoint>, DecodeError> {
        let report: Report =
            serde_json::from_slice(payload).map_err(|err| DecodeError::Malformed {
                bytes: payload.len(),
                remote_addr,
                reason: err.to_string(),
                payload: String::from_utf8_lossy(payload).into_owned(),
            })?;

        match report {
            Report::Observation { serial_number, obs } => {
                let slots = obs.first().map(Vec::as_slice).unwrap_or_default();
                let observation = Observation::from_slots(slots)?;
                debug!(
                    target: "tempest.normalize",
                    station = %serial_number,
                    precip_type = PrecipType::display_name(observation.precipitation_type),
                    observation = ?observation,
                    "obs_st_decoded"
                );
                let mut point = self.new_point(&self.bucket, serial_number);
                observation_fields(&observation, &mut point);
                Ok(Some(point))
            }
            Report::RapidWind { serial_number, ob } => {
                if !self.rapid_wind {
                    return Ok(None);
                }
                let rapid_wind = RapidWind::from_slots(&ob)?;
                debug!(
                    target: "tempest.normalize",
                    station = %serial_number,
                    rapid_wind = ?rapid_wind,
                    "rapid_wind_decoded"
                );
                let mut point = self.new_point(&self.rapid_wind_bucket, serial_number);
                point.timestamp = rapid_wind.timestamp;
                point.fields.insert(
                    "rapid_wind_speed".to_string(),
                    format!("{:.2}", rapid_wind.wind_speed),
                );
                point.fields.insert(
                    "rapid_wind_direction".to_string(),
                    rapid_wind.wind_direction.to_string(),
                );
                Ok(Some(point))
            }
            Report::HubStatus
            | Report::PrecipitationEvent
            | Report::StrikeEvent
            | Report::Unsupported => Ok(None),
        }
    }

    fn new_point(&self, bucket: &str, station: String) -> DataPoint {
        let mut point = DataPoint::new();
        point.name = MEASUREMENT.to_string();
        point.bucket = bucket.to_string();
        point.tags.insert("station".to_string(), station);
        point
    }
}

fn observation_fields(observation: &Observation, point: &mut DataPoint) {
    // 露点只是派生值，计算失败时记录日志并写 0
    let dew_point = match dew_point(observation.air_temperature, observation.relative_humidity) {
        Ok(value) => value,
        Err(err) => {
            warn!(
                target: "tempest.normalize",
                temperature = observation.air_temperature,
                humidity = observation.relative_humidity,
                error = %err,
                "dew_point_failed"
            );
            0.0
        }
    };

    point.timestamp = observation.timestamp;
    let fields = [
        ("battery", format!("{:.2}", observation.battery)),
        ("dew_point", format!("{:.2}", dew_point)),
        ("humidity", format!("{:.2}", observation.relative_humidity)),
        ("illuminance", observation.illuminance.to_string()),
        ("p", format!("{:.2}", observation.station_pressure)),
        ("precipitation", format!("{:.2}", observation.precipitation_accumulation)),
        ("precipitation_type", observation.precipitation_type.to_string()),
        ("solar_radiation", observation.solar_radiation.to_string()),
        ("strike_count", observation.strike_count.to_string()),
        ("strike_distance", observation.strike_avg_distance.to_string()),
        ("temp", format!("{:.2}", observation.air_temperature)),
        ("uv", format!("{:.2}", observation.uv)),
        ("wind_avg", format!("{:.2}", observation.wind_avg)),
        ("wind_direction", observation.wind_direction.to_string()),
        ("wind_gust", format!("{:.2}", observation.wind_gust)),
        ("wind_lull", format!("{:.2}", observation.wind_lull)),
    ];
    point
        .fields
        .extend(fields.into_iter().map(|(key, value)| (key.to_string(), value)));
}
