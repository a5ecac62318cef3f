//! 露点计算（Magnus 公式，Sonntag 1990 系数）。

const MAGNUS_B: f64 = 17.62;
const MAGNUS_C: f64 = 243.12;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DewPointError {
    #[error("relative humidity {0} outside (0, 100]")]
    Humidity(f64),
    #[error("temperature {0} out of range")]
    Temperature(f64),
}

/// 由气温（摄氏度）与相对湿度（%）计算露点（摄氏度）。
pub fn dew_point(temperature: f64, relative_humidity: f64) -> Result<f64, DewPointError> {
    if !relative_humidity.is_finite() || relative_humidity <= 0.0 || relative_humidity > 100.0 {
        return Err(DewPointError::Humidity(relative_humidity));
    }
    if !temperature.is_finite() || temperature <= -MAGNUS_C {
        return Err(DewPointError::Temperature(temperature));
    }
    let gamma =
        (relative_humidity / 100.0).ln() + MAGNUS_B * temperature / (MAGNUS_C + temperature);
    Ok(MAGNUS_C * gamma / (MAGNUS_B - gamma))
}
