//! Derived physical indices

/// Heat index in °C from temperature (°C) and relative humidity (%).
///
/// Uses the simplified Steadman formula evaluated in Fahrenheit.
pub fn heat_index(temp_c: f64, humidity: f64) -> f64 {
    let temp_f = temp_c * 9.0 / 5.0 + 32.0;
    let hi_f = 0.5 * (temp_f + 61.0 + ((temp_f - 68.0) * 1.2) + (humidity * 0.094));
    (hi_f - 32.0) * 5.0 / 9.0
}

/// Wind chill in °C (Environment Canada) from temperature (°C) and wind speed (m/s)
pub fn wind_chill(temp_c: f64, wind_speed_ms: f64) -> f64 {
    let v = (wind_speed_ms * 3.6).powf(0.16);
    13.12 + 0.6215 * temp_c - 11.37 * v + 0.3965 * temp_c * v
}

/// Pressure normalized by absolute temperature (hPa/K)
pub fn pressure_temperature_ratio(pressure_hpa: f64, temp_c: f64) -> f64 {
    pressure_hpa / (temp_c + 273.15)
}
