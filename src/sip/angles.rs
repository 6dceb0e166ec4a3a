//! Solar illumination geometry for EO-SIP metadata.
//!
//! NOAA solar position equations (equation of time, declination, hour
//! angle); see the General Solar Position Calculations reference sheet.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

fn sin_deg(angle: f64) -> f64 {
    angle.to_radians().sin()
}

fn cos_deg(angle: f64) -> f64 {
    angle.to_radians().cos()
}

fn acos_deg(value: f64) -> f64 {
    value.clamp(-1.0, 1.0).acos().to_degrees()
}

/// Illumination (azimuth, elevation) in degrees for an acquisition time and
/// scene centre.
pub fn illumination_angles(timestamp: NaiveDateTime, latitude: f64, longitude: f64) -> (f64, f64) {
    let day_of_year = timestamp.ordinal() as f64;
    let days_in_year = if NaiveDate::from_ymd_opt(timestamp.year(), 12, 31)
        .map(|d| d.ordinal() == 366)
        .unwrap_or(false)
    {
        366.0
    } else {
        365.0
    };

    let fraction_of_year = (2.0 * std::f64::consts::PI / days_in_year)
        * (day_of_year - 1.0 + (timestamp.hour() as f64 - 12.0) / 24.0);

    let equation_of_time = 229.18
        * (0.000075 + 0.001868 * fraction_of_year.cos()
            - 0.032077 * fraction_of_year.sin()
            - 0.014615 * (2.0 * fraction_of_year).cos()
            - 0.040849 * (2.0 * fraction_of_year).sin());

    let declination_rad = 0.006918 - 0.399912 * fraction_of_year.cos()
        + 0.070257 * fraction_of_year.sin()
        - 0.006758 * (2.0 * fraction_of_year).cos()
        + 0.000907 * (2.0 * fraction_of_year).sin()
        - 0.002697 * (3.0 * fraction_of_year).cos()
        + 0.00148 * (3.0 * fraction_of_year).sin();
    let declination_deg = declination_rad.to_degrees();

    let time_offset = equation_of_time + 4.0 * longitude;
    let true_solar_time = timestamp.hour() as f64 * 60.0
        + timestamp.minute() as f64
        + timestamp.second() as f64 / 60.0
        + time_offset;
    let solar_hour_angle = true_solar_time / 4.0 - 180.0;

    let zenith_deg = acos_deg(
        sin_deg(latitude) * sin_deg(declination_deg)
            + cos_deg(latitude) * cos_deg(declination_deg) * cos_deg(solar_hour_angle),
    );

    let azimuth_deg = 180.0
        - acos_deg(
            -(sin_deg(latitude) * cos_deg(zenith_deg) - sin_deg(declination_deg))
                / (cos_deg(latitude) * sin_deg(zenith_deg)),
        );

    let elevation_deg = 90.0 + latitude - declination_deg;

    (azimuth_deg, elevation_deg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn noon(year: i32, month: u32, day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(year, month, day)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_angles_are_finite_and_bounded() {
        let (azimuth, elevation) = illumination_angles(noon(2004, 4, 11), 31.6, -110.54);
        assert!(azimuth.is_finite());
        assert!(elevation.is_finite());
        assert!((-360.0..=360.0).contains(&azimuth));
    }

    #[test]
    fn test_elevation_tracks_declination() {
        // northern summer: declination positive, so elevation below 90 + lat
        let (_, summer) = illumination_angles(noon(2004, 6, 21), 45.0, 0.0);
        // northern winter: declination negative, elevation above 90 + lat
        let (_, winter) = illumination_angles(noon(2004, 12, 21), 45.0, 0.0);
        assert!(summer < 90.0 + 45.0);
        assert!(winter > 90.0 + 45.0);
    }

    #[test]
    fn test_leap_year_handled() {
        let (azimuth, _) = illumination_angles(noon(2004, 2, 29), 10.0, 10.0);
        assert!(azimuth.is_finite());
    }
}
