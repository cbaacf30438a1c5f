//! Human-readable assessments of averaged readings
//!
//! These labels travel with each reading into the backup store and the
//! pipeline's log lines. They never influence classification.

/// Coarse air quality derived from the gas channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AirQuality {
    Good,
    Moderate,
    Poor,
    Hazardous,
}

impl AirQuality {
    /// Assess air quality from a gas concentration in ppm
    pub fn assess(ppm: f32) -> Self {
        if ppm < 1_000.0 {
            Self::Good
        } else if ppm < 2_000.0 {
            Self::Moderate
        } else if ppm < 5_000.0 {
            Self::Poor
        } else {
            Self::Hazardous
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Good => "Good",
            Self::Moderate => "Moderate",
            Self::Poor => "Poor",
            Self::Hazardous => "Hazardous",
        }
    }
}

/// Ambient light bucket derived from the lux channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightCondition {
    Dark,
    Dim,
    Indoor,
    Overcast,
    Bright,
}

impl LightCondition {
    pub fn assess(lux: f32) -> Self {
        if lux < 10.0 {
            Self::Dark
        } else if lux < 50.0 {
            Self::Dim
        } else if lux < 200.0 {
            Self::Indoor
        } else if lux < 400.0 {
            Self::Overcast
        } else {
            Self::Bright
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Dark => "Dark",
            Self::Dim => "Dim",
            Self::Indoor => "Indoor",
            Self::Overcast => "Overcast",
            Self::Bright => "Bright",
        }
    }
}

/// Link signal strength bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalQuality {
    Excellent,
    Good,
    Fair,
    Weak,
}

impl SignalQuality {
    /// Bucket a received signal strength in dBm
    pub fn from_rssi(rssi: i8) -> Self {
        if rssi > -50 {
            Self::Excellent
        } else if rssi > -60 {
            Self::Good
        } else if rssi > -70 {
            Self::Fair
        } else {
            Self::Weak
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Excellent => "Excellent",
            Self::Good => "Good",
            Self::Fair => "Fair",
            Self::Weak => "Weak",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn air_quality_thresholds() {
        assert_eq!(AirQuality::assess(0.0), AirQuality::Good);
        assert_eq!(AirQuality::assess(999.9), AirQuality::Good);
        assert_eq!(AirQuality::assess(1_000.0), AirQuality::Moderate);
        assert_eq!(AirQuality::assess(4_999.0), AirQuality::Poor);
        assert_eq!(AirQuality::assess(5_000.0), AirQuality::Hazardous);
    }

    #[test]
    fn light_thresholds() {
        assert_eq!(LightCondition::assess(3.0), LightCondition::Dark);
        assert_eq!(LightCondition::assess(10.0), LightCondition::Dim);
        assert_eq!(LightCondition::assess(199.0), LightCondition::Indoor);
        assert_eq!(LightCondition::assess(250.0), LightCondition::Overcast);
        assert_eq!(LightCondition::assess(400.0).label(), "Bright");
    }

    #[test]
    fn rssi_buckets() {
        assert_eq!(SignalQuality::from_rssi(-45), SignalQuality::Excellent);
        assert_eq!(SignalQuality::from_rssi(-50), SignalQuality::Good);
        assert_eq!(SignalQuality::from_rssi(-65), SignalQuality::Fair);
        assert_eq!(SignalQuality::from_rssi(-70), SignalQuality::Weak);
    }
}
