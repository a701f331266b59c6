//! Decoding of the SGLI LST `QA_flag` band.
//!
//! Every pixel of the quality band is a 16-bit field. Bit `i` (counted from
//! the least significant bit) carries one fixed condition from the product
//! format description. Bits 14 and 15 are unused by the LST product.

use std::fmt;

/// A named condition carried by one bit of the quality field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QualityCondition {
    NoInputData,
    Water,
    RetrievalFailure,
    LargeSensorZenith,
    HighWaterVapour,
    Snow,
    Night,
    LowEmissivityAccuracy,
    LowRetrievalAccuracy,
    TerrainShadow,
    CloudShadow,
    ProbablyCloudy,
    Cloudy,
    StrayLight,
}

impl QualityCondition {
    /// All conditions in bit order.
    pub const ALL: [QualityCondition; 14] = [
        QualityCondition::NoInputData,
        QualityCondition::Water,
        QualityCondition::RetrievalFailure,
        QualityCondition::LargeSensorZenith,
        QualityCondition::HighWaterVapour,
        QualityCondition::Snow,
        QualityCondition::Night,
        QualityCondition::LowEmissivityAccuracy,
        QualityCondition::LowRetrievalAccuracy,
        QualityCondition::TerrainShadow,
        QualityCondition::CloudShadow,
        QualityCondition::ProbablyCloudy,
        QualityCondition::Cloudy,
        QualityCondition::StrayLight,
    ];

    pub fn bit(self) -> u32 {
        match self {
            QualityCondition::NoInputData => 0,
            QualityCondition::Water => 1,
            QualityCondition::RetrievalFailure => 2,
            QualityCondition::LargeSensorZenith => 3,
            QualityCondition::HighWaterVapour => 4,
            QualityCondition::Snow => 5,
            QualityCondition::Night => 6,
            QualityCondition::LowEmissivityAccuracy => 7,
            QualityCondition::LowRetrievalAccuracy => 8,
            QualityCondition::TerrainShadow => 9,
            QualityCondition::CloudShadow => 10,
            QualityCondition::ProbablyCloudy => 11,
            QualityCondition::Cloudy => 12,
            QualityCondition::StrayLight => 13,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            QualityCondition::NoInputData => "no input data",
            QualityCondition::Water => "land/water",
            QualityCondition::RetrievalFailure => "retrieval failure",
            QualityCondition::LargeSensorZenith => "large sensor zenith",
            QualityCondition::HighWaterVapour => "high water vapour",
            QualityCondition::Snow => "snow",
            QualityCondition::Night => "night",
            QualityCondition::LowEmissivityAccuracy => "low emissivity accuracy",
            QualityCondition::LowRetrievalAccuracy => "low retrieval accuracy",
            QualityCondition::TerrainShadow => "terrain shadow",
            QualityCondition::CloudShadow => "cloud shadow",
            QualityCondition::ProbablyCloudy => "probably cloudy",
            QualityCondition::Cloudy => "cloudy",
            QualityCondition::StrayLight => "stray light",
        }
    }
}

impl fmt::Display for QualityCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded quality field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct QualityFlags {
    raw: u16,
}

/// Decodes a raw quality value. Anything above 16 bits is masked off.
pub fn decode(raw: u32) -> QualityFlags {
    QualityFlags {
        raw: (raw & 0xFFFF) as u16,
    }
}

impl QualityFlags {
    /// Decodes a value read from a raster band.
    ///
    /// Raster values arrive as floating point; the fraction is dropped and
    /// the integer part masked to 16 bits. Negative or non-finite values
    /// decode as zero.
    pub fn from_sample(value: f64) -> Self {
        if !value.is_finite() || value < 0.0 {
            return decode(0);
        }
        decode((value as u64 & 0xFFFF) as u32)
    }

    pub fn raw(&self) -> u16 {
        self.raw
    }

    pub fn is_set(&self, condition: QualityCondition) -> bool {
        (self.raw >> condition.bit()) & 1 == 1
    }

    /// Every condition with its state, in bit order.
    pub fn conditions(&self) -> impl Iterator<Item = (QualityCondition, bool)> + '_ {
        QualityCondition::ALL
            .iter()
            .map(move |&condition| (condition, self.is_set(condition)))
    }

    /// Conditions that are set, in bit order.
    pub fn set_conditions(&self) -> Vec<QualityCondition> {
        self.conditions()
            .filter_map(|(condition, set)| set.then_some(condition))
            .collect()
    }

    pub fn any_of(&self, conditions: &[QualityCondition]) -> bool {
        conditions.iter().any(|&condition| self.is_set(condition))
    }
}

impl fmt::Display for QualityFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self
            .set_conditions()
            .into_iter()
            .map(QualityCondition::name)
            .collect();
        if names.is_empty() {
            write!(f, "clear")
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_value_matches_bit_positions() {
        for v in 0..=u16::MAX as u32 {
            let flags = decode(v);
            let decoded: Vec<(QualityCondition, bool)> = flags.conditions().collect();
            assert_eq!(decoded.len(), 14);
            for (condition, set) in decoded {
                assert_eq!(set, (v >> condition.bit()) & 1 == 1, "value {v:#06x}");
            }
            assert_eq!(decode(v), flags);
        }
    }

    #[test]
    fn test_literal_patterns() {
        let flags = decode(0b0001_1000_0010_0001);
        assert_eq!(
            flags.set_conditions(),
            vec![
                QualityCondition::NoInputData,
                QualityCondition::Snow,
                QualityCondition::ProbablyCloudy,
                QualityCondition::Cloudy,
            ]
        );
        assert!(!flags.is_set(QualityCondition::Water));

        assert!(decode(0).set_conditions().is_empty());
        assert_eq!(decode(0).to_string(), "clear");
        assert_eq!(decode(0b10).to_string(), "land/water");
    }

    #[test]
    fn test_unused_high_bits_are_ignored() {
        assert!(decode(0xC000).set_conditions().is_empty());
        assert_eq!(decode(0xFFFF).set_conditions().len(), 14);
    }

    #[test]
    fn test_out_of_range_values_are_masked() {
        assert_eq!(decode(0x1_0001), decode(0x0001));
        assert_eq!(decode(u32::MAX).raw(), 0xFFFF);
        assert_eq!(QualityFlags::from_sample(65536.0 + 4096.0).raw(), 4096);
        assert_eq!(QualityFlags::from_sample(4097.9).raw(), 4097);
        assert_eq!(QualityFlags::from_sample(f64::NAN).raw(), 0);
        assert_eq!(QualityFlags::from_sample(-1.0).raw(), 0);
    }

    #[test]
    fn test_any_of() {
        let flags = decode(1 << 12);
        assert!(flags.any_of(&[QualityCondition::NoInputData, QualityCondition::Cloudy]));
        assert!(!flags.any_of(&[QualityCondition::NoInputData]));
    }
}
