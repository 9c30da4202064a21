use crate::error::{MirageError, Result};
use serde::{Deserialize, Serialize};

/// A single illumination value, constrained to the protocol's 4-bit range.
/// Out-of-range values are rejected at construction rather than clamped;
/// clamping would hide a caller bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightLevel(u8);

impl LightLevel {
    pub const MAX: u8 = 15;

    pub fn new(value: u8) -> Result<Self> {
        if value > Self::MAX {
            return Err(MirageError::InvalidInput(format!(
                "light level {} out of range 0..=15",
                value
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

/// Per-position lighting override. Either channel may be left as "use the
/// world value".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightOverride {
    pub block: Option<LightLevel>,
    pub sky: Option<LightLevel>,
}

impl LightOverride {
    pub fn new(block: Option<u8>, sky: Option<u8>) -> Result<Self> {
        Ok(Self {
            block: block.map(LightLevel::new).transpose()?,
            sky: sky.map(LightLevel::new).transpose()?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.block.is_none() && self.sky.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn accepts_full_range() {
        for v in 0..=15 {
            assert_eq!(LightLevel::new(v).unwrap().value(), v);
        }
    }

    #[test]
    fn rejects_out_of_range() {
        assert_matches!(LightLevel::new(16), Err(MirageError::InvalidInput(_)));
        assert_matches!(LightLevel::new(255), Err(MirageError::InvalidInput(_)));
        assert_matches!(
            LightOverride::new(Some(3), Some(99)),
            Err(MirageError::InvalidInput(_))
        );
    }

    #[test]
    fn override_emptiness() {
        assert!(LightOverride::new(None, None).unwrap().is_empty());
        assert!(!LightOverride::new(Some(0), None).unwrap().is_empty());
    }
}
