//! Schema version numbers.

use std::{fmt, str::FromStr};

use crate::migration::MigrationError;

/// Dotted schema version. Components compare numerically, so `0.9 < 0.10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SchemaVersion {
    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SchemaVersion {
    type Err = MigrationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || MigrationError::InvalidVersion(value.to_string());

        let mut parts = value.trim().split('.');
        let mut next = |required: bool| -> Result<u32, MigrationError> {
            match parts.next() {
                Some(part) => part.parse::<u32>().map_err(|_| invalid()),
                None if required => Err(invalid()),
                None => Ok(0),
            }
        };

        let version = Self::new(next(true)?, next(true)?, next(false)?);

        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn ordering_is_numeric_per_component() -> TestResult {
        let nine: SchemaVersion = "0.9".parse()?;
        let ten: SchemaVersion = "0.10".parse()?;

        assert!(nine < ten);
        assert_eq!(ten, SchemaVersion::new(0, 10, 0));

        Ok(())
    }

    #[test]
    fn display_always_has_three_components() -> TestResult {
        assert_eq!("1.2".parse::<SchemaVersion>()?.to_string(), "1.2.0");
        assert_eq!("1.2.3".parse::<SchemaVersion>()?.to_string(), "1.2.3");

        Ok(())
    }

    #[test]
    fn rejects_malformed_versions() {
        for value in ["", "1", "1.x", "1.2.3.4", "v1.2"] {
            assert!(
                value.parse::<SchemaVersion>().is_err(),
                "`{value}` should not parse"
            );
        }
    }
}
