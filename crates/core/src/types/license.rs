//! License type enum.

use core::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when a string is not a known license type.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown license type: {0}")]
pub struct LicenseTypeError(pub String);

/// Kind of license. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseType {
    /// Single-seat license.
    Individual,
    /// Shared license with a member roster and a capacity.
    Team,
}

impl LicenseType {
    /// Wire and storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Individual => "individual",
            Self::Team => "team",
        }
    }

    /// Whether this license type has a member roster.
    #[must_use]
    pub const fn is_team(self) -> bool {
        matches!(self, Self::Team)
    }
}

impl fmt::Display for LicenseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LicenseType {
    type Err = LicenseTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "individual" => Ok(Self::Individual),
            "team" => Ok(Self::Team),
            other => Err(LicenseTypeError(other.to_owned())),
        }
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for LicenseType {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for LicenseType {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(s.parse()?)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for LicenseType {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.as_str(), buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str() {
        assert_eq!("team".parse::<LicenseType>().unwrap(), LicenseType::Team);
        assert_eq!(
            "individual".parse::<LicenseType>().unwrap(),
            LicenseType::Individual
        );
        assert!("enterprise".parse::<LicenseType>().is_err());
        assert!("Team".parse::<LicenseType>().is_err());
    }

    #[test]
    fn test_serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&LicenseType::Team).unwrap(),
            "\"team\""
        );
        let parsed: LicenseType = serde_json::from_str("\"individual\"").unwrap();
        assert_eq!(parsed, LicenseType::Individual);
    }

    #[test]
    fn test_is_team() {
        assert!(LicenseType::Team.is_team());
        assert!(!LicenseType::Individual.is_team());
    }
}
