use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;

/// Format used wherever a timestamp feeds into a hash: `HHMMSS MMDDYYYY`
pub const TIMESTAMP_FORMAT: &str = "%H%M%S %m%d%Y";

/// Creation time of a block or transaction, kept in its hashed textual form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp(String);

impl Timestamp {
    /// Captures the current UTC time
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub fn from_datetime(datetime: DateTime<Utc>) -> Self {
        Timestamp(datetime.format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format() {
        let datetime = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();

        assert_eq!(Timestamp::from_datetime(datetime).as_str(), "070501 03092024");
    }

    #[test]
    fn test_now_has_fixed_width() {
        assert_eq!(Timestamp::now().as_str().len(), 15);
    }
}
