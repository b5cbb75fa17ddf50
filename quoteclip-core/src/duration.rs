use std::{fmt, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid duration: {0:?}")]
pub struct DurationParseError(pub String);

/// A signed offset with millisecond precision.
///
/// Used for the shift and extend/trim settings of a preview, which may move a
/// clip boundary in either direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignedDuration(i64);

impl SignedDuration {
    pub const ZERO: SignedDuration = SignedDuration(0);

    pub const fn from_millis(ms: i64) -> SignedDuration {
        SignedDuration(ms)
    }

    pub const fn from_secs(s: i64) -> SignedDuration {
        SignedDuration(s * 1000)
    }

    pub fn from_duration(d: Duration) -> SignedDuration {
        SignedDuration(d.as_millis().min(i64::MAX as u128) as i64)
    }

    pub const fn as_millis(&self) -> i64 {
        self.0
    }

    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Apply this offset to an absolute timestamp, saturating at zero.
    pub fn offset(&self, base: Duration) -> Duration {
        if self.0 >= 0 {
            base.saturating_add(Duration::from_millis(self.0 as u64))
        } else {
            base.saturating_sub(Duration::from_millis(self.0.unsigned_abs()))
        }
    }
}

impl std::ops::Add for SignedDuration {
    type Output = SignedDuration;

    fn add(self, rhs: Self) -> Self::Output {
        SignedDuration(self.0.saturating_add(rhs.0))
    }
}

impl std::ops::Sub for SignedDuration {
    type Output = SignedDuration;

    fn sub(self, rhs: Self) -> Self::Output {
        SignedDuration(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Display for SignedDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let (secs, ms) = (abs / 1000, abs % 1000);
        if ms == 0 {
            write!(f, "{}{}s", sign, secs)
        } else {
            let frac = format!("{:03}", ms);
            write!(f, "{}{}.{}s", sign, secs, frac.trim_end_matches('0'))
        }
    }
}

impl FromStr for SignedDuration {
    type Err = DurationParseError;

    /// Accepts `1.5s`, `-500ms`, `+2s`, `1m30s`, or a bare number of seconds.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || DurationParseError(s.to_owned());
        let trimmed = s.trim();
        let (negative, body) = match trimmed.as_bytes().first() {
            Some(b'-') => (true, &trimmed[1..]),
            Some(b'+') => (false, &trimmed[1..]),
            _ => (false, trimmed),
        };
        let body = body.trim();
        if body.is_empty() {
            return Err(err());
        }
        let ms = if let Ok(secs) = body.parse::<f64>() {
            if !secs.is_finite() || secs < 0.0 {
                return Err(err());
            }
            (secs * 1000.0).round() as i64
        } else {
            parse_unit_millis(body).ok_or_else(err)?
        };
        Ok(SignedDuration(if negative { -ms } else { ms }))
    }
}

/// Parse a compound duration like `1h2m3s`, `10m30s`, `90s` or `250ms` into
/// milliseconds. Each component may carry a decimal fraction.
pub fn parse_unit_millis(s: &str) -> Option<i64> {
    let mut total: f64 = 0.0;
    let mut rest = s;
    let mut any = false;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_len == 0 {
            return None;
        }
        let value: f64 = rest[..num_len].parse().ok()?;
        rest = &rest[num_len..];
        let unit_len = rest
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "h" => 3_600_000.0,
            "m" => 60_000.0,
            "s" => 1_000.0,
            "ms" => 1.0,
            _ => return None,
        };
        rest = &rest[unit_len..];
        total += value * scale;
        any = true;
    }
    any.then(|| total.round() as i64)
}

/// `HH:MM:SS,mmm`, the SRT timestamp form.
pub fn format_timestamp(d: Duration) -> String {
    let ms = d.as_millis();
    format!(
        "{:02}:{:02}:{:02},{:03}",
        ms / 3_600_000,
        (ms / 60_000) % 60,
        (ms / 1000) % 60,
        ms % 1000
    )
}

/// `MM:SS` or `H:MM:SS` for display next to search results.
pub fn format_short_timestamp(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 3600 {
        format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
    } else {
        format!("{:02}:{:02}", secs / 60, secs % 60)
    }
}

/// Serialize a [`Duration`] as an integer number of milliseconds.
pub mod serde_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_signed_forms() {
        assert_eq!("1.5s".parse(), Ok(SignedDuration::from_millis(1500)));
        assert_eq!("-500ms".parse(), Ok(SignedDuration::from_millis(-500)));
        assert_eq!("+2s".parse(), Ok(SignedDuration::from_secs(2)));
        assert_eq!("3".parse(), Ok(SignedDuration::from_secs(3)));
        assert_eq!("-0.25".parse(), Ok(SignedDuration::from_millis(-250)));
        assert_eq!("1m30s".parse(), Ok(SignedDuration::from_secs(90)));
        assert!("".parse::<SignedDuration>().is_err());
        assert!("-".parse::<SignedDuration>().is_err());
        assert!("5 parsecs".parse::<SignedDuration>().is_err());
    }

    #[test]
    fn display_trims_fraction() {
        assert_eq!(SignedDuration::from_millis(1500).to_string(), "1.5s");
        assert_eq!(SignedDuration::from_millis(-250).to_string(), "-0.25s");
        assert_eq!(SignedDuration::from_secs(2).to_string(), "2s");
        assert_eq!(SignedDuration::ZERO.to_string(), "0s");
    }

    #[test]
    fn display_parses_back() {
        for ms in [0, 1, -1, 999, -1001, 20_000, 123_456] {
            let d = SignedDuration::from_millis(ms);
            assert_eq!(d.to_string().parse::<SignedDuration>(), Ok(d));
        }
    }

    #[test]
    fn unit_durations() {
        assert_eq!(parse_unit_millis("10m30s"), Some(630_000));
        assert_eq!(parse_unit_millis("1h"), Some(3_600_000));
        assert_eq!(parse_unit_millis("250ms"), Some(250));
        assert_eq!(parse_unit_millis("1.5s"), Some(1500));
        assert_eq!(parse_unit_millis("10"), None);
        assert_eq!(parse_unit_millis("10x"), None);
        assert_eq!(parse_unit_millis(""), None);
    }

    #[test]
    fn offset_saturates() {
        let base = Duration::from_secs(1);
        assert_eq!(SignedDuration::from_secs(-5).offset(base), Duration::ZERO);
        assert_eq!(
            SignedDuration::from_millis(500).offset(base),
            Duration::from_millis(1500)
        );
    }

    #[test]
    fn timestamps() {
        assert_eq!(
            format_timestamp(Duration::from_millis(3_723_004)),
            "01:02:03,004"
        );
        assert_eq!(format_short_timestamp(Duration::from_secs(125)), "02:05");
        assert_eq!(format_short_timestamp(Duration::from_secs(3725)), "1:02:05");
    }
}
