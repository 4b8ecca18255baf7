//! Duration values for `--timeout` and `profile.timeout` ("250ms", "30s", "5m", "2h").

use std::str::FromStr;
use std::time::Duration;

use crate::{FuzzError, FuzzResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecTimeout(pub Duration);

impl FromStr for ExecTimeout {
    type Err = FuzzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_duration(s).map(Self)
    }
}

pub fn parse_duration(input: &str) -> FuzzResult<Duration> {
    let s = input.trim();
    let digits = s.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return Err(FuzzError::InvalidArgument(format!(
            "invalid duration {input:?} (missing number)"
        )));
    }
    let (num, unit) = s.split_at(digits);
    let value: u64 = num
        .parse()
        .map_err(|_| FuzzError::InvalidArgument(format!("duration {input:?} is out of range")))?;

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value.saturating_mul(60))),
        "h" => Ok(Duration::from_secs(value.saturating_mul(3600))),
        "" => Err(FuzzError::InvalidArgument(format!(
            "invalid duration {input:?} (missing unit; expected ms|s|m|h)"
        ))),
        other => Err(FuzzError::InvalidArgument(format!(
            "invalid duration unit {other:?} in {input:?} (expected ms|s|m|h)"
        ))),
    }
}

/// Shortest exact rendering in the same grammar.
pub fn format_duration(d: Duration) -> String {
    let ms = d.as_millis();
    if ms == 0 || ms % 1000 != 0 {
        return format!("{ms}ms");
    }
    let secs = d.as_secs();
    if secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}
