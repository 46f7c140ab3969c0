//! Provides parsing and formatting helpers for durations and byte sizes as used in the config and
//! in log messages.
use std::fmt::Write;
use std::time::Duration;

/// Contains the units supported by [format_duration](format_duration) in descending order.
const DURATION_UNITS: [(&str, u128); 5] = [
    ("d", 1000 * 60 * 60 * 24),
    ("h", 1000 * 60 * 60),
    ("m", 1000 * 60),
    ("s", 1000),
    ("ms", 1),
];

/// Parses a duration from a given string.
///
/// This string can have the following suffixes:
/// * **ms** or **MS**: treats the value as milliseconds
/// * **s** or **S**: treats the value as seconds
/// * **m** or **M**: treats the value as minutes
/// * **h** or **H**: treats the value as hours
/// * **d** or **D**: treats the value as days
///
/// A value without suffix is treated as milliseconds. Returns an **Err** if either a non-integer
/// value is given, if an unknown suffix was provided or if the value overflows.
///
/// # Examples
///
/// ```
/// # use std::time::Duration;
/// assert_eq!(nsdoc::fmt::parse_duration("100 ms").unwrap(), Duration::from_millis(100));
/// assert_eq!(nsdoc::fmt::parse_duration("250").unwrap(), Duration::from_millis(250));
/// assert_eq!(nsdoc::fmt::parse_duration("12 s").unwrap(), Duration::from_secs(12));
/// assert_eq!(nsdoc::fmt::parse_duration("3 M").unwrap(), Duration::from_secs(3 * 60));
/// assert_eq!(nsdoc::fmt::parse_duration("1h").unwrap(), Duration::from_secs(60 * 60));
/// assert_eq!(nsdoc::fmt::parse_duration("5 d").unwrap(), Duration::from_secs(5 * 24 * 60 * 60));
///
/// // An invalid suffix results in an error...
/// assert_eq!(nsdoc::fmt::parse_duration("3 Y").is_err(), true);
///
/// // Decimal numbers result in an error...
/// assert_eq!(nsdoc::fmt::parse_duration("1.2s").is_err(), true);
///
/// // Negative numbers result in an error...
/// assert_eq!(nsdoc::fmt::parse_duration("-1m").is_err(), true);
///
/// // So do values which exceed the range of a duration...
/// assert_eq!(nsdoc::fmt::parse_duration("18446744073709551615d").is_err(), true);
/// ```
pub fn parse_duration(str: impl AsRef<str>) -> anyhow::Result<Duration> {
    lazy_static::lazy_static! {
        static ref NUMBER_AND_SUFFIX: regex::Regex =
            regex::Regex::new(r"^ *(\d+) *((ms|s|m|h|d|MS|S|M|H|D)?) *$").unwrap();
    }

    let captures = NUMBER_AND_SUFFIX.captures(str.as_ref()).ok_or_else(|| {
        anyhow::anyhow!(
            "Cannot parse '{}' into a duration expression. \
             Expected a positive number and optionally 'ms', 's', 'm', 'h' or 'd' as suffix.",
            str.as_ref()
        )
    })?;

    let number = captures[1].parse::<u64>()?;
    let seconds_per_unit = match captures[2].to_ascii_lowercase().as_str() {
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 60 * 60 * 24,
        _ => return Ok(Duration::from_millis(number)),
    };

    number
        .checked_mul(seconds_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| anyhow::anyhow!("The duration '{}' is too large.", str.as_ref()))
}

/// Formats a duration into a string like "5d 3h 17m 2s 12ms".
///
/// Units which would be zero are omitted and an empty duration is reported as "0ms".
///
/// # Examples
///
/// ```
/// # use std::time::Duration;
/// assert_eq!(nsdoc::fmt::format_duration(Duration::from_millis(0)), "0ms");
/// assert_eq!(nsdoc::fmt::format_duration(Duration::from_millis(13)), "13ms");
/// assert_eq!(nsdoc::fmt::format_duration(Duration::from_millis(62_013)), "1m 2s 13ms");
/// assert_eq!(nsdoc::fmt::format_duration(Duration::from_secs(60 * 61)), "1h 1m");
/// assert_eq!(nsdoc::fmt::format_duration(Duration::from_secs(24 * 60 * 60 + 59)), "1d 59s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let mut result = String::new();
    let mut value = duration.as_millis();

    for (suffix, millis) in DURATION_UNITS {
        let amount = value / millis;
        if amount > 0 {
            if !result.is_empty() {
                result.push(' ');
            }
            let _ = write!(result, "{}{}", amount, suffix);
            value %= millis;
        }
    }

    if result.is_empty() {
        result.push_str("0ms");
    }

    result
}

/// Formats a given size in bytes using binary units.
///
/// # Examples
///
/// ```
/// assert_eq!(nsdoc::fmt::format_size(0), "0 bytes");
/// assert_eq!(nsdoc::fmt::format_size(1), "1 byte");
/// assert_eq!(nsdoc::fmt::format_size(100), "100 bytes");
/// assert_eq!(nsdoc::fmt::format_size(8_734), "8.53 KiB");
/// assert_eq!(nsdoc::fmt::format_size(873_400), "853 KiB");
/// assert_eq!(nsdoc::fmt::format_size(8_734_000), "8.33 MiB");
/// assert_eq!(nsdoc::fmt::format_size(8_734_000_000), "8.13 GiB");
/// ```
pub fn format_size(size_in_bytes: usize) -> String {
    const UNITS: [&str; 5] = ["KiB", "MiB", "GiB", "TiB", "PiB"];

    match size_in_bytes {
        1 => return "1 byte".to_owned(),
        0..=1023 => return format!("{} bytes", size_in_bytes),
        _ => (),
    }

    let mut value = size_in_bytes as f64 / 1024.;
    let mut unit = 0;
    while value >= 1024. && unit < UNITS.len() - 1 {
        value /= 1024.;
        unit += 1;
    }

    // Print three significant digits...
    if value < 10. {
        format!("{:.2} {}", value, UNITS[unit])
    } else if value < 100. {
        format!("{:.1} {}", value, UNITS[unit])
    } else {
        format!("{:.0} {}", value, UNITS[unit])
    }
}
