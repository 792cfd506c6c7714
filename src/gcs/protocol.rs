//! GCS2 command formatting and reply parsing.
//!
//! GCS2 is a line based ASCII protocol. A command is terminated by LF; a
//! query ends in `?`. Multi-line replies mark every line except the last with
//! a trailing space before the LF, e.g. the answer to `POS?` on a hexapod:
//!
//! ```text
//! X=0.000000 \n
//! Y=1.250000 \n
//! ...
//! W=0.000000\n
//! ```
//!
//! Single-character commands (`#5` motion status, `#24` stop) are sent as
//! the raw byte without a terminator.

use std::collections::HashMap;

use super::errors::{GcsError, GcsResult};

/// Request motion status (reply is a hex bit mask over the axes).
pub const MOTION_STATUS: u8 = 0x05;
/// Stop all axes immediately, including reference moves.
pub const STOP_ALL: u8 = 0x18;

/// Returns true if a reply line announces another line to follow.
pub fn is_continuation(line: &str) -> bool {
    let line = line.strip_suffix('\n').unwrap_or(line);
    let line = line.strip_suffix('\r').unwrap_or(line);
    line.ends_with(' ')
}

/// Build axis/value arguments like `"X 1.5 Y -2"`.
pub fn format_axis_args<V: std::fmt::Display>(pairs: &[(&str, V)]) -> String {
    pairs
        .iter()
        .map(|(axis, value)| format!("{axis} {value}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split a reply into trimmed, non-empty lines.
pub fn reply_lines(reply: &str) -> impl Iterator<Item = &str> {
    reply.lines().map(str::trim).filter(|l| !l.is_empty())
}

/// Parse `KEY=VALUE` lines into raw string pairs, preserving order.
pub fn parse_key_values(reply: &str) -> GcsResult<Vec<(String, String)>> {
    reply_lines(reply)
        .map(|line| {
            line.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .ok_or_else(|| GcsError::ParseError(format!("Expected KEY=VALUE, got '{line}'")))
        })
        .collect()
}

/// Parse an axis-keyed reply with floating point values.
pub fn parse_axis_floats(reply: &str) -> GcsResult<HashMap<String, f64>> {
    parse_key_values(reply)?
        .into_iter()
        .map(|(axis, value)| {
            let v = value
                .parse::<f64>()
                .map_err(|_| GcsError::ParseError(format!("Invalid number '{value}' for {axis}")))?;
            Ok((axis, v))
        })
        .collect()
}

/// Parse an axis-keyed reply with `0`/`1` flags.
pub fn parse_axis_bools(reply: &str) -> GcsResult<HashMap<String, bool>> {
    parse_key_values(reply)?
        .into_iter()
        .map(|(axis, value)| Ok((axis, parse_flag(&value)?)))
        .collect()
}

/// Parse an axis-keyed reply with string values (e.g. `PUN?`).
pub fn parse_axis_strings(reply: &str) -> GcsResult<HashMap<String, String>> {
    Ok(parse_key_values(reply)?.into_iter().collect())
}

/// Parse a reply holding one number, either bare (`"1.5"`) or keyed (`"X=1.5"`).
pub fn parse_single_value(reply: &str) -> GcsResult<f64> {
    let line = reply_lines(reply)
        .next()
        .ok_or_else(|| GcsError::InvalidResponse("Empty response".to_string()))?;
    let value = line.split_once('=').map(|(_, v)| v).unwrap_or(line).trim();
    value
        .parse()
        .map_err(|_| GcsError::ParseError(format!("Invalid number in response: '{line}'")))
}

/// Parse a bare or keyed `0`/`1` flag.
pub fn parse_single_flag(reply: &str) -> GcsResult<bool> {
    let line = reply_lines(reply)
        .next()
        .ok_or_else(|| GcsError::InvalidResponse("Empty response".to_string()))?;
    let value = line.split_once('=').map(|(_, v)| v).unwrap_or(line);
    parse_flag(value.trim())
}

/// Parse an `ERR?` reply.
pub fn parse_error_code(reply: &str) -> GcsResult<i32> {
    let trimmed = reply.trim();
    trimmed
        .parse()
        .map_err(|_| GcsError::InvalidResponse(format!("Invalid error code: '{trimmed}'")))
}

/// Parse a `SAI?` reply: one axis identifier per line.
pub fn parse_axis_list(reply: &str) -> Vec<String> {
    reply_lines(reply).map(str::to_string).collect()
}

/// Map the hex bit mask returned by `#5` onto axis names.
///
/// Bit *i* corresponds to the *i*-th axis in controller (`SAI?`) order.
pub fn parse_motion_mask(reply: &str, axes: &[String]) -> GcsResult<HashMap<String, bool>> {
    let trimmed = reply.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let mask = u64::from_str_radix(digits, 16)
        .map_err(|_| GcsError::InvalidResponse(format!("Invalid motion status: '{trimmed}'")))?;
    Ok(axes
        .iter()
        .enumerate()
        .map(|(bit, axis)| (axis.clone(), bit < 64 && mask & (1 << bit) != 0))
        .collect())
}

fn parse_flag(value: &str) -> GcsResult<bool> {
    match value {
        "1" => Ok(true),
        "0" => Ok(false),
        other => Err(GcsError::ParseError(format!("Invalid flag '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axes(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_continuation_marker() {
        assert!(is_continuation("X=1.0 \n"));
        assert!(is_continuation("X=1.0 \r\n"));
        assert!(!is_continuation("X=1.0\n"));
        assert!(!is_continuation("0\n"));
    }

    #[test]
    fn test_parse_hexapod_positions() {
        let reply = "X=0.000000 \nY=1.250000 \nZ=-3.5 \nU=0 \nV=0 \nW=0.1";
        let pos = parse_axis_floats(reply).unwrap();
        assert_eq!(pos.len(), 6);
        assert_eq!(pos["Y"], 1.25);
        assert_eq!(pos["Z"], -3.5);
        assert_eq!(pos["W"], 0.1);
    }

    #[test]
    fn test_axis_keys_are_case_sensitive() {
        let pos = parse_axis_floats("A=1\na=2").unwrap();
        assert_eq!(pos["A"], 1.0);
        assert_eq!(pos["a"], 2.0);
    }

    #[test]
    fn test_parse_bools_and_strings() {
        let refs = parse_axis_bools("X=1 \nY=0").unwrap();
        assert!(refs["X"]);
        assert!(!refs["Y"]);
        assert!(parse_axis_bools("X=yes").is_err());

        let units = parse_axis_strings("X=mm \nU=deg").unwrap();
        assert_eq!(units["U"], "deg");
    }

    #[test]
    fn test_parse_key_values_rejects_garbage() {
        assert!(matches!(parse_axis_floats("X 1.0"), Err(GcsError::ParseError(_))));
        assert!(matches!(parse_axis_floats("X=abc"), Err(GcsError::ParseError(_))));
    }

    #[test]
    fn test_single_values() {
        assert_eq!(parse_single_value("2.5\n").unwrap(), 2.5);
        assert_eq!(parse_single_value("X=-1.5").unwrap(), -1.5);
        assert!(parse_single_value("").is_err());
        assert!(parse_single_flag("1").unwrap());
        assert!(!parse_single_flag("X=0").unwrap());
    }

    #[test]
    fn test_error_code() {
        assert_eq!(parse_error_code("0\n").unwrap(), 0);
        assert_eq!(parse_error_code("-1024").unwrap(), -1024);
        assert!(parse_error_code("ok").is_err());
    }

    #[test]
    fn test_axis_list() {
        assert_eq!(parse_axis_list("X \nY \nZ \nU \nV \nW\n"), axes(&["X", "Y", "Z", "U", "V", "W"]));
        assert!(parse_axis_list("").is_empty());
    }

    #[test]
    fn test_motion_mask_maps_bits_in_axis_order() {
        let names = axes(&["X", "Y", "Z", "U", "V", "W"]);
        let moving = parse_motion_mask("5", &names).unwrap();
        assert!(moving["X"]);
        assert!(!moving["Y"]);
        assert!(moving["Z"]);
        assert!(!moving["W"]);

        let all = parse_motion_mask("3F", &names).unwrap();
        assert!(all.values().all(|&m| m));

        let none = parse_motion_mask("0x0", &names).unwrap();
        assert!(none.values().all(|&m| !m));

        assert!(parse_motion_mask("zz", &names).is_err());
    }

    #[test]
    fn test_format_axis_args() {
        assert_eq!(format_axis_args(&[("X", 1.5), ("Y", -2.0)]), "X 1.5 Y -2");
        assert_eq!(format_axis_args::<f64>(&[]), "");
    }
}
