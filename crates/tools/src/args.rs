//! Argument extraction shared by every tool handler.
//!
//! Schema validation has already run by the time a handler sees its
//! arguments, so these helpers mostly convert; the rules a JSON Schema
//! cannot express live here too: input paths must be readable, the output
//! may not alias the input, and `endTime`/`duration` are mutually
//! exclusive.

use std::path::PathBuf;

use serde_json::Value;

use cf_domain::error::{Error, Result};

pub fn req_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::SchemaViolation(format!("missing required argument \"{key}\"")))
}

pub fn opt_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

pub fn req_f64(args: &Value, key: &str) -> Result<f64> {
    args.get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| Error::SchemaViolation(format!("missing required argument \"{key}\"")))
}

pub fn opt_f64(args: &Value, key: &str) -> Option<f64> {
    args.get(key).and_then(Value::as_f64)
}

pub fn opt_u64(args: &Value, key: &str) -> Option<u64> {
    args.get(key).and_then(Value::as_u64)
}

pub fn opt_i64(args: &Value, key: &str) -> Option<i64> {
    args.get(key).and_then(Value::as_i64)
}

pub fn opt_bool(args: &Value, key: &str) -> Option<bool> {
    args.get(key).and_then(Value::as_bool)
}

/// A validated, readable input path.
pub fn input_path(args: &Value, key: &str) -> Result<PathBuf> {
    let path = PathBuf::from(req_str(args, key)?);
    cf_media::fsops::require_readable(&path)?;
    Ok(path)
}

/// A list of validated input paths.
pub fn input_paths(args: &Value, key: &str) -> Result<Vec<PathBuf>> {
    let arr = args
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| Error::SchemaViolation(format!("missing required argument \"{key}\"")))?;
    let mut paths = Vec::with_capacity(arr.len());
    for v in arr {
        let path = PathBuf::from(v.as_str().ok_or_else(|| {
            Error::SchemaViolation(format!("\"{key}\" entries must be strings"))
        })?);
        cf_media::fsops::require_readable(&path)?;
        paths.push(path);
    }
    if paths.is_empty() {
        return Err(Error::SchemaViolation(format!("\"{key}\" is empty")));
    }
    Ok(paths)
}

/// Output path, checked against every input for in-place writes.
pub fn output_path(args: &Value, key: &str, inputs: &[&PathBuf]) -> Result<PathBuf> {
    let path = PathBuf::from(req_str(args, key)?);
    for input in inputs {
        cf_media::fsops::reject_in_place(input, &path)?;
    }
    Ok(path)
}

/// Resolve the trim window: `start` plus either `endTime` or `duration`.
/// Passing both is a schema violation; passing neither means "to the end".
pub fn time_window(args: &Value) -> Result<(f64, Option<f64>)> {
    let start = opt_f64(args, "start").unwrap_or(0.0);
    let end_time = opt_f64(args, "endTime");
    let duration = opt_f64(args, "duration");
    match (end_time, duration) {
        (Some(_), Some(_)) => Err(Error::SchemaViolation(
            "both \"endTime\" and \"duration\" were provided; pass exactly one".into(),
        )),
        (Some(end), None) => {
            if end <= start {
                return Err(Error::SchemaViolation(format!(
                    "endTime {end} must be after start {start}"
                )));
            }
            Ok((start, Some(end)))
        }
        (None, Some(d)) => {
            if d <= 0.0 {
                return Err(Error::SchemaViolation(format!(
                    "duration must be positive, got {d}"
                )));
            }
            Ok((start, Some(start + d)))
        }
        (None, None) => Ok((start, None)),
    }
}

/// The nine predefined overlay anchors, resolved to ffmpeg x/y expressions
/// for an element of size `w`/`h` (drawtext uses text_w/text_h, overlay
/// uses overlay_w/overlay_h).
pub fn anchor_expr(position: &str, w: &str, h: &str) -> Result<(String, String)> {
    const MARGIN: &str = "10";
    let (x, y) = match position {
        "top-left" => (MARGIN.into(), MARGIN.into()),
        "top-center" => (format!("(W-{w})/2"), MARGIN.into()),
        "top-right" => (format!("W-{w}-{MARGIN}"), MARGIN.into()),
        "center-left" => (MARGIN.into(), format!("(H-{h})/2")),
        "center" => (format!("(W-{w})/2"), format!("(H-{h})/2")),
        "center-right" => (format!("W-{w}-{MARGIN}"), format!("(H-{h})/2")),
        "bottom-left" => (MARGIN.into(), format!("H-{h}-{MARGIN}")),
        "bottom-center" => (format!("(W-{w})/2"), format!("H-{h}-{MARGIN}")),
        "bottom-right" => (format!("W-{w}-{MARGIN}"), format!("H-{h}-{MARGIN}")),
        other => {
            return Err(Error::SchemaViolation(format!(
                "unknown position \"{other}\""
            )))
        }
    };
    Ok((x, y))
}

/// Escape a string for use inside an ffmpeg filter argument.
pub fn escape_filter_text(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace(':', "\\:")
        .replace(',', "\\,")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn end_time_and_duration_conflict() {
        let err = time_window(&json!({"start": 1.0, "endTime": 5.0, "duration": 4.0})).unwrap_err();
        assert_eq!(err.kind(), "schema_violation");
    }

    #[test]
    fn duration_resolves_to_absolute_end() {
        let (start, end) = time_window(&json!({"start": 2.0, "duration": 5.5})).unwrap();
        assert_eq!(start, 2.0);
        assert_eq!(end, Some(7.5));
    }

    #[test]
    fn end_before_start_is_rejected() {
        assert!(time_window(&json!({"start": 5.0, "endTime": 2.0})).is_err());
    }

    #[test]
    fn open_window_when_neither_given() {
        let (start, end) = time_window(&json!({"start": 3.0})).unwrap();
        assert_eq!((start, end), (3.0, None));
    }

    #[test]
    fn anchors_resolve_to_expressions() {
        let (x, y) = anchor_expr("bottom-right", "text_w", "text_h").unwrap();
        assert_eq!(x, "W-text_w-10");
        assert_eq!(y, "H-text_h-10");
        assert!(anchor_expr("middle-ish", "w", "h").is_err());
    }

    #[test]
    fn filter_text_escaping() {
        assert_eq!(escape_filter_text("it's 5:00, ok"), "it\\'s 5\\:00\\, ok");
    }

    #[test]
    fn input_path_surfaces_not_found() {
        let err = input_path(&json!({"input": "/definitely/missing.mp4"}), "input").unwrap_err();
        assert_eq!(err.kind(), "file_not_found");
    }
}
