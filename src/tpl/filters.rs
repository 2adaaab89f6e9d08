//! Builtin filters.
//!
//! Each filter takes the piped value plus its `:`-separated string args and
//! never fails: input it cannot work with is passed through or mapped to a
//! neutral value.

use std::rc::Rc;

use super::{resolve, FilterFn};
use crate::types::{Map, Value};

const BYTE_UNITS: [&str; 9] = ["B", "KB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

const DURATION_STEPS: [(u64, &str); 7] = [
    (1, "s"),
    (60, "min"),
    (3_600, "h"),
    (86_400, "d"),
    (2_592_000, "mo"),
    (7_776_000, "q"),
    (31_104_000, "y"),
];

pub(super) fn builtins() -> Vec<(&'static str, FilterFn)> {
    vec![
        entry("raw", |input, _| input.clone()),
        entry("html", html),
        entry("json", json),
        entry("toJson", to_json),
        entry("number", number),
        entry("trim", trim),
        entry("percent", percent),
        entry("round", round),
        entry("truncate", truncate),
        entry("url_encode", url_encode),
        entry("url_decode", url_decode),
        entry("default", default),
        entry("join", join),
        entry("split", split),
        entry("first", |input, _| nth_of(input, 0)),
        entry("nth", nth),
        entry("last", last),
        entry("plus", |input, args| step(input, args, 1)),
        entry("minus", |input, args| step(input, args, -1)),
        entry("lowerCase", |input, _| map_str(input, str::to_lowercase)),
        entry("upperCase", |input, _| map_str(input, str::to_uppercase)),
        entry("asArray", as_array),
        entry("bytes", bytes),
        entry("duration", duration),
        entry("pick", pick),
    ]
}

fn entry<F>(name: &'static str, filter: F) -> (&'static str, FilterFn)
where
    F: Fn(&Value, &[String]) -> Value + 'static,
{
    (name, Rc::new(filter))
}

// =============================================================================
// Helpers
// =============================================================================

/// Text form of a value: strings as is, null as empty, the rest as JSON.
pub(crate) fn to_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn as_int(value: &Value) -> Option<i64> {
    as_f64(value).filter(|n| n.is_finite()).map(|n| n.trunc() as i64)
}

fn arg<'a>(args: &'a [String], index: usize) -> Option<&'a str> {
    args.get(index).map(String::as_str)
}

fn arg_int(args: &[String], index: usize) -> Option<i64> {
    arg(args, index).and_then(|a| a.trim().parse::<f64>().ok()).map(|n| n.trunc() as i64)
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        Value::from(n)
    }
}

fn map_str(input: &Value, f: impl Fn(&str) -> String) -> Value {
    match input {
        Value::String(text) => Value::String(f(text)),
        other => other.clone(),
    }
}

// =============================================================================
// Text
// =============================================================================

fn html(input: &Value, _: &[String]) -> Value {
    Value::String(html_escape::encode_safe(&to_text(input)).into_owned())
}

fn trim(input: &Value, _: &[String]) -> Value {
    map_str(input, |text| text.trim().to_string())
}

fn truncate(input: &Value, args: &[String]) -> Value {
    let (Value::String(text), Some(_)) = (input, arg(args, 0)) else {
        return input.clone();
    };
    let length = arg_int(args, 0).filter(|n| *n > 0).unwrap_or(200) as usize;
    let end = arg(args, 1).filter(|e| !e.is_empty()).unwrap_or("...");
    if text.chars().count() <= length {
        return input.clone();
    }
    let mut out: String = text.chars().take(length).collect();
    out.push_str(end);
    Value::String(out)
}

fn url_encode(input: &Value, _: &[String]) -> Value {
    Value::String(urlencoding::encode(&to_text(input)).into_owned())
}

fn url_decode(input: &Value, _: &[String]) -> Value {
    let text = to_text(input);
    match urlencoding::decode(&text) {
        Ok(decoded) => Value::String(decoded.into_owned()),
        Err(_) => input.clone(),
    }
}

/// Widest indent `json` pads with, as in `JSON.stringify`.
const MAX_JSON_INDENT: i64 = 10;

fn json(input: &Value, args: &[String]) -> Value {
    let indent = arg_int(args, 0).unwrap_or(2).clamp(0, MAX_JSON_INDENT) as usize;
    if indent == 0 {
        return Value::String(input.to_string());
    }
    let pad = " ".repeat(indent);
    let formatter = serde_json::ser::PrettyFormatter::with_indent(pad.as_bytes());
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    if serde::Serialize::serialize(input, &mut serializer).is_err() {
        return Value::String(input.to_string());
    }
    Value::String(String::from_utf8_lossy(&out).into_owned())
}

fn to_json(input: &Value, _: &[String]) -> Value {
    match input {
        Value::String(text) => serde_json::from_str(text).unwrap_or(Value::Null),
        other => other.clone(),
    }
}

// =============================================================================
// Numbers
// =============================================================================

/// Thousands separators on the integer part.
fn number(input: &Value, _: &[String]) -> Value {
    let text = to_text(input);
    let (sign, rest) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text.as_str()),
    };
    let (whole, fraction) = match rest.find('.') {
        Some(dot) => rest.split_at(dot),
        None => (rest, ""),
    };
    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return Value::String(text);
    }

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    Value::String(format!("{sign}{grouped}{fraction}"))
}

fn percent(input: &Value, args: &[String]) -> Value {
    let value = as_f64(input).unwrap_or(0.0);
    let decimals = arg_int(args, 0).unwrap_or(0).clamp(0, 20) as usize;
    Value::String(format!("{:.*}%", decimals, value * 100.0))
}

fn round(input: &Value, args: &[String]) -> Value {
    let Some(value) = as_f64(input) else {
        return Value::from(0);
    };
    let decimals = arg_int(args, 0).filter(|d| *d > 0).unwrap_or(2).min(20) as usize;
    Value::String(format!("{:.*}", decimals, value))
}

fn step(input: &Value, args: &[String], sign: i64) -> Value {
    let base = as_int(input).unwrap_or(0);
    let by = arg_int(args, 0).unwrap_or(1);
    match sign.checked_mul(by).and_then(|delta| base.checked_add(delta)) {
        Some(sum) => Value::from(sum),
        // Out of i64 range: fall back to float arithmetic.
        None => number_value(base as f64 + sign as f64 * by as f64),
    }
}

fn bytes(input: &Value, _: &[String]) -> Value {
    if !truthy(input) {
        return input.clone();
    }
    match as_f64(input) {
        Some(n) if n.is_finite() => Value::String(format_bytes(n)),
        _ => input.clone(),
    }
}

/// `1337` -> `"1.34 KB"`. Three significant digits, decimal units.
pub fn format_bytes(n: f64) -> String {
    let sign = if n < 0.0 { "-" } else { "" };
    let n = n.abs();
    if n < 1.0 {
        return format!("{sign}{} B", number_value(n));
    }
    let exponent = ((n.ln() / 1000f64.ln()).floor() as usize).min(BYTE_UNITS.len() - 1);
    let scaled = n / 1000f64.powi(exponent as i32);
    let digits = 2 - (scaled.log10().floor() as i32).clamp(0, 2);
    let factor = 10f64.powi(digits);
    let rounded = (scaled * factor).round() / factor;
    format!("{sign}{} {}", number_value(rounded), BYTE_UNITS[exponent])
}

fn duration(input: &Value, _: &[String]) -> Value {
    if !truthy(input) {
        return input.clone();
    }
    match as_f64(input) {
        Some(seconds) if seconds > 0.0 => Value::String(format_duration(seconds)),
        _ => input.clone(),
    }
}

/// `3725` -> `"1h2min5s"`, largest unit first.
pub fn format_duration(seconds: f64) -> String {
    let mut rest = seconds;
    let mut out = String::new();
    for (step, unit) in DURATION_STEPS.iter().rev() {
        let step = *step as f64;
        if rest >= step {
            out.push_str(&format!("{}{unit}", (rest / step).floor()));
            rest %= step;
        }
    }
    if rest > 0.0 && out.is_empty() {
        out.push_str(&format!("{rest:.2}s"));
    }
    out
}

// =============================================================================
// Collections
// =============================================================================

fn default(input: &Value, args: &[String]) -> Value {
    if truthy(input) {
        return input.clone();
    }
    match arg(args, 0) {
        None | Some("undefined") => Value::Null,
        Some(fallback) => {
            serde_json::from_str(fallback).unwrap_or_else(|_| Value::String(fallback.to_string()))
        }
    }
}

fn join(input: &Value, args: &[String]) -> Value {
    let Value::Array(items) = input else {
        return input.clone();
    };
    let glue = arg(args, 0).unwrap_or(",");
    let parts: Vec<String> = items.iter().map(to_text).collect();
    Value::String(parts.join(glue))
}

fn split(input: &Value, args: &[String]) -> Value {
    let Value::String(text) = input else {
        return input.clone();
    };
    let delimiter = arg(args, 0).unwrap_or(",");
    Value::Array(
        text.split(delimiter)
            .map(|part| Value::String(part.to_string()))
            .collect(),
    )
}

fn nth_of(input: &Value, index: usize) -> Value {
    match input {
        Value::Array(items) => items.get(index).cloned().unwrap_or(Value::Null),
        Value::String(text) => text
            .chars()
            .nth(index)
            .map(|c| Value::String(c.to_string()))
            .unwrap_or(Value::Null),
        Value::Null => Value::Null,
        other => crate::types::value_get(other, &index.to_string())
            .cloned()
            .unwrap_or(Value::Null),
    }
}

fn nth(input: &Value, args: &[String]) -> Value {
    let index = arg_int(args, 0).filter(|i| *i >= 0).unwrap_or(0) as usize;
    nth_of(input, index)
}

fn last(input: &Value, _: &[String]) -> Value {
    match input {
        Value::Array(items) => items.last().cloned().unwrap_or(Value::Null),
        Value::String(text) => text
            .chars()
            .last()
            .map(|c| Value::String(c.to_string()))
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn as_array(input: &Value, _: &[String]) -> Value {
    if truthy(input) {
        Value::Array(vec![input.clone()])
    } else {
        input.clone()
    }
}

/// `pick:a` picks one path; `pick:a,b~c.d` builds `{a, b: c.d}`. Arrays are
/// picked per item unless the path is an index.
fn pick(input: &Value, args: &[String]) -> Value {
    if input.is_null() {
        return Value::Null;
    }
    let path = arg(args, 0).unwrap_or("&");
    match input {
        Value::Array(items) if !path.bytes().all(|b| b.is_ascii_digit()) => {
            Value::Array(items.iter().map(|item| pick_values(path, item)).collect())
        }
        _ => pick_values(path, input),
    }
}

fn pick_values(names: &str, data: &Value) -> Value {
    let lookup = |path: &str| resolve::variable(path, data).unwrap_or(Value::Null);
    let names: Vec<&str> = names.split(',').map(str::trim).collect();

    if let [single] = names.as_slice() {
        return match single.split_once('~') {
            Some((key, target)) => {
                let mut out = Map::new();
                out.insert(key.to_string(), lookup(target));
                Value::Object(out)
            }
            None => lookup(single),
        };
    }

    let mut out = Map::new();
    for name in names {
        let (key, target) = name.split_once('~').unwrap_or((name, name));
        out.insert(key.to_string(), lookup(target));
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(name: &str, input: Value, args: &[&str]) -> Value {
        let table = builtins();
        let filter = table
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, f)| f.clone())
            .unwrap();
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        filter(&input, &args)
    }

    #[test]
    fn test_text_filters() {
        assert_eq!(run("html", json!("<b>&"), &[]), json!("&lt;b&gt;&amp;"));
        assert_eq!(run("trim", json!("  x "), &[]), json!("x"));
        assert_eq!(run("upperCase", json!("ab"), &[]), json!("AB"));
        assert_eq!(run("lowerCase", json!(5), &[]), json!(5));
        assert_eq!(run("truncate", json!("abcdef"), &["3"]), json!("abc..."));
        assert_eq!(run("truncate", json!("abc"), &["3"]), json!("abc"));
        assert_eq!(run("truncate", json!("abcdef"), &[]), json!("abcdef"));
        assert_eq!(run("url_encode", json!("a b&c"), &[]), json!("a%20b%26c"));
        assert_eq!(run("url_decode", json!("a%20b"), &[]), json!("a b"));
    }

    #[test]
    fn test_json_filters() {
        assert_eq!(run("json", json!({"a": 1}), &["0"]), json!(r#"{"a":1}"#));
        assert_eq!(run("json", json!([1]), &[]), json!("[\n  1\n]"));
        assert_eq!(run("toJson", json!(r#"{"a":1}"#), &[]), json!({"a": 1}));
        assert_eq!(run("toJson", json!("{bad"), &[]), Value::Null);
    }

    #[test]
    fn test_json_indent_is_capped() {
        let widest = run("json", json!([1]), &["10"]);
        assert_eq!(widest, json!(format!("[\n{}1\n]", " ".repeat(10))));
        assert_eq!(run("json", json!([1]), &["1000000000000000000"]), widest);
        assert_eq!(run("json", json!([1]), &["-5"]), json!("[1]"));
    }

    #[test]
    fn test_number_filters() {
        assert_eq!(run("number", json!(1234567), &[]), json!("1,234,567"));
        assert_eq!(run("number", json!(-1234.5), &[]), json!("-1,234.5"));
        assert_eq!(run("number", json!("abc"), &[]), json!("abc"));
        assert_eq!(run("percent", json!(0.256), &["1"]), json!("25.6%"));
        assert_eq!(run("percent", json!("x"), &[]), json!("0%"));
        assert_eq!(run("round", json!(3.14159), &[]), json!("3.14"));
        assert_eq!(run("round", json!("x"), &[]), json!(0));
        assert_eq!(run("plus", json!(1), &["2"]), json!(3));
        assert_eq!(run("minus", json!("10"), &[]), json!(9));
    }

    #[test]
    fn test_step_out_of_range() {
        let max = run("plus", json!(1), &["9223372036854775807"]);
        assert_eq!(max.as_f64(), Some(9.223372036854776e18));
        let min = run("minus", json!(1), &["-9223372036854775808"]);
        assert_eq!(min.as_f64(), Some(9.223372036854776e18));
        assert_eq!(run("minus", json!(5), &["7"]), json!(-2));
        assert!(run("plus", json!(1), &["inf"]).is_number());
    }

    #[test]
    fn test_bytes_and_duration() {
        assert_eq!(format_bytes(1337.0), "1.34 KB");
        assert_eq!(format_bytes(0.5), "0.5 B");
        assert_eq!(format_bytes(-2_000_000.0), "-2 MB");
        assert_eq!(run("bytes", json!(0), &[]), json!(0));
        assert_eq!(format_duration(3725.0), "1h2min5s");
        assert_eq!(format_duration(0.5), "0.50s");
        assert_eq!(run("duration", json!(60), &[]), json!("1min"));
    }

    #[test]
    fn test_default_filter() {
        assert_eq!(run("default", json!("x"), &["y"]), json!("x"));
        assert_eq!(run("default", Value::Null, &["y"]), json!("y"));
        assert_eq!(run("default", json!(""), &["[1]"]), json!([1]));
        assert_eq!(run("default", json!(0), &["undefined"]), Value::Null);
    }

    #[test]
    fn test_collection_filters() {
        assert_eq!(run("join", json!(["a", 1]), &["-"]), json!("a-1"));
        assert_eq!(run("split", json!("a|b"), &["|"]), json!(["a", "b"]));
        assert_eq!(run("first", json!([1, 2]), &[]), json!(1));
        assert_eq!(run("nth", json!([1, 2]), &["1"]), json!(2));
        assert_eq!(run("last", json!([]), &[]), Value::Null);
        assert_eq!(run("asArray", json!(3), &[]), json!([3]));
        assert_eq!(run("asArray", Value::Null, &[]), Value::Null);
    }

    #[test]
    fn test_pick() {
        let rows = json!([{"id": 1, "n": {"x": "a"}}, {"id": 2, "n": {"x": "b"}}]);
        assert_eq!(run("pick", rows.clone(), &["id"]), json!([1, 2]));
        assert_eq!(run("pick", rows.clone(), &["1"]), json!({"id": 2, "n": {"x": "b"}}));
        assert_eq!(
            run("pick", rows, &["id,label~n.x"]),
            json!([{"id": 1, "label": "a"}, {"id": 2, "label": "b"}])
        );
        assert_eq!(run("pick", json!({"a": 1}), &["k~a"]), json!({"k": 1}));
    }
}
