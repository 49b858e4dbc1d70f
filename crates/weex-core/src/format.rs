//! Rendering of value tuples for reports
//!
//! Formats follow the printf conventions used by WeeWX skins (`%.1f`,
//! `%d`, `%.2e`); values in `unix_epoch` use strftime patterns instead.

use chrono::{DateTime, FixedOffset, Offset, Utc};

use crate::units::UnitModel;
use crate::value::{Value, ValueTuple};

/// Placeholder used when the caller does not supply one
pub const DEFAULT_NONE_STRING: &str = "N/A";

const COMPASS_POINTS: [&str; 16] = [
    "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW",
    "NNW",
];

/// Decimal and digit-grouping conventions used when localizing
#[derive(Debug, Clone, PartialEq)]
pub struct Locale {
    pub decimal_point: char,
    pub thousands_sep: Option<char>,
}

impl Default for Locale {
    fn default() -> Self {
        Self {
            decimal_point: '.',
            thousands_sep: Some(','),
        }
    }
}

/// Formatting configuration for one report context
pub struct Formatter<'a> {
    model: &'a UnitModel,
    locale: Locale,
    utc_offset: FixedOffset,
}

impl<'a> Formatter<'a> {
    pub fn new(model: &'a UnitModel) -> Self {
        Self {
            model,
            locale: Locale::default(),
            utc_offset: Utc.fix(),
        }
    }

    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    pub fn with_utc_offset(mut self, offset: FixedOffset) -> Self {
        self.utc_offset = offset;
        self
    }

    /// Render a tuple.
    ///
    /// `format_string` overrides the unit's default format. A missing value
    /// renders as `none_string` without a label. Series render element-wise,
    /// joined by ", ".
    pub fn format(
        &self,
        vt: &ValueTuple,
        format_string: Option<&str>,
        none_string: Option<&str>,
        add_label: bool,
        localize: bool,
    ) -> String {
        let none_string = none_string.unwrap_or(DEFAULT_NONE_STRING);
        match vt.value() {
            Value::Null => none_string.to_string(),
            Value::Scalar(v) => self.format_scalar(vt, *v, format_string, add_label, localize),
            Value::Series(values) => values
                .iter()
                .map(|v| match v {
                    Some(v) => self.format_scalar(vt, *v, format_string, add_label, localize),
                    None => none_string.to_string(),
                })
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// Unit label for `value`: singular when the value is exactly one
    pub fn label(&self, vt: &ValueTuple, value: f64) -> &str {
        let info = vt.unit().and_then(|u| self.model.unit_info(u));
        match info {
            Some(info) if value == 1.0 => &info.singular,
            Some(info) => &info.plural,
            None => "",
        }
    }

    /// Sixteen-point compass name of a direction, `none_string` when absent
    pub fn ordinal_compass(&self, vt: &ValueTuple, none_string: Option<&str>) -> String {
        match vt.raw() {
            Some(degrees) => {
                let idx = ((degrees.rem_euclid(360.0) + 11.25) / 22.5) as usize % 16;
                COMPASS_POINTS[idx].to_string()
            }
            None => none_string.unwrap_or(DEFAULT_NONE_STRING).to_string(),
        }
    }

    fn format_scalar(
        &self,
        vt: &ValueTuple,
        value: f64,
        format_string: Option<&str>,
        add_label: bool,
        localize: bool,
    ) -> String {
        let default_format = vt
            .unit()
            .and_then(|u| self.model.unit_info(u))
            .map(|info| info.format.as_str());
        let format = format_string.or(default_format);

        if vt.unit() == Some("unix_epoch") {
            let pattern = format.unwrap_or("%x %X");
            return DateTime::from_timestamp(value as i64, 0)
                .map(|t| t.with_timezone(&self.utc_offset).format(pattern).to_string())
                .unwrap_or_else(|| value.to_string());
        }

        let mut text = match format {
            Some(f) => printf(f, value),
            None => value.to_string(),
        };
        if localize {
            text = localize_number(&text, &self.locale);
        }
        if add_label {
            text.push_str(self.label(vt, value));
        }
        text
    }
}

/// Apply a single printf conversion (`%[flags][width][.prec](f|d|e)`)
/// embedded in `format`.
pub fn printf(format: &str, value: f64) -> String {
    let mut out = String::with_capacity(format.len() + 8);
    let mut chars = format.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }

        let mut zero_pad = false;
        let mut left = false;
        let mut plus = false;
        while let Some(&flag) = chars.peek() {
            match flag {
                '0' => zero_pad = true,
                '-' => left = true,
                '+' => plus = true,
                _ => break,
            }
            chars.next();
        }
        let mut width = 0usize;
        while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
            width = width * 10 + d as usize;
            chars.next();
        }
        let mut precision = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut p = 0usize;
            while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
                p = p * 10 + d as usize;
                chars.next();
            }
            precision = Some(p);
        }

        let body = match chars.next() {
            Some('f') | Some('F') => format!("{:.*}", precision.unwrap_or(6), value),
            Some('d') | Some('i') => format!("{}", value.round() as i64),
            Some('e') => format!("{:.*e}", precision.unwrap_or(6), value),
            Some('s') | Some('g') => value.to_string(),
            Some(other) => {
                out.push('%');
                out.push(other);
                continue;
            }
            None => {
                out.push('%');
                break;
            }
        };
        let body = if plus && !body.starts_with('-') {
            format!("+{body}")
        } else {
            body
        };
        out.push_str(&pad(&body, width, zero_pad, left));
    }
    out
}

fn pad(body: &str, width: usize, zero_pad: bool, left: bool) -> String {
    let len = body.chars().count();
    if len >= width {
        return body.to_string();
    }
    let fill = width - len;
    if left {
        format!("{body}{}", " ".repeat(fill))
    } else if zero_pad {
        let (sign, digits) = match body.strip_prefix(|c: char| c == '-' || c == '+') {
            Some(rest) => (&body[..1], rest),
            None => ("", body),
        };
        format!("{sign}{}{digits}", "0".repeat(fill))
    } else {
        format!("{}{body}", " ".repeat(fill))
    }
}

/// Swap in the locale's decimal point and group the first number's
/// integer digits.
fn localize_number(text: &str, locale: &Locale) -> String {
    let Some(start) = text.find(|c: char| c.is_ascii_digit()) else {
        return text.to_string();
    };
    let int_end = text[start..]
        .find(|c: char| !c.is_ascii_digit())
        .map_or(text.len(), |i| start + i);

    let mut out = String::with_capacity(text.len() + 4);
    out.push_str(&text[..start]);
    let digits = &text[start..int_end];
    for (i, d) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            if let Some(sep) = locale.thousands_sep {
                out.push(sep);
            }
        }
        out.push(d);
    }
    let rest = &text[int_end..];
    match rest.strip_prefix('.') {
        Some(fraction) => {
            out.push(locale.decimal_point);
            out.push_str(fraction);
        }
        None => out.push_str(rest),
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> UnitModel {
        UnitModel::builtin().unwrap()
    }

    #[test]
    fn test_printf_conversions() {
        assert_eq!(printf("%.1f", 21.456), "21.5");
        assert_eq!(printf("%.0f", 7.0), "7");
        assert_eq!(printf("%d", 6.6), "7");
        assert_eq!(printf("%5.1f|", 3.14159), "  3.1|");
        assert_eq!(printf("%05.1f", -3.14159), "-03.1");
        assert_eq!(printf("%-6.2f|", 1.5), "1.50  |");
        assert_eq!(printf("%+.1f", 2.0), "+2.0");
        assert_eq!(printf("%.2f%%", 45.0), "45.00%");
    }

    #[test]
    fn test_format_with_label() {
        let model = model();
        let fmt = Formatter::new(&model);
        let vt = ValueTuple::scalar(32.0, "degree_F", "group_temperature");
        insta::assert_snapshot!(fmt.format(&vt, None, None, true, false), @"32.0°F");
        insta::assert_snapshot!(fmt.format(&vt, Some("%.0f"), None, false, false), @"32");
    }

    #[test]
    fn test_format_none_placeholder() {
        let model = model();
        let fmt = Formatter::new(&model);
        let vt = ValueTuple::null(Some("mm"), Some("group_rain"));
        assert_eq!(fmt.format(&vt, None, None, true, false), "N/A");
        assert_eq!(fmt.format(&vt, None, Some("--"), true, false), "--");
    }

    #[test]
    fn test_singular_and_plural_labels() {
        let model = model();
        let fmt = Formatter::new(&model);
        let one = ValueTuple::scalar(1.0, "hour", "group_elapsed");
        let two = ValueTuple::scalar(2.0, "hour", "group_elapsed");
        assert_eq!(fmt.format(&one, Some("%.0f"), None, true, false), "1 hour");
        assert_eq!(fmt.format(&two, Some("%.0f"), None, true, false), "2 hours");
    }

    #[test]
    fn test_localized_number() {
        let model = model();
        let fmt = Formatter::new(&model).with_locale(Locale {
            decimal_point: ',',
            thousands_sep: Some('.'),
        });
        let vt = ValueTuple::scalar(1013.27, "mbar", "group_pressure");
        assert_eq!(fmt.format(&vt, None, None, true, true), "1.013,3 mbar");
        assert_eq!(fmt.format(&vt, None, None, false, false), "1013.3");
    }

    #[test]
    fn test_series_format() {
        let model = model();
        let fmt = Formatter::new(&model);
        let vt = ValueTuple::new(vec![Some(1.0), None, Some(2.26)], Some("mm"), Some("group_rain"));
        assert_eq!(fmt.format(&vt, None, Some("-"), false, false), "1.0, -, 2.3");
    }

    #[test]
    fn test_time_format() {
        let model = model();
        let fmt = Formatter::new(&model).with_utc_offset(FixedOffset::east_opt(3600).unwrap());
        let vt = ValueTuple::scalar(1_700_000_000.0, "unix_epoch", "group_time");
        assert_eq!(fmt.format(&vt, Some("%Y-%m-%d %H:%M"), None, false, false), "2023-11-14 23:13");
    }

    #[test]
    fn test_ordinal_compass() {
        let model = model();
        let fmt = Formatter::new(&model);
        let dir = |d: f64| ValueTuple::scalar(d, "degree_compass", "group_direction");
        assert_eq!(fmt.ordinal_compass(&dir(0.0), None), "N");
        assert_eq!(fmt.ordinal_compass(&dir(350.0), None), "N");
        assert_eq!(fmt.ordinal_compass(&dir(100.0), None), "E");
        assert_eq!(fmt.ordinal_compass(&dir(225.0), None), "SW");
        assert_eq!(
            fmt.ordinal_compass(&ValueTuple::null(Some("degree_compass"), None), Some("-")),
            "-"
        );
    }
}
