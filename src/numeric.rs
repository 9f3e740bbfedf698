//! Locale-aware numeric coercion shared by the store, the KPI layer and the
//! tabular codec. Input cells may hold raw numbers or pt-BR formatted text
//! ("1.234,56"); everything funnels through [`parse_number`] which never
//! panics and never yields NaN.

use crate::model::CellValue;

/// Parses a cell into a float. `None`, empty text and garbage all coerce to 0.
pub fn parse_number(value: Option<&CellValue>) -> f64 {
    match value {
        None => 0.0,
        Some(CellValue::Number(n)) if n.is_finite() => *n,
        Some(CellValue::Number(_)) => 0.0,
        Some(CellValue::Text(text)) => parse_text(text),
    }
}

/// Text form of [`parse_number`]: strips everything but digits, comma, dot
/// and minus, drops dots acting as thousands separators and treats the first
/// comma as the decimal point.
pub fn parse_text(text: &str) -> f64 {
    let filtered: Vec<char> = text
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .collect();

    let mut cleaned = String::with_capacity(filtered.len());
    for (i, &c) in filtered.iter().enumerate() {
        if c == '.' && is_grouping_dot(&filtered, i) {
            continue;
        }
        cleaned.push(c);
    }

    // Only the first comma becomes a decimal point; the rest terminate the
    // numeric prefix below.
    let decimal = cleaned.replacen(',', ".", 1);
    parse_prefix(&decimal)
}

/// A dot followed by exactly 3 digits and then a non-digit (or end of input)
/// is a grouping separator, not a decimal point.
fn is_grouping_dot(chars: &[char], index: usize) -> bool {
    let next_three = chars.get(index + 1..index + 4);
    let all_digits = matches!(next_three, Some(window) if window.iter().all(|c| c.is_ascii_digit()));
    if !all_digits {
        return false;
    }
    match chars.get(index + 4) {
        None => true,
        Some(c) => !c.is_ascii_digit(),
    }
}

/// Parses the longest valid float prefix, mirroring JS `parseFloat`:
/// "1.2.3" yields 1.2 and "12-34" yields 12.
fn parse_prefix(text: &str) -> f64 {
    let mut end = 0;
    let mut seen_dot = false;
    let mut seen_digit = false;
    for (i, c) in text.char_indices() {
        match c {
            '-' if i == 0 => end = i + 1,
            '.' if !seen_dot => {
                seen_dot = true;
                end = i + 1;
            }
            d if d.is_ascii_digit() => {
                seen_digit = true;
                end = i + 1;
            }
            _ => break,
        }
    }
    if !seen_digit {
        return 0.0;
    }
    text[..end].parse::<f64>().unwrap_or(0.0)
}

/// Sums a weekly series; every cell is coerced through [`parse_number`].
pub fn sum(series: &[CellValue]) -> f64 {
    series.iter().map(|cell| parse_number(Some(cell))).sum()
}

/// The universal guard for derived ratios (CAC, CPL, CPO, CTR, conversion):
/// a non-positive denominator yields 0 instead of infinity or NaN.
pub fn safe_divide(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// pt-BR currency for display ("R$ 1.234,56"). Display-only; round-trips
/// through [`parse_text`].
pub fn format_currency(value: f64) -> String {
    format!("R$ {}", format_fixed(value, 2))
}

/// pt-BR grouped number for display ("1.234,56"; integers keep no decimals).
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format_fixed(value, 0)
    } else {
        format_fixed(value, 2)
    }
}

fn format_fixed(value: f64, decimals: usize) -> String {
    let negative = value < 0.0;
    let rounded = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match rounded.split_once('.') {
        Some((i, f)) => (i.to_string(), Some(f.to_string())),
        None => (rounded, None),
    };

    let mut grouped = String::new();
    let digits: Vec<char> = int_part.chars().collect();
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(*c);
    }

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(&grouped);
    if let Some(frac) = frac_part {
        out.push(',');
        out.push_str(&frac);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(value: &str) -> CellValue {
        CellValue::Text(value.to_string())
    }

    #[test]
    fn parses_locale_formatted_numbers() {
        assert_eq!(parse_number(Some(&text("1.234,56"))), 1234.56);
        assert_eq!(parse_number(Some(&text("1.234.567"))), 1_234_567.0);
        assert_eq!(parse_number(Some(&text("-50"))), -50.0);
        assert_eq!(parse_number(Some(&text("R$ 2.500,00"))), 2500.0);
        assert_eq!(parse_number(Some(&text("3,5"))), 3.5);
    }

    #[test]
    fn keeps_decimal_dots_with_more_than_three_digits() {
        assert_eq!(parse_number(Some(&text("1.2345"))), 1.2345);
        assert_eq!(parse_number(Some(&text("0.5"))), 0.5);
    }

    #[test]
    fn coerces_garbage_to_zero() {
        assert_eq!(parse_number(None), 0.0);
        assert_eq!(parse_number(Some(&text(""))), 0.0);
        assert_eq!(parse_number(Some(&text("abc"))), 0.0);
        assert_eq!(parse_number(Some(&text("--"))), 0.0);
        assert_eq!(parse_number(Some(&CellValue::Number(f64::NAN))), 0.0);
    }

    #[test]
    fn parses_longest_numeric_prefix() {
        assert_eq!(parse_number(Some(&text("1.2.3"))), 1.2);
        assert_eq!(parse_number(Some(&text("12-34"))), 12.0);
    }

    #[test]
    fn sums_mixed_series() {
        let series = vec![
            CellValue::Number(1.0),
            text("2,5"),
            text(""),
            CellValue::Number(0.0),
            text("1.000"),
        ];
        assert_eq!(sum(&series), 1003.5);
        assert_eq!(sum(&[]), 0.0);
    }

    #[test]
    fn safe_divide_guards_zero_and_negative() {
        assert_eq!(safe_divide(10.0, 0.0), 0.0);
        assert_eq!(safe_divide(10.0, -2.0), 0.0);
        assert_eq!(safe_divide(10.0, 4.0), 2.5);
    }

    #[test]
    fn formats_for_display() {
        assert_eq!(format_number(1_234_567.0), "1.234.567");
        assert_eq!(format_number(1234.5), "1.234,50");
        assert_eq!(format_currency(2500.0), "R$ 2.500,00");
        assert_eq!(parse_text(&format_currency(1234.56)), 1234.56);
    }
}
