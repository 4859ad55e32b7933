//! Number formatting shared by aggregation and templates.
//!
//! Zero is special-cased the same way the template filters always have:
//! `currency(0) == "$0.00"`, `percent(0) == "0.0%"`, `number(0) == "0"`.

fn grouped(value: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (formatted.as_str(), None),
    };

    let mut out = String::with_capacity(formatted.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(frac);
    }
    out
}

fn sign(value: f64) -> &'static str {
    if value < 0.0 { "-" } else { "" }
}

/// `$1,234.50`, negative as `$-1,234.50`.
pub fn currency(value: f64) -> String {
    if value == 0.0 {
        return "$0.00".to_string();
    }
    format!("${}{}", sign(value), grouped(value, 2))
}

/// Currency with an explicit sign: `$+1,234.50` / `$-100.00`.
pub fn signed_currency(value: f64) -> String {
    let sign = if value < 0.0 { "-" } else { "+" };
    format!("${}{}", sign, grouped(value, 2))
}

/// Signed, one decimal: `+12.5%`.
pub fn percent(value: f64) -> String {
    if value == 0.0 {
        return "0.0%".to_string();
    }
    let sign = if value < 0.0 { "-" } else { "+" };
    format!("{}{:.1}%", sign, value.abs())
}

/// Thousands-grouped, no decimals.
pub fn number(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    format!("{}{}", sign(value), grouped(value, 0))
}

pub fn count(value: usize) -> String {
    grouped(value as f64, 0)
}

/// `completed / total` as `40.0%`, or `N/A` when there is nothing to divide by.
pub fn rate(completed: usize, total: usize) -> String {
    if total == 0 {
        return "N/A".to_string();
    }
    format!("{:.1}%", completed as f64 / total as f64 * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency() {
        assert_eq!(currency(350.0), "$350.00");
        assert_eq!(currency(1234567.891), "$1,234,567.89");
        assert_eq!(currency(-1500.5), "$-1,500.50");
        assert_eq!(currency(0.0), "$0.00");
        assert_eq!(currency(999.999), "$1,000.00");
    }

    #[test]
    fn test_signed_currency() {
        assert_eq!(signed_currency(-100.0), "$-100.00");
        assert_eq!(signed_currency(100.0), "$+100.00");
        assert_eq!(signed_currency(12345.6), "$+12,345.60");
        assert_eq!(signed_currency(0.0), "$+0.00");
    }

    #[test]
    fn test_percent() {
        assert_eq!(percent(12.34), "+12.3%");
        assert_eq!(percent(-4.0), "-4.0%");
        assert_eq!(percent(0.0), "0.0%");
    }

    #[test]
    fn test_number() {
        assert_eq!(number(1234.0), "1,234");
        assert_eq!(number(1_000_000.0), "1,000,000");
        assert_eq!(number(-12_000.0), "-12,000");
        assert_eq!(number(0.0), "0");
        assert_eq!(count(1234), "1,234");
        assert_eq!(count(12), "12");
    }

    #[test]
    fn test_rate() {
        assert_eq!(rate(4, 10), "40.0%");
        assert_eq!(rate(1, 3), "33.3%");
        assert_eq!(rate(0, 0), "N/A");
        assert_eq!(rate(0, 5), "0.0%");
    }
}
