use crate::models::DisplayCurrency;
use bigdecimal::{BigDecimal, RoundingMode, Zero};
use indexmap::IndexMap;
use std::str::FromStr;

/// 固定汇率表: 1 AED 兑换的目标币种数量
const EXCHANGE_RATES: &[(&str, &str)] = &[
    ("AED", "1.0"),
    ("USD", "0.272"),
    ("EUR", "0.251"),
    ("GBP", "0.215"),
    ("SAR", "1.02"),
    ("KWD", "0.083"),
    ("BHD", "0.102"),
    ("QAR", "0.99"),
    ("OMR", "0.105"),
    ("JOD", "0.193"),
];

const CURRENCY_SYMBOLS: &[(&str, &str)] = &[
    ("AED", "د.إ"),
    ("USD", "$"),
    ("EUR", "€"),
    ("GBP", "£"),
    ("SAR", "ر.س"),
    ("KWD", "د.ك"),
    ("BHD", "د.ب"),
    ("QAR", "ر.ق"),
    ("OMR", "ر.ع"),
    ("JOD", "د.أ"),
];

/// 币种换算服务
///
/// 换算永不失败: 目标为 `ORIGINAL` 或任一币种不在汇率表中时原样返回金额.
#[derive(Debug, Clone)]
pub struct CurrencyService {
    rates: IndexMap<String, BigDecimal>,
}

impl CurrencyService {
    pub const BASE_CURRENCY: &'static str = "AED";

    pub fn new() -> Self {
        Self::with_rates(
            EXCHANGE_RATES
                .iter()
                .filter_map(|(code, rate)| BigDecimal::from_str(rate).ok().map(|r| (*code, r))),
        )
    }

    pub fn with_rates<'a>(rates: impl IntoIterator<Item = (&'a str, BigDecimal)>) -> Self {
        Self {
            rates: rates
                .into_iter()
                .map(|(code, rate)| (code.to_string(), rate))
                .collect(),
        }
    }

    pub fn rate(&self, code: &str) -> Option<&BigDecimal> {
        self.rates.get(code)
    }

    /// 汇率表中的币种, 按表内顺序
    pub fn supported_currencies(&self) -> impl Iterator<Item = &str> {
        self.rates.keys().map(String::as_str)
    }

    /// amount / rate[from] * rate[to], 四舍五入到两位小数
    pub fn convert(&self, amount: &BigDecimal, from: &str, to: &str) -> BigDecimal {
        if to == DisplayCurrency::ORIGINAL {
            return amount.clone();
        }

        let (Some(from_rate), Some(to_rate)) = (self.rates.get(from), self.rates.get(to)) else {
            return amount.clone();
        };
        if from_rate.is_zero() {
            return amount.clone();
        }

        let in_base = amount / from_rate;
        (in_base * to_rate).with_scale_round(2, RoundingMode::HalfUp)
    }

    /// 币种符号; 未知币种返回代码本身
    pub fn symbol(code: &str) -> &str {
        CURRENCY_SYMBOLS
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, s)| *s)
            .unwrap_or(code)
    }

    /// 带符号的金额文本. `currency_code` 为 `ORIGINAL` 时使用 `native` 的符号.
    pub fn format_amount(&self, amount: &BigDecimal, currency_code: &str, native: Option<&str>) -> String {
        let code = match native {
            Some(native) if currency_code == DisplayCurrency::ORIGINAL => native,
            _ => currency_code,
        };
        format!("{}{}", Self::symbol(code), format_number(amount, 0, 3))
    }

    /// 从原币换算到展示币种并格式化
    pub fn display_amount(&self, amount: &BigDecimal, source: &str, display: &DisplayCurrency) -> String {
        let converted = self.convert(amount, source, display.as_str());
        self.format_amount(&converted, display.as_str(), Some(source))
    }
}

impl Default for CurrencyService {
    fn default() -> Self {
        Self::new()
    }
}

/// en-US 千分位格式, 小数位数在 [min_fraction, max_fraction] 之间 (去掉多余的 0)
pub fn format_number(amount: &BigDecimal, min_fraction: usize, max_fraction: usize) -> String {
    let rounded = amount.with_scale_round(max_fraction as i64, RoundingMode::HalfUp);
    let text = rounded.to_string();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.as_str()),
    };
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));

    let mut fraction = frac_part.trim_end_matches('0').to_string();
    while fraction.len() < min_fraction {
        fraction.push('0');
    }

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let is_zero = grouped.chars().all(|c| c == '0' || c == ',') && fraction.chars().all(|c| c == '0');
    let mut out = String::new();
    if negative && !is_zero {
        out.push('-');
    }
    out.push_str(&grouped);
    if !fraction.is_empty() {
        out.push('.');
        out.push_str(&fraction);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn converts_via_base_currency() {
        let svc = CurrencyService::new();
        assert_eq!(svc.convert(&dec("100"), "AED", "USD"), dec("27.2"));
        // 100 USD -> 367.647... AED
        assert_eq!(svc.convert(&dec("100"), "USD", "AED"), dec("367.65"));
        assert_eq!(svc.convert(&dec("50"), "SAR", "SAR"), dec("50"));
    }

    #[test]
    fn original_target_is_identity_without_rounding() {
        let svc = CurrencyService::new();
        let amount = dec("1234.5678");
        assert_eq!(svc.convert(&amount, "USD", DisplayCurrency::ORIGINAL), amount);
        assert_eq!(svc.convert(&amount, "USD", DisplayCurrency::ORIGINAL).to_string(), "1234.5678");
    }

    #[test]
    fn unknown_currency_passes_through() {
        let svc = CurrencyService::new();
        assert_eq!(svc.convert(&dec("99.999"), "XXX", "AED"), dec("99.999"));
        assert_eq!(svc.convert(&dec("10"), "AED", "XYZ"), dec("10"));
    }

    #[test]
    fn round_trip_stays_within_rounding_tolerance() {
        let svc = CurrencyService::new();
        let codes: Vec<&str> = svc.supported_currencies().collect();
        let half_cent = dec("0.005");

        for x in ["0.01", "1", "99.99", "1234.56", "98765.43"] {
            let x = dec(x);
            for a in &codes {
                for b in &codes {
                    let there = svc.convert(&x, a, b);
                    let back = svc.convert(&there, b, a);
                    // 第一段的舍入误差经回程按汇率比放大, 第二段再加半分
                    let scale = svc.rate(a).unwrap() / svc.rate(b).unwrap();
                    let tolerance = &half_cent * scale + &half_cent + dec("0.0000001");
                    let diff = (&back - &x).abs();
                    assert!(
                        diff <= tolerance,
                        "{} {} -> {} -> {}: diff {} > {}",
                        x, a, b, back, diff, tolerance
                    );
                }
            }
        }
    }

    #[test]
    fn formats_with_symbol_and_grouping() {
        let svc = CurrencyService::new();
        assert_eq!(svc.format_amount(&dec("27.2"), "USD", None), "$27.2");
        assert_eq!(svc.format_amount(&dec("1234567.5"), "EUR", None), "€1,234,567.5");
        assert_eq!(svc.format_amount(&dec("1000"), "GBP", None), "£1,000");
        assert_eq!(svc.format_amount(&dec("12.3456"), "USD", None), "$12.346");
        assert_eq!(svc.format_amount(&dec("5"), "CHF", None), "CHF5");
    }

    #[test]
    fn original_uses_native_symbol() {
        let svc = CurrencyService::new();
        assert_eq!(
            svc.format_amount(&dec("1500"), DisplayCurrency::ORIGINAL, Some("SAR")),
            "ر.س1,500"
        );
        assert_eq!(
            svc.display_amount(&dec("100"), "AED", &DisplayCurrency::code("USD")),
            "$27.2"
        );
        assert_eq!(
            svc.display_amount(&dec("100"), "USD", &DisplayCurrency::Original),
            "$100"
        );
    }

    #[test]
    fn number_formatting_edges() {
        assert_eq!(format_number(&dec("0"), 0, 3), "0");
        assert_eq!(format_number(&dec("999.9999"), 0, 3), "1,000");
        assert_eq!(format_number(&dec("-1234.5"), 2, 2), "-1,234.50");
        assert_eq!(format_number(&dec("123456"), 2, 2), "123,456.00");
        assert_eq!(format_number(&dec("-0.0001"), 0, 3), "0");
    }
}
