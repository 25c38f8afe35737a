use crate::models::SalaryInfo;
use regex::Regex;
use std::sync::LazyLock;

const HOURS_PER_DAY: i64 = 8;
const WORKING_DAYS_PER_MONTH: i64 = 22;
const MONTHS_PER_YEAR: i64 = 12;

pub const NOTE_NO_SALARY: &str = "無薪資資訊";
pub const NOTE_FLOOR_ONLY: &str = "最低保證薪資";
pub const NOTE_ANNUAL: &str = "年薪轉換為月薪";
pub const NOTE_HOURLY: &str = "推估（時薪 × 8小時 × 22天）";
pub const NOTE_DAILY: &str = "推估（日薪 × 22天）";
pub const NOTE_UNPARSABLE: &str = "無法解析薪資格式";

const NEGOTIABLE: &str = "待遇面議";

static MONTHLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^月薪(\d+)(?:~(\d+))?元").unwrap());
static ANNUAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^年薪(\d+)(?:~(\d+))?元").unwrap());
static HOURLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^時薪(\d+)元").unwrap());
static DAILY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^日薪(\d+)元").unwrap());

/// Normalizes a listing's salary text to monthly figures.
///
/// Annual amounts are divided by 12, hourly rates assume 8 hours over 22
/// working days and daily rates assume 22 working days. Amounts that only
/// give a floor keep `salary_max` empty.
pub fn parse_salary(raw: &str) -> SalaryInfo {
    let raw = raw.trim();
    if raw.is_empty() || raw == NEGOTIABLE {
        return unknown(NOTE_NO_SALARY);
    }
    let text = raw.replace(',', "");

    if let Some((low, high)) = capture_range(&MONTHLY, &text) {
        let note = if high.is_some() { "" } else { NOTE_FLOOR_ONLY };
        return bounded(low, high, note);
    }

    if let Some((low, high)) = capture_range(&ANNUAL, &text) {
        let high = high.map(|value| value / MONTHS_PER_YEAR);
        return bounded(low / MONTHS_PER_YEAR, high, NOTE_ANNUAL);
    }

    if let Some((hourly, _)) = capture_range(&HOURLY, &text) {
        return match hourly
            .checked_mul(HOURS_PER_DAY)
            .and_then(|daily| daily.checked_mul(WORKING_DAYS_PER_MONTH))
        {
            Some(monthly) => bounded(monthly, None, NOTE_HOURLY),
            None => unknown(NOTE_UNPARSABLE),
        };
    }

    if let Some((daily, _)) = capture_range(&DAILY, &text) {
        return match daily.checked_mul(WORKING_DAYS_PER_MONTH) {
            Some(monthly) => bounded(monthly, None, NOTE_DAILY),
            None => unknown(NOTE_UNPARSABLE),
        };
    }

    unknown(NOTE_UNPARSABLE)
}

fn capture_range(pattern: &Regex, text: &str) -> Option<(i64, Option<i64>)> {
    let captures = pattern.captures(text)?;
    let low = captures.get(1)?.as_str().parse().ok()?;
    let high = captures
        .get(2)
        .and_then(|value| value.as_str().parse().ok());
    Some((low, high))
}

fn bounded(low: i64, high: Option<i64>, note: &str) -> SalaryInfo {
    let avg = match high {
        Some(high) => (low as f64 + high as f64) / 2.0,
        None => low as f64,
    };
    SalaryInfo {
        salary_min: Some(low),
        salary_max: high,
        salary_avg: Some(avg),
        salary_note: note.to_string(),
    }
}

fn unknown(note: &str) -> SalaryInfo {
    SalaryInfo {
        salary_note: note.to_string(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monthly_range_uses_midpoint() {
        let info = parse_salary("月薪40,000~60,000元");
        assert_eq!(info.salary_min, Some(40000));
        assert_eq!(info.salary_max, Some(60000));
        assert_eq!(info.salary_avg, Some(50000.0));
        assert_eq!(info.salary_note, "");
    }

    #[test]
    fn monthly_single_value_is_floor_only() {
        let info = parse_salary("月薪35000元以上");
        assert_eq!(info.salary_min, Some(35000));
        assert_eq!(info.salary_max, None);
        assert_eq!(info.salary_avg, Some(35000.0));
        assert_eq!(info.salary_note, NOTE_FLOOR_ONLY);
    }

    #[test]
    fn annual_amount_becomes_monthly() {
        let info = parse_salary("年薪600000元");
        assert_eq!(info.salary_min, Some(50000));
        assert_eq!(info.salary_max, None);
        assert_eq!(info.salary_avg, Some(50000.0));
        assert_eq!(info.salary_note, NOTE_ANNUAL);
    }

    #[test]
    fn annual_range_floors_each_bound() {
        let info = parse_salary("年薪1,000,000~1,300,000元");
        assert_eq!(info.salary_min, Some(83333));
        assert_eq!(info.salary_max, Some(108333));
        assert_eq!(info.salary_avg, Some(95833.0));
    }

    #[test]
    fn hourly_and_daily_rates_are_estimated() {
        let hourly = parse_salary("時薪200元");
        assert_eq!(hourly.salary_min, Some(35200));
        assert_eq!(hourly.salary_max, None);
        assert_eq!(hourly.salary_avg, Some(35200.0));
        assert_eq!(hourly.salary_note, NOTE_HOURLY);

        let daily = parse_salary("日薪1,500元");
        assert_eq!(daily.salary_min, Some(33000));
        assert_eq!(daily.salary_note, NOTE_DAILY);
    }

    #[test]
    fn negotiable_and_garbage_are_null() {
        let negotiable = parse_salary("待遇面議");
        assert_eq!(negotiable, unknown(NOTE_NO_SALARY));

        let empty = parse_salary("");
        assert_eq!(empty.salary_note, NOTE_NO_SALARY);

        let garbage = parse_salary("N/A");
        assert_eq!(garbage.salary_min, None);
        assert_eq!(garbage.salary_avg, None);
        assert_eq!(garbage.salary_note, NOTE_UNPARSABLE);
    }

    #[test]
    fn oversized_amounts_do_not_overflow() {
        let hourly = parse_salary("時薪99999999999999999元");
        assert_eq!(hourly, unknown(NOTE_UNPARSABLE));

        let daily = parse_salary("日薪999999999999999999元");
        assert_eq!(daily, unknown(NOTE_UNPARSABLE));

        let range = parse_salary("月薪9000000000000000000~9000000000000000000元");
        assert_eq!(range.salary_min, Some(9_000_000_000_000_000_000));
        assert_eq!(range.salary_avg, Some(9e18));

        let too_long = parse_salary("月薪99999999999999999999元");
        assert_eq!(too_long, unknown(NOTE_UNPARSABLE));
    }
}
