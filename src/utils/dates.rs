//! Publication-date recovery for scraped pages and search hits.
//!
//! Every parser applies the same acceptance rule: the date must be a real
//! calendar day, not after `today`, and in year 2000 or later. Patterns are
//! tried in a fixed order and the first acceptable match wins.

use chrono::{Datelike, Duration, NaiveDate};
use regex::{Captures, Regex};
use std::sync::LazyLock;

const MONTHS: &str = r"jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?";

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("date patterns are static and valid")
}

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"\b(\d{4})-(\d{2})-(\d{2})(?:[^\d]|$)"));

static MONTH_DAY_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    compile(&format!(
        r"(?i)\b({MONTHS})\.?\s+(\d{{1,2}})(?:st|nd|rd|th)?,?\s+(\d{{4}})\b"
    ))
});

static DAY_MONTH_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    compile(&format!(
        r"(?i)\b(\d{{1,2}})(?:st|nd|rd|th)?\s+({MONTHS})\.?,?\s+(\d{{4}})\b"
    ))
});

static PREFIXED_NUMERIC: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(?i)\b(?:published|updated|posted)(?:\s+on)?\s*:?\s*(\d{1,4})[/.](\d{1,2})[/.](\d{1,4})\b")
});

static QUARTER_SHORT: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\bQ([1-4])\s*(?:FY\s*)?'?(\d{4}|\d{2})\b"));

static QUARTER_LONG: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(?i)\b(first|second|third|fourth)[\s-]+quarter(?:\s+of)?\s+(\d{4})\b")
});

static SLASH_DATE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b"));

static RELATIVE_AGO: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\b(\d{1,3})\s+(hour|day|week)s?\s+ago\b"));

static URL_PATH_DATE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"/(\d{4})/(\d{1,2})/(\d{1,2})(?:[^\d]|$)"));

static URL_DASHED_DATE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(\d{4})-(\d{2})-(\d{2})(?:[^\d]|$)"));

static URL_COMPACT_DATE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"[/=_-](\d{4})(\d{2})(\d{2})(?:[^\d]|$)"));

type Extractor = fn(&Captures) -> Option<NaiveDate>;

/// Date found at the head of scraped markdown, scanning the first `scan_chars` characters.
pub fn parse_date_from_markdown(
    markdown: &str,
    scan_chars: usize,
    today: NaiveDate,
) -> Option<NaiveDate> {
    let head = match markdown.char_indices().nth(scan_chars) {
        Some((index, _)) => &markdown[..index],
        None => markdown,
    };
    first_acceptable(head, &markdown_patterns(), today)
}

/// Date embedded in a URL path or query string.
pub fn parse_date_from_url(url: &str, today: NaiveDate) -> Option<NaiveDate> {
    let patterns: [(&Regex, Extractor); 3] = [
        (&URL_PATH_DATE, ymd),
        (&URL_DASHED_DATE, ymd),
        (&URL_COMPACT_DATE, ymd),
    ];
    first_acceptable(url, &patterns, today)
}

/// Date from free text such as a search hit's `publishedDate`, title or
/// description. Also understands "3 days ago" relative to `today`.
pub fn parse_date_from_text(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    first_acceptable(text, &markdown_patterns(), today).or_else(|| {
        RELATIVE_AGO.captures(text).and_then(|caps| {
            let amount: i64 = caps[1].parse().ok()?;
            let days = match caps[2].to_ascii_lowercase().as_str() {
                "hour" => amount / 24,
                "week" => amount * 7,
                _ => amount,
            };
            let date = today - Duration::days(days);
            is_acceptable(date, today).then_some(date)
        })
    })
}

/// Not in the future, year 2000 or later.
pub fn is_acceptable(date: NaiveDate, today: NaiveDate) -> bool {
    date <= today && date.year() >= 2000
}

/// Whether `date` falls inside the last `window_days` days (inclusive).
pub fn is_within_window(date: NaiveDate, today: NaiveDate, window_days: i64) -> bool {
    date <= today && today - date <= Duration::days(window_days)
}

fn markdown_patterns() -> [(&'static Regex, Extractor); 7] {
    [
        (&ISO_DATE, ymd),
        (&MONTH_DAY_YEAR, month_day_year),
        (&DAY_MONTH_YEAR, day_month_year),
        (&PREFIXED_NUMERIC, prefixed_numeric),
        (&QUARTER_SHORT, quarter_short),
        (&QUARTER_LONG, quarter_long),
        (&SLASH_DATE, slash_date),
    ]
}

fn first_acceptable(
    text: &str,
    patterns: &[(&Regex, Extractor)],
    today: NaiveDate,
) -> Option<NaiveDate> {
    patterns.iter().find_map(|(regex, extract)| {
        regex
            .captures_iter(text)
            .filter_map(|caps| extract(&caps))
            .find(|date| is_acceptable(*date, today))
    })
}

fn number(caps: &Captures, index: usize) -> Option<u32> {
    caps.get(index)?.as_str().parse().ok()
}

fn month_index(name: &str) -> Option<u32> {
    let prefix: String = name.chars().take(3).collect::<String>().to_ascii_lowercase();
    let month = match prefix.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

fn ymd(caps: &Captures) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(number(caps, 1)? as i32, number(caps, 2)?, number(caps, 3)?)
}

fn month_day_year(caps: &Captures) -> Option<NaiveDate> {
    let month = month_index(caps.get(1)?.as_str())?;
    NaiveDate::from_ymd_opt(number(caps, 3)? as i32, month, number(caps, 2)?)
}

fn day_month_year(caps: &Captures) -> Option<NaiveDate> {
    let month = month_index(caps.get(2)?.as_str())?;
    NaiveDate::from_ymd_opt(number(caps, 3)? as i32, month, number(caps, 1)?)
}

fn prefixed_numeric(caps: &Captures) -> Option<NaiveDate> {
    let (a, b, c) = (number(caps, 1)?, number(caps, 2)?, number(caps, 3)?);
    if caps.get(1)?.as_str().len() == 4 {
        return NaiveDate::from_ymd_opt(a as i32, b, c);
    }
    if caps.get(3)?.as_str().len() != 4 {
        return None;
    }
    day_or_month_first(a, b, c)
}

fn quarter_end(quarter: u32, year: i32) -> Option<NaiveDate> {
    let (month, day) = match quarter {
        1 => (3, 31),
        2 => (6, 30),
        3 => (9, 30),
        4 => (12, 31),
        _ => return None,
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

fn quarter_short(caps: &Captures) -> Option<NaiveDate> {
    let year_text = caps.get(2)?.as_str();
    let year = number(caps, 2)? as i32;
    let year = if year_text.len() == 2 { 2000 + year } else { year };
    quarter_end(number(caps, 1)?, year)
}

fn quarter_long(caps: &Captures) -> Option<NaiveDate> {
    let quarter = match caps.get(1)?.as_str().to_ascii_lowercase().as_str() {
        "first" => 1,
        "second" => 2,
        "third" => 3,
        "fourth" => 4,
        _ => return None,
    };
    quarter_end(quarter, number(caps, 2)? as i32)
}

fn slash_date(caps: &Captures) -> Option<NaiveDate> {
    day_or_month_first(number(caps, 1)?, number(caps, 2)?, number(caps, 3)?)
}

/// `a/b/year`: a first field above 12 can only be a day; otherwise month-first.
fn day_or_month_first(a: u32, b: u32, year: u32) -> Option<NaiveDate> {
    let year = year as i32;
    if a > 12 {
        NaiveDate::from_ymd_opt(year, b, a)
    } else {
        NaiveDate::from_ymd_opt(year, a, b)
    }
}
