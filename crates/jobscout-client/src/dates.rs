use chrono::{Days, NaiveDate};

use jobscout_core::models::PostedDate;
use jobscout_core::util::collapse_whitespace;

/// Turn a site's posted-date text into a calendar date relative to `today`.
///
/// Understands the phrasings both sites use ("Just posted", "Today",
/// "3 days ago", "30+ days ago", "Yesterday", "5 hours ago", "2 weeks ago",
/// "1 month ago") and ISO dates. Anything else is kept verbatim as a
/// [`PostedDate::Relative`] marker. Empty text yields `None`.
pub fn normalize_posted_date(text: &str, today: NaiveDate) -> Option<PostedDate> {
    let text = collapse_whitespace(text);
    if text.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(&text, "%Y-%m-%d") {
        return Some(PostedDate::Date(date));
    }

    let lower = text.to_lowercase();
    let days_ago = if lower.contains("just posted")
        || lower.contains("just now")
        || lower.contains("today")
        || lower.contains("hour")
        || lower.contains("minute")
        || lower.contains("second")
    {
        Some(0)
    } else if lower.contains("yesterday") {
        Some(1)
    } else {
        leading_number(&lower).and_then(|n| {
            if lower.contains("day") {
                Some(n)
            } else if lower.contains("week") {
                n.checked_mul(7)
            } else if lower.contains("month") {
                n.checked_mul(30)
            } else {
                None
            }
        })
    };

    match days_ago.and_then(|days| today.checked_sub_days(Days::new(days))) {
        Some(date) => Some(PostedDate::Date(date)),
        None => Some(PostedDate::Relative(text)),
    }
}

/// First run of ASCII digits in `text` ("30+ days" -> 30).
fn leading_number(text: &str) -> Option<u64> {
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}
