//! Canonical forms for handles, phone numbers and address text.
//!
//! Every function here is total and idempotent: feeding the output back in
//! returns it unchanged, so values can be normalized at every boundary
//! without tracking whether it already happened.

use regex::{Captures, Regex};
use std::sync::LazyLock;

/// Profile hosts whose URL prefix is stripped from handles.
const PROFILE_HOSTS: &[&str] = &["t.me", "telegram.me", "instagram.com"];

/// Length of a canonical domestic phone number (`7` + 10 digits).
const PHONE_LEN: usize = 11;

/// Country code that replaces the trunk prefix.
const COUNTRY_CODE: char = '7';

/// Domestic trunk prefix used in 11-digit local notation.
const TRUNK_PREFIX: char = '8';

/// First digit of a 10-digit mobile number written without any prefix.
const MOBILE_PREFIX: char = '9';

static BUILDING_CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^|[\s,;(])[кК]\s?(\d{1,2})\s?-\s?(\d{1,2})\b").expect("static building regex")
});

static GREEN_TOWN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^|[\s,;(])(?:зг|Зг|зГ)\s?-\s?(\d{1,2})\b").expect("static green-town regex")
});

static BUILDING_DESCRIBE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:К(\d{1,2})|ЗГ)[-.](\d{1,2})").expect("static describe regex")
});

/// Canonicalize a messaging-platform handle.
///
/// Lowercases, drops whitespace and leading `@`, strips profile URL prefixes
/// (`https://t.me/`, `http://www.instagram.com/`, …) and surrounding `/`.
///
/// ```
/// use postbot::normalize::normalize_handle;
/// assert_eq!(normalize_handle("@Ivan"), "ivan");
/// assert_eq!(normalize_handle("https://t.me/ivan/"), "ivan");
/// ```
pub fn normalize_handle(raw: &str) -> String {
    let mut current = strip_handle_once(raw);
    loop {
        let next = strip_handle_once(&current);
        if next == current {
            return next;
        }
        current = next;
    }
}

/// Canonicalize the secondary (photo-sharing) handle.
///
/// Same rules as [`normalize_handle`]; kept separate so call sites say which
/// field they are writing.
pub fn normalize_secondary_handle(raw: &str) -> String {
    normalize_handle(raw)
}

fn strip_handle_once(raw: &str) -> String {
    let lowered: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    let mut rest = lowered.trim_start_matches('@');

    'hosts: for scheme in ["https://", "http://", ""] {
        for www in ["www.", ""] {
            for host in PROFILE_HOSTS {
                let Some(after_scheme) = rest.strip_prefix(scheme) else {
                    continue;
                };
                let Some(after_www) = after_scheme.strip_prefix(www) else {
                    continue;
                };
                if let Some(tail) = after_www.strip_prefix(host)
                    && (tail.is_empty() || tail.starts_with('/'))
                {
                    rest = tail;
                    break 'hosts;
                }
            }
        }
    }

    rest.trim_matches('/').trim_start_matches('@').to_owned()
}

/// Canonicalize a phone number to `7XXXXXXXXXX` when it looks domestic.
///
/// Quotes, spaces, parentheses, `+` and `-` are removed; other input passes
/// through untouched.
pub fn normalize_phone(raw: &str) -> String {
    let digits: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '"' | '(' | ')' | '+' | '-'))
        .collect();
    let len = digits.chars().count();

    if len == PHONE_LEN && digits.starts_with(TRUNK_PREFIX) {
        format!("{COUNTRY_CODE}{}", &digits[TRUNK_PREFIX.len_utf8()..])
    } else if len == PHONE_LEN - 1 && digits.starts_with(MOBILE_PREFIX) {
        format!("{COUNTRY_CODE}{digits}")
    } else {
        digits
    }
}

/// Trim and replace every whitespace run with a single space.
pub fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Tidy free-text postal address input.
///
/// Collapses whitespace, upper-cases the building abbreviation and zero-pads
/// a single-digit building number before `-<floor>` (`к1-3` → `К01-3`).
pub fn normalize_address_text(raw: &str) -> String {
    let collapsed = collapse_whitespace(raw);

    let buildings = BUILDING_CODE_RE.replace_all(&collapsed, |caps: &Captures<'_>| {
        format!("{}К{:0>2}-{}", &caps[1], &caps[2], &caps[3])
    });
    GREEN_TOWN_RE
        .replace_all(&buildings, |caps: &Captures<'_>| {
            format!("{}ЗГ-{}", &caps[1], &caps[2])
        })
        .into_owned()
}

/// Human-readable form of a campus building code, if `address` contains one.
///
/// `К01-3` → `Корпус №1, 3 этаж`, `ЗГ-2` → `Зеленый городок, 2 этаж`.
pub fn describe_building(address: &str) -> Option<String> {
    let caps = BUILDING_DESCRIBE_RE.captures(address)?;
    let floor = caps.get(2)?.as_str();
    match caps.get(1) {
        Some(number) => {
            let number: u32 = number.as_str().parse().ok()?;
            Some(format!("Корпус №{number}, {floor} этаж"))
        }
        None => Some(format!("Зеленый городок, {floor} этаж")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HANDLE_SAMPLES: &[&str] = &[
        "@Ivan",
        "https://t.me/ivan/",
        "http://www.t.me/Ivan",
        "  @ i v a n ",
        "https://www.instagram.com/Maria.Petrova/",
        "instagram.com/anna",
        "@@double",
        "t.me/@ivan",
        "https://t.me/https://t.me/nested",
        "",
        "/",
        "www.example",
        "ИВАН",
    ];

    const PHONE_SAMPLES: &[&str] = &[
        "89998148871",
        "9998148871",
        "+7 (999) 814-88-71",
        "\"8 999 814 88 71\"",
        "12345",
        "",
        "+1 (555) 010-9999",
    ];

    #[test]
    fn handle_examples() {
        assert_eq!(normalize_handle("@Ivan"), "ivan");
        assert_eq!(normalize_handle("https://t.me/ivan/"), "ivan");
        assert_eq!(normalize_handle("http://www.t.me/Ivan"), "ivan");
        assert_eq!(normalize_handle("  @ i v a n "), "ivan");
        let nested = "https://t.me/https://t.me/nested";
        assert_eq!(normalize_handle(nested), "nested");
        assert_eq!(normalize_handle("t.me/@ivan"), "ivan");
    }

    #[test]
    fn handle_keeps_unknown_hosts() {
        assert_eq!(normalize_handle("www.example"), "www.example");
        assert_eq!(normalize_handle("t.meivan"), "t.meivan");
    }

    #[test]
    fn secondary_handle_strips_photo_profile_url() {
        assert_eq!(
            normalize_secondary_handle("https://www.instagram.com/Maria.Petrova/"),
            "maria.petrova"
        );
        assert_eq!(normalize_secondary_handle("instagram.com/anna"), "anna");
    }

    #[test]
    fn handle_normalization_is_idempotent() {
        for sample in HANDLE_SAMPLES {
            let once = normalize_handle(sample);
            assert_eq!(normalize_handle(&once), once, "sample {sample:?}");
        }
    }

    #[test]
    fn phone_examples() {
        assert_eq!(normalize_phone("89998148871"), "79998148871");
        assert_eq!(normalize_phone("9998148871"), "79998148871");
        assert_eq!(normalize_phone("+7 (999) 814-88-71"), "79998148871");
        assert_eq!(normalize_phone("\"8 999 814 88 71\""), "79998148871");
        assert_eq!(normalize_phone("12345"), "12345");
    }

    #[test]
    fn phone_normalization_is_idempotent() {
        for sample in PHONE_SAMPLES {
            let once = normalize_phone(sample);
            assert_eq!(normalize_phone(&once), once, "sample {sample:?}");
        }
    }

    #[test]
    fn address_text_collapses_and_pads() {
        assert_eq!(
            normalize_address_text("  Москва,   к1-3   кв 5 "),
            "Москва, К01-3 кв 5"
        );
        assert_eq!(normalize_address_text("зг-2, комната 7"), "ЗГ-2, комната 7");
        assert_eq!(normalize_address_text("К12-4"), "К12-4");
    }

    #[test]
    fn address_text_is_idempotent() {
        for sample in ["к1-3", "  a   b ", "зг - 2", "ул. Ленина, д. 1"] {
            let once = normalize_address_text(sample);
            assert_eq!(normalize_address_text(&once), once, "sample {sample:?}");
        }
    }

    #[test]
    fn building_description() {
        assert_eq!(
            describe_building("К01-3").as_deref(),
            Some("Корпус №1, 3 этаж")
        );
        assert_eq!(
            describe_building("ЗГ-2").as_deref(),
            Some("Зеленый городок, 2 этаж")
        );
        assert_eq!(describe_building("ул. Ленина, д. 1"), None);
    }
}
