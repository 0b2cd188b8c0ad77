//! Cookie header parsing and `Set-Cookie` directive serialization.

use std::borrow::Cow;
use std::fmt::Write;
use std::str::FromStr;

use strum::{EnumString, IntoStaticStr};
use time::macros::format_description;
use time::{Duration, OffsetDateTime, UtcOffset};

use crate::domain::errors::{AdapterError, AdapterResult};
use crate::FnvIndexMap;

pub const SAMESITE_VALUES: [&str; 3] = ["strict", "lax", "none"];

/// Attribute names that can never be used as a cookie name.
const RESERVED: [&str; 9] = [
    "expires", "path", "comment", "domain", "max-age", "secure", "httponly", "version", "samesite",
];

const LEGAL_PUNCTUATION: &str = "!#$%&'*+-.^_`|~:";
const UNESCAPED_PUNCTUATION: &str = " ()/<=>?@[]{}";

#[derive(Copy, Clone, Debug, PartialEq, Eq, EnumString, IntoStaticStr)]
pub enum SameSite {
    #[strum(serialize = "strict")]
    Strict,
    #[strum(serialize = "lax")]
    Lax,
    #[strum(serialize = "none")]
    None,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expires {
    /// Relative to the moment the directive is serialized.
    In(Duration),
    At(OffsetDateTime),
    /// Written verbatim.
    Raw(String),
}

/// Attributes of a single `Set-Cookie` directive.
#[derive(Clone, Debug, PartialEq)]
pub struct CookieOptions {
    pub max_age: Option<i64>,
    pub expires: Option<Expires>,
    pub path: Option<String>,
    pub domain: Option<String>,
    pub secure: bool,
    pub httponly: bool,
    /// Must be one of [`SAMESITE_VALUES`].
    pub samesite: String,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            max_age: None,
            expires: None,
            path: Some("/".to_owned()),
            domain: None,
            secure: false,
            httponly: false,
            samesite: "lax".to_owned(),
        }
    }
}

/// Serializes one cookie into the value of a `Set-Cookie` header.
///
/// Attributes are written in sorted attribute-name order, so the output for a
/// given input is stable: `a=1; Domain=x; expires=..; HttpOnly; Max-Age=60;
/// Path=/; SameSite=lax; Secure`.
pub fn serialize_set_cookie(
    name: &str,
    value: &str,
    options: &CookieOptions,
) -> AdapterResult<String> {
    let samesite = SameSite::from_str(&options.samesite)
        .map_err(|_| AdapterError::InvalidSameSite(options.samesite.clone()))?;
    if !is_legal_name(name) {
        return Err(AdapterError::InvalidCookieName(name.to_owned()));
    }

    let mut directive = format!("{name}={}", quote(value));
    let mut attribute = |rendered: &dyn std::fmt::Display| {
        // writing into a String never fails
        let _ = write!(directive, "; {rendered}");
    };

    if let Some(domain) = options.domain.as_deref().filter(|d| !d.is_empty()) {
        attribute(&format_args!("Domain={domain}"));
    }
    if let Some(expires) = &options.expires {
        let expires = format_expires(expires)?;
        if !expires.is_empty() {
            attribute(&format_args!("expires={expires}"));
        }
    }
    if options.httponly {
        attribute(&"HttpOnly");
    }
    if let Some(max_age) = options.max_age {
        attribute(&format_args!("Max-Age={max_age}"));
    }
    if let Some(path) = options.path.as_deref().filter(|p| !p.is_empty()) {
        attribute(&format_args!("Path={path}"));
    }
    let samesite: &'static str = samesite.into();
    attribute(&format_args!("SameSite={samesite}"));
    if options.secure {
        attribute(&"Secure");
    }

    Ok(directive.trim().to_owned())
}

/// Parses a `Cookie` request header into name/value pairs.
///
/// Reserved attribute names, `$`-prefixed names and segments without `=` are
/// skipped. A repeated name keeps its last value.
pub fn parse_cookie_header(header: &str) -> FnvIndexMap<String, String> {
    header
        .split(';')
        .filter_map(|segment| segment.trim().split_once('='))
        .map(|(name, value)| (name.trim(), value.trim()))
        .filter(|(name, _)| {
            !name.is_empty()
                && !name.starts_with('$')
                && !RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
        })
        .map(|(name, value)| (name.to_owned(), unquote(value).into_owned()))
        .collect()
}

fn format_expires(expires: &Expires) -> AdapterResult<String> {
    let at = match expires {
        Expires::Raw(raw) => return Ok(raw.clone()),
        Expires::In(duration) => OffsetDateTime::now_utc() + *duration,
        Expires::At(at) => *at,
    };

    let formatted = at.to_offset(UtcOffset::UTC).format(format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
    ))?;
    Ok(formatted)
}

fn is_legal_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || LEGAL_PUNCTUATION.contains(c)
}

fn is_legal_name(name: &str) -> bool {
    !name.is_empty()
        && name.chars().all(is_legal_char)
        && !RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
}

/// Wraps the value in double quotes when it holds characters outside the
/// legal cookie set. Inside quotes, `"` and `\` are backslash-escaped and
/// other non-printable latin-1 characters become `\ooo` octal escapes.
fn quote(value: &str) -> Cow<'_, str> {
    if value.chars().all(is_legal_char) {
        return Cow::Borrowed(value);
    }

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            c if is_legal_char(c) || UNESCAPED_PUNCTUATION.contains(c) => quoted.push(c),
            c if (c as u32) < 256 => {
                let _ = write!(quoted, "\\{:03o}", c as u32);
            }
            c => quoted.push(c),
        }
    }
    quoted.push('"');

    Cow::Owned(quoted)
}

fn unquote(value: &str) -> Cow<'_, str> {
    let Some(inner) = value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    else {
        return Cow::Borrowed(value);
    };

    let mut unquoted = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            unquoted.push(c);
            continue;
        }

        let octal: String = take_octal(&mut chars);
        match u32::from_str_radix(&octal, 8).ok().and_then(char::from_u32) {
            Some(decoded) if octal.len() == 3 => unquoted.push(decoded),
            _ => {
                // not an octal escape: keep the escaped character itself
                unquoted.push_str(&octal);
                if octal.is_empty() {
                    if let Some(escaped) = chars.next() {
                        unquoted.push(escaped);
                    }
                }
            }
        }
    }

    Cow::Owned(unquoted)
}

/// Consumes up to three octal digits following a backslash.
fn take_octal(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut digits = String::with_capacity(3);
    while digits.len() < 3 {
        match chars.peek() {
            Some(&d) if ('0'..='7').contains(&d) => {
                digits.push(d);
                chars.next();
            }
            _ => break,
        }
    }
    digits
}
