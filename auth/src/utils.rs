//! Utility functions for authentication.

use crate::providers::DeviceType;

/// Browser and operating system facts extracted from a user agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUserAgent {
    /// Browser family (e.g. "Chrome", "Mobile Safari", "Other").
    pub browser: String,
    /// Browser version, dotted, up to three components (may be empty).
    pub browser_version: String,
    /// Operating system family (e.g. "Windows", "iOS", "Other").
    pub os: String,
    /// Operating system version, dotted (may be empty).
    pub os_version: String,
    /// Form factor.
    pub device_type: DeviceType,
}

impl ParsedUserAgent {
    /// Human readable device name, `"{browser} on {os}"`.
    #[must_use]
    pub fn device_name(&self) -> String {
        format!("{} on {}", self.browser, self.os)
    }
}

/// Parse a user agent into browser, OS and form factor.
///
/// Covers the major browser engines and operating systems. Anything not
/// recognised maps to the `"Other"` family with an empty version.
///
/// # Examples
///
/// ```
/// use sentinel_auth::utils::parse_user_agent;
///
/// let ua = parse_user_agent(
///     "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
///      (KHTML, like Gecko) Chrome/120.0.6099.109 Safari/537.36",
/// );
/// assert_eq!(ua.browser, "Chrome");
/// assert_eq!(ua.browser_version, "120.0.6099");
/// assert_eq!(ua.os, "Windows");
/// assert_eq!(ua.os_version, "10");
/// ```
#[must_use]
pub fn parse_user_agent(user_agent: &str) -> ParsedUserAgent {
    let (browser, browser_version) = parse_browser(user_agent);
    let (os, os_version) = parse_os(user_agent);

    ParsedUserAgent {
        browser: browser.to_string(),
        browser_version,
        os: os.to_string(),
        os_version,
        device_type: parse_device_type(user_agent),
    }
}

fn parse_browser(ua: &str) -> (&'static str, String) {
    let mobile = ua.contains("Mobile");

    // Order matters: Chromium derivatives also advertise "Chrome/" and "Safari/".
    let rules: [(&str, &'static str); 9] = [
        ("Edg/", "Edge"),
        ("Edge/", "Edge"),
        ("OPR/", "Opera"),
        ("SamsungBrowser/", "Samsung Internet"),
        ("FxiOS/", "Firefox iOS"),
        ("Firefox/", if mobile { "Firefox Mobile" } else { "Firefox" }),
        ("CriOS/", "Chrome Mobile iOS"),
        ("Chrome/", if mobile { "Chrome Mobile" } else { "Chrome" }),
        ("curl/", "curl"),
    ];

    for (marker, family) in rules {
        if let Some(version) = version_after(ua, marker) {
            return (family, version);
        }
    }

    if ua.contains("Safari/") {
        let family = if mobile { "Mobile Safari" } else { "Safari" };
        return (family, version_after(ua, "Version/").unwrap_or_default());
    }

    if let Some(version) = version_after(ua, "python-requests/") {
        return ("Python Requests", version);
    }

    ("Other", String::new())
}

fn parse_os(ua: &str) -> (&'static str, String) {
    if let Some(nt) = version_after(ua, "Windows NT ") {
        let version = match nt.as_str() {
            "10.0" => "10",
            "6.3" => "8.1",
            "6.2" => "8",
            "6.1" => "7",
            "6.0" => "Vista",
            _ => "",
        };
        return ("Windows", version.to_string());
    }

    for marker in ["iPhone OS ", "CPU OS "] {
        if let Some(version) = version_after(ua, marker) {
            return ("iOS", version);
        }
    }

    if let Some(version) = version_after(ua, "Mac OS X ") {
        return ("Mac OS X", version);
    }

    if let Some(version) = version_after(ua, "Android ") {
        return ("Android", version);
    }

    if ua.contains("CrOS") {
        return ("Chrome OS", String::new());
    }

    if ua.contains("Linux") {
        return ("Linux", String::new());
    }

    ("Other", String::new())
}

/// Extract the version following `marker`, normalising `_` to `.` and
/// keeping at most three numeric components.
fn version_after(ua: &str, marker: &str) -> Option<String> {
    let start = ua.find(marker)? + marker.len();
    let raw: String = ua[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == '_')
        .map(|c| if c == '_' { '.' } else { c })
        .collect();

    let version = raw
        .split('.')
        .filter(|part| !part.is_empty())
        .take(3)
        .collect::<Vec<_>>()
        .join(".");

    Some(version)
}

/// Classify the form factor of a user agent.
///
/// # Examples
///
/// ```
/// use sentinel_auth::utils::parse_device_type;
/// use sentinel_auth::providers::DeviceType;
///
/// let iphone = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X)";
/// assert_eq!(parse_device_type(iphone), DeviceType::Mobile);
/// let ipad = "Mozilla/5.0 (iPad; CPU OS 17_0 like Mac OS X)";
/// assert_eq!(parse_device_type(ipad), DeviceType::Tablet);
/// assert_eq!(parse_device_type("Mozilla/5.0 (Windows NT 10.0; Win64; x64)"), DeviceType::Desktop);
/// ```
#[must_use]
pub fn parse_device_type(user_agent: &str) -> DeviceType {
    let ua_lower = user_agent.to_lowercase();

    if ua_lower.contains("ipad") || ua_lower.contains("tablet") {
        return DeviceType::Tablet;
    }

    if ua_lower.contains("iphone")
        || ua_lower.contains("ipod")
        || ua_lower.contains("mobile")
        || ua_lower.contains("android")
    {
        return DeviceType::Mobile;
    }

    DeviceType::Desktop
}

/// Validate email address format.
///
/// Basic structural validation: exactly one `@`, non-empty local part, a
/// dotted domain, conservative character set, 3 to 255 characters.
///
/// # Examples
///
/// ```
/// use sentinel_auth::utils::is_valid_email;
///
/// assert!(is_valid_email("user@example.com"));
/// assert!(is_valid_email("user+tag@subdomain.example.com"));
/// assert!(!is_valid_email("invalid"));
/// assert!(!is_valid_email("user@"));
/// ```
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    if email.len() < 3 || email.len() > 255 {
        return false;
    }

    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return false;
    }

    let valid_local = |c: char| c.is_alphanumeric() || matches!(c, '.' | '-' | '+' | '_');
    let valid_domain = |c: char| c.is_alphanumeric() || matches!(c, '.' | '-');

    local.chars().all(valid_local)
        && domain.chars().all(valid_domain)
        && domain.contains('.')
        && domain.split('.').all(|part| !part.is_empty())
}

/// Validate a username: 3 to 50 characters of `[A-Za-z0-9_-]`.
///
/// # Examples
///
/// ```
/// use sentinel_auth::utils::is_valid_username;
///
/// assert!(is_valid_username("jane_doe-1"));
/// assert!(!is_valid_username("ab"));
/// assert!(!is_valid_username("jane doe"));
/// ```
#[must_use]
pub fn is_valid_username(username: &str) -> bool {
    (3..=50).contains(&username.chars().count())
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Username seed derived from an email's local part.
///
/// Keeps `[a-z0-9_-]`, lowercases, and pads to the minimum username length.
///
/// # Examples
///
/// ```
/// use sentinel_auth::utils::username_seed;
///
/// assert_eq!(username_seed("Jane.Doe+news@example.com"), "janedoenews");
/// assert_eq!(username_seed("jo@example.com"), "jo_user");
/// ```
#[must_use]
pub fn username_seed(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default();
    let mut seed: String = local
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .map(|c| c.to_ascii_lowercase())
        .take(40)
        .collect();

    if seed.len() < 3 {
        seed.push_str("_user");
    }

    seed
}

/// Truncate to at most `max` characters on a char boundary.
#[must_use]
pub fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}
