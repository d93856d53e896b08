//! Refresh-token cookie formatting and parsing.

/// Name of the cookie carrying the refresh token.
pub const REFRESH_COOKIE: &str = "RefreshToken";

const ATTRIBUTES: &str = "Path=/; HttpOnly; Secure; SameSite=None; Partitioned";

/// `Set-Cookie` value delivering a refresh token.
pub fn refresh_cookie(token: &str, max_age_secs: i64) -> String {
    format!("{REFRESH_COOKIE}={token}; Max-Age={max_age_secs}; {ATTRIBUTES}")
}

/// `Set-Cookie` value that clears the refresh token on logout.
pub fn expired_refresh_cookie() -> String {
    format!("{REFRESH_COOKIE}=REVOKED; Max-Age=0; {ATTRIBUTES}")
}

/// Find a cookie's value in a `Cookie` request header.
pub fn read_cookie<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then_some(value).filter(|v| !v.is_empty())
    })
}
