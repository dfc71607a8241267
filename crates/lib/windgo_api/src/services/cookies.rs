//! Cookie service: build and clear the httpOnly auth cookies.

use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

/// Cookie name for the access token.
pub const ACCESS_COOKIE: &str = "access_token";
/// Cookie name for the refresh token.
pub const REFRESH_COOKIE: &str = "refresh_token";
/// Cookie name for the OAuth CSRF state.
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";

const ACCESS_MAX_AGE: Duration = Duration::hours(24);
const REFRESH_MAX_AGE: Duration = Duration::days(7);
const OAUTH_STATE_MAX_AGE: Duration = Duration::minutes(10);

fn build(
    name: &'static str,
    value: String,
    same_site: SameSite,
    max_age: Duration,
    secure: bool,
) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(secure)
        .same_site(same_site)
        .path("/")
        .max_age(max_age)
        .build()
}

/// Access token cookie (24 hours, strict same-site).
pub fn access_cookie(token: &str, secure: bool) -> Cookie<'static> {
    build(ACCESS_COOKIE, token.to_string(), SameSite::Strict, ACCESS_MAX_AGE, secure)
}

/// Refresh token cookie (7 days, strict same-site).
pub fn refresh_cookie(token: &str, secure: bool) -> Cookie<'static> {
    build(REFRESH_COOKIE, token.to_string(), SameSite::Strict, REFRESH_MAX_AGE, secure)
}

/// OAuth state cookie (10 minutes, lax so it survives the provider redirect).
pub fn oauth_state_cookie(state: &str, secure: bool) -> Cookie<'static> {
    build(OAUTH_STATE_COOKIE, state.to_string(), SameSite::Lax, OAUTH_STATE_MAX_AGE, secure)
}

pub fn clear_access_cookie(secure: bool) -> Cookie<'static> {
    build(ACCESS_COOKIE, String::new(), SameSite::Strict, Duration::ZERO, secure)
}

pub fn clear_refresh_cookie(secure: bool) -> Cookie<'static> {
    build(REFRESH_COOKIE, String::new(), SameSite::Strict, Duration::ZERO, secure)
}

pub fn clear_oauth_state_cookie(secure: bool) -> Cookie<'static> {
    build(OAUTH_STATE_COOKIE, String::new(), SameSite::Lax, Duration::ZERO, secure)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_cookie_attributes() {
        let c = access_cookie("tok", true);
        assert_eq!(c.name(), "access_token");
        assert_eq!(c.http_only(), Some(true));
        assert_eq!(c.secure(), Some(true));
        assert_eq!(c.same_site(), Some(SameSite::Strict));
        assert_eq!(c.max_age(), Some(Duration::hours(24)));
    }

    #[test]
    fn state_cookie_is_lax_and_short_lived() {
        let c = oauth_state_cookie("s", false);
        assert_eq!(c.same_site(), Some(SameSite::Lax));
        assert_eq!(c.max_age(), Some(Duration::minutes(10)));
    }

    #[test]
    fn cleared_cookies_expire_immediately() {
        assert_eq!(clear_refresh_cookie(true).max_age(), Some(Duration::ZERO));
        assert_eq!(clear_refresh_cookie(true).value(), "");
    }
}
