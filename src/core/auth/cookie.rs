//! Refresh token transport
//!
//! The refresh token never appears in a response body. It travels in an
//! HttpOnly cookie scoped to the refresh endpoint.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

/// Cookie carrying the refresh token
pub const REFRESH_COOKIE_NAME: &str = "refreshToken";

/// The only path the browser sends the cookie to
pub const REFRESH_COOKIE_PATH: &str = "/auth/refresh";

/// Values some clients send when they have no token
const PLACEHOLDER_TOKENS: [&str; 3] = ["", "undefined", "null"];

/// Cookie attributes, fixed per deployment
#[derive(Debug, Clone, Copy)]
pub struct RefreshCookie {
    production: bool,
    max_age: time::Duration,
}

impl RefreshCookie {
    pub fn new(production: bool, max_age: chrono::Duration) -> Self {
        Self {
            production,
            max_age: time::Duration::seconds(max_age.num_seconds()),
        }
    }

    fn base(&self, value: String) -> Cookie<'static> {
        let same_site = if self.production {
            SameSite::None
        } else {
            SameSite::Lax
        };

        Cookie::build((REFRESH_COOKIE_NAME, value))
            .http_only(true)
            .secure(self.production)
            .same_site(same_site)
            .path(REFRESH_COOKIE_PATH)
            .build()
    }

    /// Add the cookie holding a freshly issued refresh token
    pub fn set(&self, jar: CookieJar, token: String) -> CookieJar {
        let mut cookie = self.base(token);
        cookie.set_max_age(self.max_age);
        jar.add(cookie)
    }

    /// Expire the cookie on the client
    ///
    /// A removal cookie is always emitted, since the browser does not send the
    /// cookie outside its path and the jar may not know about it.
    pub fn clear(&self, jar: CookieJar) -> CookieJar {
        let mut cookie = self.base(String::new());
        cookie.make_removal();
        jar.add(cookie)
    }
}

/// Whether a presented value means "no token"
pub fn is_placeholder_token(value: &str) -> bool {
    PLACEHOLDER_TOKENS.contains(&value.trim())
}

/// Read the refresh token, treating placeholder values as absent
pub fn extract_refresh_token(jar: &CookieJar) -> Option<String> {
    jar.get(REFRESH_COOKIE_NAME)
        .map(|c| c.value().trim())
        .filter(|v| !is_placeholder_token(v))
        .map(str::to_string)
}
