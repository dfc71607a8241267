//! HTTP client for the WindGo API.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{Error, Result};

pub const ACCESS_COOKIE: &str = "access_token";
pub const REFRESH_COOKIE: &str = "refresh_token";

/// A decoded response plus any cookies it set.
#[derive(Debug)]
pub struct ApiResponse {
    pub body: Value,
    pub cookies: HashMap<String, String>,
}

impl ApiResponse {
    pub fn into_body<T: DeserializeOwned>(self) -> Result<T> {
        Ok(serde_json::from_value(self.body)?)
    }
}

/// Authentication to attach to a request.
#[derive(Debug, Clone, Copy)]
pub enum Auth<'a> {
    None,
    Bearer(&'a str),
    RefreshCookie(&'a str),
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get(&self, path: &str, auth: Auth<'_>) -> Result<ApiResponse> {
        self.send(self.request(Method::GET, path, auth)).await
    }

    pub async fn get_query(
        &self,
        path: &str,
        auth: Auth<'_>,
        query: &[(&str, String)],
    ) -> Result<ApiResponse> {
        self.send(self.request(Method::GET, path, auth).query(query))
            .await
    }

    pub async fn post(&self, path: &str, auth: Auth<'_>, body: &Value) -> Result<ApiResponse> {
        self.send(self.request(Method::POST, path, auth).json(body))
            .await
    }

    fn request(&self, method: Method, path: &str, auth: Auth<'_>) -> RequestBuilder {
        let req = self.http.request(method, format!("{}{path}", self.base_url));
        match auth {
            Auth::None => req,
            Auth::Bearer(token) => req.bearer_auth(token),
            Auth::RefreshCookie(token) => req.header(COOKIE, format!("{REFRESH_COOKIE}={token}")),
        }
    }

    async fn send(&self, req: RequestBuilder) -> Result<ApiResponse> {
        let resp = req.send().await?;
        let status = resp.status();
        let cookies = resp
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(parse_set_cookie)
            .collect();
        let text = resp.text().await?;
        log::debug!("{status} ({} bytes)", text.len());

        let body: Value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        if !status.is_success() {
            let message = body
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| body.to_string());
            return Err(Error::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(ApiResponse { body, cookies })
    }
}

/// `name=value` from a `Set-Cookie` header.
pub fn parse_set_cookie(header: &str) -> Option<(String, String)> {
    let pair = header.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_set_cookie_pairs() {
        assert_eq!(
            parse_set_cookie("refresh_token=abc; HttpOnly; Path=/; Max-Age=604800"),
            Some(("refresh_token".into(), "abc".into()))
        );
        assert_eq!(
            parse_set_cookie("access_token=; Max-Age=0"),
            Some(("access_token".into(), String::new()))
        );
        assert_eq!(parse_set_cookie("garbage"), None);
    }

    #[test]
    fn trims_trailing_slash() {
        let client = ApiClient::new("http://localhost:8080/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080");
    }
}
