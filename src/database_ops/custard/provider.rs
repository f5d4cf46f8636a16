use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::{FetchError, Flavor, FlavorSource, Store, StoreDetail};

pub const USER_AGENT: &str = "custard-backfill/1.0";

fn truncate_for_log(mut s: String, max_len: usize) -> String {
    if s.len() > max_len {
        let mut cut = max_len;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
        s.push('…');
    }
    s
}

/// Custard calendar worker API
///
/// Key endpoints:
/// - GET /api/v1/stores?q=... - Substring search over store slug/name/city
/// - GET /api/v1/flavors?slug=... - Flavor calendar for one store
#[derive(Debug, Clone)]
pub struct CustardProvider {
    base_url: String,
    http: Client,
}

impl CustardProvider {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let http = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    async fn get_json(
        &self,
        path: &str,
        query: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<Value, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .query(query)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| FetchError::Transient {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        let body = resp.bytes().await.map_err(|e| FetchError::Transient {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        if !status.is_success() {
            let snippet = truncate_for_log(String::from_utf8_lossy(&body).into_owned(), 500);
            let reason = format!("HTTP {status} body={snippet}");
            return Err(if is_retryable_status(status) {
                FetchError::Transient { url, reason }
            } else {
                FetchError::Malformed { url, reason }
            });
        }

        debug!(url = %url, bytes = body.len(), "custard response");
        serde_json::from_slice(&body).map_err(|e| FetchError::Malformed {
            url,
            reason: format!("invalid JSON: {e}"),
        })
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

fn str_field(obj: &Value, key: &str) -> String {
    match obj.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Borrow `key` as an array; absent or null means empty, anything else is malformed.
fn array_field<'a>(url: &str, obj: &'a Value, key: &str) -> Result<&'a [Value], FetchError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(&[] as &[Value]),
        Some(Value::Array(items)) => Ok(items.as_slice()),
        Some(other) => Err(FetchError::Malformed {
            url: url.to_string(),
            reason: format!("`{key}` is not an array: {}", truncate_for_log(other.to_string(), 200)),
        }),
    }
}

fn require_object(url: &str, body: &Value) -> Result<(), FetchError> {
    if body.is_object() {
        Ok(())
    } else {
        Err(FetchError::Malformed {
            url: url.to_string(),
            reason: "top-level JSON is not an object".into(),
        })
    }
}

/// Decode `{stores: [{slug, name, city, state}]}`; entries without a slug are dropped.
pub fn decode_search(url: &str, body: &Value) -> Result<Vec<Store>, FetchError> {
    require_object(url, body)?;
    let stores = array_field(url, body, "stores")?
        .iter()
        .filter_map(|item| {
            let slug = str_field(item, "slug");
            if slug.trim().is_empty() {
                return None;
            }
            Some(Store {
                slug,
                name: str_field(item, "name"),
                city: str_field(item, "city"),
                state: str_field(item, "state"),
            })
        })
        .collect();
    Ok(stores)
}

/// Decode `{name, address, flavors: [{date, title, description}]}`.
pub fn decode_detail(url: &str, body: Value) -> Result<StoreDetail, FetchError> {
    require_object(url, &body)?;
    let flavors = array_field(url, &body, "flavors")?
        .iter()
        .filter(|item| item.is_object())
        .map(|item| Flavor {
            date: str_field(item, "date"),
            title: str_field(item, "title"),
            description: str_field(item, "description"),
        })
        .collect();
    Ok(StoreDetail {
        name: str_field(&body, "name"),
        address: str_field(&body, "address"),
        flavors,
        raw: body,
    })
}

#[async_trait::async_trait]
impl FlavorSource for CustardProvider {
    async fn search(&self, token: &str, timeout: Duration) -> Result<Vec<Store>, FetchError> {
        let body = self
            .get_json("/api/v1/stores", &[("q", token)], timeout)
            .await?;
        decode_search(&format!("{}/api/v1/stores?q={token}", self.base_url), &body)
    }

    async fn fetch_detail(
        &self,
        slug: &str,
        timeout: Duration,
    ) -> Result<StoreDetail, FetchError> {
        let body = self
            .get_json("/api/v1/flavors", &[("slug", slug)], timeout)
            .await?;
        decode_detail(&format!("{}/api/v1/flavors?slug={slug}", self.base_url), body)
    }
}
