//! Live REST backing store (InvenTree-style API)
//!
//! Blocking, synchronous HTTP throughout: every call holds the pipeline
//! until the backend answers. Token auth; when the configuration carries
//! only username/password, a token is requested once at connect time.

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::config::Config;
use crate::core::kind::EntityKind;
use crate::store::{BackingStore, EntityRecord, Pk, StoreError};

/// Page size for collection listings.
const DEFAULT_PAGE_SIZE: usize = 250;

pub struct HttpStore {
    client: Client,
    base_url: String,
    token: String,
    page_size: usize,
}

impl HttpStore {
    /// Connect to the backend described by `config`, fetching an API token
    /// when none is configured.
    pub fn connect(config: &Config) -> Result<Self, StoreError> {
        let base_url = config
            .api_url
            .clone()
            .ok_or_else(|| StoreError::Auth("api_url is not configured".to_string()))?;
        let base_url = format!("{}/", base_url.trim_end_matches('/'));
        let client = Client::builder().build()?;

        let token = match &config.token {
            Some(token) => token.clone(),
            None => Self::fetch_token(&client, &base_url, config)?,
        };

        Ok(Self {
            client,
            base_url,
            token,
            page_size: config.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        })
    }

    fn fetch_token(client: &Client, base_url: &str, config: &Config) -> Result<String, StoreError> {
        let (Some(username), Some(password)) = (&config.username, &config.password) else {
            return Err(StoreError::Auth(
                "either token or username/password must be configured".to_string(),
            ));
        };
        let response = client
            .get(format!("{base_url}user/token/"))
            .basic_auth(username, Some(password))
            .send()?;
        if !response.status().is_success() {
            return Err(StoreError::Auth(format!(
                "token request returned {}",
                response.status()
            )));
        }
        let body: Value = response.json()?;
        body.get("token")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| StoreError::Auth("token response had no 'token' field".to_string()))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }

    fn parse_records(
        endpoint: &str,
        items: &[Value],
        out: &mut Vec<EntityRecord>,
    ) -> Result<(), StoreError> {
        for item in items {
            let fields = item.as_object().cloned().ok_or_else(|| StoreError::Malformed {
                endpoint: endpoint.to_string(),
                message: "listing item is not an object".to_string(),
            })?;
            let pk = fields
                .get("pk")
                .and_then(Value::as_i64)
                .ok_or_else(|| StoreError::Malformed {
                    endpoint: endpoint.to_string(),
                    message: "listing item has no integer 'pk'".to_string(),
                })?;
            out.push(EntityRecord { pk, fields });
        }
        Ok(())
    }
}

impl BackingStore for HttpStore {
    /// Paginated full-collection fetch. The backend answers either a plain
    /// array (pagination disabled) or `{count, results}` envelopes.
    fn list(&self, kind: EntityKind) -> Result<Vec<EntityRecord>, StoreError> {
        let endpoint = kind.endpoint();
        let mut records = Vec::new();
        let mut offset = 0usize;
        loop {
            let response = self
                .client
                .get(self.url(endpoint))
                .header("Authorization", format!("Token {}", self.token))
                .query(&[("limit", self.page_size), ("offset", offset)])
                .send()?;
            if !response.status().is_success() {
                return Err(StoreError::Malformed {
                    endpoint: endpoint.to_string(),
                    message: format!("listing returned {}", response.status()),
                });
            }
            let body: Value = response.json()?;
            match &body {
                Value::Array(items) => {
                    Self::parse_records(endpoint, items, &mut records)?;
                    break;
                }
                Value::Object(map) => {
                    let results = map
                        .get("results")
                        .and_then(Value::as_array)
                        .ok_or_else(|| StoreError::Malformed {
                            endpoint: endpoint.to_string(),
                            message: "paginated listing had no 'results' array".to_string(),
                        })?;
                    Self::parse_records(endpoint, results, &mut records)?;
                    let count = map.get("count").and_then(Value::as_u64).unwrap_or(0) as usize;
                    offset += results.len();
                    if results.is_empty() || offset >= count {
                        break;
                    }
                }
                _ => {
                    return Err(StoreError::Malformed {
                        endpoint: endpoint.to_string(),
                        message: "listing was neither array nor object".to_string(),
                    });
                }
            }
        }
        debug!(%kind, count = records.len(), "listed collection");
        Ok(records)
    }

    fn create(&self, kind: EntityKind, payload: &Value) -> Result<Pk, StoreError> {
        let endpoint = kind.endpoint();
        let response = self
            .client
            .post(self.url(endpoint))
            .header("Authorization", format!("Token {}", self.token))
            .json(payload)
            .send()?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_else(|_| status.to_string());
            return Err(StoreError::Rejected { kind, message });
        }
        let body: Value = response.json()?;
        body.get("pk")
            .and_then(Value::as_i64)
            .ok_or_else(|| StoreError::Malformed {
                endpoint: endpoint.to_string(),
                message: "create response had no integer 'pk'".to_string(),
            })
    }

    /// `Ok(None)` when the backend refuses the patch; `Err` only on
    /// transport failure.
    fn patch(&self, path: &str, payload: &Value) -> Result<Option<Value>, StoreError> {
        let response = self
            .client
            .patch(self.url(path))
            .header("Authorization", format!("Token {}", self.token))
            .json(payload)
            .send()?;
        if !response.status().is_success() {
            warn!(path, status = %response.status(), "patch refused");
            return Ok(None);
        }
        Ok(Some(response.json()?))
    }

    fn delete(&self, kind: EntityKind, pk: Pk) -> Result<(), StoreError> {
        // Parts must be deactivated before the backend will delete them.
        if kind == EntityKind::Part {
            let _ = self.patch(
                &format!("part/{pk}/"),
                &serde_json::json!({"active": false, "minimum_stock": 0}),
            )?;
        }
        let response = self
            .client
            .delete(self.url(&format!("{}{pk}/", kind.endpoint())))
            .header("Authorization", format!("Token {}", self.token))
            .send()?;
        let status = response.status();
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            return Err(StoreError::Malformed {
                endpoint: kind.endpoint().to_string(),
                message: format!("delete of pk {pk} returned {status}"),
            });
        }
        Ok(())
    }
}
