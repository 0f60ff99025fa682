//! Salesforce REST client
//!
//! Thin wrapper over reqwest: every call returns typed models, non-2xx
//! responses become an [`ApiError`] inside the anyhow chain so callers can
//! downcast and inspect the Salesforce error code.

use anyhow::{Context, Result};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::auth::Session;
use super::error::ApiError;
use super::models::{
    DescribeGlobal, LeadConvertOutcome, LeadConvertRequest, OrgLimits, QueryResponse, Record,
    SObjectDescribe, SaveResult,
};
use super::soap;

/// Maximum records per sObject Collections request
pub const COLLECTION_SIZE: usize = 200;

#[derive(Debug, Clone)]
pub struct SalesforceClient {
    http: reqwest::Client,
    session: Session,
    api_version: String,
}

impl SalesforceClient {
    pub fn new(http: reqwest::Client, session: Session, api_version: impl Into<String>) -> Self {
        Self {
            http,
            session,
            api_version: api_version.into(),
        }
    }

    pub fn instance_url(&self) -> &str {
        &self.session.instance_url
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    fn data_url(&self, path: &str) -> String {
        format!(
            "{}/services/data/v{}/{}",
            self.session.instance_url,
            self.api_version,
            path.trim_start_matches('/')
        )
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.session.access_token)
            .header("Accept", "application/json")
    }

    /// Send a request and decode the JSON body, mapping error statuses to ApiError
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T> {
        let response = request
            .send()
            .await
            .with_context(|| format!("Request failed: {}", what))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_body(status.as_u16(), &body))
                .with_context(|| format!("{} failed", what));
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to decode response of {}", what))
    }

    /// Run a SOQL query, following `nextRecordsUrl` until done
    pub async fn query_all(&self, soql: &str) -> Result<Vec<Value>> {
        log::debug!("SOQL: {}", soql);

        let url = format!("{}?q={}", self.data_url("query"), urlencoding::encode(soql));
        let mut page: QueryResponse = self.send(self.request(Method::GET, &url), "query").await?;
        let mut records = std::mem::take(&mut page.records);

        while !page.done {
            let Some(next) = page.next_records_url.take() else {
                break;
            };
            let url = format!("{}{}", self.session.instance_url, next);
            page = self.send(self.request(Method::GET, &url), "query page").await?;
            records.append(&mut page.records);
        }

        Ok(records)
    }

    /// `SELECT COUNT() FROM object`
    pub async fn count(&self, object: &str) -> Result<u64> {
        let soql = format!("SELECT COUNT() FROM {}", object);
        let url = format!("{}?q={}", self.data_url("query"), urlencoding::encode(&soql));
        let page: QueryResponse = self
            .send(self.request(Method::GET, &url), &format!("count {}", object))
            .await?;
        Ok(page.total_size)
    }

    pub async fn describe_global(&self) -> Result<DescribeGlobal> {
        self.send(
            self.request(Method::GET, &self.data_url("sobjects")),
            "describe global",
        )
        .await
    }

    /// Describe an object; `None` when the org does not have it
    pub async fn describe(&self, object: &str) -> Result<Option<SObjectDescribe>> {
        let url = self.data_url(&format!("sobjects/{}/describe", object));
        match self
            .send::<SObjectDescribe>(self.request(Method::GET, &url), &format!("describe {}", object))
            .await
        {
            Ok(describe) => Ok(Some(describe)),
            Err(e) if e.downcast_ref::<ApiError>().is_some_and(ApiError::is_not_found) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Create a single record, returning its ID
    pub async fn create(&self, object: &str, record: &Record) -> Result<String> {
        let url = self.data_url(&format!("sobjects/{}", object));
        let result: SaveResult = self
            .send(
                self.request(Method::POST, &url).json(record),
                &format!("create {}", object),
            )
            .await?;

        match result.id {
            Some(id) if result.success => Ok(id),
            _ => {
                let detail = result.first_error().cloned().unwrap_or_else(|| {
                    super::models::ApiErrorDetail {
                        status_code: String::new(),
                        message: "create returned no id".to_string(),
                        fields: Vec::new(),
                    }
                });
                Err(ApiError {
                    status: 200,
                    error_code: detail.status_code,
                    message: detail.message,
                }
                .into())
            }
        }
    }

    fn collection_body(object: &str, records: &[Record]) -> Value {
        let records: Vec<Value> = records
            .iter()
            .map(|record| {
                let mut with_type = Record::new();
                with_type.insert("attributes".to_string(), json!({ "type": object }));
                with_type.extend(record.iter().map(|(k, v)| (k.clone(), v.clone())));
                Value::Object(with_type)
            })
            .collect();

        json!({ "allOrNone": false, "records": records })
    }

    /// Insert records through sObject Collections, 200 per request
    ///
    /// A failed request fails only the records of its chunk; results of the
    /// chunks already accepted by the org are kept.
    pub async fn insert_collection(&self, object: &str, records: &[Record]) -> Result<Vec<SaveResult>> {
        let url = self.data_url("composite/sobjects");
        let mut results = Vec::with_capacity(records.len());

        for chunk in records.chunks(COLLECTION_SIZE) {
            let what = format!("insert {} {}", chunk.len(), object);
            let outcome = self
                .send(
                    self.request(Method::POST, &url)
                        .json(&Self::collection_body(object, chunk)),
                    &what,
                )
                .await;
            results.extend(chunk_outcome(outcome, chunk.len()));
        }

        Ok(results)
    }

    /// Upsert records keyed by an external-id field, 200 per request
    pub async fn upsert_collection(
        &self,
        object: &str,
        external_id_field: &str,
        records: &[Record],
    ) -> Result<Vec<SaveResult>> {
        let url = self.data_url(&format!("composite/sobjects/{}/{}", object, external_id_field));
        let mut results = Vec::with_capacity(records.len());

        for chunk in records.chunks(COLLECTION_SIZE) {
            let what = format!("upsert {} {}", chunk.len(), object);
            let outcome = self
                .send(
                    self.request(Method::PATCH, &url)
                        .json(&Self::collection_body(object, chunk)),
                    &what,
                )
                .await;
            results.extend(chunk_outcome(outcome, chunk.len()));
        }

        Ok(results)
    }

    /// Delete records by ID, 200 per request
    pub async fn delete_collection(&self, ids: &[String]) -> Result<Vec<SaveResult>> {
        let mut results = Vec::with_capacity(ids.len());

        for chunk in ids.chunks(COLLECTION_SIZE) {
            let url = format!(
                "{}?ids={}&allOrNone=false",
                self.data_url("composite/sobjects"),
                chunk.join(",")
            );
            let outcome = self
                .send(
                    self.request(Method::DELETE, &url),
                    &format!("delete {} records", chunk.len()),
                )
                .await;
            results.extend(chunk_outcome(outcome, chunk.len()));
        }

        Ok(results)
    }

    pub async fn limits(&self) -> Result<OrgLimits> {
        self.send(self.request(Method::GET, &self.data_url("limits")), "limits")
            .await
    }

    /// Identity of the authenticated user (`/services/oauth2/userinfo`)
    pub async fn user_info(&self) -> Result<Value> {
        let url = format!("{}/services/oauth2/userinfo", self.session.instance_url);
        self.send(self.request(Method::GET, &url), "user info").await
    }

    /// Create a custom field through the Tooling API
    ///
    /// `full_name` is `Object.Field__c`; `metadata` the CustomField metadata body.
    pub async fn create_custom_field(&self, full_name: &str, metadata: Value) -> Result<()> {
        let url = self.data_url("tooling/sobjects/CustomField");
        let body = json!({ "FullName": full_name, "Metadata": metadata });

        let _: Value = self
            .send(
                self.request(Method::POST, &url).json(&body),
                &format!("create field {}", full_name),
            )
            .await?;
        Ok(())
    }

    async fn soap_call(&self, path: &str, action: &str, envelope: String) -> Result<soap::SoapSaveResult> {
        let url = format!("{}/services/Soap/{}/{}", self.session.instance_url, path, self.api_version);
        let response = self
            .http
            .post(&url)
            .header("Content-Type", "text/xml; charset=UTF-8")
            .header("SOAPAction", action)
            .body(envelope)
            .send()
            .await
            .with_context(|| format!("SOAP {} request failed", action))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read SOAP {} response", action))?;
        soap::parse_save_response(status, &body)
    }

    /// Create a custom object through the Metadata API
    pub async fn create_custom_object(
        &self,
        full_name: &str,
        label: &str,
        plural_label: &str,
    ) -> Result<soap::SoapSaveResult> {
        let envelope = soap::create_custom_object_envelope(
            &self.session.access_token,
            full_name,
            label,
            plural_label,
        );
        self.soap_call("m", "createMetadata", envelope).await
    }

    /// Convert a Lead through the Partner API `convertLead` call
    pub async fn convert_lead(&self, request: &LeadConvertRequest) -> Result<LeadConvertOutcome> {
        let envelope = soap::convert_lead_envelope(&self.session.access_token, request);
        Ok(self.soap_call("u", "convertLead", envelope).await?.into())
    }
}

/// Per-record results of one collection request
///
/// When the request itself failed every record of the chunk gets a failed
/// result carrying the API error code.
fn chunk_outcome(outcome: Result<Vec<SaveResult>>, len: usize) -> Vec<SaveResult> {
    match outcome {
        Ok(results) => results,
        Err(e) => {
            log::error!("{:#}", e);
            failed_chunk(&e, len)
        }
    }
}

fn failed_chunk(err: &anyhow::Error, len: usize) -> Vec<SaveResult> {
    let code = match err.downcast_ref::<ApiError>() {
        Some(api) if !api.error_code.is_empty() => api.error_code.clone(),
        Some(api) if api.status == 429 => "REQUEST_LIMIT_EXCEEDED".to_string(),
        Some(api) if api.status >= 500 => "SERVER_UNAVAILABLE".to_string(),
        _ => "REQUEST_FAILED".to_string(),
    };
    let message = format!("{:#}", err);

    (0..len)
        .map(|_| SaveResult::failed(code.clone(), message.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> SalesforceClient {
        SalesforceClient::new(
            reqwest::Client::new(),
            Session {
                instance_url: "https://acme.my.salesforce.com".into(),
                access_token: "token".into(),
            },
            "59.0",
        )
    }

    #[test]
    fn test_data_url() {
        assert_eq!(
            client().data_url("/sobjects/Account/describe"),
            "https://acme.my.salesforce.com/services/data/v59.0/sobjects/Account/describe"
        );
    }

    #[test]
    fn test_collection_body_tags_records_with_type() {
        let mut record = Record::new();
        record.insert("Name".into(), json!("Acme"));

        let body = SalesforceClient::collection_body("Account", &[record]);

        assert_eq!(body["allOrNone"], json!(false));
        assert_eq!(body["records"][0]["attributes"]["type"], json!("Account"));
        assert_eq!(body["records"][0]["Name"], json!("Acme"));
    }

    /// Serve one canned HTTP response per connection, in order
    async fn serve(responses: Vec<(u16, String)>) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();

                let mut buf = Vec::new();
                let mut chunk = [0u8; 8192];
                loop {
                    let n = socket.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                    let text = String::from_utf8_lossy(&buf).to_string();
                    if let Some(end) = text.find("\r\n\r\n") {
                        let length = text[..end]
                            .lines()
                            .find_map(|line| {
                                let (name, value) = line.split_once(':')?;
                                name.eq_ignore_ascii_case("content-length")
                                    .then(|| value.trim().parse::<usize>().ok())
                                    .flatten()
                            })
                            .unwrap_or(0);
                        if buf.len() >= end + 4 + length {
                            break;
                        }
                    }
                }

                let response = format!(
                    "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });

        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_failed_chunk_keeps_results_of_accepted_chunks() {
        let created: Vec<Value> = (0..COLLECTION_SIZE)
            .map(|i| json!({ "id": format!("00T{:015}", i), "success": true, "errors": [] }))
            .collect();
        let instance_url = serve(vec![
            (200, Value::Array(created).to_string()),
            (
                503,
                r#"[{"message":"down","errorCode":"SERVER_UNAVAILABLE"}]"#.to_string(),
            ),
        ])
        .await;
        let client = SalesforceClient::new(
            reqwest::Client::builder().no_proxy().build().unwrap(),
            Session {
                instance_url,
                access_token: "token".into(),
            },
            "59.0",
        );
        let records: Vec<Record> = (0..250)
            .map(|i| {
                let mut record = Record::new();
                record.insert("Subject".into(), json!(format!("Call {}", i)));
                record
            })
            .collect();

        let results = client.insert_collection("Task", &records).await.unwrap();

        assert_eq!(results.len(), 250);
        assert!(results[..200].iter().all(|r| r.success && r.id.is_some()));
        assert!(results[200..].iter().all(|r| !r.success));
        assert_eq!(results[249].first_error().unwrap().status_code, "SERVER_UNAVAILABLE");
    }

    #[test]
    fn test_failed_chunk_codes() {
        let coded = anyhow::Error::from(ApiError::from_body(
            400,
            r#"[{"message":"bad","errorCode":"JSON_PARSER_ERROR"}]"#,
        ))
        .context("insert 2 Account failed");
        let results = failed_chunk(&coded, 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].first_error().unwrap().status_code, "JSON_PARSER_ERROR");
        assert!(results[0].first_error().unwrap().message.starts_with("insert 2 Account failed"));

        let throttled = anyhow::Error::from(ApiError::from_body(429, "slow down"));
        assert_eq!(
            failed_chunk(&throttled, 1)[0].first_error().unwrap().status_code,
            "REQUEST_LIMIT_EXCEEDED"
        );

        let reset = anyhow::anyhow!("connection reset");
        assert_eq!(failed_chunk(&reset, 1)[0].first_error().unwrap().status_code, "REQUEST_FAILED");
    }
}
