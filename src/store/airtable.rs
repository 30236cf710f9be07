use std::time::Duration;

use reqwest::{Client, RequestBuilder, Url};
use serde::Serialize;
use serde_json::{Map, Value};

use super::{RecordPage, RecordStore, StoreError};
use crate::config::StoreCredentials;

const USER_AGENT: &str = "event-harvest/0.1";

/// The hosted table, spoken to over its REST API.
pub struct AirtableStore {
    client: Client,
    endpoint: String,
    token: String,
    view: Option<String>,
}

#[derive(Serialize)]
struct CreateBody<'a> {
    records: Vec<FieldsBody<'a>>,
    typecast: bool,
}

#[derive(Serialize)]
struct FieldsBody<'a> {
    fields: &'a Map<String, Value>,
}

impl AirtableStore {
    pub fn new(credentials: &StoreCredentials, view: Option<String>) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| StoreError::Http(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: credentials.endpoint(),
            token: credentials.token.clone(),
            view,
        })
    }

    fn list_url(&self, offset: Option<&str>) -> Result<Url, StoreError> {
        let mut url =
            Url::parse(&self.endpoint).map_err(|err| StoreError::Http(err.to_string()))?;
        if offset.is_some() || self.view.is_some() {
            let mut query = url.query_pairs_mut();
            if let Some(offset) = offset {
                query.append_pair("offset", offset);
            }
            if let Some(view) = &self.view {
                query.append_pair("view", view);
            }
        }
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<String, StoreError> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|err| StoreError::Http(err.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| StoreError::Http(err.to_string()))?;

        if !status.is_success() {
            return Err(StoreError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

impl RecordStore for AirtableStore {
    async fn list_page(&self, offset: Option<&str>) -> Result<RecordPage, StoreError> {
        let url = self.list_url(offset)?;
        let body = self.send(self.client.get(url)).await?;
        serde_json::from_str(&body).map_err(|err| StoreError::Decode(err.to_string()))
    }

    async fn create_records(
        &self,
        records: &[Map<String, Value>],
        typecast: bool,
    ) -> Result<(), StoreError> {
        let body = CreateBody {
            records: records.iter().map(|fields| FieldsBody { fields }).collect(),
            typecast,
        };
        self.send(self.client.post(&self.endpoint).json(&body))
            .await
            .map(|_| ())
    }

    async fn update_record(&self, id: &str, fields: &Map<String, Value>) -> Result<(), StoreError> {
        let url = format!("{}/{}", self.endpoint, id);
        self.send(self.client.patch(url).json(&FieldsBody { fields }))
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(view: Option<&str>) -> AirtableStore {
        let creds = StoreCredentials {
            api_url: "https://api.airtable.com/v0".into(),
            token: "key".into(),
            base_id: "appBase".into(),
            table_id: "tblEvents".into(),
        };
        AirtableStore::new(&creds, view.map(str::to_string)).expect("client")
    }

    #[test]
    fn list_url_carries_cursor_and_view() {
        let url = store(Some("Grid view"))
            .list_url(Some("itr123/rec456"))
            .expect("url");
        assert_eq!(
            url.as_str(),
            "https://api.airtable.com/v0/appBase/tblEvents?offset=itr123%2Frec456&view=Grid+view"
        );
        let first = store(None).list_url(None).expect("url");
        assert_eq!(first.query(), None);
    }

    #[test]
    fn decodes_a_list_page() {
        let body = r#"{
            "records": [
                {"id": "rec1", "createdTime": "2024-10-01T10:00:00.000Z",
                 "fields": {"url": "https://xceed.me/e/123456", "remain_prices": "12.0"}},
                {"id": "rec2", "createdTime": "2024-10-01T10:00:00.000Z", "fields": {}}
            ],
            "offset": "itr1/rec2"
        }"#;
        let page: RecordPage = serde_json::from_str(body).expect("page");
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.records[0].url(), Some("https://xceed.me/e/123456"));
        assert_eq!(page.records[1].url(), None);
        assert_eq!(page.offset.as_deref(), Some("itr1/rec2"));

        let last: RecordPage = serde_json::from_str(r#"{"records": []}"#).expect("page");
        assert_eq!(last.offset, None);
    }

    #[test]
    fn create_body_wraps_fields() {
        let mut fields = Map::new();
        fields.insert("url".into(), Value::String("u".into()));
        let body = CreateBody {
            records: vec![FieldsBody { fields: &fields }],
            typecast: true,
        };
        assert_eq!(
            serde_json::to_value(&body).expect("json"),
            serde_json::json!({"records": [{"fields": {"url": "u"}}], "typecast": true})
        );
    }
}
