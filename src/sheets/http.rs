//! REST transport for a Sheets-v4-style values API.
//!
//! Obtaining the bearer token is left to the deployment; the token is passed
//! in ready to use.

use crate::sheets::range::SheetRange;
use crate::sheets::transport::{Rows, SheetTransport, TransportError, TransportFuture};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ValueRangeResponse {
    #[serde(default)]
    values: Rows,
}

#[derive(Debug, Serialize)]
struct ValueRangeBody<'a> {
    range: String,
    #[serde(rename = "majorDimension")]
    major_dimension: &'a str,
    values: Rows,
}

/// HTTP client bound to one spreadsheet
#[derive(Clone)]
pub struct HttpSheets {
    client: Client,
    base_url: String,
    spreadsheet_id: String,
    token: String,
}

impl HttpSheets {
    pub fn new(base_url: impl Into<String>, spreadsheet_id: impl Into<String>, token: impl Into<String>) -> Self {
        HttpSheets {
            client: Client::new(),
            base_url: base_url.into(),
            spreadsheet_id: spreadsheet_id.into(),
            token: token.into(),
        }
    }

    /// `{base}/{spreadsheet}/values/{range}{suffix}`, with the range
    /// percent-encoded as one path segment
    fn values_url(&self, range: &SheetRange, suffix: &str) -> Result<Url, TransportError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| TransportError::Protocol(format!("bad base url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| TransportError::Protocol("base url cannot carry a path".to_string()))?
            .push(&self.spreadsheet_id)
            .push("values")
            .push(&format!("{}{}", range, suffix));
        Ok(url)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, TransportError> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::BAD_REQUEST {
            return Err(TransportError::InvalidRange(body));
        }
        Err(TransportError::Unavailable(format!("{}: {}", status, body)))
    }

    fn body(range: &SheetRange, rows: Rows) -> ValueRangeBody<'static> {
        ValueRangeBody {
            range: range.to_string(),
            major_dimension: "ROWS",
            values: rows,
        }
    }
}

impl SheetTransport for HttpSheets {
    fn get<'a>(&'a self, range: &'a SheetRange) -> TransportFuture<'a, Rows> {
        Box::pin(async move {
            let url = self.values_url(range, "")?;
            debug!(%range, "sheets get");
            let request = self
                .client
                .get(url)
                .query(&[("valueRenderOption", "UNFORMATTED_VALUE")]);
            let response = self.send(request).await?;
            let parsed: ValueRangeResponse = response
                .json()
                .await
                .map_err(|e| TransportError::Protocol(e.to_string()))?;
            Ok(parsed.values)
        })
    }

    fn append<'a>(&'a self, range: &'a SheetRange, rows: Rows) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            let url = self.values_url(range, ":append")?;
            debug!(%range, rows = rows.len(), "sheets append");
            let request = self
                .client
                .post(url)
                .query(&[("valueInputOption", "RAW")])
                .json(&Self::body(range, rows));
            self.send(request).await?;
            Ok(())
        })
    }

    fn update<'a>(&'a self, range: &'a SheetRange, rows: Rows) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            let url = self.values_url(range, "")?;
            debug!(%range, rows = rows.len(), "sheets update");
            let request = self
                .client
                .put(url)
                .query(&[("valueInputOption", "RAW")])
                .json(&Self::body(range, rows));
            self.send(request).await?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_SHEETS_URL;

    #[test]
    fn test_values_url_encodes_range() {
        let sheets = HttpSheets::new(DEFAULT_SHEETS_URL, "abc123", "token");
        let url = sheets
            .values_url(&SheetRange::rows("New Callers", 2, 5), "")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/abc123/values/New%20Callers!2:5"
        );
    }

    #[test]
    fn test_append_suffix() {
        let sheets = HttpSheets::new(DEFAULT_SHEETS_URL, "abc123", "token");
        let url = sheets.values_url(&SheetRange::table("Requests"), ":append").unwrap();
        assert!(url.as_str().ends_with("/values/Requests:append"));
    }
}
