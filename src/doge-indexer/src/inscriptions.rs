//! Client for the doginal inscription indexer.

use crate::http::{HttpClient, NetworkError, RemoteClient};
use crate::types::{Inscription, Outpoint, OutputInscriptions};

pub struct InscriptionClient<C> {
    remote: RemoteClient<C>,
}

impl<C: HttpClient> InscriptionClient<C> {
    pub fn new(transport: C, base_url: impl Into<String>) -> Self {
        Self {
            remote: RemoteClient::new(transport, base_url),
        }
    }

    /// Inscription ids attached to an outpoint. A 404 means the outpoint is
    /// clean. Lookup failures also map to `None`: absence of inscription
    /// data must never block a funds query, unlike the balance/UTXO path
    /// where failures propagate.
    pub async fn get_output(&self, outpoint: &Outpoint) -> Option<OutputInscriptions> {
        match self
            .remote
            .get_json::<OutputInscriptions>(&format!("output/{outpoint}"))
            .await
        {
            Ok(output) => Some(output),
            Err(err) if err.status() == Some(404) => None,
            Err(err) => {
                log::warn!("inscription lookup for {outpoint} failed, treating as not inscribed: {err}");
                None
            }
        }
    }

    /// Raw inscription content plus the content type the indexer reported.
    pub async fn get_content(&self, id: &str) -> Result<(Vec<u8>, Option<String>), NetworkError> {
        let response = self.remote.get_raw(&format!("content/{id}")).await?;
        Ok((response.body, response.content_type))
    }

    /// Raw metadata page for an inscription. Parsing it is the caller's job.
    pub async fn get_metadata(&self, id: &str) -> Result<String, NetworkError> {
        self.remote.get_text(&format!("shibescription/{id}")).await
    }

    pub async fn fetch_inscription(
        &self,
        id: &str,
        outpoint: Outpoint,
    ) -> Result<Inscription, NetworkError> {
        let (content, content_type) = self.get_content(id).await?;

        Ok(Inscription {
            id: id.to_string(),
            outpoint,
            content_type: content_type.unwrap_or_else(|| "application/octet-stream".to_string()),
            content,
            sequence_number: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::http::{HttpRequest, HttpResponse};

    use super::*;

    struct FixedStatusTransport {
        status: u16,
        body: &'static str,
    }

    impl HttpClient for FixedStatusTransport {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, NetworkError> {
            Ok(HttpResponse {
                status: self.status,
                body: self.body.as_bytes().to_vec(),
                content_type: Some("application/json".to_string()),
            })
        }
    }

    fn outpoint() -> Outpoint {
        Outpoint::new("aa".repeat(32), 0)
    }

    #[tokio::test(start_paused = true)]
    async fn inscribed_output_reports_its_ids() {
        let client = InscriptionClient::new(
            FixedStatusTransport {
                status: 200,
                body: r#"{"inscriptions": ["abc123i0"]}"#,
            },
            "http://localhost:8080",
        );

        let output = client.get_output(&outpoint()).await.unwrap();

        assert_eq!(output.inscriptions, vec!["abc123i0".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_output_is_not_inscribed() {
        let client = InscriptionClient::new(
            FixedStatusTransport {
                status: 404,
                body: "not found",
            },
            "http://localhost:8080",
        );

        assert!(client.get_output(&outpoint()).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn indexer_outage_is_treated_as_not_inscribed() {
        let client = InscriptionClient::new(
            FixedStatusTransport {
                status: 503,
                body: "unavailable",
            },
            "http://localhost:8080",
        );

        assert!(client.get_output(&outpoint()).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_inscription_combines_content_and_location() {
        let client = InscriptionClient::new(
            FixedStatusTransport {
                status: 200,
                body: "much doge",
            },
            "http://localhost:8080",
        );

        let inscription = client
            .fetch_inscription("abc123i0", outpoint())
            .await
            .unwrap();

        assert_eq!(inscription.content, b"much doge");
        assert_eq!(inscription.content_type, "application/json");
        assert_eq!(inscription.outpoint, outpoint());
    }

    #[tokio::test(start_paused = true)]
    async fn content_fetch_failures_propagate() {
        let client = InscriptionClient::new(
            FixedStatusTransport {
                status: 503,
                body: "unavailable",
            },
            "http://localhost:8080",
        );

        let err = client.get_content("abc123i0").await.unwrap_err();

        assert_eq!(err.status(), Some(503));
    }
}
