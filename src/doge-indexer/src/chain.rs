//! Client for the blockchain indexer API: balances, unspent outputs,
//! history, and broadcast.

use crate::http::{HttpClient, NetworkError, RemoteClient};
use crate::types::{
    AddressBalance, BroadcastRequest, BroadcastResponse, TransactionInfo, TxSummary, Utxo,
};

pub struct ChainClient<C> {
    remote: RemoteClient<C>,
}

impl<C: HttpClient> ChainClient<C> {
    pub fn new(transport: C, base_url: impl Into<String>) -> Self {
        Self {
            remote: RemoteClient::new(transport, base_url),
        }
    }

    /// Full unspent set for an address. Failures here propagate: a funds
    /// query must never silently come back empty.
    pub async fn get_utxos(&self, address: &str) -> Result<Vec<Utxo>, NetworkError> {
        log::trace!("requesting UTXO list for address {address}");
        let utxos: Vec<Utxo> = self
            .remote
            .get_json(&format!("address/{address}/utxo"))
            .await?;
        log::debug!("indexer returned {} unspent outputs for {address}", utxos.len());

        Ok(utxos)
    }

    pub async fn get_balance(&self, address: &str) -> Result<AddressBalance, NetworkError> {
        self.remote
            .get_json(&format!("address/{address}/balance"))
            .await
    }

    pub async fn get_transactions(&self, address: &str) -> Result<Vec<TxSummary>, NetworkError> {
        self.remote.get_json(&format!("address/{address}/txs")).await
    }

    pub async fn get_transaction(&self, txid: &str) -> Result<TransactionInfo, NetworkError> {
        self.remote.get_json(&format!("tx/{txid}")).await
    }

    /// Submit a serialized signed transaction; returns the accepted txid.
    pub async fn broadcast(&self, hex: &str) -> Result<String, NetworkError> {
        log::info!("broadcasting transaction ({} bytes)", hex.len() / 2);
        let response: BroadcastResponse = self
            .remote
            .post_json(
                "tx",
                &BroadcastRequest {
                    hex: hex.to_string(),
                },
            )
            .await?;
        log::info!("transaction {} accepted by the indexer", response.txid);

        Ok(response.txid)
    }

    pub async fn tip_height(&self) -> Result<u64, NetworkError> {
        let text = self.remote.get_text("blocks/tip/height").await?;
        text.trim()
            .parse()
            .map_err(|err| NetworkError::Decode(format!("invalid tip height: {err}")))
    }

    pub async fn tip_hash(&self) -> Result<String, NetworkError> {
        Ok(self.remote.get_text("blocks/tip/hash").await?.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use crate::http::{HttpRequest, HttpResponse};

    use super::*;

    struct CannedTransport {
        body: &'static str,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl CannedTransport {
        fn new(body: &'static str) -> Self {
            Self {
                body,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    impl HttpClient for CannedTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, NetworkError> {
            self.requests.lock().unwrap().push(request);
            Ok(HttpResponse {
                status: 200,
                body: self.body.as_bytes().to_vec(),
                content_type: Some("application/json".to_string()),
            })
        }
    }

    #[tokio::test]
    async fn parses_utxo_list() {
        let body = r#"[
            {"txid": "aa", "vout": 0, "script": "76a9", "value": 100000000, "confirmations": 3},
            {"txid": "bb", "vout": 1, "script": "76a9", "value": 250000000, "confirmations": 9}
        ]"#;
        let client = ChainClient::new(CannedTransport::new(body), "http://localhost:8080");

        let utxos = client.get_utxos("DTestAddress").await.unwrap();

        assert_eq!(utxos.len(), 2);
        assert_eq!(utxos[1].value, 250_000_000);
    }

    #[tokio::test]
    async fn broadcast_posts_hex_and_returns_txid() {
        let client = ChainClient::new(
            CannedTransport::new(r#"{"txid": "feedface"}"#),
            "http://localhost:8080",
        );

        let txid = client.broadcast("0100beef").await.unwrap();

        assert_eq!(txid, "feedface");
        let requests = client.remote_requests();
        assert_eq!(requests.len(), 1);
        let body = requests[0].body.clone().unwrap();
        assert!(String::from_utf8(body).unwrap().contains("0100beef"));
    }

    #[tokio::test]
    async fn parses_tip_height_from_text() {
        let client = ChainClient::new(CannedTransport::new("5214623\n"), "http://localhost:8080");

        assert_eq!(client.tip_height().await.unwrap(), 5_214_623);
    }

    #[tokio::test]
    async fn trims_tip_hash() {
        let client = ChainClient::new(CannedTransport::new("deadbeef\n"), "http://localhost:8080");

        assert_eq!(client.tip_hash().await.unwrap(), "deadbeef");
    }

    struct FailingTransport;

    impl HttpClient for FailingTransport {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, NetworkError> {
            Ok(HttpResponse {
                status: 503,
                body: b"unavailable".to_vec(),
                content_type: None,
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn utxo_fetch_failures_propagate() {
        // unlike inscription lookups, a funds query must surface the outage
        let client = ChainClient::new(FailingTransport, "http://localhost:8080");

        let err = client.get_utxos("DTestAddress").await.unwrap_err();

        assert_eq!(err.status(), Some(503));
    }

    #[tokio::test]
    async fn parses_transaction_info() {
        let body = r#"{"txid": "aa", "confirmations": 2, "block_height": 5214600}"#;
        let client = ChainClient::new(CannedTransport::new(body), "http://localhost:8080");

        let info = client.get_transaction("aa").await.unwrap();

        assert_eq!(info.confirmations, 2);
        assert_eq!(info.block_height, Some(5_214_600));
        assert_eq!(info.hex, None);
    }

    impl ChainClient<CannedTransport> {
        fn remote_requests(&self) -> Vec<HttpRequest> {
            self.remote_transport().requests.lock().unwrap().clone()
        }

        fn remote_transport(&self) -> &CannedTransport {
            // test-only peek at the transport behind the retry layer
            &self.remote.transport
        }
    }
}
