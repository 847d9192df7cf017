//! Typed HTTP clients for the Dogecoin blockchain indexer and the doginal
//! inscription indexer.
//!
//! Both clients share a single transport abstraction ([`HttpClient`]) and a
//! uniform bounded-retry request path ([`RemoteClient`]), so tests can
//! substitute canned responses for the whole stack.

pub mod chain;
pub mod http;
pub mod inscriptions;
pub mod types;

pub use crate::chain::ChainClient;
pub use crate::http::{
    HttpClient, HttpMethod, HttpRequest, HttpResponse, NetworkError, RemoteClient,
    ReqwestHttpClient, MAX_REQUEST_ATTEMPTS, RETRY_DELAY,
};
pub use crate::inscriptions::InscriptionClient;
pub use crate::types::{
    AddressBalance, BroadcastRequest, BroadcastResponse, Inscription, Outpoint,
    OutputInscriptions, TransactionInfo, TxSummary, Utxo,
};
