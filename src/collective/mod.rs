//! Paid queries against the collective knowledge base.
//!
//! Flow: one free preview per controller lifetime, then the paid endpoint.
//! A 402 response pauses the flow with a pending [`PaymentChallenge`] until
//! the user authorizes payment; `pay_and_search` signs an EIP-3009 transfer
//! authorization through the wallet seam and retries the same query with the
//! payment proof attached.
//!
//! The preview latch has no reset on purpose: the server's "limit" sentinel
//! means the free allotment is spent, and a fresh controller (app restart)
//! is the only way to try again.

use std::sync::{Arc, Mutex};

use chrono::Utc;

use crate::api::{CollectiveApi, QueryOutcome, QueryRequest, SearchResults};
use crate::config::Config;
use crate::effects::{Effect, EffectSink};
use crate::error::{ApiError, PaymentError, SearchError, WalletError};
use crate::payment::eip712::TypedData;
use crate::payment::{
    AuthorizationEnvelope, PaymentChallenge, PaymentPayload, TransferAuthorization, X402_VERSION,
    encode_payment_header,
};
use crate::wallet::WalletCapability;

/// Fallback transfer amount (0.05 USDC) when a challenge omits one.
const DEFAULT_AMOUNT: &str = "50000";

/// What a search produced.
#[derive(Debug, Clone)]
pub enum SearchOutcome {
    Results(SearchResults),
    /// The server wants payment; the challenge is pending on the controller
    /// until `pay_and_search` succeeds.
    PaymentRequired(PaymentChallenge),
}

/// Point-in-time copy of the flow state for rendering.
#[derive(Debug, Clone, Default)]
pub struct CollectiveSnapshot {
    pub results: Option<SearchResults>,
    pub payment_required: Option<PaymentChallenge>,
    pub preview_used: bool,
    pub last_query: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    results: Option<SearchResults>,
    payment_required: Option<PaymentChallenge>,
    preview_used: bool,
    last_query: Option<String>,
}

/// Owns the preview → 402 challenge → signed-authorization → result flow.
pub struct CollectiveController {
    api: Arc<dyn CollectiveApi>,
    wallet: Arc<dyn WalletCapability>,
    effects: Arc<dyn EffectSink>,
    asset: crate::config::AssetConfig,
    pay_to: String,
    query_limit: u32,
    state: Mutex<State>,
}

impl CollectiveController {
    pub fn new(
        api: Arc<dyn CollectiveApi>,
        wallet: Arc<dyn WalletCapability>,
        effects: Arc<dyn EffectSink>,
        config: &Config,
    ) -> Self {
        Self {
            api,
            wallet,
            effects,
            asset: config.asset.clone(),
            pay_to: config.pay_to.clone(),
            query_limit: config.query_limit,
            state: Mutex::new(State::default()),
        }
    }

    pub fn snapshot(&self) -> CollectiveSnapshot {
        self.state
            .lock()
            .map(|state| CollectiveSnapshot {
                results: state.results.clone(),
                payment_required: state.payment_required.clone(),
                preview_used: state.preview_used,
                last_query: state.last_query.clone(),
            })
            .unwrap_or_default()
    }

    /// The pending challenge, if the last search hit a 402.
    pub fn payment_required(&self) -> Option<PaymentChallenge> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.payment_required.clone())
    }

    /// Run a query: free preview first (until consumed), then the paid path.
    ///
    /// Prior results stay in place until new ones are adopted; only the
    /// pending challenge is invalidated by starting a new search.
    pub async fn search(&self, query: &str) -> Result<SearchOutcome, SearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let try_preview = {
            let Ok(mut state) = self.state.lock() else {
                return Err(SearchError::Rejected("state unavailable".into()));
            };
            state.last_query = Some(query.to_string());
            state.payment_required = None;
            !state.preview_used
        };

        if try_preview {
            let preview = self.api.preview(query).await?;
            if preview.success {
                let results = SearchResults::from_preview(preview);
                if let Ok(mut state) = self.state.lock() {
                    state.preview_used = true;
                    state.results = Some(results.clone());
                }
                self.effects.emit(Effect::Success);
                return Ok(SearchOutcome::Results(results));
            }
            if preview
                .error
                .as_deref()
                .is_some_and(|error| error.contains("limit"))
            {
                // Free allotment exhausted; fall through to the paid path
                // without surfacing the preview error.
                if let Ok(mut state) = self.state.lock() {
                    state.preview_used = true;
                }
                tracing::debug!("free preview limit reached; falling back to paid query");
            }
        }

        let request = QueryRequest {
            query: query.to_string(),
            limit: self.query_limit,
            synthesize: None,
        };
        match self.api.query(&request, None).await? {
            QueryOutcome::Success(results) => {
                if let Ok(mut state) = self.state.lock() {
                    state.results = Some(results.clone());
                }
                self.effects.emit(Effect::Success);
                Ok(SearchOutcome::Results(results))
            }
            QueryOutcome::PaymentRequired(header) => {
                let challenge = match header {
                    Some(header) => crate::payment::decode_challenge_header(&header),
                    None => PaymentChallenge::default(),
                };
                if let Ok(mut state) = self.state.lock() {
                    state.payment_required = Some(challenge.clone());
                }
                Ok(SearchOutcome::PaymentRequired(challenge))
            }
            QueryOutcome::Failed { body, .. } => Err(SearchError::Rejected(non_empty_or(
                body,
                "Search failed",
            ))),
        }
    }

    /// Authorize payment for the pending challenge and retry the query.
    ///
    /// Builds a time-boxed transfer authorization against the first offered
    /// payment option, signs it through the wallet, and resubmits the
    /// original query with the encoded proof. The challenge is consumed only
    /// on success; every failure leaves it pending so the user can retry.
    pub async fn pay_and_search(&self) -> Result<SearchResults, PaymentError> {
        let from = self.wallet.address().ok_or(PaymentError::WalletRequired)?;
        let (challenge, query) = {
            let Ok(state) = self.state.lock() else {
                return Err(PaymentError::NoPendingChallenge);
            };
            match (&state.payment_required, &state.last_query) {
                (Some(challenge), Some(query)) => (challenge.clone(), query.clone()),
                _ => return Err(PaymentError::NoPendingChallenge),
            }
        };
        let accepted = challenge
            .accepts
            .first()
            .cloned()
            .ok_or(PaymentError::NoPaymentOptions)?;
        let value = accepted
            .amount
            .clone()
            .unwrap_or_else(|| DEFAULT_AMOUNT.into());

        let authorization = TransferAuthorization::time_boxed(
            &from,
            &self.pay_to,
            &value,
            Utc::now().timestamp(),
        );
        let typed_data = TypedData::transfer_with_authorization(&self.asset, &authorization);
        let signature = self.wallet.sign_typed_data(&typed_data).await?;
        if signature.trim().is_empty() {
            return Err(PaymentError::Wallet(WalletError::EmptySignature));
        }

        // The authorization inside the signed document and inside the
        // submitted payload must be the same structure, field for field.
        let payload = PaymentPayload {
            x402_version: X402_VERSION,
            payload: AuthorizationEnvelope {
                authorization,
                signature,
            },
            resource: challenge.resource.clone(),
            accepted,
        };
        let header = encode_payment_header(&payload).map_err(ApiError::from)?;

        let request = QueryRequest {
            query,
            limit: self.query_limit,
            synthesize: Some(true),
        };
        match self.api.query(&request, Some(&header)).await? {
            QueryOutcome::Success(results) => {
                if let Ok(mut state) = self.state.lock() {
                    state.results = Some(results.clone());
                    state.payment_required = None;
                }
                self.effects.emit(Effect::Success);
                Ok(results)
            }
            QueryOutcome::PaymentRequired(_) => Err(PaymentError::VerificationFailed),
            QueryOutcome::Failed { body, .. } => Err(PaymentError::Rejected(non_empty_or(
                body,
                "Search failed",
            ))),
        }
    }
}

fn non_empty_or(body: String, fallback: &str) -> String {
    if body.trim().is_empty() {
        fallback.to_string()
    } else {
        body
    }
}
