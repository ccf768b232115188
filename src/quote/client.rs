//! HTTP client for the routing service
//!
//! Every public entry point returns `Option`: failures are logged and counted
//! here and never escape to the caller. Cancellation is silent.

use crate::config::{EngineConfig, FeeConfig, QuoteConfig};
use crate::metrics::{metrics, Timer};
use crate::observability::CorrelationId;
use crate::quote::compare::DexComparison;
use crate::quote::response::{ComparisonResponse, QuoteResponse, Rejection};
use crate::trade::{
    PriceImpact, PriceImpactSeverity, PriceImpactThresholds, SolanaContext, Trade, TradeParts,
};
use crate::types::{ChainId, Currency, CurrencyAmount, TradeType};
use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use solana_sdk::{pubkey::Pubkey, signature::Keypair, signer::Signer};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

const EVM_ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Parameters of one quote
#[derive(Debug, Clone)]
pub struct QuoteRequest {
    pub base_url: String,
    pub amount_in: CurrencyAmount,
    pub currency_out: Currency,
    pub save_gas: bool,
    /// Comma-separated venue filter
    pub dexes: Option<String>,
    pub slippage_bips: u32,
    /// Unix seconds
    pub deadline: Option<u64>,
    pub recipient: Option<String>,
    pub fee_config: Option<FeeConfig>,
}

#[derive(Debug, Error)]
pub enum QuoteError {
    #[error("Quote aborted")]
    Aborted,

    #[error("Currency has no routing address")]
    Unresolvable,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Routing service returned status {0}")]
    Status(u16),

    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Response rejected: {}", .0.as_str())]
    Rejected(Rejection),

    #[error("Invalid Solana key: {0}")]
    InvalidKey(String),
}

impl QuoteError {
    /// Label used for `quote_failures_total{kind}`
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Aborted => "aborted",
            Self::Unresolvable => "unresolvable",
            Self::Http(_) => "http",
            Self::Status(_) => "status",
            Self::Decode(_) => "decode",
            Self::Rejected(r) => r.as_str(),
            Self::InvalidKey(_) => "invalid_key",
        }
    }
}

pub struct QuoteClient {
    http: reqwest::Client,
    config: QuoteConfig,
    fees: Option<FeeConfig>,
    price_impact: PriceImpactThresholds,
}

impl QuoteClient {
    pub fn new(config: QuoteConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self::with_client(http, config))
    }

    /// Client for `config.quote`, charging `config.fees` and warning on
    /// `config.price_impact`
    pub fn from_config(config: &EngineConfig) -> anyhow::Result<Self> {
        Ok(Self::new(config.quote.clone())?
            .with_fees(config.fees.clone())
            .with_price_impact(config.price_impact))
    }

    pub fn with_client(http: reqwest::Client, config: QuoteConfig) -> Self {
        Self {
            http,
            config,
            fees: None,
            price_impact: PriceImpactThresholds::default(),
        }
    }

    pub fn with_fees(mut self, fees: Option<FeeConfig>) -> Self {
        self.fees = fees;
        self
    }

    pub fn with_price_impact(mut self, thresholds: PriceImpactThresholds) -> Self {
        self.price_impact = thresholds;
        self
    }

    /// Request against the configured endpoint with the configured fee.
    /// Optional fields (`dexes`, `deadline`, `recipient`) start empty.
    pub fn request(
        &self,
        amount_in: CurrencyAmount,
        currency_out: Currency,
        slippage_bips: u32,
    ) -> QuoteRequest {
        QuoteRequest {
            base_url: self.config.base_url.clone(),
            amount_in,
            currency_out,
            save_gas: false,
            dexes: None,
            slippage_bips,
            deadline: None,
            recipient: None,
            fee_config: self.fees.clone(),
        }
    }

    /// Warning level of `trade` under the configured thresholds
    pub fn price_impact_severity(&self, trade: &Trade) -> PriceImpactSeverity {
        trade.price_impact().severity(&self.price_impact)
    }

    pub fn config(&self) -> &QuoteConfig {
        &self.config
    }

    /// Configured minimum quote duration
    pub fn min_load(&self) -> Duration {
        Duration::from_millis(self.config.min_loading_ms)
    }

    /// Best exact-input trade for `req`, or `None`.
    ///
    /// The call takes at least `min_load`. Cancelling `cancel` ends it
    /// immediately without logging.
    pub async fn best_trade_exact_in(
        &self,
        req: &QuoteRequest,
        cancel: &CancellationToken,
        min_load: Duration,
    ) -> Option<Trade> {
        let correlation_id = CorrelationId::new();
        match self.try_best_trade(req, cancel, min_load, &correlation_id).await {
            Ok(trade) => Some(trade),
            Err(QuoteError::Aborted) => {
                metrics().quote_aborted_total.inc();
                None
            }
            Err(e) => {
                error!(
                    correlation_id = %correlation_id,
                    currency_in = %req.amount_in.currency.symbol(),
                    currency_out = %req.currency_out.symbol(),
                    amount_in = %req.amount_in.raw,
                    slippage_bips = req.slippage_bips,
                    save_gas = req.save_gas,
                    kind = e.kind(),
                    error = %e,
                    "Quote request failed"
                );
                metrics().quote_failed(e.kind());
                None
            }
        }
    }

    async fn try_best_trade(
        &self,
        req: &QuoteRequest,
        cancel: &CancellationToken,
        min_load: Duration,
        correlation_id: &CorrelationId,
    ) -> Result<Trade, QuoteError> {
        let token_in = req
            .amount_in
            .currency
            .routing_address()
            .ok_or(QuoteError::Unresolvable)?;
        let token_out = req
            .currency_out
            .routing_address()
            .ok_or(QuoteError::Unresolvable)?;

        let chain = req.amount_in.currency.chain();
        let program_state = chain.is_solana().then(Keypair::new);

        let mut params = vec![
            ("tokenIn", token_in),
            ("tokenOut", token_out),
            ("amountIn", req.amount_in.raw.to_string()),
            ("saveGas", flag(req.save_gas)),
            ("gasInclude", flag(req.save_gas)),
            ("slippageTolerance", req.slippage_bips.to_string()),
            ("to", recipient_or_zero(chain, req.recipient.as_deref())),
            ("clientData", self.client_data()),
        ];
        if let Some(dexes) = req.dexes.as_ref().filter(|d| !d.is_empty()) {
            params.push(("dexes", dexes.clone()));
        }
        if let Some(deadline) = req.deadline {
            params.push(("deadline", deadline.to_string()));
        }
        if let Some(fee) = &req.fee_config {
            params.push(("chargeFeeBy", fee.charge_fee_by.as_str().to_string()));
            params.push(("feeReceiver", fee.fee_receiver.clone()));
            params.push(("isInBps", flag(fee.is_in_bps)));
            params.push(("feeAmount", fee.fee_amount.clone()));
        }
        if let Some(state) = &program_state {
            params.push(("programState", state.pubkey().to_string()));
        }

        debug!(correlation_id = %correlation_id, url = %req.base_url, "Requesting quote");
        metrics().quote_requests_total.inc();
        let timer = Timer::new();

        let resp: QuoteResponse = self
            .fetch_with_min_load(&req.base_url, &params, correlation_id, cancel, min_load)
            .await?;
        timer.observe_duration(&metrics().quote_latency);

        resp.check().map_err(QuoteError::Rejected)?;

        let solana = match program_state {
            Some(program_state) => Some(solana_context(&resp, req, program_state)?),
            None => None,
        };

        let price_impact = PriceImpact::from_usd(resp.amount_in_usd, resp.amount_out_usd);
        let severity = price_impact.severity(&self.price_impact);
        if matches!(severity, PriceImpactSeverity::High | PriceImpactSeverity::VeryHigh) {
            warn!(
                correlation_id = %correlation_id,
                price_impact = price_impact.as_sentinel(),
                severity = ?severity,
                "High price impact quote"
            );
        }

        Ok(Trade::from_parts(TradeParts {
            trade_type: TradeType::ExactIn,
            input_amount: CurrencyAmount::new(req.amount_in.currency.clone(), resp.input_amount),
            output_amount: CurrencyAmount::new(req.currency_out.clone(), resp.output_amount),
            swaps: resp
                .swaps
                .into_iter()
                .map(|route| route.into_iter().map(Into::into).collect())
                .collect(),
            tokens: resp.tokens.into_iter().map(|(k, v)| (k, v.into())).collect(),
            amount_in_usd: resp.amount_in_usd,
            amount_out_usd: resp.amount_out_usd,
            received_usd: resp.received_usd,
            gas_usd: resp.gas_usd,
            price_impact,
            encoded_swap_data: resp.encoded_swap_data,
            router_address: resp.router_address,
            solana,
        }))
    }

    /// Quote the same trade on the reference venue alone.
    ///
    /// Independent of [`Self::best_trade_exact_in`]: a failure here never
    /// affects the main quote.
    pub async fn compare_dex(
        &self,
        base_url: &str,
        amount_in: &CurrencyAmount,
        currency_out: &Currency,
        cancel: &CancellationToken,
    ) -> Option<DexComparison> {
        let correlation_id = CorrelationId::new();
        match self
            .try_compare(base_url, amount_in, currency_out, cancel, &correlation_id)
            .await
        {
            Ok(comparison) => Some(comparison),
            Err(QuoteError::Aborted) => {
                metrics().quote_aborted_total.inc();
                None
            }
            Err(e) => {
                error!(
                    correlation_id = %correlation_id,
                    venue = %self.config.reference_venue,
                    currency_in = %amount_in.currency.symbol(),
                    currency_out = %currency_out.symbol(),
                    amount_in = %amount_in.raw,
                    error = %e,
                    "Reference venue comparison failed"
                );
                metrics().quote_failed(e.kind());
                None
            }
        }
    }

    async fn try_compare(
        &self,
        base_url: &str,
        amount_in: &CurrencyAmount,
        currency_out: &Currency,
        cancel: &CancellationToken,
        correlation_id: &CorrelationId,
    ) -> Result<DexComparison, QuoteError> {
        let token_in = amount_in
            .currency
            .routing_address()
            .ok_or(QuoteError::Unresolvable)?;
        let token_out = currency_out
            .routing_address()
            .ok_or(QuoteError::Unresolvable)?;

        let params = vec![
            ("tokenIn", token_in),
            ("tokenOut", token_out),
            ("amountIn", amount_in.raw.to_string()),
            ("saveGas", flag(false)),
            ("gasInclude", flag(true)),
            ("dexes", self.config.reference_venue.clone()),
            ("clientData", self.client_data()),
        ];

        let resp: ComparisonResponse = self
            .fetch_with_min_load(base_url, &params, correlation_id, cancel, Duration::ZERO)
            .await?;
        if resp.input_amount == 0 || resp.output_amount == 0 {
            return Err(QuoteError::Rejected(Rejection::ZeroAmount));
        }

        Ok(DexComparison {
            input_amount: CurrencyAmount::new(amount_in.currency.clone(), resp.input_amount),
            output_amount: CurrencyAmount::new(currency_out.clone(), resp.output_amount),
            amount_in_usd: resp.amount_in_usd,
            amount_out_usd: resp.amount_out_usd,
            received_usd: resp.received_usd,
            compared_dex: self.config.reference_venue.clone(),
        })
    }

    /// Request and `min_load` sleep run jointly; cancellation wins any tie
    async fn fetch_with_min_load<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&'static str, String)],
        correlation_id: &CorrelationId,
        cancel: &CancellationToken,
        min_load: Duration,
    ) -> Result<T, QuoteError> {
        let joined = async {
            let (result, _) = tokio::join!(
                self.fetch(url, params, correlation_id),
                tokio::time::sleep(min_load)
            );
            result
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(QuoteError::Aborted),
            result = joined => result,
        };

        if cancel.is_cancelled() {
            return Err(QuoteError::Aborted);
        }
        result
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&'static str, String)],
        correlation_id: &CorrelationId,
    ) -> Result<T, QuoteError> {
        let resp = self
            .http
            .get(url)
            .query(params)
            .header("X-Request-Id", correlation_id.as_str())
            .header("Accept-Version", self.config.api_version.as_str())
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(QuoteError::Status(status.as_u16()));
        }

        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    fn client_data(&self) -> String {
        serde_json::json!({ "source": self.config.client_data }).to_string()
    }
}

fn flag(value: bool) -> String {
    let s = if value { "1" } else { "0" };
    s.to_string()
}

fn recipient_or_zero(chain: ChainId, recipient: Option<&str>) -> String {
    match (recipient.filter(|r| !r.trim().is_empty()), chain) {
        (Some(r), ChainId::Evm(_)) => r.trim().to_lowercase(),
        (Some(r), ChainId::Solana) => r.trim().to_string(),
        (None, ChainId::Evm(_)) => EVM_ZERO_ADDRESS.to_string(),
        (None, ChainId::Solana) => Pubkey::default().to_string(),
    }
}

fn parse_key(s: &str) -> Result<Pubkey, QuoteError> {
    Pubkey::from_str(s.trim()).map_err(|_| QuoteError::InvalidKey(s.to_string()))
}

fn solana_context(
    resp: &QuoteResponse,
    req: &QuoteRequest,
    program_state: Keypair,
) -> Result<SolanaContext, QuoteError> {
    let to = match req.recipient.as_deref().filter(|r| !r.trim().is_empty()) {
        Some(r) => parse_key(r)?,
        None => Pubkey::default(),
    };

    let serum_open_orders_by_market = resp
        .serum_open_orders_account_by_market
        .iter()
        .flatten()
        .map(|(market, placeholder)| Ok((parse_key(market)?, parse_key(placeholder)?)))
        .collect::<Result<HashMap<_, _>, QuoteError>>()?;

    Ok(SolanaContext {
        to,
        program_state,
        encoded_message: resp.encoded_message.clone().unwrap_or_default(),
        serum_open_orders_by_market,
    })
}

/// Last-write-wins quote holder.
///
/// A refresh cancels whatever request is still in flight; a superseded
/// response is discarded and never replaces the current trade.
pub struct QuoteSession {
    client: Arc<QuoteClient>,
    in_flight: Mutex<CancellationToken>,
    current: ArcSwapOption<Trade>,
}

impl QuoteSession {
    pub fn new(client: Arc<QuoteClient>) -> Self {
        Self {
            client,
            in_flight: Mutex::new(CancellationToken::new()),
            current: ArcSwapOption::empty(),
        }
    }

    /// Requote; returns the stored trade, or `None` if superseded or failed
    pub async fn refresh(&self, req: &QuoteRequest, min_load: Duration) -> Option<Arc<Trade>> {
        let token = {
            let mut in_flight = self.in_flight.lock();
            in_flight.cancel();
            *in_flight = CancellationToken::new();
            in_flight.clone()
        };

        let trade = self
            .client
            .best_trade_exact_in(req, &token, min_load)
            .await
            .map(Arc::new);

        // the lock orders this check against a newer refresh's cancel
        let _in_flight = self.in_flight.lock();
        if token.is_cancelled() {
            return None;
        }
        self.current.store(trade.clone());
        trade
    }

    pub fn current(&self) -> Option<Arc<Trade>> {
        self.current.load_full()
    }

    /// Abort the in-flight request, if any
    pub fn cancel(&self) {
        self.in_flight.lock().cancel();
    }
}
