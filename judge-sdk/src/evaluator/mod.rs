//! Evaluation orchestrator
//!
//! `Evaluator` is the public entry point. It renders the judge prompt, routes
//! it through the [`FallbackCoordinator`], parses whatever comes back and
//! aggregates the scores. Batches share one FIFO semaphore, and every request
//! runs under a child of the evaluator's root cancellation token so `close()`
//! reaches all in-flight work.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::aggregate::{aggregate, AggregatedResult};
use crate::config::{JudgeConfig, ServiceConfig};
use crate::core::{InvokeParameters, JudgeRequest, RawReply};
use crate::criteria::CriteriaSet;
use crate::error::{JudgeError, Result};
use crate::fallback::{cache_key, FallbackCoordinator, FallbackResponse};
use crate::parser::{ResponseParser, Winner};
use crate::prompts::{build_comparison_messages, build_evaluation_messages};
use crate::resilience::{ProviderHealth, TokioClock};
use crate::util::generate_request_id;

/// Evaluator tuning
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatorConfig {
    /// Upper bound on concurrently running batch items
    pub max_concurrency: usize,
    /// Sampling parameters sent with every judge call
    pub parameters: InvokeParameters,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            parameters: InvokeParameters::default(),
        }
    }
}

/// One item to evaluate
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationRequest {
    pub candidate: String,
    /// Original question or task the candidate answers
    pub context: Option<String>,
    pub criteria: CriteriaSet,
}

impl EvaluationRequest {
    pub fn new(candidate: impl Into<String>, criteria: CriteriaSet) -> Self {
        Self {
            candidate: candidate.into(),
            context: None,
            criteria,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// Outcome of a pairwise comparison
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonResult {
    pub winner: Winner,
    pub reasoning: String,
    pub confidence: f64,
    pub served_by: String,
    pub degraded: bool,
}

/// LLM-as-judge evaluator
pub struct Evaluator {
    coordinator: Arc<FallbackCoordinator>,
    semaphore: Arc<Semaphore>,
    root: CancellationToken,
    closed: AtomicBool,
    parser: ResponseParser,
    parameters: InvokeParameters,
}

impl std::fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evaluator")
            .field("coordinator", &self.coordinator)
            .field("available_permits", &self.semaphore.available_permits())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Evaluator {
    pub fn new(coordinator: FallbackCoordinator, config: EvaluatorConfig) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
            semaphore: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            root: CancellationToken::new(),
            closed: AtomicBool::new(false),
            parser: ResponseParser::new(),
            parameters: config.parameters,
        }
    }

    /// Validate `config` and build every provider it names
    pub fn from_config(config: &JudgeConfig) -> Result<Self> {
        config.validate()?;
        let coordinator = FallbackCoordinator::from_config(config, Arc::new(TokioClock))?;
        Ok(Self::new(
            coordinator,
            EvaluatorConfig {
                max_concurrency: config.max_concurrency,
                parameters: InvokeParameters::default(),
            },
        ))
    }

    /// Shorthand for [`JudgeConfig::from_env`] followed by [`Evaluator::from_config`]
    pub fn from_env() -> Result<Self> {
        Self::from_config(&JudgeConfig::from_env()?)
    }

    pub fn with_parser(mut self, parser: ResponseParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Breaker state of every provider, in priority order
    pub fn health(&self) -> Vec<ProviderHealth> {
        self.coordinator.health()
    }

    /// Score `candidate` against `criteria`
    pub async fn evaluate(&self, candidate: &str, criteria: &CriteriaSet) -> Result<AggregatedResult> {
        self.evaluate_request(EvaluationRequest::new(candidate, criteria.clone()))
            .await
    }

    /// Score one request, including its optional context
    pub async fn evaluate_request(&self, request: EvaluationRequest) -> Result<AggregatedResult> {
        self.ensure_open()?;
        let cancel = self.root.child_token();
        self.run_evaluation(request, &cancel).await
    }

    /// Ask the judge which of two responses is better
    pub async fn compare(&self, a: &str, b: &str) -> Result<ComparisonResult> {
        self.compare_with_context(a, b, None).await
    }

    pub async fn compare_with_context(
        &self,
        a: &str,
        b: &str,
        context: Option<&str>,
    ) -> Result<ComparisonResult> {
        self.ensure_open()?;
        let cancel = self.root.child_token();
        let request_id = generate_request_id();

        async {
            let request =
                JudgeRequest::new(build_comparison_messages(a, b, context)).with_parameters(self.parameters.clone());
            let key = cache_key(&request);
            let response = self.execute(request, &key, &cancel).await?;
            let (reply, served_by, degraded, factor) = self.unwrap_reply(response)?;

            let verdict = self.parser.parse_comparison(&reply.text);
            let confidence = if degraded {
                verdict.confidence * factor
            } else {
                verdict.confidence
            };

            info!(winner = %verdict.winner, confidence, served_by = %served_by, "Comparison complete");
            Ok(ComparisonResult {
                winner: verdict.winner,
                reasoning: verdict.reasoning,
                confidence,
                served_by,
                degraded,
            })
        }
        .instrument(info_span!("compare", request_id = %request_id))
        .await
    }

    /// Evaluate many requests, at most `max_concurrency` at a time
    ///
    /// Results come back in request order. Cancelling `cancel` (or closing the
    /// evaluator) stops queued items and interrupts in-flight ones; each of
    /// those reports [`JudgeError::Cancelled`].
    pub async fn evaluate_batch(
        &self,
        requests: Vec<EvaluationRequest>,
        cancel: &CancellationToken,
    ) -> Vec<Result<AggregatedResult>> {
        if let Err(e) = self.ensure_open() {
            return requests.iter().map(|_| Err(e.clone())).collect();
        }

        let batch = self.root.child_token();
        info!(size = requests.len(), "Starting evaluation batch");

        let tasks = requests.into_iter().map(|request| {
            let token = batch.child_token();
            let semaphore = Arc::clone(&self.semaphore);
            async move {
                let _permit = tokio::select! {
                    permit = semaphore.acquire_owned() => permit.map_err(|_| JudgeError::Closed)?,
                    _ = token.cancelled() => return Err(self.cancelled_error()),
                };
                self.run_evaluation(request, &token).await
            }
        });

        let mut all = Box::pin(join_all(tasks));
        loop {
            tokio::select! {
                results = &mut all => return results,
                _ = cancel.cancelled(), if !batch.is_cancelled() => {
                    warn!("Evaluation batch cancelled by caller");
                    batch.cancel();
                }
            }
        }
    }

    /// Cancel in-flight work and release providers
    ///
    /// Idempotent. Every later call returns [`JudgeError::Closed`].
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Closing evaluator");
        self.root.cancel();
        self.semaphore.close();
        self.coordinator.close().await;
    }

    async fn run_evaluation(
        &self,
        request: EvaluationRequest,
        cancel: &CancellationToken,
    ) -> Result<AggregatedResult> {
        let request_id = generate_request_id();

        async {
            let EvaluationRequest {
                candidate,
                context,
                criteria,
            } = request;

            let judge_request = JudgeRequest::new(build_evaluation_messages(&candidate, context.as_deref(), &criteria))
                .with_parameters(self.parameters.clone());
            let key = cache_key(&judge_request);
            let response = self.execute(judge_request, &key, cancel).await?;
            let (reply, served_by, degraded, factor) = self.unwrap_reply(response)?;

            let parsed = self.parser.parse(&reply.text, &criteria);
            let mut result = aggregate(&parsed.scores, &criteria)
                .with_narrative(&parsed)
                .with_source(served_by, degraded);
            if degraded {
                result = result.discount_confidence(factor);
            }

            info!(
                overall_score = result.overall_score,
                confidence = result.confidence,
                served_by = %result.served_by,
                degraded = result.degraded,
                strategy = ?result.parse_strategy,
                "Evaluation complete"
            );
            Ok(result)
        }
        .instrument(info_span!("evaluate", request_id = %request_id))
        .await
    }

    async fn execute(
        &self,
        request: JudgeRequest,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<FallbackResponse<RawReply>> {
        self.coordinator
            .execute(request, key, cancel)
            .await
            .map_err(|e| match e {
                JudgeError::Cancelled => self.cancelled_error(),
                other => other,
            })
    }

    /// Split a coordinator response into reply, source, degraded flag and confidence factor
    fn unwrap_reply(&self, response: FallbackResponse<RawReply>) -> Result<(RawReply, String, bool, f64)> {
        let served_by = response.served_by.to_string();
        match response.payload {
            Some(reply) => Ok((reply, served_by, response.degraded, response.confidence)),
            None => Err(JudgeError::ProvidersExhausted {
                attempted: self.coordinator.provider_names(),
            }),
        }
    }

    fn cancelled_error(&self) -> JudgeError {
        if self.is_closed() {
            JudgeError::Closed
        } else {
            JudgeError::Cancelled
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(JudgeError::Closed)
        } else {
            Ok(())
        }
    }
}
