//! The PRE → ROUTE → POST / ERROR state machine.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;
use tracing::Instrument;

use super::{ChainPolicy, PostFailurePolicy};
use crate::config::LiveSettings;
use crate::context::{SessionContext, StateFactory};
use crate::error::{FilterError, GatewayError};
use crate::filter::{FilterPhase, FilterRegistry, FilterSet, SharedFilter};
use crate::message::{RequestMessage, ResponseMessage};
use crate::observability::metrics;

/// Terminal state of one chain execution.
#[derive(Debug)]
pub enum ChainOutcome {
    /// A filter produced the response (possibly an ERROR filter).
    Completed(ResponseMessage),
    /// Nothing could produce a response; carries the 500 fallback.
    Failed {
        response: ResponseMessage,
        cause: GatewayError,
    },
}

impl ChainOutcome {
    pub fn response(&self) -> &ResponseMessage {
        match self {
            ChainOutcome::Completed(response) => response,
            ChainOutcome::Failed { response, .. } => response,
        }
    }

    pub fn into_response(self) -> ResponseMessage {
        match self {
            ChainOutcome::Completed(response) => response,
            ChainOutcome::Failed { response, .. } => response,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, ChainOutcome::Completed(_))
    }

    pub fn cause(&self) -> Option<&GatewayError> {
        match self {
            ChainOutcome::Completed(_) => None,
            ChainOutcome::Failed { cause, .. } => Some(cause),
        }
    }
}

enum Stage {
    Pre,
    Route,
    Post,
    Error(GatewayError),
}

enum PreOutcome {
    Continue,
    Stopped,
}

/// Runs filter phases over a session context.
///
/// Shared by all requests; each [`run`](FilterChain::run) owns its context.
pub struct FilterChain<T> {
    registry: Arc<FilterRegistry<T>>,
    state_factory: Arc<dyn StateFactory<T>>,
    settings: Arc<LiveSettings>,
}

impl<T: Send + 'static> FilterChain<T> {
    pub fn new(registry: Arc<FilterRegistry<T>>, state_factory: impl StateFactory<T>) -> Self {
        Self {
            registry,
            state_factory: Arc::new(state_factory),
            settings: Arc::new(LiveSettings::default()),
        }
    }

    /// Share reloadable settings with the transport adapter.
    pub fn with_settings(mut self, settings: Arc<LiveSettings>) -> Self {
        self.settings = settings;
        self
    }

    pub fn registry(&self) -> &Arc<FilterRegistry<T>> {
        &self.registry
    }

    pub fn settings(&self) -> &Arc<LiveSettings> {
        &self.settings
    }

    /// Create the context for a new request, invoking the state factory once.
    pub fn create_context(
        &self,
        request_id: impl Into<String>,
        request: RequestMessage,
    ) -> Result<SessionContext<T>, GatewayError> {
        let state = self.state_factory.create()?;
        Ok(SessionContext::new(request_id, request, state))
    }

    /// Run the chain to completion. Never fails; the outcome always carries
    /// a response.
    pub async fn run(&self, ctx: SessionContext<T>) -> ChainOutcome {
        let policy = self.settings.load().chain.clone();
        self.run_with_policy(ctx, &policy).await
    }

    /// Like [`run`](FilterChain::run), under a policy taken from a settings
    /// snapshot the caller already holds.
    pub async fn run_with_policy(&self, ctx: SessionContext<T>, policy: &ChainPolicy) -> ChainOutcome {
        let snapshot = self.registry.snapshot();
        let span = tracing::debug_span!(
            "filter_chain",
            request_id = %ctx.request_id(),
            generation = snapshot.generation()
        );

        Self::execute(&snapshot, policy, ctx).instrument(span).await
    }

    async fn execute(
        snapshot: &FilterSet<T>,
        policy: &ChainPolicy,
        mut ctx: SessionContext<T>,
    ) -> ChainOutcome {
        let mut stage = Stage::Pre;
        loop {
            stage = match stage {
                Stage::Pre => match Self::run_pre(snapshot, policy, &mut ctx).await {
                    Ok(PreOutcome::Continue) => Stage::Route,
                    Ok(PreOutcome::Stopped) => Stage::Post,
                    Err(cause) => Stage::Error(cause),
                },
                Stage::Route => match Self::run_route(snapshot, policy, &mut ctx).await {
                    Ok(()) => Stage::Post,
                    Err(cause) => Stage::Error(cause),
                },
                Stage::Post => match Self::run_post(snapshot, policy, &mut ctx).await {
                    Ok(()) => match ctx.take_response() {
                        Some(response) => {
                            tracing::debug!(status = response.status(), "Filter chain completed");
                            return ChainOutcome::Completed(response);
                        }
                        None => Stage::Error(GatewayError::MissingResponse),
                    },
                    Err(cause) => Stage::Error(cause),
                },
                Stage::Error(cause) => {
                    return Self::run_error(snapshot, policy, &mut ctx, cause).await;
                }
            };
        }
    }

    async fn run_pre(
        snapshot: &FilterSet<T>,
        policy: &ChainPolicy,
        ctx: &mut SessionContext<T>,
    ) -> Result<PreOutcome, GatewayError> {
        for filter in snapshot.for_phase(FilterPhase::Pre) {
            if !Self::applies(filter, FilterPhase::Pre, ctx)? {
                continue;
            }
            Self::invoke(filter, FilterPhase::Pre, policy, ctx).await?;
            if ctx.is_filter_processing_stopped() {
                tracing::debug!(filter = filter.name(), "Filter processing stopped");
                return Ok(PreOutcome::Stopped);
            }
        }
        Ok(PreOutcome::Continue)
    }

    async fn run_route(
        snapshot: &FilterSet<T>,
        policy: &ChainPolicy,
        ctx: &mut SessionContext<T>,
    ) -> Result<(), GatewayError> {
        for filter in snapshot.for_phase(FilterPhase::Route) {
            if Self::applies(filter, FilterPhase::Route, ctx)? {
                tracing::debug!(filter = filter.name(), "Route claimed");
                return Self::invoke(filter, FilterPhase::Route, policy, ctx).await;
            }
        }
        Err(GatewayError::NoRouteClaimed)
    }

    async fn run_post(
        snapshot: &FilterSet<T>,
        policy: &ChainPolicy,
        ctx: &mut SessionContext<T>,
    ) -> Result<(), GatewayError> {
        for filter in snapshot.for_phase(FilterPhase::Post) {
            let result = match Self::applies(filter, FilterPhase::Post, ctx) {
                Ok(false) => continue,
                Ok(true) => Self::invoke(filter, FilterPhase::Post, policy, ctx).await,
                Err(failure) => Err(failure),
            };
            if let Err(failure) = result {
                match policy.post_failure {
                    PostFailurePolicy::Recover => {
                        tracing::warn!(
                            filter = filter.name(),
                            error = %failure,
                            "Post filter failed, skipping"
                        );
                        ctx.record_recovered(failure);
                    }
                    PostFailurePolicy::Escalate => return Err(failure),
                }
            }
        }
        Ok(())
    }

    async fn run_error(
        snapshot: &FilterSet<T>,
        policy: &ChainPolicy,
        ctx: &mut SessionContext<T>,
        cause: GatewayError,
    ) -> ChainOutcome {
        tracing::warn!(error = %cause, kind = cause.kind(), "Entering error phase");

        // Only a response produced from here on is used.
        ctx.take_response();
        ctx.take_error_flag();
        ctx.attach_failure(cause.clone());

        for filter in snapshot.for_phase(FilterPhase::Error) {
            let result = match Self::applies(filter, FilterPhase::Error, ctx) {
                Ok(false) => continue,
                Ok(true) => Self::invoke(filter, FilterPhase::Error, policy, ctx).await,
                Err(failure) => Err(failure),
            };
            if let Err(failure) = result {
                return Self::fallback(&cause, failure.to_string());
            }
        }

        match ctx.take_response() {
            Some(response) => ChainOutcome::Completed(response),
            None => Self::fallback(&cause, "no error filter produced a response".to_string()),
        }
    }

    fn fallback(cause: &GatewayError, reason: String) -> ChainOutcome {
        tracing::error!(error = %cause, reason = %reason, "Error phase exhausted, using fallback response");
        ChainOutcome::Failed {
            response: ResponseMessage::fallback(),
            cause: GatewayError::ErrorPhaseExhausted {
                cause: cause.to_string(),
                reason,
            },
        }
    }

    /// Evaluate `should_filter`, turning a panic into a filter failure.
    fn applies(
        filter: &SharedFilter<T>,
        phase: FilterPhase,
        ctx: &SessionContext<T>,
    ) -> Result<bool, GatewayError> {
        match std::panic::catch_unwind(AssertUnwindSafe(|| filter.should_filter(ctx))) {
            Ok(applies) => Ok(applies),
            Err(payload) => {
                let source = FilterError::new(format!(
                    "should_filter panicked: {}",
                    panic_message(&*payload)
                ));
                tracing::warn!(filter = filter.name(), %phase, error = %source, "Filter predicate failed");
                metrics::record_filter(phase, filter.name(), "failure", Instant::now());
                Err(GatewayError::FilterFailure {
                    filter: filter.name().to_string(),
                    phase,
                    source,
                })
            }
        }
    }

    /// Apply one filter under its time budget, converting panics, returned
    /// failures, and a raised error flag into [`GatewayError`].
    async fn invoke(
        filter: &SharedFilter<T>,
        phase: FilterPhase,
        policy: &ChainPolicy,
        ctx: &mut SessionContext<T>,
    ) -> Result<(), GatewayError> {
        let name = filter.name();
        let started = Instant::now();
        let limit = policy.timeout_for(filter.timeout());
        let call = AssertUnwindSafe(filter.apply(ctx)).catch_unwind();

        let completed = match limit {
            Some(limit) => tokio::time::timeout(limit, call).await.ok(),
            None => Some(call.await),
        };

        let Some(result) = completed else {
            let timeout = limit.unwrap_or_default();
            ctx.take_error_flag();
            tracing::warn!(filter = name, %phase, ?timeout, "Filter timed out");
            metrics::record_filter(phase, name, "timeout", started);
            return Err(GatewayError::FilterTimeout {
                filter: name.to_string(),
                phase,
                timeout,
            });
        };

        let flagged = ctx.take_error_flag();
        let source = match result {
            Ok(Ok(())) => match flagged {
                None => {
                    tracing::trace!(filter = name, %phase, "Filter applied");
                    metrics::record_filter(phase, name, "ok", started);
                    return Ok(());
                }
                Some(cause) => cause,
            },
            Ok(Err(source)) => source,
            Err(payload) => FilterError::new(format!("filter panicked: {}", panic_message(&*payload))),
        };

        tracing::warn!(filter = name, %phase, error = %source, "Filter failed");
        metrics::record_filter(phase, name, "failure", started);
        Err(GatewayError::FilterFailure {
            filter: name.to_string(),
            phase,
            source,
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeSettings;
    use crate::context::{Attributes, DefaultStateFactory, FnStateFactory, StateError};
    use crate::filter::{BoxFuture, Filter};
    use crate::message::Message;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Notify;

    type Journal = Arc<Mutex<Vec<String>>>;

    #[derive(Clone)]
    enum Action {
        Pass,
        Respond(u16),
        StopWith(u16),
        Fail,
        Flag,
        Panic,
        Sleep(Duration),
        DescribeFailure,
        CountRecovered,
        Gate { entered: Arc<Notify>, release: Arc<Notify> },
    }

    struct Step {
        name: String,
        phase: FilterPhase,
        order: i32,
        applies: bool,
        action: Action,
        journal: Journal,
    }

    impl Step {
        fn record(&self) {
            self.journal.lock().unwrap().push(self.name.clone());
        }
    }

    impl Filter<Attributes> for Step {
        fn name(&self) -> &str {
            &self.name
        }

        fn phase(&self) -> FilterPhase {
            self.phase
        }

        fn order(&self) -> i32 {
            self.order
        }

        fn should_filter(&self, _ctx: &SessionContext<Attributes>) -> bool {
            self.applies
        }

        fn apply<'a>(
            &'a self,
            ctx: &'a mut SessionContext<Attributes>,
        ) -> BoxFuture<'a, Result<(), FilterError>> {
            Box::pin(async move {
                self.record();
                match &self.action {
                    Action::Pass => Ok(()),
                    Action::Respond(status) => {
                        ctx.set_response(ResponseMessage::new(*status).with_body("ok"));
                        Ok(())
                    }
                    Action::StopWith(status) => {
                        ctx.set_response(ResponseMessage::new(*status));
                        ctx.stop_filter_processing();
                        Ok(())
                    }
                    Action::Fail => Err(FilterError::new("boom")),
                    Action::Flag => {
                        ctx.set_error_flag("flagged");
                        Ok(())
                    }
                    Action::Panic => panic!("filter exploded"),
                    Action::Sleep(duration) => {
                        tokio::time::sleep(*duration).await;
                        Ok(())
                    }
                    Action::DescribeFailure => {
                        let kind = ctx.failure().map(|f| f.kind()).unwrap_or("none");
                        ctx.set_response(ResponseMessage::new(502).with_header("x-failure", kind));
                        Ok(())
                    }
                    Action::CountRecovered => {
                        let count = ctx.recovered_failures().len().to_string();
                        if let Some(response) = ctx.response_mut() {
                            response.headers_mut().set("x-recovered", count);
                        }
                        Ok(())
                    }
                    Action::Gate { entered, release } => {
                        entered.notify_one();
                        release.notified().await;
                        Ok(())
                    }
                }
            })
        }
    }

    /// Filter whose `should_filter` panics.
    struct PanickyPredicate {
        phase: FilterPhase,
    }

    impl Filter<Attributes> for PanickyPredicate {
        fn name(&self) -> &str {
            "panicky-predicate"
        }

        fn phase(&self) -> FilterPhase {
            self.phase
        }

        fn order(&self) -> i32 {
            0
        }

        fn should_filter(&self, _ctx: &SessionContext<Attributes>) -> bool {
            panic!("should_filter exploded")
        }

        fn apply<'a>(
            &'a self,
            _ctx: &'a mut SessionContext<Attributes>,
        ) -> BoxFuture<'a, Result<(), FilterError>> {
            Box::pin(async { Ok(()) })
        }
    }

    #[derive(Default)]
    struct Harness {
        journal: Journal,
        filters: Vec<SharedFilter<Attributes>>,
    }

    impl Harness {
        fn filter(&self, name: &str, phase: FilterPhase, order: i32, action: Action) -> SharedFilter<Attributes> {
            Arc::new(Step {
                name: name.to_string(),
                phase,
                order,
                applies: true,
                action,
                journal: self.journal.clone(),
            })
        }

        fn with(mut self, name: &str, phase: FilterPhase, order: i32, action: Action) -> Self {
            let filter = self.filter(name, phase, order, action);
            self.filters.push(filter);
            self
        }

        fn with_panicky_predicate(mut self, phase: FilterPhase) -> Self {
            self.filters.push(Arc::new(PanickyPredicate { phase }));
            self
        }

        fn with_skipped(mut self, name: &str, phase: FilterPhase, order: i32) -> Self {
            self.filters.push(Arc::new(Step {
                name: name.to_string(),
                phase,
                order,
                applies: false,
                action: Action::Respond(299),
                journal: self.journal.clone(),
            }));
            self
        }

        fn chain(&self) -> FilterChain<Attributes> {
            self.chain_with(ChainPolicy::default())
        }

        fn chain_with(&self, policy: ChainPolicy) -> FilterChain<Attributes> {
            let registry = Arc::new(FilterRegistry::new(self.filters.clone()).unwrap());
            let settings = RuntimeSettings {
                chain: policy,
                ..RuntimeSettings::default()
            };
            FilterChain::new(registry, DefaultStateFactory)
                .with_settings(Arc::new(LiveSettings::new(settings)))
        }

        fn ran(&self) -> Vec<String> {
            self.journal.lock().unwrap().clone()
        }
    }

    async fn run(chain: &FilterChain<Attributes>) -> ChainOutcome {
        let ctx = chain
            .create_context("test", RequestMessage::new("GET", "/"))
            .unwrap();
        chain.run(ctx).await
    }

    #[tokio::test]
    async fn executes_in_order_with_stable_ties() {
        let harness = Harness::default()
            .with("ten", FilterPhase::Pre, 10, Action::Pass)
            .with("five-first", FilterPhase::Pre, 5, Action::Pass)
            .with("five-second", FilterPhase::Pre, 5, Action::Pass)
            .with("twenty", FilterPhase::Pre, 20, Action::Pass)
            .with("route", FilterPhase::Route, 0, Action::Respond(200))
            .with("post", FilterPhase::Post, 0, Action::Pass);

        let outcome = run(&harness.chain()).await;

        assert!(outcome.is_completed());
        assert_eq!(outcome.response().status(), 200);
        assert_eq!(
            harness.ran(),
            vec!["five-first", "five-second", "ten", "twenty", "route", "post"]
        );
    }

    #[tokio::test]
    async fn stop_processing_skips_to_post() {
        let harness = Harness::default()
            .with("auth", FilterPhase::Pre, 1, Action::StopWith(401))
            .with("later-pre", FilterPhase::Pre, 2, Action::Pass)
            .with("route", FilterPhase::Route, 0, Action::Respond(200))
            .with("post-a", FilterPhase::Post, 1, Action::Pass)
            .with("post-b", FilterPhase::Post, 2, Action::Pass);

        let outcome = run(&harness.chain()).await;

        assert_eq!(outcome.response().status(), 401);
        assert_eq!(harness.ran(), vec!["auth", "post-a", "post-b"]);
    }

    #[tokio::test]
    async fn first_matching_route_claims_phase() {
        let harness = Harness::default()
            .with_skipped("static", FilterPhase::Route, 1)
            .with("origin", FilterPhase::Route, 2, Action::Respond(200))
            .with("backup", FilterPhase::Route, 3, Action::Respond(201));

        let outcome = run(&harness.chain()).await;

        assert_eq!(outcome.response().status(), 200);
        assert_eq!(harness.ran(), vec!["origin"]);
    }

    #[tokio::test]
    async fn unclaimed_route_falls_back_to_500() {
        let harness = Harness::default()
            .with("pre", FilterPhase::Pre, 1, Action::Pass)
            .with_skipped("route", FilterPhase::Route, 1)
            .with("post", FilterPhase::Post, 1, Action::Pass);

        let outcome = run(&harness.chain()).await;

        assert!(!outcome.is_completed());
        assert!(matches!(
            outcome.cause(),
            Some(GatewayError::ErrorPhaseExhausted { cause, .. }) if cause.contains("No route filter")
        ));
        let response = outcome.into_response();
        assert_eq!(response.status(), 500);
        assert!(response.body().is_none());
        assert!(response.headers().is_empty());
        assert_eq!(harness.ran(), vec!["pre"]);
    }

    #[tokio::test]
    async fn pre_failure_enters_error_phase() {
        let harness = Harness::default()
            .with("pre-fail", FilterPhase::Pre, 1, Action::Fail)
            .with("pre-next", FilterPhase::Pre, 2, Action::Pass)
            .with("route", FilterPhase::Route, 0, Action::Respond(200))
            .with("post", FilterPhase::Post, 0, Action::Pass)
            .with("error", FilterPhase::Error, 0, Action::DescribeFailure);

        let outcome = run(&harness.chain()).await;

        assert!(outcome.is_completed());
        let response = outcome.into_response();
        assert_eq!(response.status(), 502);
        assert_eq!(response.headers().get("x-failure"), Some("filter_failure"));
        assert_eq!(harness.ran(), vec!["pre-fail", "error"]);
    }

    #[tokio::test]
    async fn error_flag_diverts_to_error_phase() {
        let harness = Harness::default()
            .with("flagger", FilterPhase::Pre, 1, Action::Flag)
            .with("pre-next", FilterPhase::Pre, 2, Action::Pass)
            .with("error", FilterPhase::Error, 0, Action::DescribeFailure);

        let outcome = run(&harness.chain()).await;

        assert_eq!(outcome.response().status(), 502);
        assert_eq!(harness.ran(), vec!["flagger", "error"]);
    }

    #[tokio::test]
    async fn route_panic_is_a_filter_failure() {
        let harness = Harness::default()
            .with("route", FilterPhase::Route, 0, Action::Panic)
            .with("error", FilterPhase::Error, 0, Action::DescribeFailure);

        let outcome = run(&harness.chain()).await;

        let response = outcome.into_response();
        assert_eq!(response.headers().get("x-failure"), Some("filter_failure"));
    }

    #[tokio::test]
    async fn post_failure_is_recovered_by_default() {
        let harness = Harness::default()
            .with("route", FilterPhase::Route, 0, Action::Respond(200))
            .with("post-fail", FilterPhase::Post, 1, Action::Fail)
            .with("post-count", FilterPhase::Post, 2, Action::CountRecovered)
            .with("error", FilterPhase::Error, 0, Action::DescribeFailure);

        let outcome = run(&harness.chain()).await;

        assert!(outcome.is_completed());
        let response = outcome.into_response();
        assert_eq!(response.status(), 200);
        assert_eq!(response.headers().get("x-recovered"), Some("1"));
        assert_eq!(harness.ran(), vec!["route", "post-fail", "post-count"]);
    }

    #[tokio::test]
    async fn post_failure_escalates_when_configured() {
        let harness = Harness::default()
            .with("route", FilterPhase::Route, 0, Action::Respond(200))
            .with("post-fail", FilterPhase::Post, 1, Action::Fail)
            .with("post-next", FilterPhase::Post, 2, Action::Pass)
            .with("error", FilterPhase::Error, 0, Action::Respond(503));

        let policy = ChainPolicy {
            post_failure: PostFailurePolicy::Escalate,
            ..ChainPolicy::default()
        };
        let outcome = run(&harness.chain_with(policy)).await;

        assert_eq!(outcome.response().status(), 503);
        assert_eq!(harness.ran(), vec!["route", "post-fail", "error"]);
    }

    #[tokio::test(start_paused = true)]
    async fn pre_timeout_enters_error_phase() {
        let harness = Harness::default()
            .with("slow", FilterPhase::Pre, 1, Action::Sleep(Duration::from_secs(10)))
            .with("route", FilterPhase::Route, 0, Action::Respond(200))
            .with("error", FilterPhase::Error, 0, Action::DescribeFailure);

        let policy = ChainPolicy {
            filter_timeout: Some(Duration::from_millis(100)),
            ..ChainPolicy::default()
        };
        let outcome = run(&harness.chain_with(policy)).await;

        let response = outcome.into_response();
        assert_eq!(response.headers().get("x-failure"), Some("filter_timeout"));
        assert_eq!(harness.ran(), vec!["slow", "error"]);
    }

    #[tokio::test(start_paused = true)]
    async fn post_timeout_is_recovered() {
        let harness = Harness::default()
            .with("route", FilterPhase::Route, 0, Action::Respond(200))
            .with("slow", FilterPhase::Post, 1, Action::Sleep(Duration::from_secs(10)))
            .with("post-count", FilterPhase::Post, 2, Action::CountRecovered);

        let policy = ChainPolicy {
            filter_timeout: Some(Duration::from_millis(100)),
            ..ChainPolicy::default()
        };
        let outcome = run(&harness.chain_with(policy)).await;

        let response = outcome.into_response();
        assert_eq!(response.status(), 200);
        assert_eq!(response.headers().get("x-recovered"), Some("1"));
    }

    #[tokio::test]
    async fn failing_error_phase_uses_fallback() {
        let harness = Harness::default()
            .with("pre", FilterPhase::Pre, 1, Action::Fail)
            .with("error-a", FilterPhase::Error, 1, Action::Fail)
            .with("error-b", FilterPhase::Error, 2, Action::Respond(503));

        let outcome = run(&harness.chain()).await;

        assert!(!outcome.is_completed());
        assert_eq!(outcome.response(), &ResponseMessage::fallback());
        assert_eq!(harness.ran(), vec!["pre", "error-a"]);
    }

    #[tokio::test]
    async fn chain_without_response_enters_error_phase() {
        let harness = Harness::default()
            .with("route", FilterPhase::Route, 0, Action::Pass)
            .with("post", FilterPhase::Post, 0, Action::Pass)
            .with("error", FilterPhase::Error, 0, Action::DescribeFailure);

        let outcome = run(&harness.chain()).await;

        let response = outcome.into_response();
        assert_eq!(response.headers().get("x-failure"), Some("missing_response"));
        assert_eq!(harness.ran(), vec!["route", "post", "error"]);
    }

    #[tokio::test]
    async fn panicking_pre_predicate_enters_error_phase() {
        let harness = Harness::default()
            .with_panicky_predicate(FilterPhase::Pre)
            .with("route", FilterPhase::Route, 0, Action::Respond(200))
            .with("error", FilterPhase::Error, 0, Action::DescribeFailure);
        let chain = Arc::new(harness.chain());

        let outcome = tokio::spawn({
            let chain = chain.clone();
            async move { run(&chain).await }
        })
        .await
        .expect("run must resolve to a response");

        let response = outcome.into_response();
        assert_eq!(response.status(), 502);
        assert_eq!(response.headers().get("x-failure"), Some("filter_failure"));
        assert_eq!(harness.ran(), vec!["error"]);
    }

    #[tokio::test]
    async fn panicking_route_predicate_enters_error_phase() {
        let harness = Harness::default()
            .with_panicky_predicate(FilterPhase::Route)
            .with("error", FilterPhase::Error, 0, Action::DescribeFailure);

        let outcome = run(&harness.chain()).await;

        assert_eq!(outcome.response().headers().get("x-failure"), Some("filter_failure"));
    }

    #[tokio::test]
    async fn panicking_post_predicate_is_recovered() {
        let harness = Harness::default()
            .with("route", FilterPhase::Route, 0, Action::Respond(200))
            .with_panicky_predicate(FilterPhase::Post)
            .with("post-count", FilterPhase::Post, 5, Action::CountRecovered);

        let outcome = run(&harness.chain()).await;

        let response = outcome.into_response();
        assert_eq!(response.status(), 200);
        assert_eq!(response.headers().get("x-recovered"), Some("1"));
    }

    #[tokio::test]
    async fn panicking_error_predicate_uses_fallback() {
        let harness = Harness::default()
            .with("pre", FilterPhase::Pre, 1, Action::Fail)
            .with_panicky_predicate(FilterPhase::Error);

        let outcome = run(&harness.chain()).await;

        assert!(!outcome.is_completed());
        assert_eq!(outcome.response(), &ResponseMessage::fallback());
    }

    #[tokio::test(start_paused = true)]
    async fn error_filter_timeout_uses_fallback() {
        let harness = Harness::default()
            .with("pre", FilterPhase::Pre, 1, Action::Fail)
            .with("slow-error", FilterPhase::Error, 1, Action::Sleep(Duration::from_secs(10)))
            .with("error-next", FilterPhase::Error, 2, Action::Respond(503));

        let policy = ChainPolicy {
            filter_timeout: Some(Duration::from_millis(100)),
            ..ChainPolicy::default()
        };
        let outcome = run(&harness.chain_with(policy)).await;

        assert!(!outcome.is_completed());
        assert_eq!(outcome.response(), &ResponseMessage::fallback());
        assert!(matches!(
            outcome.cause(),
            Some(GatewayError::ErrorPhaseExhausted { reason, .. }) if reason.contains("timed out")
        ));
        assert_eq!(harness.ran(), vec!["pre", "slow-error"]);
    }

    #[tokio::test]
    async fn post_error_flag_is_recovered_by_default() {
        let harness = Harness::default()
            .with("route", FilterPhase::Route, 0, Action::Respond(200))
            .with("post-flag", FilterPhase::Post, 1, Action::Flag)
            .with("post-count", FilterPhase::Post, 2, Action::CountRecovered)
            .with("error", FilterPhase::Error, 0, Action::DescribeFailure);

        let outcome = run(&harness.chain()).await;

        assert!(outcome.is_completed());
        let response = outcome.into_response();
        assert_eq!(response.status(), 200);
        assert_eq!(response.headers().get("x-recovered"), Some("1"));
        assert_eq!(harness.ran(), vec!["route", "post-flag", "post-count"]);
    }

    #[tokio::test]
    async fn explicit_policy_overrides_live_settings() {
        let harness = Harness::default()
            .with("route", FilterPhase::Route, 0, Action::Respond(200))
            .with("post-fail", FilterPhase::Post, 1, Action::Fail)
            .with("error", FilterPhase::Error, 0, Action::Respond(503));
        let chain = harness.chain_with(ChainPolicy {
            post_failure: PostFailurePolicy::Escalate,
            ..ChainPolicy::default()
        });

        let ctx = chain
            .create_context("test", RequestMessage::new("GET", "/"))
            .unwrap();
        let outcome = chain.run_with_policy(ctx, &ChainPolicy::default()).await;

        assert_eq!(outcome.response().status(), 200);
    }

    #[test]
    fn state_factory_failure_is_reported_before_any_filter() {
        let registry = Arc::new(FilterRegistry::<u32>::empty());
        let chain = FilterChain::new(
            registry,
            FnStateFactory::new(|| Err::<u32, _>(StateError("no state".into()))),
        );

        let err = chain
            .create_context("req", RequestMessage::new("GET", "/"))
            .unwrap_err();
        assert!(matches!(err, GatewayError::StateFactory(_)));
        assert!(err.is_ingestion());
    }

    #[tokio::test]
    async fn in_flight_run_keeps_its_snapshot() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let harness = Harness::default()
            .with(
                "gate",
                FilterPhase::Pre,
                1,
                Action::Gate { entered: entered.clone(), release: release.clone() },
            )
            .with("route-a", FilterPhase::Route, 0, Action::Respond(200));
        let chain = Arc::new(harness.chain());

        let in_flight = {
            let chain = chain.clone();
            tokio::spawn(async move { run(&chain).await })
        };
        entered.notified().await;

        let generation = chain
            .registry()
            .reload(vec![harness.filter("route-b", FilterPhase::Route, 0, Action::Respond(201))])
            .unwrap();
        assert_eq!(generation, 1);
        release.notify_one();

        let first = in_flight.await.unwrap();
        assert_eq!(first.response().status(), 200);

        let second = run(&chain).await;
        assert_eq!(second.response().status(), 201);
        assert_eq!(harness.ran(), vec!["gate", "route-a", "route-b"]);
    }
}
