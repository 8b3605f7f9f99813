//! End-to-end executor scenarios

use async_trait::async_trait;
use chaosforge::{
    new_scenario, Executor, ExecutorOptions, FailurePolicy, RunReport, Thresholds, Verdict,
};
use chaosforge_core::{ChaosContext, Severity, Target, Validator};
use chaosforge_injectors::{
    DelayConfig, DelayInjector, ErrorConfig, ErrorInjector, NetworkChaosConfig,
    NetworkChaosInjector, NetworkRule,
};
use chaosforge_validators::{
    ExecutionTimeValidator, LoopTimeoutValidator, RecursionDepthValidator,
};
use std::time::Duration;

struct NullTarget;

#[async_trait]
impl Target for NullTarget {
    fn name(&self) -> &str {
        "service"
    }
}

struct AlwaysPass;

#[async_trait]
impl Validator for AlwaysPass {
    fn name(&self) -> &str {
        "always_pass"
    }
    fn severity(&self) -> Severity {
        Severity::Critical
    }
    async fn validate(&self, _ctx: &ChaosContext, _target: &dyn Target) -> anyhow::Result<()> {
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn happy_path_passes_with_exit_zero() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let scenario = new_scenario("happy-path")
        .with_target(NullTarget)
        .step("first", |_ctx, _target| async { Ok(()) })
        .step("second", |_ctx, _target| async { Ok(()) })
        .step("third", |_ctx, _target| async { Ok(()) })
        .assert(AlwaysPass)
        .repeat(5)
        .build();

    let report = Executor::with_defaults().run(&scenario).await.expect("run completes");
    assert_eq!(report.total(), 5);
    assert_eq!(report.succeeded(), 5);
    assert_eq!(report.failed(), 0);
    assert!(!report.aborted_early);

    let verdict = report.verdict(&Thresholds::default());
    assert_eq!(verdict, Verdict::Pass);
    assert_eq!(verdict.exit_code(), 0);
}

async fn run_coin_scenario() -> RunReport {
    let delay = DelayInjector::new(DelayConfig {
        probability: 1.0,
        min_delay_ms: 5,
        max_delay_ms: 5,
        ..DelayConfig::default()
    });
    let scenario = new_scenario("deterministic-coin")
        .with_target(NullTarget)
        .inject(delay)
        .step("coin", |ctx: ChaosContext, _target| async move {
            ctx.maybe_delay().await;
            if ctx.should_fail(0.5) {
                anyhow::bail!("coin landed on failure");
            }
            Ok(())
        })
        .repeat(10)
        .build();

    Executor::new(ExecutorOptions::default().with_seed(0xC0FFEE))
        .run(&scenario)
        .await
        .expect("run completes")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn identical_seeds_reproduce_identical_outcomes() {
    let first = run_coin_scenario().await;
    let second = run_coin_scenario().await;

    assert_eq!(first.total(), 10);
    assert_eq!(first.failed(), second.failed());

    let pattern_a: Vec<bool> = first.iterations.iter().map(|i| i.success).collect();
    let pattern_b: Vec<bool> = second.iterations.iter().map(|i| i.success).collect();
    assert_eq!(pattern_a, pattern_b, "per-iteration outcomes must replay");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn critical_validator_failure_fails_every_iteration() {
    let scenario = new_scenario("deep-recursion")
        .with_target(NullTarget)
        .step("recurse", |ctx: ChaosContext, _target| async move {
            ctx.record_recursion_depth(75);
            Ok(())
        })
        .assert(RecursionDepthValidator::new(50))
        .repeat(3)
        .build();

    let report = Executor::with_defaults().run(&scenario).await.expect("run completes");
    assert_eq!(report.total(), 3);
    assert_eq!(report.failed(), 3);
    for iteration in &report.iterations {
        assert_eq!(iteration.error_kind.as_deref(), Some("validator-failed"));
    }

    let verdict = report.verdict(&Thresholds::default());
    assert_eq!(verdict, Verdict::Fail);
    assert_eq!(verdict.exit_code(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn loop_timeout_detects_hanging_steps() {
    let scenario = new_scenario("hang-detection")
        .with_target(NullTarget)
        .step("hang", |_ctx, _target| async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(())
        })
        .assert(LoopTimeoutValidator::new(Duration::from_millis(100)))
        .repeat(2)
        .build();

    let report = Executor::with_defaults().run(&scenario).await.expect("run completes");
    assert_eq!(report.total(), 2);
    assert_eq!(report.failed(), 2);
    for iteration in &report.iterations {
        assert_eq!(iteration.error_kind.as_deref(), Some("iteration-timeout"));
    }
    assert_eq!(report.verdict(&Thresholds::default()), Verdict::Fail);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn warning_validator_alone_makes_the_run_unstable() {
    let scenario = new_scenario("sometimes-slow")
        .with_target(NullTarget)
        .step("work", |ctx: ChaosContext, _target| async move {
            if ctx.iteration() < 4 {
                tokio::time::sleep(Duration::from_millis(40)).await;
            }
            Ok(())
        })
        .assert(ExecutionTimeValidator::new(Duration::from_millis(15)))
        .repeat(10)
        .build();

    let report = Executor::with_defaults().run(&scenario).await.expect("run completes");
    assert_eq!(report.total(), 10);
    assert_eq!(report.failed(), 0, "warnings never flip iteration success");
    assert_eq!(report.metrics.validator_failures["execution_time"], 4);

    let verdict = report.verdict(&Thresholds::default());
    assert_eq!(verdict, Verdict::Unstable);
    assert_eq!(verdict.exit_code(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fail_fast_records_exactly_one_result() {
    let scenario = new_scenario("fail-fast")
        .with_target(NullTarget)
        .step("doomed", |_ctx, _target| async { anyhow::bail!("always broken") })
        .repeat(10)
        .build();

    let report = Executor::new(ExecutorOptions::default().with_policy(FailurePolicy::FailFast))
        .run(&scenario)
        .await
        .expect("fail-fast still yields a report");
    assert_eq!(report.total(), 1);
    assert!(report.aborted_early);
    assert_eq!(report.verdict(&Thresholds::default()), Verdict::Fail);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn injected_errors_surface_with_their_kind() {
    let error = ErrorInjector::new(ErrorConfig {
        enabled: true,
        probability: 1.0,
        message: "database unavailable".to_string(),
    });
    let scenario = new_scenario("error-injection")
        .with_target(NullTarget)
        .inject(error)
        .step("query", |ctx: ChaosContext, _target| async move {
            ctx.maybe_error()?;
            Ok(())
        })
        .repeat(2)
        .build();

    let report = Executor::new(ExecutorOptions::default().with_seed(1))
        .run(&scenario)
        .await
        .expect("run completes");
    assert_eq!(report.failed(), 2);
    for iteration in &report.iterations {
        assert_eq!(iteration.error_kind.as_deref(), Some("injected-fault"));
        assert!(iteration.error.as_deref().unwrap_or("").contains("database unavailable"));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn network_chaos_drops_connections() {
    let network = NetworkChaosInjector::new(NetworkChaosConfig {
        rules: vec![NetworkRule {
            host: Some("db.internal".to_string()),
            drop_probability: 1.0,
            ..NetworkRule::default()
        }],
    });
    let scenario = new_scenario("network-drop")
        .with_target(NullTarget)
        .inject(network)
        .step("connect", |ctx: ChaosContext, _target| async move {
            ctx.maybe_network_chaos("db.internal", 5432).await?;
            Ok(())
        })
        .repeat(1)
        .build();

    let report = Executor::new(ExecutorOptions::default().with_seed(1))
        .run(&scenario)
        .await
        .expect("run completes");
    assert_eq!(report.failed(), 1);
    assert_eq!(
        report.iterations[0].error_kind.as_deref(),
        Some("connection-dropped")
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_duration_bound_cuts_the_run_short() {
    let scenario = new_scenario("bounded-run")
        .with_target(NullTarget)
        .step("slow", |_ctx, _target| async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok(())
        })
        .repeat(5)
        .max_duration(Duration::from_millis(150))
        .build();

    let report = Executor::with_defaults().run(&scenario).await.expect("run completes");
    assert!(report.aborted_early, "the duration watchdog must trip");
    assert_eq!(report.total(), 1, "the watchdog fires inside the first iteration");
    let last = report.iterations.last().expect("one iteration ran");
    assert!(!last.success, "the in-flight iteration is recorded as failed");
    assert_eq!(last.error_kind.as_deref(), Some("cancelled"));
}
