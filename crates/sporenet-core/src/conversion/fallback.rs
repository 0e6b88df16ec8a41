//! Single-step degrade-and-retry around one converter invocation.
//!
//! The controller is an explicit state machine:
//!
//! ```text
//! Planned ─▶ Attempting(plan) ─ok──────────────▶ Succeeded
//!                 │
//!                 └─toolchain error─▶ Degraded(none) ─ok──▶ Succeeded
//!                                         └─error──▶ Failed
//! ```
//!
//! Attempt 1 runs with the computed plan. A toolchain failure degrades the
//! plan to plain float conversion and retries exactly once; a second failure
//! is final. Errors that are not toolchain failures end the run immediately.

use std::future::Future;

use tracing::{info, warn};

use super::quantization::QuantizationPlan;
use crate::error::{Result, SporeError};

/// State of a fallback run.
#[derive(Debug)]
pub enum FallbackState {
    /// Plan computed, nothing attempted yet.
    Planned(QuantizationPlan),
    /// First attempt with the full plan.
    Attempting(QuantizationPlan),
    /// Retry with the degraded plan.
    Degraded(QuantizationPlan),
    Succeeded {
        binary: Vec<u8>,
        plan: QuantizationPlan,
        attempts: u32,
    },
    Failed {
        error: SporeError,
        attempts: u32,
    },
}

impl FallbackState {
    /// The plan the next attempt should run with, if one is pending.
    pub fn pending_plan(&self) -> Option<&QuantizationPlan> {
        match self {
            FallbackState::Attempting(plan) | FallbackState::Degraded(plan) => Some(plan),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FallbackState::Succeeded { .. } | FallbackState::Failed { .. }
        )
    }

    /// Move from `Planned` to the first attempt; other states are unchanged.
    pub fn start(self) -> Self {
        match self {
            FallbackState::Planned(plan) => FallbackState::Attempting(plan),
            other => other,
        }
    }

    /// Apply the result of the pending attempt.
    pub fn advance(self, result: Result<Vec<u8>>) -> Self {
        match (self, result) {
            (FallbackState::Attempting(plan), Ok(binary)) => FallbackState::Succeeded {
                binary,
                plan,
                attempts: 1,
            },
            (FallbackState::Attempting(plan), Err(error)) if error.is_toolchain_failure() => {
                warn!(
                    "Conversion with {} optimization failed: {}; retrying without quantization",
                    plan.mode, error
                );
                FallbackState::Degraded(QuantizationPlan::disabled())
            }
            (FallbackState::Attempting(_), Err(error)) => FallbackState::Failed { error, attempts: 1 },
            (FallbackState::Degraded(plan), Ok(binary)) => {
                info!("Model converted without quantization");
                FallbackState::Succeeded {
                    binary,
                    plan,
                    attempts: 2,
                }
            }
            (FallbackState::Degraded(_), Err(error)) => FallbackState::Failed {
                error: match error {
                    SporeError::ConversionFailed { .. } => error,
                    other => SporeError::conversion_failed(other.to_string()),
                },
                attempts: 2,
            },
            (state, _) => state,
        }
    }
}

/// Terminal report of a fallback run.
#[derive(Debug)]
pub struct FallbackReport {
    pub result: Result<Vec<u8>>,
    /// Plan that produced the binary (or the last plan tried).
    pub applied_plan: QuantizationPlan,
    pub attempts: u32,
}

impl FallbackReport {
    pub fn degraded(&self) -> bool {
        self.attempts > 1
    }
}

/// Drive `attempt` through the fallback state machine.
///
/// `attempt` is invoked at most twice: once with `plan`, and once with the
/// disabled plan if the first invocation failed inside the toolchain.
pub async fn run_with_fallback<F, Fut>(plan: QuantizationPlan, mut attempt: F) -> FallbackReport
where
    F: FnMut(QuantizationPlan) -> Fut,
    Fut: Future<Output = Result<Vec<u8>>>,
{
    let mut state = FallbackState::Planned(plan).start();
    let mut last_plan = QuantizationPlan::disabled();

    while let Some(plan) = state.pending_plan().cloned() {
        let result = attempt(plan.clone()).await;
        last_plan = plan;
        state = state.advance(result);
    }

    match state {
        FallbackState::Succeeded {
            binary,
            plan,
            attempts,
        } => FallbackReport {
            result: Ok(binary),
            applied_plan: plan,
            attempts,
        },
        FallbackState::Failed { error, attempts } => FallbackReport {
            result: Err(error),
            applied_plan: last_plan,
            attempts,
        },
        // pending_plan() is None only for terminal states once started.
        FallbackState::Planned(plan) | FallbackState::Attempting(plan) | FallbackState::Degraded(plan) => {
            FallbackReport {
                result: Err(SporeError::Other("fallback run ended without a result".into())),
                applied_plan: plan,
                attempts: 0,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversion::quantization;
    use crate::conversion::QuantizationMode;
    use std::cell::RefCell;

    fn int8_plan() -> QuantizationPlan {
        quantization::plan(Some(&[1, 28, 28, 1][..]), true)
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let calls = RefCell::new(Vec::new());
        let report = run_with_fallback(int8_plan(), |plan| {
            calls.borrow_mut().push(plan.mode);
            async { Ok(vec![1, 2, 3]) }
        })
        .await;

        assert_eq!(report.result.as_ref().unwrap(), &vec![1, 2, 3]);
        assert_eq!(report.attempts, 1);
        assert!(!report.degraded());
        assert_eq!(report.applied_plan.mode, QuantizationMode::Integer8Bit);
        assert_eq!(*calls.borrow(), vec![QuantizationMode::Integer8Bit]);
    }

    #[tokio::test]
    async fn test_degrades_once_then_succeeds() {
        let calls = RefCell::new(Vec::new());
        let report = run_with_fallback(int8_plan(), |plan| {
            calls.borrow_mut().push(plan.mode);
            let first = calls.borrow().len() == 1;
            async move {
                if first {
                    Err(SporeError::conversion_failed("int8 op unsupported"))
                } else {
                    Ok(vec![9])
                }
            }
        })
        .await;

        assert_eq!(report.result.as_ref().unwrap(), &vec![9]);
        assert_eq!(report.attempts, 2);
        assert!(report.degraded());
        assert_eq!(report.applied_plan, QuantizationPlan::disabled());
        assert_eq!(
            *calls.borrow(),
            vec![QuantizationMode::Integer8Bit, QuantizationMode::None]
        );
    }

    #[tokio::test]
    async fn test_always_failing_attempt_runs_exactly_twice() {
        let calls = RefCell::new(0u32);
        let report = run_with_fallback(int8_plan(), |_plan| {
            *calls.borrow_mut() += 1;
            let n = *calls.borrow();
            async move { Err::<Vec<u8>, _>(SporeError::conversion_failed(format!("attempt {n}"))) }
        })
        .await;

        assert_eq!(*calls.borrow(), 2);
        assert_eq!(report.attempts, 2);
        match report.result {
            Err(SporeError::ConversionFailed { message }) => assert_eq!(message, "attempt 2"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_disabled_plan_still_retries_once() {
        let calls = RefCell::new(0u32);
        let report = run_with_fallback(QuantizationPlan::disabled(), |_plan| {
            *calls.borrow_mut() += 1;
            async { Err::<Vec<u8>, _>(SporeError::conversion_failed("broken graph")) }
        })
        .await;
        assert_eq!(*calls.borrow(), 2);
        assert!(report.result.is_err());
    }

    #[tokio::test]
    async fn test_non_toolchain_error_is_not_retried() {
        let calls = RefCell::new(0u32);
        let report = run_with_fallback(int8_plan(), |_plan| {
            *calls.borrow_mut() += 1;
            async { Err::<Vec<u8>, _>(SporeError::Other("disk full".into())) }
        })
        .await;
        assert_eq!(*calls.borrow(), 1);
        assert_eq!(report.attempts, 1);
        assert!(matches!(report.result, Err(SporeError::Other(_))));
    }

    #[test]
    fn test_state_transitions() {
        let state = FallbackState::Planned(int8_plan());
        assert!(state.pending_plan().is_none());

        let state = state.start();
        assert_eq!(
            state.pending_plan().map(|p| p.mode),
            Some(QuantizationMode::Integer8Bit)
        );

        let state = state.advance(Err(SporeError::conversion_failed("x")));
        assert!(matches!(state, FallbackState::Degraded(ref p) if p.mode == QuantizationMode::None));

        let state = state.advance(Err(SporeError::conversion_failed("y")));
        assert!(state.is_terminal());
        assert!(matches!(state, FallbackState::Failed { attempts: 2, .. }));
    }
}
