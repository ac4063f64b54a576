//! Per-record labeling state machine.
//!
//! `PromptBuilt -> Invoked -> Parsed -> Validated -> Labeled`, with a
//! bounded loop back to `Invoked` when the output is malformed or invalid.
//! The machine never talks to a backend; the engine feeds it raw output.

use serde::Serialize;
use tracing::{debug, warn};

use super::schema::{self, LabelResult};
use crate::errors::LabelFault;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LabelState {
    PromptBuilt,
    Invoked,
    Parsed,
    Validated,
    Labeled,
}

/// How many extra attempts a record gets after bad model output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Whether another attempt is allowed after `attempts_made` failures.
    pub fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts()
    }
}

/// What the engine should do after handing output to the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Retry,
    Done(LabelResult),
}

#[derive(Debug)]
pub struct LabelMachine {
    event_id: String,
    prompt: String,
    state: LabelState,
    attempts: u32,
    faults: Vec<LabelFault>,
    policy: RetryPolicy,
    confidence_floor: f64,
}

impl LabelMachine {
    pub fn new(event_id: &str, prompt: String, policy: RetryPolicy, confidence_floor: f64) -> Self {
        Self {
            event_id: event_id.to_string(),
            prompt,
            state: LabelState::PromptBuilt,
            attempts: 0,
            faults: Vec::new(),
            policy,
            confidence_floor,
        }
    }

    pub fn state(&self) -> LabelState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn faults(&self) -> &[LabelFault] {
        &self.faults
    }

    /// Move to `Invoked` and hand out the prompt. The same prompt is reused
    /// on every attempt.
    pub fn invoke(&mut self) -> &str {
        self.state = LabelState::Invoked;
        self.attempts += 1;
        &self.prompt
    }

    /// Feed the backend's raw text for the current attempt.
    pub fn accept_output(&mut self, raw: &str) -> Step {
        match self.parse_and_validate(raw) {
            Ok(result) => {
                self.state = LabelState::Labeled;
                debug!(
                    event_id = %self.event_id,
                    attempts = self.attempts,
                    category = %result.category,
                    needs_review = result.label_needs_review,
                    "Record labeled"
                );
                Step::Done(result)
            }
            Err(fault) => {
                warn!(
                    event_id = %self.event_id,
                    attempt = self.attempts,
                    max_attempts = self.policy.max_attempts(),
                    error = %fault,
                    "Model output rejected"
                );
                self.faults.push(fault);

                if self.policy.should_retry(self.attempts) {
                    Step::Retry
                } else {
                    self.state = LabelState::Labeled;
                    warn!(
                        event_id = %self.event_id,
                        attempts = self.attempts,
                        "Retries exhausted, writing placeholder label"
                    );
                    Step::Done(LabelResult::placeholder(&self.event_id))
                }
            }
        }
    }

    fn parse_and_validate(&mut self, raw: &str) -> Result<LabelResult, LabelFault> {
        let object = schema::parse_output(raw)?;
        self.state = LabelState::Parsed;

        let label = schema::validate(&object)?;
        self.state = LabelState::Validated;

        Ok(LabelResult::from_validated(&self.event_id, label, self.confidence_floor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{"category": "guidance", "label_severity": 2, "label_direction": "negative",
        "label_time_horizon_1_min": 10, "label_time_horizon_2_min": 240, "confidence": 0.9}"#;

    fn machine(max_retries: u32) -> LabelMachine {
        LabelMachine::new("e1", "prompt".to_string(), RetryPolicy::new(max_retries), 0.5)
    }

    #[test]
    fn test_retry_policy() {
        let policy = RetryPolicy::new(2);
        assert_eq!(policy.max_attempts(), 3);
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));

        assert!(!RetryPolicy::new(0).should_retry(1));
    }

    #[test]
    fn test_happy_path_reaches_labeled() {
        let mut m = machine(2);
        assert_eq!(m.state(), LabelState::PromptBuilt);
        assert_eq!(m.invoke(), "prompt");
        assert_eq!(m.state(), LabelState::Invoked);

        match m.accept_output(VALID) {
            Step::Done(result) => {
                assert_eq!(result.event_id, "e1");
                assert!(!result.label_needs_review);
                assert!(!result.is_placeholder());
            }
            Step::Retry => panic!("valid output should not be retried"),
        }
        assert_eq!(m.state(), LabelState::Labeled);
        assert_eq!(m.attempts(), 1);
    }

    #[test]
    fn test_recovers_on_retry() {
        let mut m = machine(2);
        m.invoke();
        assert_eq!(m.accept_output("I cannot help with that"), Step::Retry);
        m.invoke();
        assert!(matches!(m.accept_output(VALID), Step::Done(_)));
        assert_eq!(m.attempts(), 2);
        assert_eq!(m.faults().len(), 1);
    }

    #[test]
    fn test_exhaustion_counts_attempts_exactly() {
        let mut m = machine(2);
        let mut steps = Vec::new();
        loop {
            m.invoke();
            let step = m.accept_output("garbage");
            let done = matches!(step, Step::Done(_));
            steps.push(step);
            if done {
                break;
            }
        }
        assert_eq!(m.attempts(), 3);
        assert_eq!(m.faults().len(), 3);
        assert_eq!(m.state(), LabelState::Labeled);
        match steps.pop() {
            Some(Step::Done(result)) => {
                assert!(result.is_placeholder());
                assert!(result.label_needs_review);
            }
            other => panic!("unexpected final step: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_output_stops_at_parsed() {
        let mut m = machine(1);
        m.invoke();
        let bad = VALID.replace("guidance", "weather");
        assert_eq!(m.accept_output(&bad), Step::Retry);
        assert_eq!(m.state(), LabelState::Parsed);
        assert!(matches!(m.faults()[0], LabelFault::Invalid { .. }));
    }
}
