//! Lifecycle state machine with explicit states and legal transition guards.
//!
//! Every run starts at `Init` and ends in exactly one of `Succeeded` or
//! `Quarantined`. The orchestrator calls `advance()` to move between states;
//! each call checks the edge is legal and appends it to the transition log.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// The set of lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Run state seeded, nothing called yet.
    Init,
    /// Calling the Generator (fresh attempt) or the Fixer (repair attempt).
    Generate,
    /// Resolving which artifact the producer worked on.
    Parse,
    /// Structural checks.
    Validate,
    /// Executable checks.
    Test,
    /// Combining both verdicts.
    Decide,
    /// Re-running checks with the solution withheld.
    KeepVerify,
    /// Recording a failed attempt.
    Fail,
    /// Comparing the retry count against the budget.
    CheckBudget,
    /// Building a targeted repair request.
    Repair,
    /// Moving the artifact aside and writing the failure report.
    Quarantine,
    /// Artifact kept. Terminal.
    Succeeded,
    /// Budget exhausted, artifact quarantined. Terminal.
    Quarantined,
}

impl LifecycleState {
    /// Whether this is a terminal state (no further transitions allowed).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Quarantined)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "Init"),
            Self::Generate => write!(f, "Generate"),
            Self::Parse => write!(f, "Parse"),
            Self::Validate => write!(f, "Validate"),
            Self::Test => write!(f, "Test"),
            Self::Decide => write!(f, "Decide"),
            Self::KeepVerify => write!(f, "KeepVerify"),
            Self::Fail => write!(f, "Fail"),
            Self::CheckBudget => write!(f, "CheckBudget"),
            Self::Repair => write!(f, "Repair"),
            Self::Quarantine => write!(f, "Quarantine"),
            Self::Succeeded => write!(f, "Succeeded"),
            Self::Quarantined => write!(f, "Quarantined"),
        }
    }
}

/// Legal transitions between lifecycle states.
///
/// ```text
/// Init -> Generate
/// Generate -> Parse | Fail          (Fail: producer unreachable)
/// Parse -> Validate
/// Validate -> Test
/// Test -> Decide
/// Decide -> KeepVerify | Fail
/// KeepVerify -> Succeeded | Fail
/// Fail -> CheckBudget
/// CheckBudget -> Repair | Quarantine
/// Repair -> Generate
/// Quarantine -> Quarantined
/// ```
fn is_legal_transition(from: LifecycleState, to: LifecycleState) -> bool {
    use LifecycleState::*;

    matches!(
        (from, to),
        (Init, Generate)
            | (Generate, Parse)
            | (Generate, Fail)
            | (Parse, Validate)
            | (Validate, Test)
            | (Test, Decide)
            | (Decide, KeepVerify)
            | (Decide, Fail)
            | (KeepVerify, Succeeded)
            | (KeepVerify, Fail)
            | (Fail, CheckBudget)
            | (CheckBudget, Repair)
            | (CheckBudget, Quarantine)
            | (Repair, Generate)
            | (Quarantine, Quarantined)
    )
}

/// A single recorded state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: LifecycleState,
    pub to: LifecycleState,
    /// 1-based attempt number at the time of transition.
    pub attempt: u32,
    /// Milliseconds since the state machine was created.
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl fmt::Display for TransitionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[attempt {}] {} -> {} (+{}ms)",
            self.attempt, self.from, self.to, self.elapsed_ms
        )?;
        if let Some(reason) = &self.reason {
            write!(f, ": {reason}")?;
        }
        Ok(())
    }
}

/// Error returned when an illegal transition is attempted.
#[derive(Debug, Clone)]
pub struct IllegalTransition {
    pub from: LifecycleState,
    pub to: LifecycleState,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Illegal state transition: {} -> {}", self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

/// Tracks the current state, enforces legal transitions, and keeps the full
/// transition log for diagnostics and failure reports.
pub struct StateMachine {
    current: LifecycleState,
    attempt: u32,
    created_at: Instant,
    transitions: Vec<TransitionRecord>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            current: LifecycleState::Init,
            attempt: 1,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> LifecycleState {
        self.current
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn set_attempt(&mut self, attempt: u32) {
        self.attempt = attempt;
    }

    /// Attempt to advance to the next state.
    pub fn advance(
        &mut self,
        to: LifecycleState,
        reason: Option<&str>,
    ) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }

        let record = TransitionRecord {
            from: self.current,
            to,
            attempt: self.attempt,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        };

        tracing::debug!(
            from = %self.current,
            to = %to,
            attempt = self.attempt,
            reason = reason.unwrap_or(""),
            "State transition"
        );

        self.transitions.push(record);
        self.current = to;
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    pub fn into_transitions(self) -> Vec<TransitionRecord> {
        self.transitions
    }

    /// One line per transition, for failure reports.
    pub fn transition_log(&self) -> String {
        self.transitions
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Get a summary string of the state machine's history.
    pub fn summary(&self) -> String {
        let states: Vec<String> = self.transitions.iter().map(|t| t.to.to_string()).collect();
        let mut summary = format!(
            "{} -> {} ({}ms, {} transitions)",
            LifecycleState::Init,
            self.current,
            self.created_at.elapsed().as_millis(),
            self.transitions.len(),
        );
        if !states.is_empty() {
            summary.push_str(&format!(" [{}]", states.join(" -> ")));
        }
        summary
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LifecycleState::*;

    fn drive(sm: &mut StateMachine, path: &[LifecycleState]) {
        for &state in path {
            sm.advance(state, None).unwrap();
        }
    }

    #[test]
    fn test_initial_state() {
        let sm = StateMachine::new();
        assert_eq!(sm.current(), Init);
        assert_eq!(sm.attempt(), 1);
        assert!(!sm.is_terminal());
        assert!(sm.transitions().is_empty());
    }

    #[test]
    fn test_immediate_success_path() {
        let mut sm = StateMachine::new();
        drive(
            &mut sm,
            &[Generate, Parse, Validate, Test, Decide, KeepVerify, Succeeded],
        );
        assert!(sm.is_terminal());
        assert_eq!(sm.transitions().len(), 7);
    }

    #[test]
    fn test_repair_loop_then_quarantine() {
        let mut sm = StateMachine::new();
        drive(&mut sm, &[Generate, Parse, Validate, Test, Decide, Fail, CheckBudget, Repair]);
        sm.set_attempt(2);
        drive(
            &mut sm,
            &[Generate, Parse, Validate, Test, Decide, KeepVerify, Fail, CheckBudget, Quarantine, Quarantined],
        );
        assert_eq!(sm.current(), Quarantined);
        assert_eq!(sm.transitions().last().unwrap().attempt, 2);
    }

    #[test]
    fn test_producer_failure_skips_to_fail() {
        let mut sm = StateMachine::new();
        drive(&mut sm, &[Generate]);
        sm.advance(Fail, Some("generator unreachable")).unwrap();
        assert_eq!(sm.current(), Fail);
    }

    #[test]
    fn test_cannot_leave_terminal_states() {
        for terminal in [Succeeded, Quarantined] {
            let mut sm = StateMachine {
                current: terminal,
                attempt: 1,
                created_at: Instant::now(),
                transitions: Vec::new(),
            };
            for next in [Init, Generate, Fail, Repair, Quarantine] {
                let err = sm.advance(next, None).unwrap_err();
                assert_eq!(err.from, terminal);
            }
        }
    }

    #[test]
    fn test_illegal_shortcuts_are_rejected() {
        let mut sm = StateMachine::new();
        drive(&mut sm, &[Generate, Parse, Validate, Test, Decide]);
        // Cannot succeed without negative verification.
        assert!(sm.advance(Succeeded, None).is_err());
        // Cannot repair without recording the failure first.
        assert!(sm.advance(Repair, None).is_err());
        // Cannot quarantine without a budget check.
        assert!(sm.advance(Quarantine, None).is_err());
    }

    #[test]
    fn test_transition_log_lines() {
        let mut sm = StateMachine::new();
        sm.advance(Generate, Some("run started")).unwrap();
        sm.advance(Parse, None).unwrap();
        let log = sm.transition_log();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("Init -> Generate"));
        assert!(lines[0].ends_with(": run started"));
    }

    #[test]
    fn test_transition_record_serde_roundtrip() {
        let record = TransitionRecord {
            from: KeepVerify,
            to: Fail,
            attempt: 3,
            elapsed_ms: 42,
            reason: Some("check passed with solution withheld".into()),
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"keep_verify\""));
        let restored: TransitionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.to, Fail);
        assert_eq!(restored.attempt, 3);
    }

    #[test]
    fn test_summary() {
        let mut sm = StateMachine::new();
        drive(&mut sm, &[Generate, Fail]);
        let summary = sm.summary();
        assert!(summary.contains("Fail"));
        assert!(summary.contains("2 transitions"));
    }
}
