//! Stuck-loop detection (`spec.md` §4.C step 8). Not present in the teacher
//! corpus; built in the idiom of `agent/mod.rs`'s small owned-state structs
//! threaded through the iteration rather than copied from an existing file.

use std::collections::VecDeque;

use serde_json::Value;

use crate::llm::ToolCallRequest;

/// How many of the most recent calls are kept for duplicate/streak checks.
const WINDOW: usize = 20;
/// Consecutive same-tool failures before a warning fires.
const FAILURE_STREAK: usize = 3;
/// Warnings accumulated before the loop force-escalates.
const WARNING_LIMIT: u32 = 3;

#[derive(Debug, Clone)]
struct CallRecord {
    name: String,
    fingerprint: String,
    success: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StuckSignal {
    None,
    Warn,
    ForceEscalate,
}

/// Bounded window of recent tool calls for one loop run.
#[derive(Debug, Default)]
pub struct StuckDetector {
    window: VecDeque<CallRecord>,
    warning_count: u32,
}

impl StuckDetector {
    pub fn new() -> Self {
        Self::default()
    }

    fn fingerprint(args: &Value) -> String {
        serde_json::to_string(args).unwrap_or_default()
    }

    /// Records one completed call and returns the signal step 8/9 should act
    /// on (inject a warning message, or force an escalating exit).
    pub fn record(&mut self, call: &ToolCallRequest, success: bool) -> StuckSignal {
        let fingerprint = Self::fingerprint(&call.arguments);

        let duplicate = self.window.iter().any(|r| r.name == call.name && r.fingerprint == fingerprint);

        let failure_streak = !success
            && self.window.len() + 1 >= FAILURE_STREAK
            && self
                .window
                .iter()
                .rev()
                .take(FAILURE_STREAK - 1)
                .all(|r| r.name == call.name && !r.success);

        self.window.push_back(CallRecord { name: call.name.clone(), fingerprint, success });
        if self.window.len() > WINDOW {
            self.window.pop_front();
        }

        if duplicate || failure_streak {
            self.warning_count += 1;
            if self.warning_count >= WARNING_LIMIT {
                return StuckSignal::ForceEscalate;
            }
            return StuckSignal::Warn;
        }

        StuckSignal::None
    }

    pub fn warning_count(&self) -> u32 {
        self.warning_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: Value) -> ToolCallRequest {
        ToolCallRequest { id: uuid::Uuid::new_v4().to_string(), name: name.to_string(), arguments: args }
    }

    #[test]
    fn duplicate_id_and_args_warns() {
        let mut detector = StuckDetector::new();
        let a = call("file.read", serde_json::json!({"path": "a.txt"}));
        assert_eq!(detector.record(&a, true), StuckSignal::None);
        let b = call("file.read", serde_json::json!({"path": "a.txt"}));
        assert_eq!(detector.record(&b, true), StuckSignal::Warn);
    }

    #[test]
    fn three_consecutive_failures_warns() {
        let mut detector = StuckDetector::new();
        assert_eq!(detector.record(&call("file.write", serde_json::json!({"n": 1})), false), StuckSignal::None);
        assert_eq!(detector.record(&call("file.write", serde_json::json!({"n": 2})), false), StuckSignal::None);
        assert_eq!(detector.record(&call("file.write", serde_json::json!({"n": 3})), false), StuckSignal::Warn);
    }

    #[test]
    fn repeated_warnings_force_escalate() {
        let mut detector = StuckDetector::new();
        let args = serde_json::json!({"path": "a.txt"});
        detector.record(&call("file.read", args.clone()), true);
        for _ in 0..(WARNING_LIMIT - 1) {
            let signal = detector.record(&call("file.read", args.clone()), true);
            assert_eq!(signal, StuckSignal::Warn);
        }
        let signal = detector.record(&call("file.read", args), true);
        assert_eq!(signal, StuckSignal::ForceEscalate);
    }

    #[test]
    fn distinct_calls_do_not_warn() {
        let mut detector = StuckDetector::new();
        assert_eq!(detector.record(&call("file.read", serde_json::json!({"path": "a"})), true), StuckSignal::None);
        assert_eq!(detector.record(&call("file.read", serde_json::json!({"path": "b"})), true), StuckSignal::None);
        assert_eq!(detector.record(&call("file.write", serde_json::json!({"path": "a"})), true), StuckSignal::None);
    }
}
