//! Breakpoint registry and matching policy.
//!
//! Breakpoint ids are allocated monotonically at transform time and never
//! reused; an id denotes one fixed (line, column) within one unit. The
//! registry also owns the global flags (breakpoints enabled, single-shot
//! pause, pause-on-exception) and the policy decision applied at every
//! suspension check.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Conditions evaluated as a breakpoint condition expression; a condition
/// whose text starts with this tag only evaluates for its side effect and
/// never pauses.
pub const LOG_POINT_TAG: &str = "/** LOGPOINT */";

/// Registered state of one breakpoint id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Condition {
    /// Unconditional.
    Always,
    /// Pause only when the expression evaluates truthy in the current frame.
    Expr(String),
}

/// A possible or registered breakpoint position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Breakpoint {
    pub id: u32,
    pub line: u32,
    pub column: u32,
}

/// Stepping policy for `resume`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMode {
    Into,
    Over,
    Out,
}

/// Step bookkeeping recorded when a resume begins.
#[derive(Debug, Clone, Copy)]
pub struct ResumeOptions {
    pub mode: StepMode,
    /// Frame id at the moment stepping was requested.
    pub frame_id: u64,
}

/// Outcome of the matching policy for one suspension check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckDecision {
    Run,
    Pause,
}

/// Policy outcome before condition evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreDecision {
    Run,
    Pause,
    /// A condition expression must be evaluated in the current frame.
    Condition(String),
}

/// The breakpoint registry.
pub struct BreakpointRegistry {
    next_id: u32,
    conditions: FxHashMap<u32, Condition>,
    active: bool,
    pause_next: bool,
    pause_on_exception: bool,
}

impl BreakpointRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: 1,
            conditions: FxHashMap::default(),
            active: true,
            pause_next: false,
            pause_on_exception: false,
        }
    }

    /// Allocates the next breakpoint id.
    pub fn allocate(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Raises the allocator above ids carried by a precompiled payload.
    pub fn reserve_through(&mut self, max_id: u32) {
        self.next_id = self.next_id.max(max_id + 1);
    }

    /// Registers a condition for an id, returning the previous state.
    pub fn register(&mut self, id: u32, condition: Condition) -> Option<Condition> {
        self.conditions.insert(id, condition)
    }

    /// Registers a condition only when the id has none yet (payload merge).
    pub fn register_if_absent(&mut self, id: u32, condition: Condition) {
        self.conditions.entry(id).or_insert(condition);
    }

    /// Removes a breakpoint by id.
    pub fn remove(&mut self, id: u32) -> bool {
        self.conditions.remove(&id).is_some()
    }

    #[must_use]
    pub fn condition(&self, id: u32) -> Option<&Condition> {
        self.conditions.get(&id)
    }

    /// Conditions snapshot for precompiled payloads.
    #[must_use]
    pub fn registered(&self) -> Vec<(u32, Condition)> {
        let mut entries: Vec<_> = self
            .conditions
            .iter()
            .map(|(id, condition)| (*id, condition.clone()))
            .collect();
        entries.sort_by_key(|(id, _)| *id);
        entries
    }

    pub fn set_active(&mut self, active: bool) -> bool {
        self.active = active;
        active
    }

    pub fn set_pause_next(&mut self, pause: bool) -> bool {
        self.pause_next = pause;
        pause
    }

    pub fn set_pause_on_exception(&mut self, pause: bool) -> bool {
        self.pause_on_exception = pause;
        pause
    }

    #[must_use]
    pub fn pause_on_exception(&self) -> bool {
        self.pause_on_exception
    }

    /// First phase of the matching policy: everything except condition
    /// evaluation, which needs a live frame evaluator.
    pub fn decide_pre(
        &mut self,
        bp: u32,
        stepping: Option<ResumeOptions>,
        current_frame_id: u64,
    ) -> PreDecision {
        if self.pause_next {
            self.pause_next = false;
            return PreDecision::Pause;
        }
        if !self.active {
            return PreDecision::Run;
        }
        let condition = self.conditions.get(&bp).cloned();
        if condition.is_none() && stepping.is_none() {
            return PreDecision::Run;
        }
        match stepping {
            Some(ResumeOptions {
                mode: StepMode::Over,
                frame_id,
            }) if frame_id < current_frame_id => return PreDecision::Run,
            Some(ResumeOptions {
                mode: StepMode::Out,
                frame_id,
            }) if frame_id <= current_frame_id => return PreDecision::Run,
            _ => {}
        }
        match condition {
            Some(Condition::Expr(expr)) => PreDecision::Condition(expr),
            _ => PreDecision::Pause,
        }
    }

    /// Applies the matching policy for a (non-boundary) suspension check.
    ///
    /// `eval_condition` evaluates a condition expression in the current
    /// frame and reports its truthiness.
    pub fn decide(
        &mut self,
        bp: u32,
        stepping: Option<ResumeOptions>,
        current_frame_id: u64,
        eval_condition: impl FnOnce(&str) -> bool,
    ) -> CheckDecision {
        match self.decide_pre(bp, stepping, current_frame_id) {
            PreDecision::Run => CheckDecision::Run,
            PreDecision::Pause => CheckDecision::Pause,
            PreDecision::Condition(expr) => {
                if !eval_condition(&expr) || expr.starts_with(LOG_POINT_TAG) {
                    CheckDecision::Run
                } else {
                    CheckDecision::Pause
                }
            }
        }
    }

    /// Forward proximity search over a unit's line index: up to 50 lines
    /// down and, within a line, up to 200 columns right.
    #[must_use]
    pub fn find_near(
        index: &IndexMap<u32, IndexMap<u32, u32>>,
        line: u32,
        column: Option<u32>,
    ) -> Option<Breakpoint> {
        for l in line..line.saturating_add(50) {
            let Some(columns) = index.get(&l) else {
                continue;
            };
            match column {
                Some(start) => {
                    for c in start..start.saturating_add(200) {
                        if let Some(&id) = columns.get(&c) {
                            return Some(Breakpoint { id, line: l, column: c });
                        }
                    }
                }
                None => {
                    if let Some((&c, &id)) = columns.first() {
                        return Some(Breakpoint { id, line: l, column: c });
                    }
                }
            }
        }
        None
    }
}

impl Default for BreakpointRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_with(entries: &[(u32, u32, u32)]) -> IndexMap<u32, IndexMap<u32, u32>> {
        let mut index: IndexMap<u32, IndexMap<u32, u32>> = IndexMap::new();
        for &(line, column, id) in entries {
            index.entry(line).or_default().insert(column, id);
        }
        index
    }

    #[test]
    fn forward_search_finds_next_line() {
        let index = index_with(&[(5, 2, 7), (9, 0, 9)]);
        let hit = BreakpointRegistry::find_near(&index, 3, None).unwrap();
        assert_eq!((hit.id, hit.line, hit.column), (7, 5, 2));
        assert!(BreakpointRegistry::find_near(&index, 60, None).is_none());
    }

    #[test]
    fn forward_search_respects_column_window() {
        let index = index_with(&[(5, 250, 7)]);
        assert!(BreakpointRegistry::find_near(&index, 5, Some(0)).is_none());
        let hit = BreakpointRegistry::find_near(&index, 5, Some(100)).unwrap();
        assert_eq!(hit.id, 7);
    }

    #[test]
    fn step_over_suppresses_deeper_frames() {
        let mut registry = BreakpointRegistry::new();
        let stepping = Some(ResumeOptions {
            mode: StepMode::Over,
            frame_id: 3,
        });
        assert_eq!(
            registry.decide(1, stepping, 5, |_| true),
            CheckDecision::Run
        );
        assert_eq!(
            registry.decide(1, stepping, 3, |_| true),
            CheckDecision::Pause
        );
    }

    #[test]
    fn step_out_requires_strictly_shallower_frame() {
        let mut registry = BreakpointRegistry::new();
        let stepping = Some(ResumeOptions {
            mode: StepMode::Out,
            frame_id: 3,
        });
        assert_eq!(
            registry.decide(1, stepping, 3, |_| true),
            CheckDecision::Run
        );
        assert_eq!(
            registry.decide(1, stepping, 2, |_| true),
            CheckDecision::Pause
        );
    }

    #[test]
    fn pause_next_is_single_shot() {
        let mut registry = BreakpointRegistry::new();
        registry.set_pause_next(true);
        assert_eq!(registry.decide(1, None, 0, |_| true), CheckDecision::Pause);
        assert_eq!(registry.decide(1, None, 0, |_| true), CheckDecision::Run);
    }

    #[test]
    fn log_points_never_pause() {
        let mut registry = BreakpointRegistry::new();
        registry.register(4, Condition::Expr(format!("{LOG_POINT_TAG}count")));
        assert_eq!(registry.decide(4, None, 0, |_| true), CheckDecision::Run);
        registry.register(4, Condition::Expr("count > 1".to_string()));
        assert_eq!(registry.decide(4, None, 0, |_| false), CheckDecision::Run);
        assert_eq!(registry.decide(4, None, 0, |_| true), CheckDecision::Pause);
    }
}
