//! Call-frame and scope tracking.
//!
//! An ordered stack of lexical-frame records. Named (function) frames take
//! fresh strictly-increasing ids; block frames inherit the enclosing named
//! frame's id, so id comparisons encode "called later than" for
//! step-over/step-out. The most recently popped frame is kept around for
//! error-stack reconstruction.

use smol_str::SmolStr;

use crate::value::EnvRef;

/// Where a frame currently is in its unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    pub unit: SmolStr,
    pub line: u32,
    pub column: u32,
}

/// One lexical frame on the stack.
pub struct FrameRecord {
    /// Function name for named frames; `None` for block frames.
    pub name: Option<SmolStr>,
    pub id: u64,
    /// Evaluator environment for this scope.
    pub env: EnvRef,
    /// Last statement position executed in this frame.
    pub call_site: Option<CallSite>,
}

/// Cloneable view of a frame for pause payloads and error reports.
#[derive(Debug, Clone)]
pub struct FrameSnapshot {
    pub name: Option<SmolStr>,
    pub id: u64,
    pub call_site: Option<CallSite>,
}

/// The frame stack.
pub struct FrameRegistry {
    chain: Vec<FrameRecord>,
    next_id: u64,
    last_popped: Option<FrameRecord>,
}

impl FrameRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            chain: Vec::new(),
            next_id: 0,
            last_popped: None,
        }
    }

    /// Pushes a named (function) frame; assigns a fresh id.
    pub fn push_named(&mut self, name: SmolStr, env: EnvRef) -> u64 {
        self.next_id += 1;
        self.chain.push(FrameRecord {
            name: Some(name),
            id: self.next_id,
            env,
            call_site: None,
        });
        self.next_id
    }

    /// Pushes a block frame inheriting the current named frame's id.
    pub fn push_block(&mut self, env: EnvRef) {
        let id = self.current_id();
        self.chain.push(FrameRecord {
            name: None,
            id,
            env,
            call_site: None,
        });
    }

    /// Pops the top frame, remembering it for error reports.
    pub fn pop(&mut self) {
        if let Some(frame) = self.chain.pop() {
            self.last_popped = Some(frame);
        }
    }

    /// Current frame id (0 outside any frame).
    #[must_use]
    pub fn current_id(&self) -> u64 {
        self.chain.last().map_or(0, |frame| frame.id)
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.chain.len()
    }

    /// Records the innermost named frame's current source position.
    pub fn update_call_site(&mut self, site: CallSite) {
        if let Some(frame) = self.chain.iter_mut().rev().find(|f| f.name.is_some()) {
            frame.call_site = Some(site);
        }
    }

    /// Environment of the frame with the given id, searching innermost
    /// first; `None` falls back to the innermost frame.
    #[must_use]
    pub fn env_for(&self, frame_id: Option<u64>) -> Option<EnvRef> {
        match frame_id {
            Some(id) => self
                .chain
                .iter()
                .rev()
                .find(|frame| frame.id == id)
                .map(|frame| frame.env.clone()),
            None => self.chain.last().map(|frame| frame.env.clone()),
        }
    }

    /// Snapshot of the whole chain, outermost first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<FrameSnapshot> {
        self.chain
            .iter()
            .map(|frame| FrameSnapshot {
                name: frame.name.clone(),
                id: frame.id,
                call_site: frame.call_site.clone(),
            })
            .collect()
    }

    /// Snapshot including the most recently popped frame, used when an
    /// error's own frame has already been removed by the time it surfaces.
    #[must_use]
    pub fn snapshot_with_last_popped(&self) -> Vec<FrameSnapshot> {
        let mut frames = self.snapshot();
        if let Some(frame) = &self.last_popped {
            frames.push(FrameSnapshot {
                name: frame.name.clone(),
                id: frame.id,
                call_site: frame.call_site.clone(),
            });
        }
        frames
    }
}

impl Default for FrameRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Env;

    #[test]
    fn named_frames_get_increasing_ids_and_blocks_inherit() {
        let mut registry = FrameRegistry::new();
        let env = Env::root();
        let a = registry.push_named(SmolStr::new("a"), env.clone());
        registry.push_block(env.clone());
        assert_eq!(registry.current_id(), a);
        let b = registry.push_named(SmolStr::new("b"), env.clone());
        assert!(b > a);
        registry.pop();
        registry.pop();
        assert_eq!(registry.current_id(), a);
    }

    #[test]
    fn last_popped_is_kept_for_error_stacks() {
        let mut registry = FrameRegistry::new();
        let env = Env::root();
        registry.push_named(SmolStr::new("outer"), env.clone());
        registry.push_named(SmolStr::new("inner"), env);
        registry.pop();
        let frames = registry.snapshot_with_last_popped();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].name.as_deref(), Some("inner"));
    }
}
