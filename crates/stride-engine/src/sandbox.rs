//! Sandbox bridge: cooperative jobs for higher-order builtins.
//!
//! A registration table maps selected higher-order builtins (iteration,
//! transformation, search/replace, comparison) to job state machines. When
//! the bridge is active and such a builtin receives an instrumented
//! callback, the call site routes through a job instead of the native
//! implementation, so every per-element invocation runs through the
//! scheduler and stays pausable. Non-instrumented callbacks fall through to
//! the native builtins unchanged.

use smol_str::SmolStr;

use crate::engine::Engine;
use crate::value::{
    array_items_or_empty, is_instrumented_callable, to_display_string, to_number, truthy,
    ErrorKind, Payload, Value,
};

/// Which bridged operation a native builtin implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeKind {
    Map,
    ForEach,
    Filter,
    Reduce,
    ReduceRight,
    Find,
    FindIndex,
    Some,
    Every,
    FlatMap,
    Sort,
    ArrayFrom,
    Replace,
    ReplaceAll,
}

/// What a job asks the machine to do next.
pub enum BridgeStep {
    /// Invoke the callback; the result feeds the next `step`.
    Call {
        callee: Value,
        this: Value,
        args: Vec<Value>,
    },
    /// The operation finished with this value.
    Done(Value),
    /// The operation failed.
    Fail(Value),
}

/// A bridged operation in progress.
pub enum BridgeJob {
    Iterate(IterateJob),
    Reduce(ReduceJob),
    Sort(SortJob),
    Replace(ReplaceJob),
}

impl BridgeJob {
    pub fn step(&mut self, engine: &mut Engine, input: Value) -> BridgeStep {
        match self {
            BridgeJob::Iterate(job) => job.step(engine, input),
            BridgeJob::Reduce(job) => job.step(engine, input),
            BridgeJob::Sort(job) => job.step(input),
            BridgeJob::Replace(job) => job.step(input),
        }
    }
}

/// Builds the job for a bridged call, or `None` when the callback argument
/// is not an instrumented callable (native fall-through).
pub fn make_bridge_job(
    engine: &mut Engine,
    kind: BridgeKind,
    this: &Value,
    args: &[Value],
) -> Result<Option<BridgeJob>, Value> {
    let arg = |i: usize| args.get(i).cloned().unwrap_or(Value::Undefined);
    match kind {
        BridgeKind::Map
        | BridgeKind::ForEach
        | BridgeKind::Filter
        | BridgeKind::Find
        | BridgeKind::FindIndex
        | BridgeKind::Some
        | BridgeKind::Every
        | BridgeKind::FlatMap => {
            let callback = arg(0);
            if !is_instrumented_callable(&callback) {
                return Ok(None);
            }
            let items = require_array(engine, this)?;
            Ok(Some(BridgeJob::Iterate(IterateJob::new(
                kind,
                items,
                this.clone(),
                callback,
                arg(1),
            ))))
        }
        BridgeKind::ArrayFrom => {
            let callback = arg(1);
            if !is_instrumented_callable(&callback) {
                return Ok(None);
            }
            let items = crate::value::iterable_items(&arg(0));
            let source = arg(0);
            Ok(Some(BridgeJob::Iterate(IterateJob::new(
                kind,
                items,
                source,
                callback,
                arg(2),
            ))))
        }
        BridgeKind::Reduce | BridgeKind::ReduceRight => {
            let callback = arg(0);
            if !is_instrumented_callable(&callback) {
                return Ok(None);
            }
            let items = require_array(engine, this)?;
            Ok(Some(BridgeJob::Reduce(ReduceJob::new(
                items,
                this.clone(),
                callback,
                args.get(1).cloned(),
                kind == BridgeKind::ReduceRight,
            ))))
        }
        BridgeKind::Sort => {
            let comparator = arg(0);
            if !is_instrumented_callable(&comparator) {
                return Ok(None);
            }
            let items = require_array(engine, this)?;
            Ok(Some(BridgeJob::Sort(SortJob::new(
                items,
                this.clone(),
                comparator,
            ))))
        }
        BridgeKind::Replace | BridgeKind::ReplaceAll => {
            let replacer = arg(1);
            if !is_instrumented_callable(&replacer) {
                return Ok(None);
            }
            let pattern = arg(0);
            if !matches!(pattern, Value::Str(_)) {
                return Ok(None);
            }
            Ok(Some(BridgeJob::Replace(ReplaceJob::new(
                to_display_string(this),
                to_display_string(&pattern),
                replacer,
                kind == BridgeKind::ReplaceAll,
            ))))
        }
    }
}

fn require_array(engine: &mut Engine, this: &Value) -> Result<Vec<Value>, Value> {
    match this {
        Value::Object(obj) => match &obj.borrow().payload {
            Payload::Array(items) => Ok(items.clone()),
            _ => Err(engine.make_error(ErrorKind::TypeError, "not an array")),
        },
        _ => Err(engine.make_error(ErrorKind::TypeError, "not an array")),
    }
}

// =============================================================================
// Iteration
// =============================================================================

pub struct IterateJob {
    kind: BridgeKind,
    items: Vec<Value>,
    receiver: Value,
    callback: Value,
    this_arg: Value,
    next: usize,
    started: bool,
    out: Vec<Value>,
}

impl IterateJob {
    fn new(
        kind: BridgeKind,
        items: Vec<Value>,
        receiver: Value,
        callback: Value,
        this_arg: Value,
    ) -> Self {
        Self {
            kind,
            items,
            receiver,
            callback,
            this_arg,
            next: 0,
            started: false,
            out: Vec::new(),
        }
    }

    fn step(&mut self, engine: &mut Engine, input: Value) -> BridgeStep {
        if self.started {
            let done_idx = self.next - 1;
            let result = input;
            match self.kind {
                BridgeKind::Map | BridgeKind::ArrayFrom => self.out.push(result),
                BridgeKind::ForEach => {}
                BridgeKind::Filter => {
                    if truthy(&result) {
                        self.out.push(self.items[done_idx].clone());
                    }
                }
                BridgeKind::Find => {
                    if truthy(&result) {
                        return BridgeStep::Done(self.items[done_idx].clone());
                    }
                }
                BridgeKind::FindIndex => {
                    if truthy(&result) {
                        return BridgeStep::Done(Value::Number(done_idx as f64));
                    }
                }
                BridgeKind::Some => {
                    if truthy(&result) {
                        return BridgeStep::Done(Value::Bool(true));
                    }
                }
                BridgeKind::Every => {
                    if !truthy(&result) {
                        return BridgeStep::Done(Value::Bool(false));
                    }
                }
                BridgeKind::FlatMap => {
                    let is_array = matches!(
                        &result,
                        Value::Object(obj) if matches!(obj.borrow().payload, Payload::Array(_))
                    );
                    if is_array {
                        self.out.extend(array_items_or_empty(&result));
                    } else {
                        self.out.push(result);
                    }
                }
                _ => {}
            }
        }
        if self.next < self.items.len() {
            let idx = self.next;
            self.next += 1;
            self.started = true;
            return BridgeStep::Call {
                callee: self.callback.clone(),
                this: self.this_arg.clone(),
                args: vec![
                    self.items[idx].clone(),
                    Value::Number(idx as f64),
                    self.receiver.clone(),
                ],
            };
        }
        let out = std::mem::take(&mut self.out);
        BridgeStep::Done(match self.kind {
            BridgeKind::Map | BridgeKind::Filter | BridgeKind::FlatMap | BridgeKind::ArrayFrom => {
                engine.realm.new_array(out)
            }
            BridgeKind::ForEach => Value::Undefined,
            BridgeKind::Find => Value::Undefined,
            BridgeKind::FindIndex => Value::Number(-1.0),
            BridgeKind::Some => Value::Bool(false),
            BridgeKind::Every => Value::Bool(true),
            _ => Value::Undefined,
        })
    }
}

// =============================================================================
// Reduce
// =============================================================================

pub struct ReduceJob {
    /// (original index, element) in visit order.
    items: Vec<(usize, Value)>,
    receiver: Value,
    callback: Value,
    acc: Option<Value>,
    next: usize,
    started: bool,
}

impl ReduceJob {
    fn new(
        items: Vec<Value>,
        receiver: Value,
        callback: Value,
        init: Option<Value>,
        right: bool,
    ) -> Self {
        let mut indexed: Vec<(usize, Value)> = items.into_iter().enumerate().collect();
        if right {
            indexed.reverse();
        }
        Self {
            items: indexed,
            receiver,
            callback,
            acc: init,
            next: 0,
            started: false,
        }
    }

    fn step(&mut self, engine: &mut Engine, input: Value) -> BridgeStep {
        if self.started {
            self.acc = Some(input);
        } else if self.acc.is_none() {
            match self.items.first() {
                Some((_, first)) => {
                    self.acc = Some(first.clone());
                    self.next = 1;
                }
                None => {
                    return BridgeStep::Fail(engine.make_error(
                        ErrorKind::TypeError,
                        "reduce of empty array with no initial value",
                    ))
                }
            }
        }
        if self.next < self.items.len() {
            let (idx, item) = self.items[self.next].clone();
            self.next += 1;
            self.started = true;
            return BridgeStep::Call {
                callee: self.callback.clone(),
                this: Value::Undefined,
                args: vec![
                    self.acc.clone().unwrap_or(Value::Undefined),
                    item,
                    Value::Number(idx as f64),
                    self.receiver.clone(),
                ],
            };
        }
        BridgeStep::Done(self.acc.take().unwrap_or(Value::Undefined))
    }
}

// =============================================================================
// Sort
// =============================================================================

/// Stable bottom-up merge sort, so comparator suspension does not alter the
/// iteration order the native stable sort would produce.
pub struct SortJob {
    receiver: Value,
    comparator: Value,
    src: Vec<Value>,
    dst: Vec<Value>,
    width: usize,
    lo: usize,
    i: usize,
    j: usize,
    k: usize,
    started: bool,
}

impl SortJob {
    fn new(items: Vec<Value>, receiver: Value, comparator: Value) -> Self {
        let n = items.len();
        let mut job = Self {
            receiver,
            comparator,
            dst: vec![Value::Undefined; n],
            src: items,
            width: 1,
            lo: 0,
            i: 0,
            j: 0,
            k: 0,
            started: false,
        };
        job.open_window();
        job
    }

    fn n(&self) -> usize {
        self.src.len()
    }

    fn mid(&self) -> usize {
        (self.lo + self.width).min(self.n())
    }

    fn hi(&self) -> usize {
        (self.lo + 2 * self.width).min(self.n())
    }

    fn open_window(&mut self) {
        self.i = self.lo;
        self.j = self.mid();
        self.k = self.lo;
    }

    fn step(&mut self, input: Value) -> BridgeStep {
        if self.started {
            // A comparison settled: take from the right run when positive.
            if to_number(&input) > 0.0 {
                self.dst[self.k] = self.src[self.j].clone();
                self.j += 1;
            } else {
                self.dst[self.k] = self.src[self.i].clone();
                self.i += 1;
            }
            self.k += 1;
            self.started = false;
        }
        loop {
            if self.width >= self.n().max(1) {
                let sorted = std::mem::take(&mut self.src);
                if let Value::Object(obj) = &self.receiver {
                    if let Payload::Array(items) = &mut obj.borrow_mut().payload {
                        *items = sorted;
                    }
                }
                return BridgeStep::Done(self.receiver.clone());
            }
            let (mid, hi) = (self.mid(), self.hi());
            if self.k < hi {
                if self.i < mid && self.j < hi {
                    self.started = true;
                    return BridgeStep::Call {
                        callee: self.comparator.clone(),
                        this: Value::Undefined,
                        args: vec![self.src[self.i].clone(), self.src[self.j].clone()],
                    };
                }
                // One run is exhausted: copy the rest without comparing.
                while self.i < mid {
                    self.dst[self.k] = self.src[self.i].clone();
                    self.i += 1;
                    self.k += 1;
                }
                while self.j < hi {
                    self.dst[self.k] = self.src[self.j].clone();
                    self.j += 1;
                    self.k += 1;
                }
            }
            self.lo = hi;
            if self.lo >= self.n() {
                std::mem::swap(&mut self.src, &mut self.dst);
                self.width *= 2;
                self.lo = 0;
            }
            self.open_window();
        }
    }
}

// =============================================================================
// Replace
// =============================================================================

/// Callback-driven string replacement over a literal pattern.
pub struct ReplaceJob {
    text: String,
    pattern: String,
    replacer: Value,
    all: bool,
    /// Byte offset scanning position.
    cursor: usize,
    out: String,
    started: bool,
    pending_match_end: usize,
}

impl ReplaceJob {
    fn new(text: String, pattern: String, replacer: Value, all: bool) -> Self {
        Self {
            text,
            pattern,
            replacer,
            all,
            cursor: 0,
            out: String::new(),
            started: false,
            pending_match_end: 0,
        }
    }

    fn step(&mut self, input: Value) -> BridgeStep {
        if self.started {
            self.out.push_str(&to_display_string(&input));
            self.cursor = self.pending_match_end;
            if !self.all {
                self.out.push_str(&self.text[self.cursor..]);
                return BridgeStep::Done(Value::str(std::mem::take(&mut self.out)));
            }
        }
        if self.pattern.is_empty() {
            self.out.push_str(&self.text[self.cursor..]);
            return BridgeStep::Done(Value::str(std::mem::take(&mut self.out)));
        }
        match self.text[self.cursor..].find(&self.pattern) {
            Some(found) => {
                let at = self.cursor + found;
                self.out.push_str(&self.text[self.cursor..at]);
                self.pending_match_end = at + self.pattern.len();
                self.started = true;
                let offset = self.text[..at].chars().count();
                BridgeStep::Call {
                    callee: self.replacer.clone(),
                    this: Value::Undefined,
                    args: vec![
                        Value::str(&self.pattern),
                        Value::Number(offset as f64),
                        Value::str(&self.text),
                    ],
                }
            }
            None => {
                self.out.push_str(&self.text[self.cursor..]);
                BridgeStep::Done(Value::str(std::mem::take(&mut self.out)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_sort_visits_pairs_stably_without_an_engine_callback() {
        // Drive the sort job with a numeric comparator simulated inline.
        let items: Vec<Value> = [3.0, 1.0, 2.0, 1.0]
            .iter()
            .map(|n| Value::Number(*n))
            .collect();
        let mut job = SortJob::new(items, Value::Undefined, Value::Undefined);
        let mut input = Value::Undefined;
        let sorted = loop {
            // The receiver is not an array here, so the job returns its own
            // buffer through Done(receiver); inspect src before that.
            match job.step_for_test(input) {
                BridgeStep::Call { args, .. } => {
                    let a = to_number(&args[0]);
                    let b = to_number(&args[1]);
                    input = Value::Number(a - b);
                }
                BridgeStep::Done(_) => break job.src.clone(),
                BridgeStep::Fail(_) => panic!("sort failed"),
            }
        };
        let numbers: Vec<f64> = sorted.iter().map(to_number).collect();
        assert_eq!(numbers, vec![1.0, 1.0, 2.0, 3.0]);
    }
}

#[cfg(test)]
impl SortJob {
    /// Test-only drive without an engine.
    fn step_for_test(&mut self, input: Value) -> BridgeStep {
        if self.started {
            if to_number(&input) > 0.0 {
                self.dst[self.k] = self.src[self.j].clone();
                self.j += 1;
            } else {
                self.dst[self.k] = self.src[self.i].clone();
                self.i += 1;
            }
            self.k += 1;
            self.started = false;
        }
        loop {
            if self.width >= self.n().max(1) {
                return BridgeStep::Done(Value::Undefined);
            }
            let (mid, hi) = (self.mid(), self.hi());
            if self.k < hi {
                if self.i < mid && self.j < hi {
                    self.started = true;
                    return BridgeStep::Call {
                        callee: Value::Undefined,
                        this: Value::Undefined,
                        args: vec![self.src[self.i].clone(), self.src[self.j].clone()],
                    };
                }
                while self.i < mid {
                    self.dst[self.k] = self.src[self.i].clone();
                    self.i += 1;
                    self.k += 1;
                }
                while self.j < hi {
                    self.dst[self.k] = self.src[self.j].clone();
                    self.j += 1;
                    self.k += 1;
                }
            }
            self.lo = hi;
            if self.lo >= self.n() {
                std::mem::swap(&mut self.src, &mut self.dst);
                self.width *= 2;
                self.lo = 0;
            }
            self.open_window();
        }
    }
}
