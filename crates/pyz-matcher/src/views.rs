//! View enumeration.
//!
//! A view fixes one binding per variable. The driver enumerates views of
//! the variable under scrutiny - including the parameter variables of
//! the instances it holds, so nested matches see a consistent world -
//! and offers a skip hint: after a successful match, sibling views whose
//! bindings have the same type keys are skipped (they would produce the
//! same outcome); after a failure, siblings are enumerated exhaustively
//! so that every error is collected.

use pyz_abstract::{Ctx, TypeKey, Value, VarId, View};
use rustc_hash::FxHashSet;

/// Iterator over the views of a set of variables.
pub struct Views<'a, 'n> {
    ctx: &'a Ctx<'n>,
    vars: Vec<VarId>,
    counts: Vec<usize>,
    indices: Vec<usize>,
    exhausted: bool,
    /// Type keys of the last yielded view, pending a skip verdict.
    last: Option<Vec<TypeKey>>,
    succeeded: Vec<Vec<TypeKey>>,
}

impl<'a, 'n> Views<'a, 'n> {
    pub fn new(ctx: &'a Ctx<'n>, roots: &[VarId]) -> Self {
        let vars = collect_deep_vars(ctx, roots);
        let counts: Vec<usize> = vars.iter().map(|&v| ctx.program.binding_count(v)).collect();
        let exhausted = counts.iter().any(|&c| c == 0);
        let indices = vec![0; vars.len()];
        Views {
            ctx,
            vars,
            counts,
            indices,
            exhausted,
            last: None,
            succeeded: Vec::new(),
        }
    }

    /// The next view. `skip` reports the outcome of the previously
    /// yielded view: `Some(true)` means it matched and similar views
    /// may be skipped; `Some(false)` or `None` means enumerate all.
    pub fn next_view(&mut self, skip: Option<bool>) -> Option<View> {
        if let Some(last) = self.last.take() {
            if skip == Some(true) {
                self.succeeded.push(last);
            }
        }
        loop {
            if self.exhausted {
                return None;
            }
            let keys: Vec<TypeKey> = self
                .vars
                .iter()
                .zip(&self.indices)
                .map(|(&var, &index)| {
                    let binding = self.ctx.program.bindings(var)[index].value;
                    self.ctx.values.type_key(binding)
                })
                .collect();
            let skipped = self.succeeded.contains(&keys);
            let view = if skipped {
                None
            } else {
                let mut view = View::new();
                for (&var, &index) in self.vars.iter().zip(&self.indices) {
                    view.set(var, index);
                }
                Some(view)
            };
            self.advance();
            if let Some(view) = view {
                self.last = Some(keys);
                return Some(view);
            }
        }
    }

    fn advance(&mut self) {
        if self.vars.is_empty() {
            self.exhausted = true;
            return;
        }
        let mut position = self.vars.len();
        while position > 0 {
            position -= 1;
            self.indices[position] += 1;
            if self.indices[position] < self.counts[position] {
                return;
            }
            self.indices[position] = 0;
        }
        self.exhausted = true;
    }
}

/// The transitive closure of variables reachable from `roots` through
/// instance parameters and concrete container elements.
fn collect_deep_vars(ctx: &Ctx, roots: &[VarId]) -> Vec<VarId> {
    let mut seen: FxHashSet<VarId> = FxHashSet::default();
    let mut out = Vec::new();
    let mut worklist: Vec<VarId> = roots.to_vec();
    while let Some(var) = worklist.pop() {
        if !seen.insert(var) {
            continue;
        }
        // Bindingless inner variables contribute nothing to a view; the
        // empty-variable match path handles them. A bindingless root,
        // in contrast, means there are no views at all.
        if ctx.program.binding_count(var) == 0 && !roots.contains(&var) {
            continue;
        }
        out.push(var);
        for value in ctx.program.data(var) {
            match &*ctx.values.get(value) {
                Value::Instance(instance) => {
                    worklist.extend(instance.type_params.values().copied());
                }
                Value::Tuple(tuple) => {
                    worklist.extend(tuple.elements.iter().copied());
                }
                Value::Dict(dict) => {
                    worklist.extend(dict.entries.values().copied());
                    worklist.extend(dict.type_params.values().copied());
                }
                _ => {}
            }
        }
    }
    out
}
