//! Keyed list reconciliation
//!
//! Each item of a repeat list is identified by its track-by field, or by its
//! index when the template declares none. On every update:
//!
//! - keys that are missing, empty or duplicated in the new list never match
//!   an old item: those positions are always compiled fresh
//! - old items whose key is still present are kept, with their elements,
//!   child view models and local state; all others are destroyed
//! - the new list is walked in order behind a cursor. A kept item that is
//!   the next unconsumed one in old order is already in place; any other kept
//!   item is moved behind the cursor. New items are compiled behind it.
//!
//! A reorder of known keys therefore only moves elements, and a partial
//! overlap only adds and removes what actually changed.

use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use tessel_observe::{untracked, Object, Value};

use super::block::{create_block, FragBlock};
use super::{compile, move_target, remove_target, watch_block, Dest, Meta, Target};
use crate::app::App;
use crate::context::Scope;
use crate::differ::DiffKind;
use crate::template::{Repeat, Template};

/// One materialized list item
pub(crate) struct RepeatItem {
    key: Option<String>,
    target: Target,
    /// Index and value exposed to the item's bindings
    locals: Object,
}

struct RepeatList {
    scope: Scope,
    template: Rc<Template>,
    repeat: Repeat,
    track_by: Option<String>,
    block: Rc<FragBlock>,
}

impl RepeatList {
    /// Reuse key of an item; `None` is never reused. Keys compare by JSON
    /// text, so `1` and `"1"` differ.
    fn key_of(&self, index: usize, item: &Value) -> Option<String> {
        let Some(field) = &self.track_by else {
            return Some(index.to_string());
        };
        match untracked(|| item.get_path(field)) {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            key => Some(key.to_json().to_string()),
        }
    }

    fn set_locals(&self, locals: &Object, index: usize, item: &Value) {
        locals.set(self.repeat.key_name(), index);
        locals.set(self.repeat.value_name(), item.clone());
    }

    fn compile_item(&self, index: usize, item: &Value, key: Option<String>) -> Option<RepeatItem> {
        let locals = Object::new();
        self.set_locals(&locals, index, item);
        let scope = self.scope.child(locals.clone(), self.repeat.legacy);
        let meta = Meta {
            repeat: Some(item.clone()),
            ..Meta::default()
        };
        let target = compile(&scope, &self.template, &Dest::Block(self.block.clone()), &meta)?;
        Some(RepeatItem { key, target, locals })
    }

    fn reconcile(&self, list: &Value) {
        let Some(app) = self.scope.vm().app() else {
            return;
        };
        let items = untracked(|| match list {
            Value::Array(array) => array.to_vec(),
            Value::Null => Vec::new(),
            other => {
                tracing::warn!(value = ?other, "repeat expects an array");
                Vec::new()
            }
        });

        // keys seen more than once are never reused
        let mut counts: HashMap<String, usize> = HashMap::new();
        let raw_keys: Vec<Option<String>> = items
            .iter()
            .enumerate()
            .map(|(index, item)| self.key_of(index, item))
            .collect();
        for key in raw_keys.iter().flatten() {
            *counts.entry(key.clone()).or_default() += 1;
        }
        let keys: Vec<Option<String>> = raw_keys
            .into_iter()
            .map(|key| key.filter(|k| counts.get(k) == Some(&1)))
            .collect();
        let wanted: HashSet<&String> = keys.iter().flatten().collect();

        let old = std::mem::take(&mut *self.block.items.borrow_mut());
        let mut reused: HashMap<String, RepeatItem> = HashMap::new();
        let mut queue: VecDeque<String> = VecDeque::new();
        let mut removed = 0;
        for item in old {
            let keep = item
                .key
                .as_ref()
                .is_some_and(|key| wanted.contains(key) && !reused.contains_key(key));
            if keep {
                let key = item.key.clone().unwrap_or_default();
                queue.push_back(key.clone());
                reused.insert(key, item);
            } else {
                remove_target(&app, &item.target);
                removed += 1;
            }
        }

        let (mut added, mut moved) = (0, 0);
        let mut next = Vec::with_capacity(items.len());
        self.block.update_mark.set(Some(self.block.start));
        for (index, (item, key)) in items.iter().zip(keys).enumerate() {
            if app.is_aborted() {
                break;
            }
            let existing = key.as_ref().and_then(|k| reused.remove(k));
            match existing {
                Some(existing) => {
                    let key = existing.key.clone().unwrap_or_default();
                    if queue.front() == Some(&key) {
                        queue.pop_front();
                    } else {
                        queue.retain(|k| *k != key);
                        if let Some(mark) = self.block.update_mark.get() {
                            move_target(&app, self.block.parent, &existing.target, mark);
                            moved += 1;
                        }
                    }
                    self.set_locals(&existing.locals, index, item);
                    self.block.update_mark.set(Some(existing.target.last_node()));
                    next.push(existing);
                }
                None => {
                    if let Some(fresh) = self.compile_item(index, item, key) {
                        self.block.update_mark.set(Some(fresh.target.last_node()));
                        next.push(fresh);
                        added += 1;
                    }
                }
            }
        }
        self.block.update_mark.set(None);

        // left over when an abort cut the walk short
        for item in reused.into_values() {
            remove_target(&app, &item.target);
        }
        *self.block.items.borrow_mut() = next;
        tracing::debug!(block = self.block.id, added, moved, removed, "repeat reconciled");
    }
}

/// `repeat`: a block holding one compiled copy of the node per list item
pub(crate) fn compile_repeat(
    app: &App,
    scope: &Scope,
    template: &Rc<Template>,
    repeat: &Repeat,
    dest: &Dest,
) -> Option<Target> {
    let block = create_block(app, dest)?;
    let list = Rc::new(RepeatList {
        scope: scope.clone(),
        template: template.clone(),
        repeat: repeat.clone(),
        track_by: template.track_by_field(),
        block: block.clone(),
    });
    let on_change = list.clone();
    let initial = watch_block(
        scope,
        &block,
        repeat.expr.clone(),
        DiffKind::Repeat,
        Rc::new(move |value: &Value| on_change.reconcile(value)),
    );
    list.reconcile(&initial);
    Some(Target::Block(block))
}
