use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::controller::{NavController, NavUpdateKind, StorageMode};
use crate::destination::{DestinationRef, DestinationSet};
use crate::entry::{NavEntry, SavedLeafState};
use crate::error::{NavError, Result};
use crate::logging::{LogLevel, json_kv};
use crate::metrics::NavMetrics;
use crate::stack::BackStack;

/// Portable snapshot of one controller: its key and its entries in stack
/// order, current last. Instance ids are deliberately absent; restore mints
/// fresh ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerState {
    pub key: String,
    pub entries: Vec<EntryState>,
}

impl ControllerState {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// One persisted back-stack entry. Child controller states nest under the
/// entry that owns them; keys sort stably for deterministic output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryState {
    pub destination: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub args: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub saved_state: Option<SavedLeafState>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub children: BTreeMap<String, ControllerState>,
}

impl NavController {
    /// Snapshot this controller and every savable descendant. Memory-mode
    /// children are omitted; they reset to their start on restore.
    pub fn save_state(&self) -> ControllerState {
        let entries = self.entries().iter().map(save_entry).collect();
        self.record_metric(NavMetrics::record_save);
        self.log_nav(
            LogLevel::Info,
            "state_saved",
            [json_kv("depth", json!(self.len()))],
        );
        ControllerState {
            key: self.key().to_string(),
            entries,
        }
    }

    /// Rebuild the stack from a snapshot. Entries referencing destinations
    /// this controller no longer declares are dropped with a warning; if
    /// nothing survives, the controller resets to its start destination.
    /// Every restored entry gets a fresh instance id.
    pub fn restore_state(&mut self, state: ControllerState) -> Result<()> {
        if state.key != self.key() {
            return Err(NavError::Persistence(format!(
                "state for controller '{}' applied to '{}'",
                state.key,
                self.key()
            )));
        }

        let mut restored: Vec<NavEntry> = Vec::new();
        let mut dropped = 0usize;
        for entry_state in state.entries {
            if let Some(entry) = self.restore_entry(entry_state, &mut dropped) {
                restored.push(entry);
            }
        }

        if restored.is_empty() {
            let start = self.start().clone();
            restored.push(self.new_entry(start, None, None));
        }

        let mut stack = BackStack::empty();
        let depth = restored.len();
        for entry in restored {
            stack.push(entry);
        }
        for old in self.replace_stack(stack) {
            self.close_entry(old);
        }

        self.mark_forward(true);
        self.record_metric(|m| {
            m.record_restore();
            m.record_entries_dropped(dropped);
        });
        self.push_update(NavUpdateKind::Restored, None);
        self.log_nav(
            LogLevel::Info,
            "state_restored",
            [
                json_kv("depth", json!(depth)),
                json_kv("dropped", json!(dropped)),
            ],
        );
        Ok(())
    }

    /// Rebuild one entry, or `None` when its destination has drifted away.
    /// `dropped` accumulates every discarded entry, persisted descendants
    /// included, for the metrics report.
    fn restore_entry(&self, state: EntryState, dropped: &mut usize) -> Option<NavEntry> {
        let Some(destination) = self.destinations().get(&state.destination).cloned() else {
            *dropped += 1
                + state
                    .children
                    .values()
                    .map(state_entry_count)
                    .sum::<usize>();
            self.log_nav(
                LogLevel::Warn,
                "restore_dropped_entry",
                [json_kv("destination", json!(state.destination))],
            );
            return None;
        };

        let args = decode_saved_args(&destination, state.args, self);
        let mut entry = self.new_entry(destination.clone(), args, None);
        if let Some(saved) = state.saved_state {
            entry.attach_restored_state(saved);
        }

        for (key, child_state) in state.children {
            let Some(seed) = destination
                .nested_flows()
                .and_then(|flows| flows.child(&key))
                .cloned()
            else {
                *dropped += state_entry_count(&child_state);
                self.log_nav(
                    LogLevel::Warn,
                    "restore_dropped_child",
                    [
                        json_kv("child", json!(key)),
                        json_kv("destination", json!(destination.name())),
                    ],
                );
                continue;
            };
            let mode = seed.mode.unwrap_or(self.mode());
            let child = NavController::new(
                key.clone(),
                self.child_path(),
                DestinationSet::new(seed.destinations.iter().cloned()),
                &seed.start,
                mode,
                self.ctx().clone(),
            );
            match child {
                Ok(mut child) => {
                    if child.restore_state(child_state).is_ok() {
                        entry.insert_child(key, child);
                    }
                }
                Err(_) => {
                    *dropped += state_entry_count(&child_state);
                    self.log_nav(
                        LogLevel::Warn,
                        "restore_dropped_child",
                        [json_kv("child", json!(key))],
                    );
                }
            }
        }

        Some(entry)
    }
}

fn save_entry(entry: &NavEntry) -> EntryState {
    let mut children = BTreeMap::new();
    for (key, child) in entry.children() {
        if child.mode() == StorageMode::Savable {
            children.insert(key.clone(), child.save_state());
        }
    }
    EntryState {
        destination: entry.destination().name().to_string(),
        args: encode_saved_args(entry),
        saved_state: entry.saved_state().cloned(),
        children,
    }
}

/// Encode nav args for the save format. With a codec the args become the
/// codec's string form; without one the raw value is stored as-is.
fn encode_saved_args(entry: &NavEntry) -> Option<Value> {
    let args = entry.nav_args()?;
    if let Some(codec) = entry.destination().args_codec() {
        if let Some(encoded) = codec.args_to_string(args) {
            return Some(Value::String(encoded));
        }
    }
    Some(args.clone())
}

/// Inverse of [`encode_saved_args`]. A string that the codec cannot decode
/// is kept verbatim rather than dropping the whole entry.
fn decode_saved_args(
    destination: &DestinationRef,
    saved: Option<Value>,
    controller: &NavController,
) -> Option<Value> {
    let saved = saved?;
    let Some(codec) = destination.args_codec() else {
        return Some(saved);
    };
    match &saved {
        Value::String(text) => match codec.string_to_args(text) {
            Some(decoded) => Some(decoded),
            None => {
                controller.log_nav(
                    LogLevel::Warn,
                    "restore_args_undecodable",
                    [json_kv("destination", json!(destination.name()))],
                );
                Some(saved)
            }
        },
        _ => Some(saved),
    }
}

fn state_entry_count(state: &ControllerState) -> usize {
    state
        .entries
        .iter()
        .map(|entry| {
            1 + entry
                .children
                .values()
                .map(state_entry_count)
                .sum::<usize>()
        })
        .sum()
}
