//! Optimistic toggles.
//!
//! A toggle fires its intent at once and opens a confirmation window for its
//! subject. When the window closes the tracker compares the mirror with the
//! requested value: agreement confirms, anything else rolls back. A newer
//! toggle on the same subject cancels the older window outright, so at most
//! one window per subject is ever live.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use exfoliator_common::{Axis, OutboundMessage};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{ClientEvent, DeviceStateMirror, Effects, TimerId, TimerKind};

/// A device control that can be toggled and confirmed.
///
/// Displays as `axis:X`, `pneumatic:nozzle`, `vacuum:chuck`.
#[derive(Serialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SubjectKey {
    /// Drive enable state.
    Axis(Axis),
    Pneumatic(String),
    Vacuum(String),
}

impl SubjectKey {
    pub fn pneumatic(name: impl Into<String>) -> Self {
        SubjectKey::Pneumatic(name.into())
    }

    pub fn vacuum(name: impl Into<String>) -> Self {
        SubjectKey::Vacuum(name.into())
    }

    /// The control intent that drives this subject towards `desired`.
    pub fn intent(&self, desired: bool) -> OutboundMessage {
        match self {
            SubjectKey::Axis(axis) if desired => OutboundMessage::EnableAxis { axis: *axis },
            SubjectKey::Axis(axis) => OutboundMessage::DisableMotor { axis: *axis },
            SubjectKey::Pneumatic(name) => OutboundMessage::PneumaticControl {
                component: name.clone(),
                action: desired.into(),
            },
            SubjectKey::Vacuum(name) => OutboundMessage::VacuumControl {
                component: name.clone(),
                action: desired.into(),
            },
        }
    }
}

impl fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectKey::Axis(axis) => write!(f, "axis:{}", axis),
            SubjectKey::Pneumatic(name) => write!(f, "pneumatic:{}", name),
            SubjectKey::Vacuum(name) => write!(f, "vacuum:{}", name),
        }
    }
}

impl FromStr for SubjectKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, name) = s
            .split_once(':')
            .ok_or_else(|| format!("expected <kind>:<name>, got '{}'", s))?;
        if name.is_empty() {
            return Err(format!("missing name in '{}'", s));
        }
        match kind {
            "axis" => Ok(SubjectKey::Axis(name.parse()?)),
            "pneumatic" => Ok(SubjectKey::pneumatic(name)),
            "vacuum" => Ok(SubjectKey::vacuum(name)),
            other => Err(format!("unknown subject kind '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingConfirmation {
    pub key: SubjectKey,
    pub desired: bool,
    pub deadline: Instant,
    timer: TimerId,
}

#[derive(Debug)]
pub struct ConfirmationTracker {
    window: Duration,
    pending: HashMap<SubjectKey, PendingConfirmation>,
}

impl ConfirmationTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
        }
    }

    /// Fires the control intent for `key` and opens a confirmation window,
    /// replacing any window already open for the same subject.
    ///
    /// A failed send is logged and the window opens anyway; the rollback at
    /// the deadline is what the user sees.
    pub fn request_change(&mut self, key: SubjectKey, desired: bool, fx: &mut impl Effects) {
        if let Err(e) = fx.send(key.intent(desired)) {
            warn!(subject = %key, "toggle intent not sent: {}", e);
        }

        if let Some(previous) = self.pending.remove(&key) {
            debug!(subject = %key, "superseding pending confirmation");
            fx.cancel(previous.timer);
        }

        let timer = fx.schedule(TimerKind::Confirmation(key.clone()), self.window);
        let deadline = fx.now() + self.window;
        self.pending.insert(
            key.clone(),
            PendingConfirmation {
                key: key.clone(),
                desired,
                deadline,
                timer,
            },
        );
        fx.emit(ClientEvent::ChangeRequested { key, desired });
    }

    /// Decides a window when its timer fires. Timers that no longer belong to
    /// the live window for `key` are ignored.
    pub fn on_deadline(
        &mut self,
        key: &SubjectKey,
        timer: TimerId,
        mirror: &DeviceStateMirror,
        fx: &mut impl Effects,
    ) {
        match self.pending.get(key) {
            Some(pending) if pending.timer == timer => {}
            _ => {
                debug!(subject = %key, "ignoring superseded deadline");
                return;
            }
        }
        let Some(pending) = self.pending.remove(key) else {
            return;
        };

        let current = mirror.subject_value(key);
        if current == Some(pending.desired) {
            debug!(subject = %key, value = pending.desired, "change confirmed");
            fx.emit(ClientEvent::ChangeConfirmed {
                key: pending.key,
                value: pending.desired,
            });
        } else {
            info!(subject = %key, desired = pending.desired, restored = ?current, "change not confirmed, rolling back");
            fx.emit(ClientEvent::ChangeRolledBack {
                key: pending.key,
                desired: pending.desired,
                restored: current,
            });
        }
    }

    /// Drops every open window without deciding it.
    pub fn reset(&mut self, fx: &mut impl Effects) {
        for (_, pending) in self.pending.drain() {
            fx.cancel(pending.timer);
        }
    }

    pub fn pending(&self, key: &SubjectKey) -> Option<&PendingConfirmation> {
        self.pending.get(key)
    }

    pub fn pending_keys(&self) -> Vec<SubjectKey> {
        let mut keys: Vec<_> = self.pending.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
