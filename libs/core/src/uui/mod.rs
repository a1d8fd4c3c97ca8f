//! Screen manager.
//!
//! Owns the fixed set of screens built at boot, routes input events to the
//! focused item of the current screen, drives the periodic tick and redraw,
//! and sequences screen changes so that settings are saved and output is
//! never live across a transition.
//!
//! Frozen rule: a screen's `deactivated` hook must leave the output stage
//! disabled (every mode does this by calling its own `enable(false)`).
//! `set_screen` relies on that contract instead of re-checking.

pub mod item;

pub use item::{IconWidget, Item, NumberWidget, SiPrefix, Unit, Widget};

use crate::event::Event;
use crate::func::FuncCtx;
use crate::settings::{SettingsStore, StoreError};
use heapless::{String, Vec};
use powerlynx_protocol::ParamStatus;

pub const MAX_SCREENS: usize = 6;
pub const MAX_PARAMETERS: usize = 6;

/// Outcome of a parameter set, richer than the wire status.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetParamStatus {
    Ok,
    UnknownName,
    RangeError,
    NotSupported,
    FlashError,
}

impl From<SetParamStatus> for ParamStatus {
    fn from(status: SetParamStatus) -> ParamStatus {
        match status {
            SetParamStatus::Ok => ParamStatus::Ok,
            SetParamStatus::UnknownName => ParamStatus::UnknownName,
            _ => ParamStatus::IllegalValue,
        }
    }
}

/// One operating mode and its screenful of items.
///
/// Hooks are invoked by the manager and the device core only; screens call
/// back into the power-control layer through the passed context.
pub trait Screen {
    fn name(&self) -> &'static str;

    fn items(&mut self) -> &mut [Item];

    /// The screen became current.
    fn activated(&mut self, ctx: &mut FuncCtx<'_>);

    /// The screen stops being current; must leave output disabled.
    fn deactivated(&mut self, ctx: &mut FuncCtx<'_>);

    /// Applies setpoints and switches the output stage.
    fn enable(&mut self, ctx: &mut FuncCtx<'_>, on: bool);

    /// Periodic work at the UI rate; may report a protection trip.
    fn tick(&mut self, ctx: &mut FuncCtx<'_>) -> Option<Event>;

    fn save_settings(&mut self, store: &mut dyn SettingsStore) -> Result<(), StoreError>;

    fn restore_settings(&mut self, store: &mut dyn SettingsStore);

    /// An item's value was edited through the UI.
    fn value_changed(&mut self, ctx: &mut FuncCtx<'_>, item: usize);

    fn parameter_names(&self) -> &'static [&'static str];

    fn set_parameter(&mut self, ctx: &mut FuncCtx<'_>, name: &str, value: &str) -> SetParamStatus;

    /// Writes the parameter's current value; false for unknown names.
    fn get_parameter(&self, name: &str, out: &mut String<16>) -> bool;
}

pub struct Uui<S: Screen> {
    screens: Vec<S, MAX_SCREENS>,
    current: usize,
    visible: bool,
    locked: bool,
    force_redraw: bool,
}

impl<S: Screen> Uui<S> {
    pub const fn new() -> Self {
        Uui {
            screens: Vec::new(),
            current: 0,
            visible: true,
            locked: false,
            force_redraw: true,
        }
    }

    pub fn add_screen(&mut self, screen: S) -> bool {
        self.screens.push(screen).is_ok()
    }

    pub fn screen_count(&self) -> usize {
        self.screens.len()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_screen(&mut self) -> Option<&mut S> {
        self.screens.get_mut(self.current)
    }

    pub fn screen_at(&mut self, index: usize) -> Option<&mut S> {
        self.screens.get_mut(index)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.screens.iter().map(|s| s.name())
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.screens.iter().position(|s| s.name() == name)
    }

    pub fn locked(&self) -> bool {
        self.locked
    }

    pub fn set_locked(&mut self, locked: bool) {
        if self.locked != locked {
            self.locked = locked;
            self.force_redraw = true;
        }
    }

    pub fn visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        if !self.visible && visible {
            self.force_redraw = true;
        }
        self.visible = visible;
    }

    pub fn request_redraw(&mut self) {
        self.force_redraw = true;
    }

    /// Makes screen `index` current, sequencing the handoff:
    /// old `deactivated` (output goes off), old `save_settings`, then new
    /// `restore_settings`, new `activated`, full redraw. The switch
    /// proceeds even if the save fails.
    pub fn set_screen(&mut self, ctx: &mut FuncCtx<'_>, index: usize) -> bool {
        if index >= self.screens.len() {
            return false;
        }
        if index == self.current {
            return true;
        }
        let old = &mut self.screens[self.current];
        old.deactivated(ctx);
        let _ = old.save_settings(ctx.store);
        self.current = index;
        let new = &mut self.screens[index];
        new.restore_settings(ctx.store);
        new.activated(ctx);
        for it in new.items() {
            it.dirty = true;
        }
        self.force_redraw = true;
        true
    }

    /// Routes a panel event. Edits and focus moves are ignored while the
    /// UI is hidden or locked.
    pub fn handle_event(&mut self, ctx: &mut FuncCtx<'_>, event: Event) {
        if !self.visible || self.locked {
            return;
        }
        let Some(screen) = self.screens.get_mut(self.current) else {
            return;
        };
        match event {
            Event::FocusNext => Self::move_focus(screen, 1),
            Event::FocusPrev => Self::move_focus(screen, -1),
            Event::Increment | Event::Decrement | Event::Select => {
                let items = screen.items();
                let Some(focused) = items.iter().position(|it| it.has_focus) else {
                    return;
                };
                let changed = items[focused].handle_event(event);
                if changed {
                    screen.value_changed(ctx, focused);
                }
            }
            _ => {}
        }
    }

    fn move_focus(screen: &mut S, dir: i32) {
        let items = screen.items();
        let n = items.len();
        if n == 0 {
            return;
        }
        let cur = items.iter().position(|it| it.has_focus);
        // With nothing focused, next lands on the first focusable item and
        // prev on the last.
        let start = match cur {
            Some(c) => c as i32,
            None if dir > 0 => n as i32 - 1,
            None => 0,
        };
        for step in 1..=n as i32 {
            let idx = (start + step * dir).rem_euclid(n as i32) as usize;
            if !items[idx].can_focus {
                continue;
            }
            if Some(idx) != cur {
                if let Some(c) = cur {
                    items[c].lost_focus();
                }
                items[idx].got_focus();
            }
            return;
        }
    }

    /// Runs the current screen's tick, then redraws dirty items (all items
    /// after a force request). Returns a protection trip if the screen
    /// reported one.
    pub fn tick(&mut self, ctx: &mut FuncCtx<'_>) -> Option<Event> {
        let Some(screen) = self.screens.get_mut(self.current) else {
            return None;
        };
        let trip = screen.tick(ctx);
        if self.visible {
            let force = core::mem::take(&mut self.force_redraw);
            let name = screen.name();
            for (i, it) in screen.items().iter_mut().enumerate() {
                if force || it.dirty {
                    ctx.hw.draw_item(name, i, it);
                    it.dirty = false;
                }
            }
        }
        trip
    }
}

impl<S: Screen> Default for Uui<S> {
    fn default() -> Self {
        Self::new()
    }
}
