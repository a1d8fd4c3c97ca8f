//! Input events crossing into the main loop.
//!
//! Interrupt handlers translate button edges, encoder steps and protection
//! comparator hits into one of these and push it through a [`Ring`]; the
//! main loop drains the queue and feeds [`crate::uui`].
//!
//! [`Ring`]: crate::ring::Ring

/// One debounced user action or protection trip.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Move focus to the next focusable item on the current screen.
    FocusNext,
    /// Move focus to the previous focusable item.
    FocusPrev,
    /// Rotary press: advance the digit cursor or confirm a selection.
    Select,
    /// Rotary step clockwise: increment the focused value.
    Increment,
    /// Rotary step counter-clockwise: decrement the focused value.
    Decrement,
    /// On/off button: toggle the output stage through the active function.
    PowerToggle,
    /// Switch to the next screen.
    ScreenNext,
    /// Switch to the previous screen.
    ScreenPrev,
    /// Over-current comparator tripped at the given measured current.
    OcpTripped { i_cut_ma: u16 },
    /// Over-voltage comparator tripped at the given measured voltage.
    OvpTripped { v_cut_mv: u16 },
}

impl Event {
    /// Events that move focus rather than edit the focused value.
    pub fn is_focus_navigation(self) -> bool {
        matches!(self, Event::FocusNext | Event::FocusPrev)
    }

    /// Protection trips bypass the lock flag and the focus system.
    pub fn is_trip(self) -> bool {
        matches!(self, Event::OcpTripped { .. } | Event::OvpTripped { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_covers_the_panel_events() {
        assert!(Event::FocusNext.is_focus_navigation());
        assert!(!Event::Increment.is_focus_navigation());
        assert!(Event::OcpTripped { i_cut_ma: 750 }.is_trip());
        assert!(Event::OvpTripped { v_cut_mv: 9000 }.is_trip());
        assert!(!Event::PowerToggle.is_trip());
    }
}
