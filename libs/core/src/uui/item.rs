//! Screen items and their widgets.
//!
//! Two widget kinds cover every screen: a digit-cursor number editor and
//! an icon selector. Items wrap a widget with focus and dirty flags; the
//! manager in [`crate::uui`] owns navigation and redraw, the renderer
//! behind [`crate::hal::Hal::draw_item`] owns pixels.

use crate::event::Event;
use heapless::String;

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Volt,
    Ampere,
    Hertz,
    Percent,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiPrefix {
    None,
    Milli,
}

impl SiPrefix {
    /// Decimal places between stored integers and base units.
    const fn shift(self) -> u8 {
        match self {
            SiPrefix::None => 0,
            SiPrefix::Milli => 3,
        }
    }
}

fn pow10(e: u32) -> i32 {
    10i32.pow(e)
}

/// Number editor with one editable digit at a time.
///
/// `value` is stored in prefix units (mV for a milli-volt widget); the
/// display shows `digits` integer and `decimals` fractional digits in base
/// units. The digit cursor starts at the most significant digit and
/// `select` walks it right, wrapping.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberWidget {
    pub value: i32,
    pub min: i32,
    pub max: i32,
    pub digits: u8,
    pub decimals: u8,
    pub unit: Unit,
    pub prefix: SiPrefix,
    cur_digit: u8,
}

impl NumberWidget {
    pub const fn new(unit: Unit, prefix: SiPrefix, digits: u8, decimals: u8) -> Self {
        NumberWidget {
            value: 0,
            min: 0,
            max: 0,
            digits,
            decimals,
            unit,
            prefix,
            cur_digit: 0,
        }
    }

    pub const fn with_range(mut self, min: i32, max: i32) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub const fn with_value(mut self, value: i32) -> Self {
        self.value = value;
        self
    }

    /// Stored-unit weight of the digit under the cursor.
    ///
    /// The display's least significant digit is worth
    /// `10^(shift - decimals)` stored units, so cursor position `d` is
    /// worth `10^(digits - 1 - d + shift)`. Configurations must keep
    /// `decimals <= shift` or the last display digits would need
    /// fractional storage.
    fn step(&self) -> i32 {
        let e = self.digits as i32 - 1 - self.cur_digit as i32 + self.prefix.shift() as i32;
        pow10(e as u32)
    }

    pub fn digit(&self) -> u8 {
        self.cur_digit
    }

    /// Number of cursor positions: integer digits plus the fractional
    /// digits that map to whole stored units.
    fn editable_digits(&self) -> u8 {
        self.digits + self.decimals.min(self.prefix.shift())
    }

    pub fn select(&mut self) {
        self.cur_digit = (self.cur_digit + 1) % self.editable_digits().max(1);
    }

    pub fn reset_cursor(&mut self) {
        self.cur_digit = 0;
    }

    pub fn set_value(&mut self, value: i32) {
        self.value = value.clamp(self.min, self.max);
    }

    /// Adds the cursor digit's weight, clamped. Returns whether the value
    /// moved.
    pub fn increment(&mut self) -> bool {
        let next = self.value.saturating_add(self.step()).clamp(self.min, self.max);
        let changed = next != self.value;
        self.value = next;
        changed
    }

    pub fn decrement(&mut self) -> bool {
        let next = self.value.saturating_sub(self.step()).clamp(self.min, self.max);
        let changed = next != self.value;
        self.value = next;
        changed
    }

    /// Renders the value as zero-padded display digits, e.g. `05.00`.
    pub fn format(&self, out: &mut String<16>) {
        let mut v = self.value;
        if v < 0 {
            let _ = out.push('-');
            v = -v;
        }
        let scale = pow10((self.prefix.shift() - self.decimals) as u32);
        let mut disp = v / scale;
        let total = self.digits + self.decimals;
        // Digits come out most significant first.
        let mut place = pow10(total.saturating_sub(1) as u32);
        for i in 0..total {
            if i == self.digits && self.decimals > 0 {
                let _ = out.push('.');
            }
            let d = (disp / place) % 10;
            let _ = out.push((b'0' + d as u8) as char);
            disp %= place;
            place /= 10;
        }
    }
}

/// Selector cycling through a fixed label set.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IconWidget {
    pub labels: &'static [&'static str],
    pub index: u8,
}

impl IconWidget {
    pub const fn new(labels: &'static [&'static str]) -> Self {
        IconWidget { labels, index: 0 }
    }

    pub fn current(&self) -> &'static str {
        self.labels[self.index as usize]
    }

    pub fn set_index(&mut self, index: u8) {
        if (index as usize) < self.labels.len() {
            self.index = index;
        }
    }

    pub fn next(&mut self) -> bool {
        self.index = (self.index as usize + 1) as u8 % self.labels.len() as u8;
        true
    }

    pub fn prev(&mut self) -> bool {
        let n = self.labels.len() as u8;
        self.index = (self.index + n - 1) % n;
        true
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Widget {
    Number(NumberWidget),
    Icon(IconWidget),
}

/// One slot on a screen.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Item {
    pub can_focus: bool,
    pub has_focus: bool,
    pub dirty: bool,
    pub widget: Widget,
}

impl Item {
    /// Editable number item.
    pub const fn number(widget: NumberWidget) -> Self {
        Item {
            can_focus: true,
            has_focus: false,
            dirty: true,
            widget: Widget::Number(widget),
        }
    }

    /// Display-only number item, skipped by focus navigation.
    pub const fn readout(widget: NumberWidget) -> Self {
        Item {
            can_focus: false,
            has_focus: false,
            dirty: true,
            widget: Widget::Number(widget),
        }
    }

    pub const fn icon(widget: IconWidget) -> Self {
        Item {
            can_focus: true,
            has_focus: false,
            dirty: true,
            widget: Widget::Icon(widget),
        }
    }

    pub fn number_value(&self) -> i32 {
        match &self.widget {
            Widget::Number(w) => w.value,
            Widget::Icon(w) => w.index as i32,
        }
    }

    /// Applies an edit event to the widget. Returns whether the value
    /// changed; cursor movement alone only marks the item dirty.
    pub fn handle_event(&mut self, event: Event) -> bool {
        let changed = match (&mut self.widget, event) {
            (Widget::Number(w), Event::Increment) => w.increment(),
            (Widget::Number(w), Event::Decrement) => w.decrement(),
            (Widget::Number(w), Event::Select) => {
                w.select();
                self.dirty = true;
                false
            }
            (Widget::Icon(w), Event::Increment) => w.next(),
            (Widget::Icon(w), Event::Decrement) => w.prev(),
            _ => false,
        };
        if changed {
            self.dirty = true;
        }
        changed
    }

    pub fn got_focus(&mut self) {
        self.has_focus = true;
        self.dirty = true;
    }

    pub fn lost_focus(&mut self) {
        self.has_focus = false;
        self.dirty = true;
        if let Widget::Number(w) = &mut self.widget {
            w.reset_cursor();
        }
    }

    pub fn format(&self, out: &mut String<16>) {
        match &self.widget {
            Widget::Number(w) => w.format(out),
            Widget::Icon(w) => {
                let _ = out.push_str(w.current());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volts() -> NumberWidget {
        NumberWidget::new(Unit::Volt, SiPrefix::Milli, 2, 2).with_range(0, 20_000)
    }

    #[test]
    fn cursor_walks_place_values() {
        let mut w = volts().with_value(5000);
        assert!(w.increment());
        assert_eq!(w.value, 15_000); // leftmost digit is worth 10 V
        w.select();
        assert!(w.increment());
        assert_eq!(w.value, 16_000);
        w.select();
        assert!(w.increment());
        assert_eq!(w.value, 16_100);
        w.select();
        assert!(w.increment());
        assert_eq!(w.value, 16_110);
        // Wraps back to the most significant digit.
        w.select();
        assert_eq!(w.digit(), 0);
    }

    #[test]
    fn edits_clamp_at_the_range_ends() {
        let mut w = volts().with_value(15_000);
        assert!(w.increment());
        assert_eq!(w.value, 20_000);
        assert!(!w.increment());

        let mut w = volts().with_value(5000);
        assert!(w.decrement());
        assert_eq!(w.value, 0);
        assert!(!w.decrement());
    }

    #[test]
    fn current_widget_steps_in_milliamps() {
        let mut w = NumberWidget::new(Unit::Ampere, SiPrefix::Milli, 1, 3).with_range(0, 5000);
        w.set_value(500);
        for _ in 0..3 {
            w.select();
        }
        assert!(w.increment());
        assert_eq!(w.value, 501);
    }

    #[test]
    fn unprefixed_widget_steps_in_whole_units() {
        let mut w = NumberWidget::new(Unit::Hertz, SiPrefix::None, 4, 0).with_range(1, 5000);
        w.set_value(100);
        assert!(w.increment());
        assert_eq!(w.value, 1100);
        for _ in 0..3 {
            w.select();
        }
        assert!(w.increment());
        assert_eq!(w.value, 1101);
    }

    #[test]
    fn formats_with_zero_padding() {
        let mut s = String::new();
        volts().with_value(5000).format(&mut s);
        assert_eq!(s.as_str(), "05.00");

        let mut s = String::new();
        volts().with_value(12_340).format(&mut s);
        assert_eq!(s.as_str(), "12.34");

        let mut s = String::new();
        NumberWidget::new(Unit::Ampere, SiPrefix::Milli, 1, 3)
            .with_range(0, 5000)
            .with_value(507)
            .format(&mut s);
        assert_eq!(s.as_str(), "0.507");

        let mut s = String::new();
        NumberWidget::new(Unit::Percent, SiPrefix::None, 3, 0)
            .with_range(0, 100)
            .with_value(42)
            .format(&mut s);
        assert_eq!(s.as_str(), "042");
    }

    #[test]
    fn icon_cycles_both_ways() {
        let mut w = IconWidget::new(&["sine", "square", "sawtooth"]);
        assert_eq!(w.current(), "sine");
        w.next();
        assert_eq!(w.current(), "square");
        w.prev();
        w.prev();
        assert_eq!(w.current(), "sawtooth");
        w.next();
        assert_eq!(w.current(), "sine");
    }

    #[test]
    fn losing_focus_resets_the_cursor() {
        let mut item = Item::number(volts());
        item.got_focus();
        assert!(item.has_focus);
        item.handle_event(Event::Select);
        item.handle_event(Event::Select);
        item.lost_focus();
        item.got_focus();
        match &item.widget {
            Widget::Number(w) => assert_eq!(w.digit(), 0),
            Widget::Icon(_) => unreachable!(),
        }
    }

    #[test]
    fn select_marks_dirty_without_a_value_change() {
        let mut item = Item::number(volts().with_value(5000));
        item.dirty = false;
        assert!(!item.handle_event(Event::Select));
        assert!(item.dirty);
        assert_eq!(item.number_value(), 5000);

        item.dirty = false;
        assert!(item.handle_event(Event::Increment));
        assert!(item.dirty);
    }
}
