//! Constant voltage mode.
//!
//! Holds the output at a voltage setpoint while an over-current threshold
//! guards the load: crossing it trips OCP and latches the output off. The
//! current DAC is driven at the threshold so the analog loop also caps
//! there.
//!
//! While the output is live the voltage item shows the measured output and
//! edits keep adjusting the setpoint underneath; on disable the item falls
//! back to showing the setpoint.

use crate::event::Event;
use crate::func::{parse_u32, write_u32, FuncCtx};
use crate::model::ModelConfig;
use crate::settings::{unit, SettingsStore, StoreError};
use crate::uui::{Item, NumberWidget, Screen, SetParamStatus, SiPrefix, Unit, Widget};
use heapless::String;

const VOLTAGE: usize = 0;
const CURRENT: usize = 1;

/// Widget ceiling before the input voltage is known; also bounds what the
/// packed settings word can carry.
const VOLTAGE_CEILING_MV: i32 = 0xffff;

pub struct CvFunc {
    items: [Item; 2],
    v_set_mv: u32,
    i_limit_ma: u32,
}

impl CvFunc {
    pub fn new(model: &ModelConfig) -> Self {
        let voltage = NumberWidget::new(Unit::Volt, SiPrefix::Milli, 2, 2)
            .with_range(0, VOLTAGE_CEILING_MV);
        let current = NumberWidget::new(
            Unit::Ampere,
            SiPrefix::Milli,
            model.current_digits,
            model.current_decimals,
        )
        .with_range(0, model.max_current_ma as i32)
        .with_value(model.max_current_ma as i32);
        CvFunc {
            items: [Item::number(voltage), Item::number(current)],
            v_set_mv: 0,
            i_limit_ma: model.max_current_ma,
        }
    }

    /// Pushes the setpoints into the widgets (clamped) and reads the
    /// clamped values back, keeping both views identical.
    fn sync_items(&mut self) {
        if let Widget::Number(w) = &mut self.items[VOLTAGE].widget {
            w.set_value(self.v_set_mv as i32);
            self.v_set_mv = w.value as u32;
        }
        if let Widget::Number(w) = &mut self.items[CURRENT].widget {
            w.set_value(self.i_limit_ma as i32);
            self.i_limit_ma = w.value as u32;
        }
        for it in &mut self.items {
            it.dirty = true;
        }
    }

    /// The input voltage bounds what the output stage can reach.
    fn refresh_voltage_ceiling(&mut self, ctx: &mut FuncCtx<'_>) {
        let vin = ctx.hw.read_adc().vin;
        let max = (ctx.model.max_vout_mv(ctx.pwrctl.calc_vin(vin)) as i32).min(VOLTAGE_CEILING_MV);
        let item = &mut self.items[VOLTAGE];
        if let Widget::Number(w) = &mut item.widget {
            if w.max != max {
                w.max = max;
                item.dirty = true;
            }
        }
    }
}

impl Screen for CvFunc {
    fn name(&self) -> &'static str {
        "cv"
    }

    fn items(&mut self) -> &mut [Item] {
        &mut self.items
    }

    fn activated(&mut self, ctx: &mut FuncCtx<'_>) {
        self.refresh_voltage_ceiling(ctx);
        self.sync_items();
    }

    fn deactivated(&mut self, ctx: &mut FuncCtx<'_>) {
        self.enable(ctx, false);
    }

    fn enable(&mut self, ctx: &mut FuncCtx<'_>, on: bool) {
        if on {
            if !ctx.pwrctl.set_vout(ctx.hw, self.v_set_mv) {
                return;
            }
            ctx.pwrctl.set_iout(ctx.hw, self.i_limit_ma);
            ctx.pwrctl.set_ilimit(self.i_limit_ma);
            ctx.pwrctl.enable_vout(ctx.hw, true);
        } else {
            ctx.pwrctl.enable_vout(ctx.hw, false);
            self.sync_items();
        }
    }

    fn tick(&mut self, ctx: &mut FuncCtx<'_>) -> Option<Event> {
        self.refresh_voltage_ceiling(ctx);
        if !ctx.pwrctl.vout_enabled() {
            return None;
        }
        let adc = ctx.hw.read_adc();
        let measured = ctx.pwrctl.calc_vout(adc.vout) as i32;
        let item = &mut self.items[VOLTAGE];
        if let Widget::Number(w) = &mut item.widget {
            if w.value != measured {
                w.value = measured;
                item.dirty = true;
            }
        }
        if adc.iout > ctx.pwrctl.i_limit_raw() {
            return Some(Event::OcpTripped {
                i_cut_ma: ctx.pwrctl.calc_iout(adc.iout) as u16,
            });
        }
        None
    }

    fn save_settings(&mut self, store: &mut dyn SettingsStore) -> Result<(), StoreError> {
        let packed = (self.i_limit_ma << 16) | (self.v_set_mv & 0xffff);
        store.save_u32(unit::POWER, packed)
    }

    fn restore_settings(&mut self, store: &mut dyn SettingsStore) {
        if let Some(packed) = store.load_u32(unit::POWER) {
            self.i_limit_ma = packed >> 16;
            self.v_set_mv = packed & 0xffff;
        }
        self.sync_items();
    }

    fn value_changed(&mut self, ctx: &mut FuncCtx<'_>, item: usize) {
        match item {
            VOLTAGE => {
                self.v_set_mv = self.items[VOLTAGE].number_value() as u32;
                ctx.pwrctl.set_vout(ctx.hw, self.v_set_mv);
            }
            CURRENT => {
                self.i_limit_ma = self.items[CURRENT].number_value() as u32;
                ctx.pwrctl.set_ilimit(self.i_limit_ma);
                ctx.pwrctl.set_iout(ctx.hw, self.i_limit_ma);
            }
            _ => {}
        }
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        &["voltage", "current"]
    }

    fn set_parameter(&mut self, ctx: &mut FuncCtx<'_>, name: &str, value: &str) -> SetParamStatus {
        match name {
            "voltage" => {
                let Some(v) = parse_u32(value) else {
                    return SetParamStatus::RangeError;
                };
                if v > VOLTAGE_CEILING_MV as u32 || !ctx.pwrctl.set_vout(ctx.hw, v) {
                    return SetParamStatus::RangeError;
                }
                self.v_set_mv = v;
                self.sync_items();
            }
            "current" => {
                let Some(i) = parse_u32(value) else {
                    return SetParamStatus::RangeError;
                };
                if !ctx.pwrctl.set_ilimit(i) {
                    return SetParamStatus::RangeError;
                }
                ctx.pwrctl.set_iout(ctx.hw, i);
                self.i_limit_ma = i;
                self.sync_items();
            }
            _ => return SetParamStatus::UnknownName,
        }
        match self.save_settings(ctx.store) {
            Ok(()) => SetParamStatus::Ok,
            Err(_) => SetParamStatus::FlashError,
        }
    }

    fn get_parameter(&self, name: &str, out: &mut String<16>) -> bool {
        match name {
            "voltage" => write_u32(out, self.v_set_mv),
            "current" => write_u32(out, self.i_limit_ma),
            _ => return false,
        }
        true
    }
}
