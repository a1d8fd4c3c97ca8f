//! Constant current mode.
//!
//! Regulates output current at a setpoint; the voltage DAC is driven at
//! the over-voltage threshold so the analog loop caps there, and crossing
//! that threshold on the measurement side trips OVP and latches off.

use crate::event::Event;
use crate::func::{parse_u32, write_u32, FuncCtx};
use crate::model::ModelConfig;
use crate::settings::{unit, SettingsStore, StoreError};
use crate::uui::{Item, NumberWidget, Screen, SetParamStatus, SiPrefix, Unit, Widget};
use heapless::String;

const CURRENT: usize = 0;
const VOLTAGE: usize = 1;

const VOLTAGE_CEILING_MV: i32 = 0xffff;

pub struct CcFunc {
    items: [Item; 2],
    i_set_ma: u32,
    v_limit_mv: u32,
}

impl CcFunc {
    pub fn new(model: &ModelConfig) -> Self {
        let current = NumberWidget::new(
            Unit::Ampere,
            SiPrefix::Milli,
            model.current_digits,
            model.current_decimals,
        )
        .with_range(0, model.max_current_ma as i32);
        let voltage = NumberWidget::new(Unit::Volt, SiPrefix::Milli, 2, 2)
            .with_range(0, VOLTAGE_CEILING_MV)
            .with_value(5000);
        CcFunc {
            items: [Item::number(current), Item::number(voltage)],
            i_set_ma: 0,
            v_limit_mv: 5000,
        }
    }

    fn sync_items(&mut self) {
        if let Widget::Number(w) = &mut self.items[CURRENT].widget {
            w.set_value(self.i_set_ma as i32);
            self.i_set_ma = w.value as u32;
        }
        if let Widget::Number(w) = &mut self.items[VOLTAGE].widget {
            w.set_value(self.v_limit_mv as i32);
            self.v_limit_mv = w.value as u32;
        }
        for it in &mut self.items {
            it.dirty = true;
        }
    }

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

impl Screen for CcFunc {
    fn name(&self) -> &'static str {
        "cc"
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
            if !ctx.pwrctl.set_vlimit(self.v_limit_mv) {
                return;
            }
            ctx.pwrctl.set_vout(ctx.hw, self.v_limit_mv);
            ctx.pwrctl.set_iout(ctx.hw, self.i_set_ma);
            // Current is commanded here; the trip threshold guards only
            // the model ceiling.
            ctx.pwrctl.set_ilimit(ctx.model.max_current_ma);
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
        let measured = ctx.pwrctl.calc_iout(adc.iout) as i32;
        let item = &mut self.items[CURRENT];
        if let Widget::Number(w) = &mut item.widget {
            if w.value != measured {
                w.value = measured;
                item.dirty = true;
            }
        }
        if adc.vout > ctx.pwrctl.v_limit_raw() {
            return Some(Event::OvpTripped {
                v_cut_mv: ctx.pwrctl.calc_vout(adc.vout) as u16,
            });
        }
        None
    }

    fn save_settings(&mut self, store: &mut dyn SettingsStore) -> Result<(), StoreError> {
        let packed = (self.v_limit_mv << 16) | (self.i_set_ma & 0xffff);
        store.save_u32(unit::CC_SETTINGS, packed)
    }

    fn restore_settings(&mut self, store: &mut dyn SettingsStore) {
        if let Some(packed) = store.load_u32(unit::CC_SETTINGS) {
            self.v_limit_mv = packed >> 16;
            self.i_set_ma = packed & 0xffff;
        }
        self.sync_items();
    }

    fn value_changed(&mut self, ctx: &mut FuncCtx<'_>, item: usize) {
        match item {
            CURRENT => {
                self.i_set_ma = self.items[CURRENT].number_value() as u32;
                ctx.pwrctl.set_iout(ctx.hw, self.i_set_ma);
            }
            VOLTAGE => {
                self.v_limit_mv = self.items[VOLTAGE].number_value() as u32;
                ctx.pwrctl.set_vlimit(self.v_limit_mv);
                ctx.pwrctl.set_vout(ctx.hw, self.v_limit_mv);
            }
            _ => {}
        }
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        &["current", "voltage"]
    }

    fn set_parameter(&mut self, ctx: &mut FuncCtx<'_>, name: &str, value: &str) -> SetParamStatus {
        match name {
            "current" => {
                let Some(i) = parse_u32(value) else {
                    return SetParamStatus::RangeError;
                };
                if !ctx.pwrctl.set_iout(ctx.hw, i) {
                    return SetParamStatus::RangeError;
                }
                self.i_set_ma = i;
                self.sync_items();
            }
            "voltage" => {
                let Some(v) = parse_u32(value) else {
                    return SetParamStatus::RangeError;
                };
                if !ctx.pwrctl.set_vlimit(v) {
                    return SetParamStatus::RangeError;
                }
                ctx.pwrctl.set_vout(ctx.hw, v);
                self.v_limit_mv = v;
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
            "current" => write_u32(out, self.i_set_ma),
            "voltage" => write_u32(out, self.v_limit_mv),
            _ => return false,
        }
        true
    }
}
