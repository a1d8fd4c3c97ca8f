//! Current-limited constant voltage mode.
//!
//! Same voltage regulation as constant voltage mode, but the current
//! bound is a soft cap: the current DAC is programmed at the bound and
//! the analog loop folds the voltage back instead of latching off.

use crate::event::Event;
use crate::func::{parse_u32, write_u32, FuncCtx};
use crate::model::ModelConfig;
use crate::settings::{unit, SettingsStore, StoreError};
use crate::uui::{Item, NumberWidget, Screen, SetParamStatus, SiPrefix, Unit, Widget};
use heapless::String;

const VOLTAGE: usize = 0;
const CURRENT: usize = 1;

const VOLTAGE_CEILING_MV: i32 = 0xffff;

pub struct ClFunc {
    items: [Item; 2],
    v_set_mv: u32,
    i_limit_ma: u32,
}

impl ClFunc {
    pub fn new(model: &ModelConfig) -> Self {
        let voltage = NumberWidget::new(Unit::Volt, SiPrefix::Milli, 2, 2)
            .with_range(0, VOLTAGE_CEILING_MV)
            .with_value(5000);
        let current = NumberWidget::new(
            Unit::Ampere,
            SiPrefix::Milli,
            model.current_digits,
            model.current_decimals,
        )
        .with_range(0, model.max_current_ma as i32)
        .with_value(model.max_current_ma as i32);
        ClFunc {
            items: [Item::number(voltage), Item::number(current)],
            v_set_mv: 5000,
            i_limit_ma: model.max_current_ma,
        }
    }

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

impl Screen for ClFunc {
    fn name(&self) -> &'static str {
        "cl"
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
            // The cap lives in the current DAC, not in the trip compare.
            ctx.pwrctl.set_iout(ctx.hw, self.i_limit_ma);
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
        let measured = ctx.pwrctl.calc_vout(adc.vout) as i32;
        let item = &mut self.items[VOLTAGE];
        if let Widget::Number(w) = &mut item.widget {
            if w.value != measured {
                w.value = measured;
                item.dirty = true;
            }
        }
        None
    }

    fn save_settings(&mut self, store: &mut dyn SettingsStore) -> Result<(), StoreError> {
        let packed = (self.i_limit_ma << 16) | (self.v_set_mv & 0xffff);
        store.save_u32(unit::CL_SETTINGS, packed)
    }

    fn restore_settings(&mut self, store: &mut dyn SettingsStore) {
        if let Some(packed) = store.load_u32(unit::CL_SETTINGS) {
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
                if !ctx.pwrctl.set_vout(ctx.hw, v) {
                    return SetParamStatus::RangeError;
                }
                self.v_set_mv = v;
                self.sync_items();
            }
            "current" => {
                let Some(i) = parse_u32(value) else {
                    return SetParamStatus::RangeError;
                };
                if !ctx.pwrctl.set_iout(ctx.hw, i) {
                    return SetParamStatus::RangeError;
                }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::AdcReading;
    use crate::mock::{MockHal, MockStore};
    use crate::model;
    use crate::pwrctl::PowerControl;

    struct Rig {
        pwrctl: PowerControl,
        store: MockStore,
        hw: MockHal,
    }

    impl Rig {
        fn new() -> Self {
            let mut hw = MockHal::new();
            hw.adc = AdcReading {
                vin: 713,
                vout: 0,
                iout: 0,
            };
            Rig {
                pwrctl: PowerControl::new(&model::DPS5005, model::DPS5005.cal),
                store: MockStore::new(),
                hw,
            }
        }

        fn ctx(&mut self) -> FuncCtx<'_> {
            FuncCtx {
                pwrctl: &mut self.pwrctl,
                store: &mut self.store,
                hw: &mut self.hw,
                model: &model::DPS5005,
            }
        }
    }

    #[test]
    fn current_bound_goes_to_the_dac_not_the_trip() {
        let mut rig = Rig::new();
        let mut cl = ClFunc::new(&model::DPS5005);
        let mut ctx = rig.ctx();
        assert_eq!(cl.set_parameter(&mut ctx, "voltage", "3300"), SetParamStatus::Ok);
        assert_eq!(cl.set_parameter(&mut ctx, "current", "500"), SetParamStatus::Ok);

        let mut ctx = rig.ctx();
        cl.enable(&mut ctx, true);
        assert!(rig.pwrctl.vout_enabled());
        assert_eq!(rig.pwrctl.i_out_ma(), 500);
        assert_eq!(rig.pwrctl.i_limit_ma(), 5000);
    }

    #[test]
    fn overcurrent_does_not_trip() {
        let mut rig = Rig::new();
        let mut cl = ClFunc::new(&model::DPS5005);
        let mut ctx = rig.ctx();
        cl.set_parameter(&mut ctx, "current", "500");
        let mut ctx = rig.ctx();
        cl.enable(&mut ctx, true);

        // Way past the soft cap; the analog loop handles it silently.
        rig.hw.adc.iout = 1500;
        let mut ctx = rig.ctx();
        assert_eq!(cl.tick(&mut ctx), None);
        assert!(rig.pwrctl.vout_enabled());
    }

    #[test]
    fn voltage_display_follows_the_measurement() {
        let mut rig = Rig::new();
        let mut cl = ClFunc::new(&model::DPS5005);
        let mut ctx = rig.ctx();
        cl.set_parameter(&mut ctx, "voltage", "5000");
        let mut ctx = rig.ctx();
        cl.enable(&mut ctx, true);

        rig.hw.adc.vout = 387;
        let mut ctx = rig.ctx();
        cl.tick(&mut ctx);
        assert_eq!(cl.items[VOLTAGE].number_value(), 4993);
    }

    #[test]
    fn settings_roundtrip_through_their_own_unit() {
        let mut rig = Rig::new();
        let mut cl = ClFunc::new(&model::DPS5005);
        let mut ctx = rig.ctx();
        cl.set_parameter(&mut ctx, "voltage", "4200");
        cl.set_parameter(&mut ctx, "current", "750");
        assert_eq!(
            rig.store.load_u32(unit::CL_SETTINGS),
            Some((750 << 16) | 4200)
        );

        let mut other = ClFunc::new(&model::DPS5005);
        other.restore_settings(&mut rig.store);
        assert_eq!(other.v_set_mv, 4200);
        assert_eq!(other.i_limit_ma, 750);
    }
}
