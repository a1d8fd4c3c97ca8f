//! Device core.
//!
//! Owns the settings store, the power-control state, the screen manager
//! and the hardware seam, and provides the single `poll` entry the
//! firmware main loop calls. Interrupt handlers only feed the receive and
//! event rings; everything else happens here at thread level.

use crate::calib::Calibration;
use crate::event::Event;
use crate::func::{CcFunc, ClFunc, CvFunc, Func, FuncCtx, GenFunc};
use crate::hal::Hal;
use crate::model::ModelConfig;
use crate::pwrctl::PowerControl;
use crate::ring::Ring;
use crate::settings::{unit, SettingsStore};
use crate::uui::{Screen, Uui};
use embedded_storage::nor_flash::NorFlash;
use powerlynx_past as past;
use powerlynx_protocol::{encode_ocp_event, FrameCollector, WifiStatus, MAX_WIRE};

/// UI tick period. `poll` may be called much faster; the tick self-paces
/// off the millisecond clock.
pub const TICK_INTERVAL_MS: u32 = 10;

/// Longest git hash string either boot stage will store.
pub(crate) const GIT_HASH_MAX: usize = 32;

const DEFAULT_BRIGHTNESS: u8 = 100;

const RX_RING_SIZE: usize = 512;
const EVENT_RING_SIZE: usize = 16;

pub struct Device<F: NorFlash, H: Hal> {
    pub(crate) hal: H,
    pub(crate) store: past::Past<F>,
    pub(crate) pwrctl: PowerControl,
    pub(crate) uui: Uui<Func>,
    pub(crate) model: &'static ModelConfig,
    pub(crate) app_git_hash: &'static str,
    pub(crate) wifi_status: WifiStatus,
    pub(crate) temperatures: (i16, i16),
    rx: Ring<u8, RX_RING_SIZE>,
    events: Ring<Event, EVENT_RING_SIZE>,
    collector: FrameCollector<MAX_WIRE>,
    last_tick_ms: u32,
}

impl<F: NorFlash, H: Hal> Device<F, H> {
    pub fn new(flash: F, hal: H, model: &'static ModelConfig, app_git_hash: &'static str) -> Self {
        Device {
            hal,
            store: past::Past::new(flash),
            pwrctl: PowerControl::new(model, model.cal),
            uui: Uui::new(),
            model,
            app_git_hash,
            wifi_status: WifiStatus::Off,
            temperatures: (
                powerlynx_protocol::INVALID_TEMPERATURE,
                powerlynx_protocol::INVALID_TEMPERATURE,
            ),
            rx: Ring::new(),
            events: Ring::new(),
            collector: FrameCollector::new(),
            last_tick_ms: 0,
        }
    }

    /// Mounts the store, applies persisted state and brings up the mode
    /// screens. The output stage stays off.
    pub fn boot(&mut self) -> Result<(), past::Error> {
        self.store.init()?;

        let brightness = self
            .store
            .load_u32(unit::TFT_BRIGHTNESS)
            .map(|v| v.min(100) as u8)
            .unwrap_or(DEFAULT_BRIGHTNESS);
        self.hal.set_brightness(brightness);

        // Rewrite the stored app hash when the firmware changed, so
        // version reports track what actually runs.
        let mut stored = [0u8; GIT_HASH_MAX];
        let stale = match self.store.load(unit::APP_GIT_HASH, &mut stored) {
            Some(n) => stored[..n] != *self.app_git_hash.as_bytes(),
            None => true,
        };
        if stale {
            let _ = self.store.save(unit::APP_GIT_HASH, self.app_git_hash.as_bytes());
        }

        let cal = Calibration::load(&self.model.cal, &mut self.store);
        self.pwrctl.set_calibration(cal);

        self.uui.add_screen(Func::Cv(CvFunc::new(self.model)));
        self.uui.add_screen(Func::Cc(CcFunc::new(self.model)));
        self.uui.add_screen(Func::Cl(ClFunc::new(self.model)));
        self.uui.add_screen(Func::Gen(GenFunc::new(self.model)));

        let (mut ctx, uui) = self.split();
        if let Some(screen) = uui.current_screen() {
            screen.restore_settings(ctx.store);
            screen.activated(&mut ctx);
        }

        self.last_tick_ms = self.hal.millis();
        Ok(())
    }

    /// Splits the device into the screen-facing context and the screen
    /// manager, which borrow disjoint fields.
    pub(crate) fn split(&mut self) -> (FuncCtx<'_>, &mut Uui<Func>) {
        let Device {
            hal,
            store,
            pwrctl,
            uui,
            model,
            ..
        } = self;
        (
            FuncCtx {
                pwrctl,
                store,
                hw: hal,
                model,
            },
            uui,
        )
    }

    /// Queues one received wire byte. Called from the UART interrupt.
    pub fn push_rx(&mut self, byte: u8) -> bool {
        self.rx.put(byte)
    }

    /// Queues one panel event. Called from the rotary/button interrupt.
    pub fn push_event(&mut self, event: Event) -> bool {
        self.events.put(event)
    }

    /// Main loop body: drains the receive ring through the frame
    /// collector, drains panel events, then runs the paced UI tick.
    pub fn poll(&mut self) {
        while let Some(byte) = self.rx.get() {
            if let Some(mut raw) = self.collector.push(byte) {
                if let Some(resp) = self.handle_wire(&mut raw) {
                    self.hal.tx(&resp);
                }
            }
        }
        while let Some(event) = self.events.get() {
            self.handle_event(event);
        }
        let now = self.hal.millis();
        if now.wrapping_sub(self.last_tick_ms) >= TICK_INTERVAL_MS {
            self.last_tick_ms = now;
            self.tick();
        }
    }

    /// Switches the output stage through the current mode. Returns whether
    /// the output ended up in the requested state; a mode may refuse to
    /// start with settings it cannot realize.
    pub fn set_power(&mut self, on: bool) -> bool {
        let (mut ctx, uui) = self.split();
        if let Some(screen) = uui.current_screen() {
            screen.enable(&mut ctx, on);
        }
        self.pwrctl.vout_enabled() == on
    }

    pub fn change_screen(&mut self, index: usize) -> bool {
        let (mut ctx, uui) = self.split();
        uui.set_screen(&mut ctx, index)
    }

    pub fn power_enabled(&self) -> bool {
        self.pwrctl.vout_enabled()
    }

    pub fn locked(&self) -> bool {
        self.uui.locked()
    }

    pub fn wifi_status(&self) -> WifiStatus {
        self.wifi_status
    }

    pub fn temperatures(&self) -> (i16, i16) {
        self.temperatures
    }

    pub fn current_function(&self) -> Option<&'static str> {
        self.uui.names().nth(self.uui.current_index())
    }

    pub fn hal_mut(&mut self) -> &mut H {
        &mut self.hal
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::PowerToggle => {
                if !self.uui.locked() {
                    let on = !self.pwrctl.vout_enabled();
                    self.set_power(on);
                }
            }
            Event::ScreenNext => {
                if !self.uui.locked() {
                    self.step_screen(1);
                }
            }
            Event::ScreenPrev => {
                if !self.uui.locked() {
                    self.step_screen(-1);
                }
            }
            Event::OcpTripped { .. } | Event::OvpTripped { .. } => self.handle_trip(event),
            other => {
                let (mut ctx, uui) = self.split();
                uui.handle_event(&mut ctx, other);
            }
        }
    }

    fn step_screen(&mut self, dir: i32) {
        let count = self.uui.screen_count() as i32;
        if count == 0 {
            return;
        }
        let next = (self.uui.current_index() as i32 + dir).rem_euclid(count) as usize;
        self.change_screen(next);
    }

    /// Latches the output off. Overcurrent additionally goes out on the
    /// wire; the protocol has no overvoltage event, so that trip is local.
    fn handle_trip(&mut self, trip: Event) {
        let (mut ctx, uui) = self.split();
        if let Some(screen) = uui.current_screen() {
            screen.enable(&mut ctx, false);
        }
        if let Event::OcpTripped { i_cut_ma } = trip {
            if let Ok(frame) = encode_ocp_event(i_cut_ma) {
                self.hal.tx(&frame);
            }
        }
    }

    fn tick(&mut self) {
        let (mut ctx, uui) = self.split();
        let trip = uui.tick(&mut ctx);
        if let Some(trip) = trip {
            self.handle_trip(trip);
        }
    }
}
