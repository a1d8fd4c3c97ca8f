//! Wire command dispatch.
//!
//! One entry point, [`Device::handle_wire`], takes a complete raw frame
//! and returns the response frame when the command calls for one. Frames
//! that fail framing or CRC checks are dropped without a reply; the host
//! recovers by timeout. Requests decode in place, so string fields borrow
//! straight from the receive buffer.

use crate::calib::Calibration;
use crate::device::{Device, GIT_HASH_MAX};
use crate::hal::Hal;
use crate::settings::{unit, SettingsStore};
use crate::uui::{Screen, MAX_PARAMETERS, MAX_SCREENS};
use embedded_storage::nor_flash::NorFlash;
use heapless::{String, Vec};
use powerlynx_protocol::{
    decode_change_screen, decode_enable_output, decode_lock, decode_request_opcode,
    decode_set_brightness, decode_set_calibration, decode_set_function, decode_set_parameters,
    decode_temperature_report, decode_upgrade_start, decode_wifi_status,
    encode_cal_report_response, encode_list_functions_response, encode_list_parameters_response,
    encode_query_response, encode_set_calibration_response, encode_set_parameters_response,
    encode_status_response, encode_upgrade_data_response, encode_upgrade_start_response,
    encode_version_response, extract_payload_inplace, CalReport, Command, FrameBuf, ParamStatus,
    QueryResponse, UpgradeReason, UpgradeStatus,
};

impl<F: NorFlash, H: Hal> Device<F, H> {
    /// Processes one received frame and returns the reply, if any.
    pub fn handle_wire(&mut self, raw: &mut [u8]) -> Option<FrameBuf> {
        let payload = match extract_payload_inplace(raw) {
            Ok(p) => p,
            Err(_) => return None,
        };
        let cmd = match decode_request_opcode(payload) {
            Ok(c) => c,
            Err(_) => return None,
        };
        match cmd {
            Command::Ping => encode_status_response(Command::Ping, true).ok(),
            Command::Query => self.query_response(),
            Command::WifiStatus => {
                let ok = match decode_wifi_status(payload) {
                    Ok(status) => {
                        self.wifi_status = status;
                        self.uui.request_redraw();
                        true
                    }
                    Err(_) => false,
                };
                encode_status_response(Command::WifiStatus, ok).ok()
            }
            Command::Lock => {
                let ok = match decode_lock(payload) {
                    Ok(lock) => {
                        self.uui.set_locked(lock);
                        true
                    }
                    Err(_) => false,
                };
                encode_status_response(Command::Lock, ok).ok()
            }
            // Device-to-host only; a host echoing it back is confused.
            Command::OcpEvent => encode_status_response(Command::OcpEvent, false).ok(),
            Command::UpgradeStart => {
                let Ok((chunk_size, crc)) = decode_upgrade_start(payload) else {
                    return encode_upgrade_start_response(
                        UpgradeStatus::ProtocolError,
                        0,
                        UpgradeReason::Unknown,
                    )
                    .ok();
                };
                // The marker tells the bootloader an image transfer is in
                // flight; it answers the handshake after the restart.
                let _ = self.store.save(unit::UPGRADE_STARTED, &[1]);
                self.hal.stage_upgrade(chunk_size, crc);
                None
            }
            Command::UpgradeData => {
                encode_upgrade_data_response(UpgradeStatus::ProtocolError).ok()
            }
            Command::SetFunction => {
                let ok = match decode_set_function(payload) {
                    Ok(name) => match self.uui.index_of(name) {
                        Some(index) => self.change_screen(index),
                        None => false,
                    },
                    Err(_) => false,
                };
                encode_status_response(Command::SetFunction, ok).ok()
            }
            Command::EnableOutput => {
                let ok = match decode_enable_output(payload) {
                    Ok(enable) => self.set_power(enable),
                    Err(_) => false,
                };
                encode_status_response(Command::EnableOutput, ok).ok()
            }
            Command::ListFunctions => {
                let mut names: Vec<&'static str, MAX_SCREENS> = Vec::new();
                for name in self.uui.names() {
                    let _ = names.push(name);
                }
                encode_list_functions_response(true, &names).ok()
            }
            Command::SetParameters => {
                let Ok(pairs) = decode_set_parameters(payload) else {
                    return None;
                };
                let mut verdicts: Vec<ParamStatus, 16> = Vec::new();
                let (mut ctx, uui) = self.split();
                let screen = uui.current_screen()?;
                for pair in pairs {
                    let verdict = match pair {
                        Ok((name, value)) => {
                            screen.set_parameter(&mut ctx, name, value).into()
                        }
                        Err(_) => ParamStatus::IllegalValue,
                    };
                    if verdicts.push(verdict).is_err() {
                        break;
                    }
                }
                encode_set_parameters_response(&verdicts).ok()
            }
            Command::ListParameters => self.list_parameters_response(),
            Command::TemperatureReport => {
                let ok = match decode_temperature_report(payload) {
                    Ok(readings) => {
                        self.temperatures = readings;
                        true
                    }
                    Err(_) => false,
                };
                encode_status_response(Command::TemperatureReport, ok).ok()
            }
            Command::Version => self.version_response(),
            Command::CalReport => self.cal_report_response(),
            Command::SetCalibration => {
                let Ok(pairs) = decode_set_calibration(payload) else {
                    return None;
                };
                let mut verdicts: Vec<ParamStatus, 16> = Vec::new();
                let mut cal = *self.pwrctl.calibration();
                let mut touched = false;
                for pair in pairs {
                    let verdict = match pair {
                        Ok((name, value)) => {
                            if cal.set(name, value) {
                                touched = true;
                                match Calibration::persist(&mut self.store, name, value) {
                                    Ok(()) => ParamStatus::Ok,
                                    Err(_) => ParamStatus::IllegalValue,
                                }
                            } else if cal.get(name).is_none() {
                                ParamStatus::UnknownName
                            } else {
                                ParamStatus::IllegalValue
                            }
                        }
                        Err(_) => ParamStatus::IllegalValue,
                    };
                    if verdicts.push(verdict).is_err() {
                        break;
                    }
                }
                if touched {
                    self.pwrctl.set_calibration(cal);
                }
                encode_set_calibration_response(&verdicts).ok()
            }
            Command::ClearCalibration => {
                let ok = Calibration::clear(&mut self.store).is_ok();
                self.pwrctl.set_calibration(self.model.cal);
                encode_status_response(Command::ClearCalibration, ok).ok()
            }
            Command::ChangeScreen => {
                let ok = match decode_change_screen(payload) {
                    Ok(index) => self.change_screen(index as usize),
                    Err(_) => false,
                };
                encode_status_response(Command::ChangeScreen, ok).ok()
            }
            Command::SetBrightness => {
                let ok = match decode_set_brightness(payload) {
                    Ok(percent) if percent <= 100 => {
                        self.hal.set_brightness(percent);
                        self.store.save_u32(unit::TFT_BRIGHTNESS, percent as u32).is_ok()
                    }
                    _ => false,
                };
                encode_status_response(Command::SetBrightness, ok).ok()
            }
        }
    }

    fn query_response(&mut self) -> Option<FrameBuf> {
        let adc = self.hal.read_adc();
        let resp = QueryResponse {
            v_in_mv: clamp_u16(self.pwrctl.calc_vin(adc.vin)),
            v_out_setting_mv: clamp_u16(self.pwrctl.v_out_mv()),
            v_out_mv: clamp_u16(self.pwrctl.calc_vout(adc.vout)),
            i_out_ma: clamp_u16(self.pwrctl.calc_iout(adc.iout)),
            i_limit_ma: clamp_u16(self.pwrctl.i_limit_ma()),
            power_enabled: self.pwrctl.vout_enabled(),
        };
        encode_query_response(&resp).ok()
    }

    fn version_response(&mut self) -> Option<FrameBuf> {
        let mut buf = [0u8; GIT_HASH_MAX];
        let boot = match self.store.load(unit::BOOT_GIT_HASH, &mut buf) {
            Some(n) => core::str::from_utf8(&buf[..n]).unwrap_or(""),
            None => "",
        };
        encode_version_response(true, boot, self.app_git_hash).ok()
    }

    fn cal_report_response(&mut self) -> Option<FrameBuf> {
        let adc = self.hal.read_adc();
        let cal = self.pwrctl.calibration();
        let report = CalReport {
            a_adc_k: cal.a_adc_k,
            a_adc_c: cal.a_adc_c,
            a_dac_k: cal.a_dac_k,
            a_dac_c: cal.a_dac_c,
            v_adc_k: cal.v_adc_k,
            v_adc_c: cal.v_adc_c,
            v_dac_k: cal.v_dac_k,
            v_dac_c: cal.v_dac_c,
            vin_adc_k: cal.vin_adc_k,
            vin_adc_c: cal.vin_adc_c,
            vin_adc: adc.vin,
            vout_adc: adc.vout,
            iout_adc: adc.iout,
            vout_dac: self.pwrctl.vout_dac(),
            iout_dac: self.pwrctl.iout_dac(),
        };
        encode_cal_report_response(true, &report).ok()
    }

    fn list_parameters_response(&mut self) -> Option<FrameBuf> {
        let screen = self.uui.current_screen()?;
        let names = screen.parameter_names();
        let mut values: Vec<String<16>, MAX_PARAMETERS> = Vec::new();
        for name in names {
            let mut value = String::new();
            let _ = screen.get_parameter(name, &mut value);
            let _ = values.push(value);
        }
        let mut pairs: Vec<(&str, &str), MAX_PARAMETERS> = Vec::new();
        for (&name, value) in names.iter().zip(values.iter()) {
            let _ = pairs.push((name, value.as_str()));
        }
        encode_list_parameters_response(&pairs).ok()
    }
}

fn clamp_u16(value: u32) -> u16 {
    value.min(u16::MAX as u32) as u16
}
