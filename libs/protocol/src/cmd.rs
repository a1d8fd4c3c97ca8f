//! Command layer on top of the framing codec.
//!
//! Every message is one payload: an opcode byte followed by big-endian
//! fields. Responses echo the request opcode with [`RESPONSE_FLAG`] set.
//! Encoders build sealed wire frames, decoders take an extracted payload.

use crate::{Frame, FrameBuf, FrameError, PayloadReader};

/// Set on the opcode byte of every response.
pub const RESPONSE_FLAG: u8 = 0x80;

/// Wire value marking a temperature field as absent or unreadable.
pub const INVALID_TEMPERATURE: i16 = -1;

/// Opcodes 2, 3 and 5 were the pre-function-interface output setters and
/// stay retired so old hosts fail loudly instead of half-working.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Ping = 1,
    Query = 4,
    WifiStatus = 6,
    Lock = 7,
    OcpEvent = 8,
    UpgradeStart = 9,
    UpgradeData = 10,
    SetFunction = 11,
    EnableOutput = 12,
    ListFunctions = 13,
    SetParameters = 14,
    ListParameters = 15,
    TemperatureReport = 16,
    Version = 17,
    CalReport = 18,
    SetCalibration = 19,
    ClearCalibration = 20,
    ChangeScreen = 21,
    SetBrightness = 22,
}

impl Command {
    pub fn from_u8(value: u8) -> Option<Command> {
        match value {
            1 => Some(Command::Ping),
            4 => Some(Command::Query),
            6 => Some(Command::WifiStatus),
            7 => Some(Command::Lock),
            8 => Some(Command::OcpEvent),
            9 => Some(Command::UpgradeStart),
            10 => Some(Command::UpgradeData),
            11 => Some(Command::SetFunction),
            12 => Some(Command::EnableOutput),
            13 => Some(Command::ListFunctions),
            14 => Some(Command::SetParameters),
            15 => Some(Command::ListParameters),
            16 => Some(Command::TemperatureReport),
            17 => Some(Command::Version),
            18 => Some(Command::CalReport),
            19 => Some(Command::SetCalibration),
            20 => Some(Command::ClearCalibration),
            21 => Some(Command::ChangeScreen),
            22 => Some(Command::SetBrightness),
            _ => None,
        }
    }

    /// Opcode byte of the matching response.
    pub fn response(self) -> u8 {
        self as u8 | RESPONSE_FLAG
    }
}

impl From<Command> for u8 {
    fn from(cmd: Command) -> u8 {
        cmd as u8
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WifiStatus {
    Off = 0,
    Connecting = 1,
    Connected = 2,
    Error = 3,
    Upgrading = 4,
}

impl WifiStatus {
    pub fn from_u8(value: u8) -> Option<WifiStatus> {
        match value {
            0 => Some(WifiStatus::Off),
            1 => Some(WifiStatus::Connecting),
            2 => Some(WifiStatus::Connected),
            3 => Some(WifiStatus::Error),
            4 => Some(WifiStatus::Upgrading),
            _ => None,
        }
    }
}

/// Handshake and per-chunk verdicts during a firmware upgrade.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UpgradeStatus {
    Continue = 0,
    BootcomError = 1,
    CrcError = 2,
    EraseError = 3,
    FlashError = 4,
    OverflowError = 5,
    ProtocolError = 6,
    Success = 16,
}

impl UpgradeStatus {
    pub fn from_u8(value: u8) -> Option<UpgradeStatus> {
        match value {
            0 => Some(UpgradeStatus::Continue),
            1 => Some(UpgradeStatus::BootcomError),
            2 => Some(UpgradeStatus::CrcError),
            3 => Some(UpgradeStatus::EraseError),
            4 => Some(UpgradeStatus::FlashError),
            5 => Some(UpgradeStatus::OverflowError),
            6 => Some(UpgradeStatus::ProtocolError),
            16 => Some(UpgradeStatus::Success),
            _ => None,
        }
    }
}

/// Why the bootloader stayed resident instead of starting the app.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UpgradeReason {
    Unknown = 0,
    Forced = 1,
    PastFailure = 2,
    Bootcom = 3,
    UnfinishedUpgrade = 4,
    AppStartFailed = 5,
}

impl UpgradeReason {
    pub fn from_u8(value: u8) -> Option<UpgradeReason> {
        match value {
            0 => Some(UpgradeReason::Unknown),
            1 => Some(UpgradeReason::Forced),
            2 => Some(UpgradeReason::PastFailure),
            3 => Some(UpgradeReason::Bootcom),
            4 => Some(UpgradeReason::UnfinishedUpgrade),
            5 => Some(UpgradeReason::AppStartFailed),
            _ => None,
        }
    }
}

/// Per-pair verdict in a set-parameters or set-calibration response.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ParamStatus {
    Ok = 1,
    UnknownName = 2,
    IllegalValue = 3,
}

impl ParamStatus {
    pub fn from_u8(value: u8) -> Option<ParamStatus> {
        match value {
            1 => Some(ParamStatus::Ok),
            2 => Some(ParamStatus::UnknownName),
            3 => Some(ParamStatus::IllegalValue),
            _ => None,
        }
    }
}

/// Live readings and settings returned by a query.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueryResponse {
    pub v_in_mv: u16,
    pub v_out_setting_mv: u16,
    pub v_out_mv: u16,
    pub i_out_ma: u16,
    pub i_limit_ma: u16,
    pub power_enabled: bool,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionResponse<'a> {
    pub boot_git_hash: &'a str,
    pub app_git_hash: &'a str,
}

/// Calibration coefficients plus a raw ADC/DAC snapshot, in wire order.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CalReport {
    pub a_adc_k: f32,
    pub a_adc_c: f32,
    pub a_dac_k: f32,
    pub a_dac_c: f32,
    pub v_adc_k: f32,
    pub v_adc_c: f32,
    pub v_dac_k: f32,
    pub v_dac_c: f32,
    pub vin_adc_k: f32,
    pub vin_adc_c: f32,
    pub vin_adc: u16,
    pub vout_adc: u16,
    pub iout_adc: u16,
    pub vout_dac: u16,
    pub iout_dac: u16,
}

fn expect_opcode(rd: &mut PayloadReader<'_>, expected: u8) -> Result<(), FrameError> {
    let b = rd.read_u8()?;
    if b != expected {
        return Err(FrameError::UnexpectedCommand(b));
    }
    Ok(())
}

fn status_byte(success: bool) -> u8 {
    if success {
        1
    } else {
        0
    }
}

/// First byte of an incoming request, for dispatch. Responses and retired
/// opcodes are rejected here.
pub fn decode_request_opcode(payload: &[u8]) -> Result<Command, FrameError> {
    let mut rd = PayloadReader::new(payload);
    let b = rd.read_u8()?;
    if b & RESPONSE_FLAG != 0 {
        return Err(FrameError::UnexpectedCommand(b));
    }
    Command::from_u8(b).ok_or(FrameError::UnexpectedCommand(b))
}

/// Request carrying nothing but its opcode (ping, query, the list and
/// report commands).
pub fn encode_request(cmd: Command) -> Result<FrameBuf, FrameError> {
    let mut f = Frame::new();
    f.push_u8(cmd.into())?;
    f.finish()
}

/// Response carrying nothing but a pass/fail byte.
pub fn encode_status_response(cmd: Command, success: bool) -> Result<FrameBuf, FrameError> {
    let mut f = Frame::new();
    f.push_u8(cmd.response())?;
    f.push_u8(status_byte(success))?;
    f.finish()
}

/// Pass/fail byte of a bare response. The caller names the command it is
/// waiting on; anything else is an error.
pub fn decode_status_response(payload: &[u8], cmd: Command) -> Result<u8, FrameError> {
    let mut rd = PayloadReader::new(payload);
    expect_opcode(&mut rd, cmd.response())?;
    rd.read_u8()
}

pub fn encode_wifi_status(status: WifiStatus) -> Result<FrameBuf, FrameError> {
    let mut f = Frame::new();
    f.push_u8(Command::WifiStatus.into())?;
    f.push_u8(status as u8)?;
    f.finish()
}

pub fn decode_wifi_status(payload: &[u8]) -> Result<WifiStatus, FrameError> {
    let mut rd = PayloadReader::new(payload);
    expect_opcode(&mut rd, Command::WifiStatus.into())?;
    let b = rd.read_u8()?;
    WifiStatus::from_u8(b).ok_or(FrameError::InvalidValue(b))
}

pub fn encode_lock(lock: bool) -> Result<FrameBuf, FrameError> {
    let mut f = Frame::new();
    f.push_u8(Command::Lock.into())?;
    f.push_u8(lock as u8)?;
    f.finish()
}

pub fn decode_lock(payload: &[u8]) -> Result<bool, FrameError> {
    let mut rd = PayloadReader::new(payload);
    expect_opcode(&mut rd, Command::Lock.into())?;
    decode_bool(rd.read_u8()?)
}

/// Unsolicited device-to-host event: output latched off at `i_cut_ma`.
/// There is no response frame for this one.
pub fn encode_ocp_event(i_cut_ma: u16) -> Result<FrameBuf, FrameError> {
    let mut f = Frame::new();
    f.push_u8(Command::OcpEvent.into())?;
    f.push_u16(i_cut_ma)?;
    f.finish()
}

pub fn decode_ocp_event(payload: &[u8]) -> Result<u16, FrameError> {
    let mut rd = PayloadReader::new(payload);
    expect_opcode(&mut rd, Command::OcpEvent.into())?;
    rd.read_u16()
}

pub fn encode_upgrade_start(chunk_size: u16, crc: u16) -> Result<FrameBuf, FrameError> {
    let mut f = Frame::new();
    f.push_u8(Command::UpgradeStart.into())?;
    f.push_u16(chunk_size)?;
    f.push_u16(crc)?;
    f.finish()
}

/// `(chunk_size, crc)` of the image about to be sent.
pub fn decode_upgrade_start(payload: &[u8]) -> Result<(u16, u16), FrameError> {
    let mut rd = PayloadReader::new(payload);
    expect_opcode(&mut rd, Command::UpgradeStart.into())?;
    Ok((rd.read_u16()?, rd.read_u16()?))
}

pub fn encode_upgrade_start_response(
    status: UpgradeStatus,
    chunk_size: u16,
    reason: UpgradeReason,
) -> Result<FrameBuf, FrameError> {
    let mut f = Frame::new();
    f.push_u8(Command::UpgradeStart.response())?;
    f.push_u8(status as u8)?;
    f.push_u16(chunk_size)?;
    f.push_u8(reason as u8)?;
    f.finish()
}

pub fn decode_upgrade_start_response(
    payload: &[u8],
) -> Result<(UpgradeStatus, u16, UpgradeReason), FrameError> {
    let mut rd = PayloadReader::new(payload);
    expect_opcode(&mut rd, Command::UpgradeStart.response())?;
    let s = rd.read_u8()?;
    let status = UpgradeStatus::from_u8(s).ok_or(FrameError::InvalidValue(s))?;
    let chunk_size = rd.read_u16()?;
    let r = rd.read_u8()?;
    let reason = UpgradeReason::from_u8(r).ok_or(FrameError::InvalidValue(r))?;
    Ok((status, chunk_size, reason))
}

pub fn encode_upgrade_data(chunk: &[u8]) -> Result<FrameBuf, FrameError> {
    let mut f = Frame::new();
    f.push_u8(Command::UpgradeData.into())?;
    f.push_bytes(chunk)?;
    f.finish()
}

pub fn decode_upgrade_data(payload: &[u8]) -> Result<&[u8], FrameError> {
    let mut rd = PayloadReader::new(payload);
    expect_opcode(&mut rd, Command::UpgradeData.into())?;
    Ok(rd.read_rest())
}

pub fn encode_upgrade_data_response(status: UpgradeStatus) -> Result<FrameBuf, FrameError> {
    let mut f = Frame::new();
    f.push_u8(Command::UpgradeData.response())?;
    f.push_u8(status as u8)?;
    f.finish()
}

pub fn decode_upgrade_data_response(payload: &[u8]) -> Result<UpgradeStatus, FrameError> {
    let mut rd = PayloadReader::new(payload);
    expect_opcode(&mut rd, Command::UpgradeData.response())?;
    let s = rd.read_u8()?;
    UpgradeStatus::from_u8(s).ok_or(FrameError::InvalidValue(s))
}

pub fn encode_set_function(name: &str) -> Result<FrameBuf, FrameError> {
    let mut f = Frame::new();
    f.push_u8(Command::SetFunction.into())?;
    f.push_cstr(name)?;
    f.finish()
}

pub fn decode_set_function(payload: &[u8]) -> Result<&str, FrameError> {
    let mut rd = PayloadReader::new(payload);
    expect_opcode(&mut rd, Command::SetFunction.into())?;
    rd.read_cstr()
}

pub fn encode_enable_output(enable: bool) -> Result<FrameBuf, FrameError> {
    let mut f = Frame::new();
    f.push_u8(Command::EnableOutput.into())?;
    f.push_u8(enable as u8)?;
    f.finish()
}

pub fn decode_enable_output(payload: &[u8]) -> Result<bool, FrameError> {
    let mut rd = PayloadReader::new(payload);
    expect_opcode(&mut rd, Command::EnableOutput.into())?;
    decode_bool(rd.read_u8()?)
}

/// Function names, then for the active one nothing extra: the response is a
/// status byte followed by one NUL-terminated name per selectable function.
pub fn encode_list_functions_response(
    success: bool,
    names: &[&str],
) -> Result<FrameBuf, FrameError> {
    let mut f = Frame::new();
    f.push_u8(Command::ListFunctions.response())?;
    f.push_u8(status_byte(success))?;
    for name in names {
        f.push_cstr(name)?;
    }
    f.finish()
}

pub fn decode_list_functions_response(payload: &[u8]) -> Result<(u8, Strings<'_>), FrameError> {
    let mut rd = PayloadReader::new(payload);
    expect_opcode(&mut rd, Command::ListFunctions.response())?;
    let status = rd.read_u8()?;
    Ok((status, Strings { rd, failed: false }))
}

pub fn encode_set_parameters(pairs: &[(&str, &str)]) -> Result<FrameBuf, FrameError> {
    let mut f = Frame::new();
    f.push_u8(Command::SetParameters.into())?;
    for (name, value) in pairs {
        f.push_cstr(name)?;
        f.push_cstr(value)?;
    }
    f.finish()
}

pub fn decode_set_parameters(payload: &[u8]) -> Result<StringPairs<'_>, FrameError> {
    let mut rd = PayloadReader::new(payload);
    expect_opcode(&mut rd, Command::SetParameters.into())?;
    Ok(StringPairs { rd, failed: false })
}

/// One verdict byte per name/value pair, in request order.
pub fn encode_set_parameters_response(statuses: &[ParamStatus]) -> Result<FrameBuf, FrameError> {
    let mut f = Frame::new();
    f.push_u8(Command::SetParameters.response())?;
    for &s in statuses {
        f.push_u8(s as u8)?;
    }
    f.finish()
}

pub fn decode_set_parameters_response(payload: &[u8]) -> Result<ParamStatuses<'_>, FrameError> {
    let mut rd = PayloadReader::new(payload);
    expect_opcode(&mut rd, Command::SetParameters.response())?;
    Ok(ParamStatuses { rd })
}

/// Name/value pairs of the active function. Unlike the function list there
/// is no status byte; the pairs start right after the opcode.
pub fn encode_list_parameters_response(pairs: &[(&str, &str)]) -> Result<FrameBuf, FrameError> {
    let mut f = Frame::new();
    f.push_u8(Command::ListParameters.response())?;
    for (name, value) in pairs {
        f.push_cstr(name)?;
        f.push_cstr(value)?;
    }
    f.finish()
}

pub fn decode_list_parameters_response(payload: &[u8]) -> Result<StringPairs<'_>, FrameError> {
    let mut rd = PayloadReader::new(payload);
    expect_opcode(&mut rd, Command::ListParameters.response())?;
    Ok(StringPairs { rd, failed: false })
}

/// Two board temperatures in tenths of a degree. Senders without a second
/// sensor put [`INVALID_TEMPERATURE`] in that slot.
pub fn encode_temperature_report(t1: i16, t2: i16) -> Result<FrameBuf, FrameError> {
    let mut f = Frame::new();
    f.push_u8(Command::TemperatureReport.into())?;
    f.push_i16(t1)?;
    f.push_i16(t2)?;
    f.finish()
}

pub fn decode_temperature_report(payload: &[u8]) -> Result<(i16, i16), FrameError> {
    let mut rd = PayloadReader::new(payload);
    expect_opcode(&mut rd, Command::TemperatureReport.into())?;
    Ok((rd.read_i16()?, rd.read_i16()?))
}

pub fn encode_version_response(
    success: bool,
    boot_git_hash: &str,
    app_git_hash: &str,
) -> Result<FrameBuf, FrameError> {
    let mut f = Frame::new();
    f.push_u8(Command::Version.response())?;
    f.push_u8(status_byte(success))?;
    f.push_cstr(boot_git_hash)?;
    f.push_cstr(app_git_hash)?;
    f.finish()
}

pub fn decode_version_response(payload: &[u8]) -> Result<(u8, VersionResponse<'_>), FrameError> {
    let mut rd = PayloadReader::new(payload);
    expect_opcode(&mut rd, Command::Version.response())?;
    let status = rd.read_u8()?;
    let boot_git_hash = rd.read_cstr()?;
    let app_git_hash = rd.read_cstr()?;
    Ok((
        status,
        VersionResponse {
            boot_git_hash,
            app_git_hash,
        },
    ))
}

pub fn encode_query_response(resp: &QueryResponse) -> Result<FrameBuf, FrameError> {
    let mut f = Frame::new();
    f.push_u8(Command::Query.response())?;
    f.push_u8(1)?;
    f.push_u16(resp.v_in_mv)?;
    f.push_u16(resp.v_out_setting_mv)?;
    f.push_u16(resp.v_out_mv)?;
    f.push_u16(resp.i_out_ma)?;
    f.push_u16(resp.i_limit_ma)?;
    f.push_u8(resp.power_enabled as u8)?;
    f.finish()
}

pub fn decode_query_response(payload: &[u8]) -> Result<QueryResponse, FrameError> {
    let mut rd = PayloadReader::new(payload);
    expect_opcode(&mut rd, Command::Query.response())?;
    let status = rd.read_u8()?;
    if status != 1 {
        return Err(FrameError::InvalidValue(status));
    }
    Ok(QueryResponse {
        v_in_mv: rd.read_u16()?,
        v_out_setting_mv: rd.read_u16()?,
        v_out_mv: rd.read_u16()?,
        i_out_ma: rd.read_u16()?,
        i_limit_ma: rd.read_u16()?,
        power_enabled: decode_bool(rd.read_u8()?)?,
    })
}

pub fn encode_cal_report_response(
    success: bool,
    report: &CalReport,
) -> Result<FrameBuf, FrameError> {
    let mut f = Frame::new();
    f.push_u8(Command::CalReport.response())?;
    f.push_u8(status_byte(success))?;
    f.push_f32(report.a_adc_k)?;
    f.push_f32(report.a_adc_c)?;
    f.push_f32(report.a_dac_k)?;
    f.push_f32(report.a_dac_c)?;
    f.push_f32(report.v_adc_k)?;
    f.push_f32(report.v_adc_c)?;
    f.push_f32(report.v_dac_k)?;
    f.push_f32(report.v_dac_c)?;
    f.push_f32(report.vin_adc_k)?;
    f.push_f32(report.vin_adc_c)?;
    f.push_u16(report.vin_adc)?;
    f.push_u16(report.vout_adc)?;
    f.push_u16(report.iout_adc)?;
    f.push_u16(report.vout_dac)?;
    f.push_u16(report.iout_dac)?;
    f.finish()
}

pub fn decode_cal_report_response(payload: &[u8]) -> Result<(u8, CalReport), FrameError> {
    let mut rd = PayloadReader::new(payload);
    expect_opcode(&mut rd, Command::CalReport.response())?;
    let status = rd.read_u8()?;
    let report = CalReport {
        a_adc_k: rd.read_f32()?,
        a_adc_c: rd.read_f32()?,
        a_dac_k: rd.read_f32()?,
        a_dac_c: rd.read_f32()?,
        v_adc_k: rd.read_f32()?,
        v_adc_c: rd.read_f32()?,
        v_dac_k: rd.read_f32()?,
        v_dac_c: rd.read_f32()?,
        vin_adc_k: rd.read_f32()?,
        vin_adc_c: rd.read_f32()?,
        vin_adc: rd.read_u16()?,
        vout_adc: rd.read_u16()?,
        iout_adc: rd.read_u16()?,
        vout_dac: rd.read_u16()?,
        iout_dac: rd.read_u16()?,
    };
    Ok((status, report))
}

pub fn encode_set_calibration(pairs: &[(&str, f32)]) -> Result<FrameBuf, FrameError> {
    let mut f = Frame::new();
    f.push_u8(Command::SetCalibration.into())?;
    for (name, value) in pairs {
        f.push_cstr(name)?;
        f.push_f32(*value)?;
    }
    f.finish()
}

pub fn decode_set_calibration(payload: &[u8]) -> Result<CalPairs<'_>, FrameError> {
    let mut rd = PayloadReader::new(payload);
    expect_opcode(&mut rd, Command::SetCalibration.into())?;
    Ok(CalPairs { rd, failed: false })
}

/// Same per-pair verdict layout as set-parameters.
pub fn encode_set_calibration_response(statuses: &[ParamStatus]) -> Result<FrameBuf, FrameError> {
    let mut f = Frame::new();
    f.push_u8(Command::SetCalibration.response())?;
    for &s in statuses {
        f.push_u8(s as u8)?;
    }
    f.finish()
}

pub fn decode_set_calibration_response(payload: &[u8]) -> Result<ParamStatuses<'_>, FrameError> {
    let mut rd = PayloadReader::new(payload);
    expect_opcode(&mut rd, Command::SetCalibration.response())?;
    Ok(ParamStatuses { rd })
}

pub fn encode_change_screen(index: u8) -> Result<FrameBuf, FrameError> {
    let mut f = Frame::new();
    f.push_u8(Command::ChangeScreen.into())?;
    f.push_u8(index)?;
    f.finish()
}

pub fn decode_change_screen(payload: &[u8]) -> Result<u8, FrameError> {
    let mut rd = PayloadReader::new(payload);
    expect_opcode(&mut rd, Command::ChangeScreen.into())?;
    rd.read_u8()
}

pub fn encode_set_brightness(percent: u8) -> Result<FrameBuf, FrameError> {
    let mut f = Frame::new();
    f.push_u8(Command::SetBrightness.into())?;
    f.push_u8(percent)?;
    f.finish()
}

pub fn decode_set_brightness(payload: &[u8]) -> Result<u8, FrameError> {
    let mut rd = PayloadReader::new(payload);
    expect_opcode(&mut rd, Command::SetBrightness.into())?;
    rd.read_u8()
}

fn decode_bool(byte: u8) -> Result<bool, FrameError> {
    match byte {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(FrameError::InvalidValue(other)),
    }
}

/// NUL-terminated strings running to the end of the payload. Fuses after
/// the first error.
pub struct Strings<'a> {
    rd: PayloadReader<'a>,
    failed: bool,
}

impl<'a> Iterator for Strings<'a> {
    type Item = Result<&'a str, FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.rd.remaining() == 0 {
            return None;
        }
        let item = self.rd.read_cstr();
        if item.is_err() {
            self.failed = true;
        }
        Some(item)
    }
}

/// Name/value string pairs running to the end of the payload.
pub struct StringPairs<'a> {
    rd: PayloadReader<'a>,
    failed: bool,
}

impl<'a> Iterator for StringPairs<'a> {
    type Item = Result<(&'a str, &'a str), FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.rd.remaining() == 0 {
            return None;
        }
        let item = (|| Ok((self.rd.read_cstr()?, self.rd.read_cstr()?)))();
        if item.is_err() {
            self.failed = true;
        }
        Some(item)
    }
}

/// Name/float pairs of a calibration upload.
pub struct CalPairs<'a> {
    rd: PayloadReader<'a>,
    failed: bool,
}

impl<'a> Iterator for CalPairs<'a> {
    type Item = Result<(&'a str, f32), FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.rd.remaining() == 0 {
            return None;
        }
        let item = (|| Ok((self.rd.read_cstr()?, self.rd.read_f32()?)))();
        if item.is_err() {
            self.failed = true;
        }
        Some(item)
    }
}

/// Verdict bytes of a set-parameters response.
pub struct ParamStatuses<'a> {
    rd: PayloadReader<'a>,
}

impl<'a> Iterator for ParamStatuses<'a> {
    type Item = Result<ParamStatus, FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rd.remaining() == 0 {
            return None;
        }
        Some(match self.rd.read_u8() {
            Ok(b) => ParamStatus::from_u8(b).ok_or(FrameError::InvalidValue(b)),
            Err(e) => Err(e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{extract_payload, MAX_PAYLOAD};
    use std::vec::Vec as StdVec;

    fn payload_of(wire: &[u8]) -> StdVec<u8> {
        let mut out = [0u8; MAX_PAYLOAD];
        let n = extract_payload(wire, &mut out).unwrap();
        out[..n].to_vec()
    }

    #[test]
    fn ping_exchange_matches_reference_bytes() {
        let req = encode_request(Command::Ping).unwrap();
        assert_eq!(payload_of(&req), &[1]);

        let resp = encode_status_response(Command::Ping, true).unwrap();
        assert_eq!(payload_of(&resp), &[0x81, 1]);
        assert_eq!(decode_status_response(&payload_of(&resp), Command::Ping), Ok(1));
    }

    #[test]
    fn query_response_matches_reference_bytes() {
        let resp = QueryResponse {
            v_in_mv: 12000,
            v_out_setting_mv: 5000,
            v_out_mv: 4990,
            i_out_ma: 500,
            i_limit_ma: 1000,
            power_enabled: true,
        };
        let wire = encode_query_response(&resp).unwrap();
        assert_eq!(
            payload_of(&wire),
            &[
                0x84, 0x01, 0x2E, 0xE0, 0x13, 0x88, 0x13, 0x7E, 0x01, 0xF4, 0x03, 0xE8, 0x01
            ]
        );
        assert_eq!(decode_query_response(&payload_of(&wire)), Ok(resp));
    }

    #[test]
    fn retired_opcodes_fail_dispatch() {
        for op in [0u8, 2, 3, 5, 23, 0x7F] {
            assert_eq!(Command::from_u8(op), None);
            assert_eq!(
                decode_request_opcode(&[op]),
                Err(FrameError::UnexpectedCommand(op))
            );
        }
        // A response opcode is never a request.
        assert_eq!(
            decode_request_opcode(&[Command::Ping.response()]),
            Err(FrameError::UnexpectedCommand(0x81))
        );
    }

    #[test]
    fn wrong_opcode_is_rejected_by_typed_decoder() {
        let wire = encode_enable_output(true).unwrap();
        assert_eq!(
            decode_lock(&payload_of(&wire)),
            Err(FrameError::UnexpectedCommand(Command::EnableOutput as u8))
        );
    }

    #[test]
    fn enable_output_accepts_only_zero_and_one() {
        assert_eq!(decode_enable_output(&[12, 0]), Ok(false));
        assert_eq!(decode_enable_output(&[12, 1]), Ok(true));
        assert_eq!(
            decode_enable_output(&[12, 2]),
            Err(FrameError::InvalidValue(2))
        );
    }

    #[test]
    fn ocp_event_is_big_endian() {
        let wire = encode_ocp_event(0x01F4).unwrap();
        assert_eq!(payload_of(&wire), &[8, 0x01, 0xF4]);
        assert_eq!(decode_ocp_event(&payload_of(&wire)), Ok(500));
    }

    #[test]
    fn set_function_roundtrip() {
        let wire = encode_set_function("cv").unwrap();
        assert_eq!(payload_of(&wire), &[11, b'c', b'v', 0]);
        assert_eq!(decode_set_function(&payload_of(&wire)), Ok("cv"));
    }

    #[test]
    fn set_parameters_roundtrip() {
        let wire = encode_set_parameters(&[("voltage", "5000"), ("current", "1000")]).unwrap();
        let payload = payload_of(&wire);
        let pairs: StdVec<_> = decode_set_parameters(&payload)
            .unwrap()
            .map(|p| p.unwrap())
            .collect();
        assert_eq!(pairs, &[("voltage", "5000"), ("current", "1000")]);
    }

    #[test]
    fn set_parameters_response_carries_one_verdict_per_pair() {
        let wire = encode_set_parameters_response(&[
            ParamStatus::Ok,
            ParamStatus::UnknownName,
            ParamStatus::IllegalValue,
        ])
        .unwrap();
        let payload = payload_of(&wire);
        assert_eq!(payload, &[0x8E, 1, 2, 3]);
        let verdicts: StdVec<_> = decode_set_parameters_response(&payload)
            .unwrap()
            .map(|v| v.unwrap())
            .collect();
        assert_eq!(
            verdicts,
            &[
                ParamStatus::Ok,
                ParamStatus::UnknownName,
                ParamStatus::IllegalValue
            ]
        );
    }

    #[test]
    fn list_parameters_response_has_no_status_byte() {
        let wire = encode_list_parameters_response(&[("voltage", "3300"), ("current", "500")])
            .unwrap();
        let payload = payload_of(&wire);
        assert_eq!(payload[0], 0x8F);
        assert_eq!(payload[1], b'v');
        let pairs: StdVec<_> = decode_list_parameters_response(&payload)
            .unwrap()
            .map(|p| p.unwrap())
            .collect();
        assert_eq!(pairs, &[("voltage", "3300"), ("current", "500")]);
    }

    #[test]
    fn list_functions_response_roundtrip() {
        let wire =
            encode_list_functions_response(true, &["cv", "cc", "cl", "gen"]).unwrap();
        let payload = payload_of(&wire);
        let (status, names) = decode_list_functions_response(&payload).unwrap();
        assert_eq!(status, 1);
        let names: StdVec<_> = names.map(|n| n.unwrap()).collect();
        assert_eq!(names, &["cv", "cc", "cl", "gen"]);
    }

    #[test]
    fn version_response_roundtrip() {
        let wire = encode_version_response(true, "8e890bf", "1a2b3c4-dirty").unwrap();
        let payload = payload_of(&wire);
        let (status, ver) = decode_version_response(&payload).unwrap();
        assert_eq!(status, 1);
        assert_eq!(ver.boot_git_hash, "8e890bf");
        assert_eq!(ver.app_git_hash, "1a2b3c4-dirty");
    }

    #[test]
    fn cal_report_roundtrip_is_bit_exact() {
        let report = CalReport {
            a_adc_k: 1.713,
            a_adc_c: -118.51,
            a_dac_k: 0.652,
            a_dac_c: 288.611,
            v_adc_k: 13.164,
            v_adc_c: -100.751,
            v_dac_k: 0.072,
            v_dac_c: 1.85,
            vin_adc_k: 16.746,
            vin_adc_c: 64.112,
            vin_adc: 1941,
            vout_adc: 102,
            iout_adc: 77,
            vout_dac: 139,
            iout_dac: 513,
        };
        let wire = encode_cal_report_response(true, &report).unwrap();
        let (status, back) = decode_cal_report_response(&payload_of(&wire)).unwrap();
        assert_eq!(status, 1);
        assert_eq!(back, report);
    }

    #[test]
    fn set_calibration_pairs_roundtrip() {
        let wire =
            encode_set_calibration(&[("A_ADC_K", 1.713), ("A_ADC_C", -118.51)]).unwrap();
        let payload = payload_of(&wire);
        let pairs: StdVec<_> = decode_set_calibration(&payload)
            .unwrap()
            .map(|p| p.unwrap())
            .collect();
        assert_eq!(pairs, &[("A_ADC_K", 1.713f32), ("A_ADC_C", -118.51f32)]);
    }

    #[test]
    fn upgrade_handshake_roundtrip() {
        let wire = encode_upgrade_start(1024, 0xBEEF).unwrap();
        assert_eq!(
            decode_upgrade_start(&payload_of(&wire)),
            Ok((1024, 0xBEEF))
        );

        let wire = encode_upgrade_start_response(
            UpgradeStatus::Continue,
            1024,
            UpgradeReason::Bootcom,
        )
        .unwrap();
        assert_eq!(
            decode_upgrade_start_response(&payload_of(&wire)),
            Ok((UpgradeStatus::Continue, 1024, UpgradeReason::Bootcom))
        );

        let chunk: StdVec<u8> = (0..64).map(|i| i as u8).collect();
        let wire = encode_upgrade_data(&chunk).unwrap();
        let payload = payload_of(&wire);
        assert_eq!(decode_upgrade_data(&payload), Ok(&chunk[..]));

        let wire = encode_upgrade_data_response(UpgradeStatus::ProtocolError).unwrap();
        assert_eq!(
            decode_upgrade_data_response(&payload_of(&wire)),
            Ok(UpgradeStatus::ProtocolError)
        );
    }

    #[test]
    fn temperature_report_roundtrip_with_sentinel() {
        let wire = encode_temperature_report(217, INVALID_TEMPERATURE).unwrap();
        let payload = payload_of(&wire);
        assert_eq!(payload, &[16, 0x00, 0xD9, 0xFF, 0xFF]);
        assert_eq!(
            decode_temperature_report(&payload),
            Ok((217, INVALID_TEMPERATURE))
        );
    }

    #[test]
    fn wifi_status_roundtrip_and_range() {
        let wire = encode_wifi_status(WifiStatus::Connected).unwrap();
        assert_eq!(decode_wifi_status(&payload_of(&wire)), Ok(WifiStatus::Connected));
        assert_eq!(decode_wifi_status(&[6, 9]), Err(FrameError::InvalidValue(9)));
    }

    #[test]
    fn screen_and_brightness_roundtrip() {
        let wire = encode_change_screen(1).unwrap();
        assert_eq!(decode_change_screen(&payload_of(&wire)), Ok(1));

        let wire = encode_set_brightness(80).unwrap();
        assert_eq!(decode_set_brightness(&payload_of(&wire)), Ok(80));

        let wire = encode_lock(true).unwrap();
        assert_eq!(decode_lock(&payload_of(&wire)), Ok(true));
    }

    #[test]
    fn truncated_pair_stream_surfaces_error_once() {
        // Second value is missing its terminator.
        let payload = [14u8, b'v', 0, b'5', b'0'];
        let mut pairs = decode_set_parameters(&payload).unwrap();
        assert_eq!(pairs.next(), Some(Err(FrameError::OutOfData)));
        assert_eq!(pairs.next(), None);
    }
}
