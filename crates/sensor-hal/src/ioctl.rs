//! Vendor IOCTL Channel
//!
//! Request codes are stable numeric values. Bit 8 of a code marks requests
//! that reprogram the readout path and therefore abort any capture in
//! flight before the driver sees them.

use crate::error::SensorError;
use crate::session::SensorSession;
use serde::Serialize;
use tracing::debug;

/// Tag bit: the request aborts an in-flight capture
pub const IOCTL_ABORT: u32 = 1 << 8;

/// IOCTL request codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u32)]
pub enum IoctlCode {
    SetReadoutWindow = 0x00 | IOCTL_ABORT,
    GetReadoutWindow = 0x01,
    SetTriggeredMode = 0x02,
    GetTriggeredMode = 0x03,
    SetFovWide = 0x04,
    GetFovWide = 0x05,
    TriggerAutoFocus = 0x06,
    PauseAutoFocus = 0x07,
    ResetAutoFocus = 0x08,
    WaitOnAutoFocus = 0x09,
    SetNightMode = 0x0A,
    GetNightMode = 0x0B,
    LeptonGetWidth = 0x0C,
    LeptonGetHeight = 0x0D,
    LeptonGetRadiometry = 0x0E,
    LeptonGetRefresh = 0x0F,
    LeptonGetResolution = 0x10,
    LeptonRunCommand = 0x11,
    LeptonSetAttribute = 0x12,
    LeptonGetAttribute = 0x13,
    LeptonGetFpaTemperature = 0x14,
    LeptonGetAuxTemperature = 0x15,
    LeptonSetMeasurementMode = 0x16 | IOCTL_ABORT,
    LeptonGetMeasurementMode = 0x17,
    LeptonSetMeasurementRange = 0x18 | IOCTL_ABORT,
    LeptonGetMeasurementRange = 0x19,
    HimaxMdEnable = 0x1A,
    HimaxMdClear = 0x1B,
    HimaxMdWindow = 0x1C | IOCTL_ABORT,
    HimaxMdThreshold = 0x1D,
    HimaxOscEnable = 0x1E | IOCTL_ABORT,
    GetRgbStats = 0x1F,
}

impl IoctlCode {
    pub const ALL: [IoctlCode; 32] = [
        IoctlCode::SetReadoutWindow,
        IoctlCode::GetReadoutWindow,
        IoctlCode::SetTriggeredMode,
        IoctlCode::GetTriggeredMode,
        IoctlCode::SetFovWide,
        IoctlCode::GetFovWide,
        IoctlCode::TriggerAutoFocus,
        IoctlCode::PauseAutoFocus,
        IoctlCode::ResetAutoFocus,
        IoctlCode::WaitOnAutoFocus,
        IoctlCode::SetNightMode,
        IoctlCode::GetNightMode,
        IoctlCode::LeptonGetWidth,
        IoctlCode::LeptonGetHeight,
        IoctlCode::LeptonGetRadiometry,
        IoctlCode::LeptonGetRefresh,
        IoctlCode::LeptonGetResolution,
        IoctlCode::LeptonRunCommand,
        IoctlCode::LeptonSetAttribute,
        IoctlCode::LeptonGetAttribute,
        IoctlCode::LeptonGetFpaTemperature,
        IoctlCode::LeptonGetAuxTemperature,
        IoctlCode::LeptonSetMeasurementMode,
        IoctlCode::LeptonGetMeasurementMode,
        IoctlCode::LeptonSetMeasurementRange,
        IoctlCode::LeptonGetMeasurementRange,
        IoctlCode::HimaxMdEnable,
        IoctlCode::HimaxMdClear,
        IoctlCode::HimaxMdWindow,
        IoctlCode::HimaxMdThreshold,
        IoctlCode::HimaxOscEnable,
        IoctlCode::GetRgbStats,
    ];

    /// Numeric request code, including the abort tag
    pub fn raw(&self) -> u32 {
        *self as u32
    }

    pub fn from_raw(raw: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|code| code.raw() == raw)
    }

    /// Whether the request aborts an in-flight capture
    pub fn aborts_capture(&self) -> bool {
        self.raw() & IOCTL_ABORT != 0
    }
}

/// Typed IOCTL request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum IoctlRequest {
    SetReadoutWindow { x: i32, y: i32, w: u32, h: u32 },
    GetReadoutWindow,
    SetTriggeredMode(bool),
    GetTriggeredMode,
    SetFovWide(bool),
    GetFovWide,
    TriggerAutoFocus,
    PauseAutoFocus,
    ResetAutoFocus,
    /// Block until focus settles or `timeout_ms` elapses
    WaitOnAutoFocus { timeout_ms: u32 },
    SetNightMode(bool),
    GetNightMode,
    LeptonGetWidth,
    LeptonGetHeight,
    LeptonGetRadiometry,
    LeptonGetRefresh,
    LeptonGetResolution,
    LeptonRunCommand { command: u16 },
    LeptonSetAttribute { command: u16, data: Vec<u16> },
    LeptonGetAttribute { command: u16, words: usize },
    LeptonGetFpaTemperature,
    LeptonGetAuxTemperature,
    LeptonSetMeasurementMode { enabled: bool, high_temp: bool },
    LeptonGetMeasurementMode,
    LeptonSetMeasurementRange { min_c: f32, max_c: f32 },
    LeptonGetMeasurementRange,
    HimaxMdEnable(bool),
    HimaxMdClear,
    HimaxMdWindow { x1: u32, y1: u32, x2: u32, y2: u32 },
    HimaxMdThreshold(u32),
    HimaxOscEnable(bool),
    GetRgbStats,
}

/// Longest auto-focus wait a caller may request
pub const MAX_AUTO_FOCUS_WAIT_MS: u32 = 60_000;

impl IoctlRequest {
    pub fn code(&self) -> IoctlCode {
        match self {
            IoctlRequest::SetReadoutWindow { .. } => IoctlCode::SetReadoutWindow,
            IoctlRequest::GetReadoutWindow => IoctlCode::GetReadoutWindow,
            IoctlRequest::SetTriggeredMode(_) => IoctlCode::SetTriggeredMode,
            IoctlRequest::GetTriggeredMode => IoctlCode::GetTriggeredMode,
            IoctlRequest::SetFovWide(_) => IoctlCode::SetFovWide,
            IoctlRequest::GetFovWide => IoctlCode::GetFovWide,
            IoctlRequest::TriggerAutoFocus => IoctlCode::TriggerAutoFocus,
            IoctlRequest::PauseAutoFocus => IoctlCode::PauseAutoFocus,
            IoctlRequest::ResetAutoFocus => IoctlCode::ResetAutoFocus,
            IoctlRequest::WaitOnAutoFocus { .. } => IoctlCode::WaitOnAutoFocus,
            IoctlRequest::SetNightMode(_) => IoctlCode::SetNightMode,
            IoctlRequest::GetNightMode => IoctlCode::GetNightMode,
            IoctlRequest::LeptonGetWidth => IoctlCode::LeptonGetWidth,
            IoctlRequest::LeptonGetHeight => IoctlCode::LeptonGetHeight,
            IoctlRequest::LeptonGetRadiometry => IoctlCode::LeptonGetRadiometry,
            IoctlRequest::LeptonGetRefresh => IoctlCode::LeptonGetRefresh,
            IoctlRequest::LeptonGetResolution => IoctlCode::LeptonGetResolution,
            IoctlRequest::LeptonRunCommand { .. } => IoctlCode::LeptonRunCommand,
            IoctlRequest::LeptonSetAttribute { .. } => IoctlCode::LeptonSetAttribute,
            IoctlRequest::LeptonGetAttribute { .. } => IoctlCode::LeptonGetAttribute,
            IoctlRequest::LeptonGetFpaTemperature => IoctlCode::LeptonGetFpaTemperature,
            IoctlRequest::LeptonGetAuxTemperature => IoctlCode::LeptonGetAuxTemperature,
            IoctlRequest::LeptonSetMeasurementMode { .. } => IoctlCode::LeptonSetMeasurementMode,
            IoctlRequest::LeptonGetMeasurementMode => IoctlCode::LeptonGetMeasurementMode,
            IoctlRequest::LeptonSetMeasurementRange { .. } => IoctlCode::LeptonSetMeasurementRange,
            IoctlRequest::LeptonGetMeasurementRange => IoctlCode::LeptonGetMeasurementRange,
            IoctlRequest::HimaxMdEnable(_) => IoctlCode::HimaxMdEnable,
            IoctlRequest::HimaxMdClear => IoctlCode::HimaxMdClear,
            IoctlRequest::HimaxMdWindow { .. } => IoctlCode::HimaxMdWindow,
            IoctlRequest::HimaxMdThreshold(_) => IoctlCode::HimaxMdThreshold,
            IoctlRequest::HimaxOscEnable(_) => IoctlCode::HimaxOscEnable,
            IoctlRequest::GetRgbStats => IoctlCode::GetRgbStats,
        }
    }

    /// Reject malformed arguments before anything is aborted or forwarded
    pub fn validate(&self) -> Result<(), SensorError> {
        let ok = match self {
            IoctlRequest::SetReadoutWindow { w, h, .. } => *w > 0 && *h > 0,
            IoctlRequest::WaitOnAutoFocus { timeout_ms } => {
                *timeout_ms > 0 && *timeout_ms <= MAX_AUTO_FOCUS_WAIT_MS
            }
            IoctlRequest::LeptonSetAttribute { data, .. } => !data.is_empty(),
            IoctlRequest::LeptonGetAttribute { words, .. } => *words > 0,
            IoctlRequest::LeptonSetMeasurementRange { min_c, max_c } => {
                min_c.is_finite() && max_c.is_finite() && min_c < max_c
            }
            IoctlRequest::HimaxMdWindow { x1, y1, x2, y2 } => x1 < x2 && y1 < y2,
            _ => true,
        };
        if ok {
            Ok(())
        } else {
            Err(SensorError::CtlFailed)
        }
    }
}

/// IOCTL result payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum IoctlResponse {
    /// Request carried out, nothing to return
    Done,
    Flag(bool),
    Value(i32),
    Window { x: i32, y: i32, w: u32, h: u32 },
    Temperature(f32),
    MeasurementMode { enabled: bool, high_temp: bool },
    Range { min_c: f32, max_c: f32 },
    Words(Vec<u16>),
    RgbStats { r: u32, g: u32, b: u32 },
}

/// Untyped argument for the raw entry point
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IoctlArg {
    Int(i64),
    Float(f64),
}

struct Args<'a> {
    args: &'a [IoctlArg],
    pos: usize,
}

impl<'a> Args<'a> {
    fn next(&mut self) -> Result<IoctlArg, SensorError> {
        let arg = self.args.get(self.pos).copied().ok_or(SensorError::CtlFailed)?;
        self.pos += 1;
        Ok(arg)
    }

    fn int<T: TryFrom<i64>>(&mut self) -> Result<T, SensorError> {
        match self.next()? {
            IoctlArg::Int(v) => T::try_from(v).map_err(|_| SensorError::CtlFailed),
            IoctlArg::Float(_) => Err(SensorError::CtlFailed),
        }
    }

    fn flag(&mut self) -> Result<bool, SensorError> {
        Ok(self.int::<i64>()? != 0)
    }

    fn float(&mut self) -> Result<f32, SensorError> {
        match self.next()? {
            IoctlArg::Int(v) => Ok(v as f32),
            IoctlArg::Float(v) => Ok(v as f32),
        }
    }

    fn rest_words(&mut self) -> Result<Vec<u16>, SensorError> {
        let mut words = Vec::new();
        while self.pos < self.args.len() {
            words.push(self.int::<u16>()?);
        }
        Ok(words)
    }

    fn finish<T>(self, value: T) -> Result<T, SensorError> {
        if self.pos == self.args.len() {
            Ok(value)
        } else {
            Err(SensorError::CtlFailed)
        }
    }
}

/// Decode a raw request code and argument list into a typed request
///
/// Unknown codes report [`SensorError::CtlUnsupported`]; missing, extra or
/// out-of-range arguments report [`SensorError::CtlFailed`].
pub fn decode(raw: u32, args: &[IoctlArg]) -> Result<IoctlRequest, SensorError> {
    let code = IoctlCode::from_raw(raw).ok_or(SensorError::CtlUnsupported)?;
    let mut a = Args { args, pos: 0 };
    let request = match code {
        IoctlCode::SetReadoutWindow => IoctlRequest::SetReadoutWindow {
            x: a.int()?,
            y: a.int()?,
            w: a.int()?,
            h: a.int()?,
        },
        IoctlCode::GetReadoutWindow => IoctlRequest::GetReadoutWindow,
        IoctlCode::SetTriggeredMode => IoctlRequest::SetTriggeredMode(a.flag()?),
        IoctlCode::GetTriggeredMode => IoctlRequest::GetTriggeredMode,
        IoctlCode::SetFovWide => IoctlRequest::SetFovWide(a.flag()?),
        IoctlCode::GetFovWide => IoctlRequest::GetFovWide,
        IoctlCode::TriggerAutoFocus => IoctlRequest::TriggerAutoFocus,
        IoctlCode::PauseAutoFocus => IoctlRequest::PauseAutoFocus,
        IoctlCode::ResetAutoFocus => IoctlRequest::ResetAutoFocus,
        IoctlCode::WaitOnAutoFocus => IoctlRequest::WaitOnAutoFocus {
            timeout_ms: a.int()?,
        },
        IoctlCode::SetNightMode => IoctlRequest::SetNightMode(a.flag()?),
        IoctlCode::GetNightMode => IoctlRequest::GetNightMode,
        IoctlCode::LeptonGetWidth => IoctlRequest::LeptonGetWidth,
        IoctlCode::LeptonGetHeight => IoctlRequest::LeptonGetHeight,
        IoctlCode::LeptonGetRadiometry => IoctlRequest::LeptonGetRadiometry,
        IoctlCode::LeptonGetRefresh => IoctlRequest::LeptonGetRefresh,
        IoctlCode::LeptonGetResolution => IoctlRequest::LeptonGetResolution,
        IoctlCode::LeptonRunCommand => IoctlRequest::LeptonRunCommand { command: a.int()? },
        IoctlCode::LeptonSetAttribute => IoctlRequest::LeptonSetAttribute {
            command: a.int()?,
            data: a.rest_words()?,
        },
        IoctlCode::LeptonGetAttribute => IoctlRequest::LeptonGetAttribute {
            command: a.int()?,
            words: a.int()?,
        },
        IoctlCode::LeptonGetFpaTemperature => IoctlRequest::LeptonGetFpaTemperature,
        IoctlCode::LeptonGetAuxTemperature => IoctlRequest::LeptonGetAuxTemperature,
        IoctlCode::LeptonSetMeasurementMode => IoctlRequest::LeptonSetMeasurementMode {
            enabled: a.flag()?,
            high_temp: a.flag()?,
        },
        IoctlCode::LeptonGetMeasurementMode => IoctlRequest::LeptonGetMeasurementMode,
        IoctlCode::LeptonSetMeasurementRange => IoctlRequest::LeptonSetMeasurementRange {
            min_c: a.float()?,
            max_c: a.float()?,
        },
        IoctlCode::LeptonGetMeasurementRange => IoctlRequest::LeptonGetMeasurementRange,
        IoctlCode::HimaxMdEnable => IoctlRequest::HimaxMdEnable(a.flag()?),
        IoctlCode::HimaxMdClear => IoctlRequest::HimaxMdClear,
        IoctlCode::HimaxMdWindow => IoctlRequest::HimaxMdWindow {
            x1: a.int()?,
            y1: a.int()?,
            x2: a.int()?,
            y2: a.int()?,
        },
        IoctlCode::HimaxMdThreshold => IoctlRequest::HimaxMdThreshold(a.int()?),
        IoctlCode::HimaxOscEnable => IoctlRequest::HimaxOscEnable(a.flag()?),
        IoctlCode::GetRgbStats => IoctlRequest::GetRgbStats,
    };
    let request = a.finish(request)?;
    request.validate()?;
    Ok(request)
}

impl SensorSession {
    /// Send a vendor request to the bound driver
    ///
    /// Requests tagged with [`IOCTL_ABORT`] stop any capture in flight first.
    pub fn ioctl(&mut self, request: &IoctlRequest) -> Result<IoctlResponse, SensorError> {
        self.bound()?;
        request.validate()?;
        if request.code().aborts_capture() {
            debug!("{:?} reprograms readout, aborting capture", request.code());
            metrics::counter!("sensor_ioctl_aborts_total").increment(1);
            self.abort(true);
        }
        self.with_driver(|driver, ctx| driver.ioctl(ctx, request))
    }

    /// [`SensorSession::ioctl`] from a raw code and argument list
    pub fn ioctl_raw(&mut self, raw: u32, args: &[IoctlArg]) -> Result<IoctlResponse, SensorError> {
        let request = decode(raw, args)?;
        self.ioctl(&request)
    }
}
