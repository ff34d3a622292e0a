//! Control-plane message format and command codes.
//!
//! A request is a command word followed by zero or more payload words. A
//! reply is a status word followed by payload words: the status echoes the
//! command on success or carries an [`ErrorCode`] sentinel (top bit set).
//! All words are big-endian `u32`.

use crate::{Error, Result};

/// Words per column block of a pixel configuration upload.
pub const PIXEL_CONFIG_BLOCK: usize = 48;

/// Commands understood by the gateway.
///
/// Codes below `0x100` are forwarded to the detector control link; the rest
/// are served by the gateway's own workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Command {
    Nop = 0x0000,
    GetSoftwareVersion = 0x0001,
    GetFirmwareVersion = 0x0002,
    GetCameraId = 0x0003,
    GetDeviceIds = 0x0004,
    GetLocalTemp = 0x0005,
    GetRemoteTemp = 0x0006,
    GetFpgaTemp = 0x0007,
    GetFanSpeed = 0x0008,
    GetPressure = 0x0009,
    GetHumidity = 0x000A,
    GetSpidrAdc = 0x000B,

    SetBiasVoltage = 0x0010,
    SetBiasSupplyEnabled = 0x0011,
    RestartTimers = 0x0012,
    ResetTimers = 0x0013,
    ResetPixels = 0x0014,
    SetToaDecodersEnabled = 0x0015,

    GetDevicePort = 0x0018,
    GetServerPort = 0x0019,
    SetServerPort = 0x001A,

    GetDac = 0x0020,
    SetDac = 0x0021,
    SetSenseDac = 0x0022,

    GetSpidrRegister = 0x0024,
    SetSpidrRegister = 0x0025,
    GetPllConfig = 0x0026,
    SetPllConfig = 0x0027,
    GetHeaderFilter = 0x0028,
    SetHeaderFilter = 0x0029,
    GetGenConfig = 0x002A,
    SetGenConfig = 0x002B,
    GetPeriodPhase = 0x002C,
    SetPeriodPhase = 0x002D,

    StartReadout = 0x0030,
    StopReadout = 0x0031,
    AutotrigStart = 0x0032,
    AutotrigStop = 0x0033,
    GetTriggerConf = 0x0034,
    SetTriggerConf = 0x0035,
    GetReadoutSpeed = 0x0036,

    GetPixelConfig = 0x0038,
    SetPixelConfig = 0x0039,
    ResetModule = 0x003A,

    SetUdpPort = 0x0100,
    SetRawTpx3Path = 0x0101,
    GetRawDataServerPath = 0x0102,
    GetClusterServerPath = 0x0110,
    SetClusterInputServer = 0x0111,
    SetClusterParameters = 0x0112,
    FlushClusters = 0x0113,
    SetClusterSavePath = 0x0114,
    GetHistogramServerPath = 0x0120,
    SetHistogramInputServer = 0x0121,
    SetHistogramOutputPeriod = 0x0122,
}

impl Command {
    const ALL: [Command; 55] = [
        Command::Nop,
        Command::GetSoftwareVersion,
        Command::GetFirmwareVersion,
        Command::GetCameraId,
        Command::GetDeviceIds,
        Command::GetLocalTemp,
        Command::GetRemoteTemp,
        Command::GetFpgaTemp,
        Command::GetFanSpeed,
        Command::GetPressure,
        Command::GetHumidity,
        Command::GetSpidrAdc,
        Command::SetBiasVoltage,
        Command::SetBiasSupplyEnabled,
        Command::RestartTimers,
        Command::ResetTimers,
        Command::ResetPixels,
        Command::SetToaDecodersEnabled,
        Command::GetDevicePort,
        Command::GetServerPort,
        Command::SetServerPort,
        Command::GetDac,
        Command::SetDac,
        Command::SetSenseDac,
        Command::GetSpidrRegister,
        Command::SetSpidrRegister,
        Command::GetPllConfig,
        Command::SetPllConfig,
        Command::GetHeaderFilter,
        Command::SetHeaderFilter,
        Command::GetGenConfig,
        Command::SetGenConfig,
        Command::GetPeriodPhase,
        Command::SetPeriodPhase,
        Command::StartReadout,
        Command::StopReadout,
        Command::AutotrigStart,
        Command::AutotrigStop,
        Command::GetTriggerConf,
        Command::SetTriggerConf,
        Command::GetReadoutSpeed,
        Command::GetPixelConfig,
        Command::SetPixelConfig,
        Command::ResetModule,
        Command::SetUdpPort,
        Command::SetRawTpx3Path,
        Command::GetRawDataServerPath,
        Command::GetClusterServerPath,
        Command::SetClusterInputServer,
        Command::SetClusterParameters,
        Command::FlushClusters,
        Command::SetClusterSavePath,
        Command::GetHistogramServerPath,
        Command::SetHistogramInputServer,
        Command::SetHistogramOutputPeriod,
    ];

    /// Looks up a wire code.
    #[must_use]
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.code() == code)
    }

    /// Wire code.
    #[must_use]
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Whether the command is relayed to the detector control link.
    #[must_use]
    pub fn is_hardware(self) -> bool {
        self.code() < 0x100
    }

    /// Exact number of payload words required, where fixed.
    #[must_use]
    pub fn payload_words(self) -> Option<usize> {
        match self {
            Command::GetSpidrAdc
            | Command::SetBiasVoltage
            | Command::SetBiasSupplyEnabled
            | Command::SetToaDecodersEnabled
            | Command::SetServerPort
            | Command::GetDac
            | Command::SetDac
            | Command::SetSenseDac
            | Command::GetSpidrRegister
            | Command::SetPllConfig
            | Command::SetHeaderFilter
            | Command::SetGenConfig
            | Command::SetPeriodPhase
            | Command::GetPixelConfig
            | Command::ResetModule
            | Command::SetUdpPort
            | Command::SetHistogramOutputPeriod => Some(1),
            Command::SetSpidrRegister => Some(2),
            Command::SetClusterParameters => Some(3),
            Command::SetTriggerConf => Some(5),
            Command::SetPixelConfig
            | Command::SetRawTpx3Path
            | Command::SetClusterInputServer
            | Command::SetClusterSavePath => None,
            _ => Some(0),
        }
    }

    /// Whether a payload of `len` words has an acceptable shape.
    ///
    /// Pixel configuration is one column selector followed by whole
    /// 48-word column blocks.
    #[must_use]
    pub fn accepts_payload(self, len: usize) -> bool {
        match (self, self.payload_words()) {
            (Command::SetPixelConfig, _) => len >= 1 && (len - 1) % PIXEL_CONFIG_BLOCK == 0,
            (_, Some(words)) => len == words,
            (_, None) => true,
        }
    }
}

/// Error sentinels carried in the reply status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorCode {
    ErrorOccurred = 0x8000_0000,
    UnknownCommand = 0x8000_0001,
    InvalidCommandData = 0x8000_0002,
    WorkerNotStarted = 0x8000_0003,
    WorkerNotConnected = 0x8000_0004,
    CantOpenFile = 0x8000_0005,
}

impl ErrorCode {
    /// Looks up a status word.
    #[must_use]
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0x8000_0000 => Some(Self::ErrorOccurred),
            0x8000_0001 => Some(Self::UnknownCommand),
            0x8000_0002 => Some(Self::InvalidCommandData),
            0x8000_0003 => Some(Self::WorkerNotStarted),
            0x8000_0004 => Some(Self::WorkerNotConnected),
            0x8000_0005 => Some(Self::CantOpenFile),
            _ => None,
        }
    }

    /// Wire code.
    #[must_use]
    pub fn code(self) -> u32 {
        self as u32
    }
}

fn words_to_bytes(first: u32, rest: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 * (1 + rest.len()));
    out.extend_from_slice(&first.to_be_bytes());
    for w in rest {
        out.extend_from_slice(&w.to_be_bytes());
    }
    out
}

fn bytes_to_words(bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.len() < 4 || bytes.len() % 4 != 0 {
        return Err(Error::MalformedMessage(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// A control request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub command: u32,
    pub payload: Vec<u32>,
}

impl Request {
    /// A request with no payload.
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self {
            command: command.code(),
            payload: Vec::new(),
        }
    }

    /// A request carrying payload words.
    #[must_use]
    pub fn with_payload(command: Command, payload: Vec<u32>) -> Self {
        Self {
            command: command.code(),
            payload,
        }
    }

    /// A request carrying a packed string.
    #[must_use]
    pub fn with_string(command: Command, value: &str) -> Self {
        Self::with_payload(command, pack_string(value))
    }

    /// The known command, if any.
    #[must_use]
    pub fn kind(&self) -> Option<Command> {
        Command::from_code(self.command)
    }

    /// Wire form.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        words_to_bytes(self.command, &self.payload)
    }

    /// Parses the wire form.
    ///
    /// # Errors
    /// Returns [`Error::MalformedMessage`] when the size is under one word or
    /// not a multiple of four.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut words = bytes_to_words(bytes)?;
        let command = words.remove(0);
        Ok(Self {
            command,
            payload: words,
        })
    }
}

/// A control reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u32,
    pub payload: Vec<u32>,
}

impl Reply {
    /// Success reply echoing the request's command.
    #[must_use]
    pub fn ok(request: &Request) -> Self {
        Self {
            code: request.command,
            payload: Vec::new(),
        }
    }

    /// Success reply with payload words.
    #[must_use]
    pub fn ok_with(request: &Request, payload: Vec<u32>) -> Self {
        Self {
            code: request.command,
            payload,
        }
    }

    /// Success reply repeating the request payload, as setters answer.
    #[must_use]
    pub fn echo(request: &Request) -> Self {
        Self::ok_with(request, request.payload.clone())
    }

    /// Success reply carrying a packed string.
    #[must_use]
    pub fn ok_string(request: &Request, value: &str) -> Self {
        Self::ok_with(request, pack_string(value))
    }

    /// Error reply with an empty payload.
    #[must_use]
    pub fn error(code: ErrorCode) -> Self {
        Self {
            code: code.code(),
            payload: Vec::new(),
        }
    }

    /// The error sentinel, if the status word carries one.
    #[must_use]
    pub fn error_code(&self) -> Option<ErrorCode> {
        ErrorCode::from_code(self.code)
    }

    /// Whether the status word has the error bit set.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.code & 0x8000_0000 != 0
    }

    /// Payload decoded as a packed string.
    #[must_use]
    pub fn payload_string(&self) -> String {
        unpack_string(&self.payload)
    }

    /// Wire form.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        words_to_bytes(self.code, &self.payload)
    }

    /// Parses the wire form.
    ///
    /// # Errors
    /// Returns [`Error::MalformedMessage`] on a bad size.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut words = bytes_to_words(bytes)?;
        let code = words.remove(0);
        Ok(Self {
            code,
            payload: words,
        })
    }
}

/// Parses a raw request, runs `handler` and encodes its reply.
///
/// Malformed input never reaches the handler; it is answered with
/// [`ErrorCode::InvalidCommandData`].
pub fn respond<F>(raw: &[u8], handler: F) -> Vec<u8>
where
    F: FnOnce(&Request) -> Reply,
{
    match Request::decode(raw) {
        Ok(request) => handler(&request).encode(),
        Err(_) => Reply::error(ErrorCode::InvalidCommandData).encode(),
    }
}

/// Packs a string four bytes per word, first byte most significant.
///
/// The result always ends with at least one NUL byte.
#[must_use]
pub fn pack_string(value: &str) -> Vec<u32> {
    let mut bytes = value.as_bytes().to_vec();
    bytes.push(0);
    while bytes.len() % 4 != 0 {
        bytes.push(0);
    }
    bytes
        .chunks_exact(4)
        .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Reverses [`pack_string`], stopping at the first NUL.
#[must_use]
pub fn unpack_string(words: &[u32]) -> String {
    let bytes: Vec<u8> = words
        .iter()
        .flat_map(|w| w.to_be_bytes())
        .take_while(|&b| b != 0)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}
