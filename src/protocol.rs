use thiserror::Error;
use tracing::instrument;

/// Length of every TESmart control frame.
pub(crate) const FRAME_LEN: usize = 6;

const FRAME_HEADER: [u8; 3] = [0xAA, 0xBB, 0x03];
const FRAME_TRAILER: u8 = 0xEE;

const OPCODE_SELECT_INPUT: u8 = 0x01;
const OPCODE_BUZZER: u8 = 0x02;
const OPCODE_LED_TIMEOUT: u8 = 0x03;
const OPCODE_QUERY_ACTIVE_INPUT: u8 = 0x10;
const OPCODE_ACTIVE_INPUT_REPLY: u8 = 0x11;
const OPCODE_AUTO_INPUT_DETECTION: u8 = 0x81;

/// Errors returned while decoding TESmart frames.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum FrameCodecError {
    #[error("frame must be {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("frame header `{header:02X?}` is not `AA BB 03`")]
    InvalidHeader { header: [u8; 3] },
    #[error("frame trailer {trailer:#04X} is not 0xEE")]
    InvalidTrailer { trailer: u8 },
    #[error("active input reply {operand:#04X} is out of range")]
    InputOutOfRange { operand: u8 },
}

/// LED timeout values accepted by the device.
#[derive(Debug, Clone, Copy, Eq, PartialEq, derive_more::Display)]
pub enum LedTimeout {
    /// The front-panel LEDs stay lit.
    #[display("never")]
    Never,
    #[display("10s")]
    TenSeconds,
    #[display("30s")]
    ThirtySeconds,
}

impl LedTimeout {
    /// Maps a timeout in seconds onto a supported device setting.
    ///
    /// ```
    /// use tesmart::LedTimeout;
    ///
    /// assert_eq!(Some(LedTimeout::ThirtySeconds), LedTimeout::from_seconds(30));
    /// assert_eq!(None, LedTimeout::from_seconds(20));
    /// ```
    #[must_use]
    pub fn from_seconds(seconds: u32) -> Option<Self> {
        match seconds {
            0 => Some(Self::Never),
            10 => Some(Self::TenSeconds),
            30 => Some(Self::ThirtySeconds),
            _ => None,
        }
    }

    /// Returns the timeout in seconds, where `0` means the LEDs never time out.
    #[must_use]
    pub fn seconds(self) -> u32 {
        match self {
            Self::Never => 0,
            Self::TenSeconds => 10,
            Self::ThirtySeconds => 30,
        }
    }

    fn as_operand(self) -> u8 {
        match self {
            Self::Never => 0x00,
            Self::TenSeconds => 0x0A,
            Self::ThirtySeconds => 0x1E,
        }
    }
}

/// Commands understood by the switch.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum SwitchCommand {
    /// Route the given 1-based input to the output.
    SelectInput(u8),
    SetBuzzerMuted(bool),
    SetLedTimeout(LedTimeout),
    QueryActiveInput,
    SetAutoInputDetection(bool),
}

impl SwitchCommand {
    fn opcode(self) -> u8 {
        match self {
            Self::SelectInput(_) => OPCODE_SELECT_INPUT,
            Self::SetBuzzerMuted(_) => OPCODE_BUZZER,
            Self::SetLedTimeout(_) => OPCODE_LED_TIMEOUT,
            Self::QueryActiveInput => OPCODE_QUERY_ACTIVE_INPUT,
            Self::SetAutoInputDetection(_) => OPCODE_AUTO_INPUT_DETECTION,
        }
    }

    fn operand(self) -> u8 {
        match self {
            Self::SelectInput(input) => input,
            Self::SetBuzzerMuted(true) => 0x00,
            Self::SetBuzzerMuted(false) => 0x01,
            Self::SetLedTimeout(timeout) => timeout.as_operand(),
            Self::QueryActiveInput => 0x00,
            Self::SetAutoInputDetection(enabled) => u8::from(enabled),
        }
    }

    /// Encodes the command as one wire frame.
    pub(crate) fn encode(self) -> [u8; FRAME_LEN] {
        let [h0, h1, h2] = FRAME_HEADER;
        [h0, h1, h2, self.opcode(), self.operand(), FRAME_TRAILER]
    }
}

/// Frames sent by the switch.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum SwitchReply {
    /// The currently routed input, 1-based.
    ActiveInput(u8),
    /// A well-formed frame this client does not interpret.
    Other { opcode: u8, operand: u8 },
}

/// Decodes one frame received from the switch.
#[instrument(level = "trace", skip(frame), fields(frame = %crate::utils::format_hex(frame)))]
pub(crate) fn decode_reply(frame: &[u8]) -> Result<SwitchReply, FrameCodecError> {
    let &[h0, h1, h2, opcode, operand, trailer] = frame else {
        return Err(FrameCodecError::InvalidLength {
            expected: FRAME_LEN,
            actual: frame.len(),
        });
    };
    if [h0, h1, h2] != FRAME_HEADER {
        return Err(FrameCodecError::InvalidHeader {
            header: [h0, h1, h2],
        });
    }
    if trailer != FRAME_TRAILER {
        return Err(FrameCodecError::InvalidTrailer { trailer });
    }

    if opcode == OPCODE_ACTIVE_INPUT_REPLY {
        let input = operand
            .checked_add(1)
            .ok_or(FrameCodecError::InputOutOfRange { operand })?;
        return Ok(SwitchReply::ActiveInput(input));
    }

    Ok(SwitchReply::Other { opcode, operand })
}

/// Encodes the reply a switch sends for its active input. Used by fake devices.
pub(crate) fn encode_active_input_reply(input: u8) -> [u8; FRAME_LEN] {
    let [h0, h1, h2] = FRAME_HEADER;
    [
        h0,
        h1,
        h2,
        OPCODE_ACTIVE_INPUT_REPLY,
        input.saturating_sub(1),
        FRAME_TRAILER,
    ]
}
