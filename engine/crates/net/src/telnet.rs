const IAC: u8 = 255;
const WILL: u8 = 251;
const WONT: u8 = 252;
const DO: u8 = 253;
const DONT: u8 = 254;
const SB: u8 = 250;
const SE: u8 = 240;

pub const DEFAULT_MAX_LINE_LEN: usize = 4096;

/// Where the decoder is inside a Telnet command. Kept across `feed` calls so
/// a sequence split over two reads is still stripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IacState {
    Data,
    Command,
    Option,
    Subnegotiation,
    SubnegotiationIac,
}

/// Splits a raw byte stream into text lines.
///
/// Lines end at LF, CR is dropped, Telnet IAC sequences are removed and bytes
/// past `max_len` on a single line are discarded.
#[derive(Debug)]
pub struct LineBuffer {
    buf: Vec<u8>,
    max_len: usize,
    state: IacState,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::with_max_len(DEFAULT_MAX_LINE_LEN)
    }

    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_len: max_len.max(1),
            state: IacState::Data,
        }
    }

    /// Feed raw data into the buffer. Returns any complete lines.
    pub fn feed(&mut self, data: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in data {
            self.state = match (self.state, byte) {
                (IacState::Data, IAC) => IacState::Command,
                (IacState::Data, b'\n') => {
                    lines.push(self.take_line());
                    IacState::Data
                }
                (IacState::Data, b'\r') => IacState::Data,
                (IacState::Data, other) => {
                    self.push(other);
                    IacState::Data
                }
                (IacState::Command, WILL | WONT | DO | DONT) => IacState::Option,
                (IacState::Command, SB) => IacState::Subnegotiation,
                (IacState::Command, IAC) => {
                    // Escaped literal 255.
                    self.push(IAC);
                    IacState::Data
                }
                (IacState::Command, _) | (IacState::Option, _) => IacState::Data,
                (IacState::Subnegotiation, IAC) => IacState::SubnegotiationIac,
                (IacState::Subnegotiation, _) => IacState::Subnegotiation,
                (IacState::SubnegotiationIac, SE) => IacState::Data,
                (IacState::SubnegotiationIac, _) => IacState::Subnegotiation,
            };
        }
        lines
    }

    fn push(&mut self, byte: u8) {
        if self.buf.len() < self.max_len {
            self.buf.push(byte);
        }
    }

    fn take_line(&mut self) -> String {
        let bytes = std::mem::take(&mut self.buf);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Outbound text as Telnet expects it: CRLF line endings, always terminated.
pub fn to_wire(text: &str) -> String {
    let mut out = text.replace("\r\n", "\n").replace('\n', "\r\n");
    if !out.ends_with("\r\n") {
        out.push_str("\r\n");
    }
    out
}
