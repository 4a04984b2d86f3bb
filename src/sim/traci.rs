//! TraCI wire protocol: message framing, typed values, and a blocking client.
//!
//! # Framing
//!
//! ```text
//! Message:
//!   Length: u32 (big-endian, includes these 4 bytes)
//!   Commands...
//!
//! Command:
//!   Length: u8 (includes length and id bytes)
//!     or 0u8 followed by u32 when the command exceeds 255 bytes
//!   Id: u8
//!   Payload
//! ```
//!
//! Every request is answered by a status command `(id, result, description)`,
//! optionally followed by a response command carrying the value.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

use super::{Phase, ProgramLogic, SimError};

pub const CMD_GETVERSION: u8 = 0x00;
pub const CMD_SIMSTEP: u8 = 0x02;
pub const CMD_CLOSE: u8 = 0x7f;

pub const CMD_GET_TL_VARIABLE: u8 = 0xa2;
pub const CMD_GET_VEHICLE_VARIABLE: u8 = 0xa4;
pub const CMD_GET_SIM_VARIABLE: u8 = 0xab;
pub const CMD_SET_TL_VARIABLE: u8 = 0xc2;

/// Response command id for a get command.
pub const fn response_id(get_command: u8) -> u8 {
    get_command + 0x10
}

pub const ID_LIST: u8 = 0x00;
pub const VAR_SPEED: u8 = 0x40;
pub const VAR_ARRIVED_VEHICLES_NUMBER: u8 = 0x79;
pub const VAR_MIN_EXPECTED_VEHICLES: u8 = 0x7d;
pub const TL_COMPLETE_DEFINITION_RYG: u8 = 0x2b;
pub const TL_COMPLETE_PROGRAM_RYG: u8 = 0x2c;

pub const TYPE_INTEGER: u8 = 0x09;
pub const TYPE_DOUBLE: u8 = 0x0b;
pub const TYPE_STRING: u8 = 0x0c;
pub const TYPE_STRINGLIST: u8 = 0x0e;
pub const TYPE_COMPOUND: u8 = 0x0f;

pub const RTYPE_OK: u8 = 0x00;
pub const RTYPE_NOTIMPLEMENTED: u8 = 0x01;
pub const RTYPE_ERR: u8 = 0xff;

/// Items in a serialized program logic compound.
const LOGIC_ITEMS: i32 = 5;
/// Items in a serialized phase compound.
const PHASE_ITEMS: i32 = 6;

// ============================================================================
// Encoding
// ============================================================================

/// Big-endian payload writer.
#[derive(Debug, Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn i32(&mut self, v: i32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn f64(&mut self, v: f64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn string(&mut self, s: &str) -> &mut Self {
        self.i32(s.len() as i32);
        self.buf.extend_from_slice(s.as_bytes());
        self
    }

    pub fn typed_int(&mut self, v: i32) -> &mut Self {
        self.u8(TYPE_INTEGER).i32(v)
    }

    pub fn typed_double(&mut self, v: f64) -> &mut Self {
        self.u8(TYPE_DOUBLE).f64(v)
    }

    pub fn typed_string(&mut self, s: &str) -> &mut Self {
        self.u8(TYPE_STRING).string(s)
    }

    pub fn typed_string_list(&mut self, items: &[&str]) -> &mut Self {
        self.u8(TYPE_STRINGLIST).i32(items.len() as i32);
        for item in items {
            self.string(item);
        }
        self
    }

    pub fn compound(&mut self, count: usize) -> &mut Self {
        self.u8(TYPE_COMPOUND).i32(count as i32)
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Frame one command, switching to the extended length form when needed.
pub fn frame_command(command: u8, payload: &[u8]) -> Vec<u8> {
    let short_len = 1 + 1 + payload.len();
    let mut out = Vec::with_capacity(short_len + 4);
    if short_len <= 255 {
        out.push(short_len as u8);
    } else {
        out.push(0);
        out.extend_from_slice(&((short_len + 4) as u32).to_be_bytes());
    }
    out.push(command);
    out.extend_from_slice(payload);
    out
}

/// Wrap framed commands into a message.
pub fn frame_message(commands: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(commands.len() + 4);
    out.extend_from_slice(&((commands.len() + 4) as u32).to_be_bytes());
    out.extend_from_slice(commands);
    out
}

/// Serialize a program for `TL_COMPLETE_PROGRAM_RYG`.
pub fn encode_logic(enc: &mut Encoder, logic: &ProgramLogic) {
    enc.compound(LOGIC_ITEMS as usize)
        .typed_string(&logic.program_id)
        .typed_int(logic.kind)
        .typed_int(logic.current_phase)
        .compound(logic.phases.len());

    for phase in &logic.phases {
        enc.compound(PHASE_ITEMS as usize)
            .typed_double(phase.duration)
            .typed_string(&phase.state)
            .typed_double(phase.min_dur)
            .typed_double(phase.max_dur)
            .compound(phase.next.len());
        for next in &phase.next {
            enc.typed_int(*next);
        }
        enc.typed_string(&phase.name);
    }

    enc.compound(logic.params.len());
    for (key, value) in &logic.params {
        enc.typed_string_list(&[key.as_str(), value.as_str()]);
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Big-endian payload reader.
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], SimError> {
        if self.remaining() < n {
            return Err(SimError::Protocol(format!(
                "needed {} bytes at offset {}, {} left",
                n,
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn u8(&mut self) -> Result<u8, SimError> {
        Ok(self.take(1)?[0])
    }

    pub fn i32(&mut self) -> Result<i32, SimError> {
        let bytes = self.take(4)?;
        Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn u32(&mut self) -> Result<u32, SimError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn f64(&mut self) -> Result<f64, SimError> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(f64::from_be_bytes(raw))
    }

    pub fn string(&mut self) -> Result<String, SimError> {
        let len = self.length()?;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| SimError::Protocol(format!("invalid UTF-8 string: {}", e)))
    }

    pub fn string_list(&mut self) -> Result<Vec<String>, SimError> {
        let count = self.length()?;
        (0..count).map(|_| self.string()).collect()
    }

    fn length(&mut self) -> Result<usize, SimError> {
        let len = self.i32()?;
        usize::try_from(len).map_err(|_| SimError::Protocol(format!("negative length {}", len)))
    }

    pub fn expect_type(&mut self, expected: u8) -> Result<(), SimError> {
        let found = self.u8()?;
        if found != expected {
            return Err(SimError::Protocol(format!(
                "expected type 0x{:02x}, found 0x{:02x}",
                expected, found
            )));
        }
        Ok(())
    }

    pub fn typed_int(&mut self) -> Result<i32, SimError> {
        self.expect_type(TYPE_INTEGER)?;
        self.i32()
    }

    pub fn typed_double(&mut self) -> Result<f64, SimError> {
        self.expect_type(TYPE_DOUBLE)?;
        self.f64()
    }

    pub fn typed_string(&mut self) -> Result<String, SimError> {
        self.expect_type(TYPE_STRING)?;
        self.string()
    }

    pub fn typed_string_list(&mut self) -> Result<Vec<String>, SimError> {
        self.expect_type(TYPE_STRINGLIST)?;
        self.string_list()
    }

    /// Read a compound header and return its item count.
    pub fn compound(&mut self) -> Result<usize, SimError> {
        self.expect_type(TYPE_COMPOUND)?;
        self.length()
    }

    /// Read a command header, returning `(command id, payload length)`.
    fn command_header(&mut self) -> Result<(u8, usize), SimError> {
        let short = self.u8()?;
        let (len, header) = if short == 0 {
            (self.u32()? as usize, 6)
        } else {
            (short as usize, 2)
        };
        let id = self.u8()?;
        let payload = len
            .checked_sub(header)
            .ok_or_else(|| SimError::Protocol(format!("command length {} too short", len)))?;
        Ok((id, payload))
    }
}

/// Parse the value of `TL_COMPLETE_DEFINITION_RYG`, type byte already consumed.
pub fn decode_logics(dec: &mut Decoder<'_>) -> Result<Vec<ProgramLogic>, SimError> {
    let count = dec.length()?;
    // Counts come off the wire; grow as items actually decode.
    let mut logics = Vec::new();

    for _ in 0..count {
        expect_items(dec, LOGIC_ITEMS)?;
        let program_id = dec.typed_string()?;
        let kind = dec.typed_int()?;
        let current_phase = dec.typed_int()?;

        let phase_count = dec.compound()?;
        let mut phases = Vec::new();
        for _ in 0..phase_count {
            expect_items(dec, PHASE_ITEMS)?;
            let duration = dec.typed_double()?;
            let state = dec.typed_string()?;
            let min_dur = dec.typed_double()?;
            let max_dur = dec.typed_double()?;
            let next_count = dec.compound()?;
            let next = (0..next_count)
                .map(|_| dec.typed_int())
                .collect::<Result<Vec<_>, _>>()?;
            let name = dec.typed_string()?;
            phases.push(Phase {
                duration,
                state,
                min_dur,
                max_dur,
                next,
                name,
            });
        }

        let param_count = dec.compound()?;
        let mut params = Vec::new();
        for _ in 0..param_count {
            let mut pair = dec.typed_string_list()?.into_iter();
            match (pair.next(), pair.next()) {
                (Some(key), Some(value)) => params.push((key, value)),
                _ => return Err(SimError::Protocol("parameter is not a pair".to_string())),
            }
        }

        logics.push(ProgramLogic {
            program_id,
            kind,
            current_phase,
            phases,
            params,
        });
    }

    Ok(logics)
}

fn expect_items(dec: &mut Decoder<'_>, expected: i32) -> Result<(), SimError> {
    let found = dec.compound()?;
    if found != expected as usize {
        return Err(SimError::Protocol(format!(
            "compound has {} items, expected {}",
            found, expected
        )));
    }
    Ok(())
}

// ============================================================================
// Client
// ============================================================================

/// Blocking TraCI client over one TCP connection.
pub struct TraciConnection {
    stream: TcpStream,
}

impl TraciConnection {
    /// Connect to a simulator listening on localhost, retrying while it starts.
    pub fn connect(port: u16, attempts: u32, delay: Duration) -> Result<Self, SimError> {
        for attempt in 1..=attempts {
            match TcpStream::connect(("127.0.0.1", port)) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    log::debug!("connected to TraCI port {} (attempt {})", port, attempt);
                    return Ok(Self { stream });
                }
                Err(e) => {
                    log::trace!("TraCI connect attempt {} failed: {}", attempt, e);
                    thread::sleep(delay);
                }
            }
        }
        Err(SimError::Connect { port, attempts })
    }

    fn send(&mut self, command: u8, payload: &[u8]) -> Result<(), SimError> {
        let message = frame_message(&frame_command(command, payload));
        log::trace!("TraCI send 0x{:02x} ({} bytes)", command, message.len());
        self.stream.write_all(&message)?;
        self.stream.flush()?;
        Ok(())
    }

    fn receive(&mut self) -> Result<Vec<u8>, SimError> {
        let mut header = [0u8; 4];
        self.stream.read_exact(&mut header)?;
        let total = u32::from_be_bytes(header) as usize;
        let body_len = total
            .checked_sub(4)
            .ok_or_else(|| SimError::Protocol(format!("message length {} too short", total)))?;
        let mut body = Vec::new();
        (&mut self.stream)
            .take(body_len as u64)
            .read_to_end(&mut body)?;
        if body.len() != body_len {
            return Err(SimError::Protocol(format!(
                "message truncated at {} of {} bytes",
                body.len(),
                body_len
            )));
        }
        Ok(body)
    }

    /// Send one command and return the bytes following its status.
    fn exchange(&mut self, command: u8, payload: &[u8]) -> Result<Vec<u8>, SimError> {
        self.send(command, payload)?;
        let body = self.receive()?;
        let mut dec = Decoder::new(&body);

        let (id, _) = dec.command_header()?;
        if id != command {
            return Err(SimError::Protocol(format!(
                "status for 0x{:02x}, expected 0x{:02x}",
                id, command
            )));
        }
        let result = dec.u8()?;
        let description = dec.string()?;
        if result != RTYPE_OK {
            let message = match result {
                RTYPE_NOTIMPLEMENTED => format!("not implemented: {}", description),
                RTYPE_ERR => description,
                other => format!("result 0x{:02x}: {}", other, description),
            };
            return Err(SimError::Command { command, message });
        }

        let consumed = body.len() - dec.remaining();
        Ok(body[consumed..].to_vec())
    }

    /// Query a variable and return the bytes of its typed value.
    fn get(&mut self, domain: u8, variable: u8, object_id: &str) -> Result<Vec<u8>, SimError> {
        let mut enc = Encoder::new();
        enc.u8(variable).string(object_id);
        let rest = self.exchange(domain, &enc.finish())?;

        let mut dec = Decoder::new(&rest);
        let (id, _) = dec.command_header()?;
        if id != response_id(domain) {
            return Err(SimError::Protocol(format!(
                "response 0x{:02x} to get 0x{:02x}",
                id, domain
            )));
        }
        let var = dec.u8()?;
        if var != variable {
            return Err(SimError::Protocol(format!(
                "variable 0x{:02x} in response, expected 0x{:02x}",
                var, variable
            )));
        }
        let _object = dec.string()?;
        let consumed = rest.len() - dec.remaining();
        Ok(rest[consumed..].to_vec())
    }

    /// API version and simulator identification.
    pub fn version(&mut self) -> Result<(i32, String), SimError> {
        let rest = self.exchange(CMD_GETVERSION, &[])?;
        let mut dec = Decoder::new(&rest);
        let (id, _) = dec.command_header()?;
        if id != CMD_GETVERSION {
            return Err(SimError::Protocol(format!("version response 0x{:02x}", id)));
        }
        let api = dec.i32()?;
        let name = dec.string()?;
        Ok((api, name))
    }

    /// Advance one step (target time 0 means "one step").
    pub fn simulation_step(&mut self) -> Result<(), SimError> {
        let mut enc = Encoder::new();
        enc.f64(0.0);
        // Trailing subscription results are not used.
        self.exchange(CMD_SIMSTEP, &enc.finish())?;
        Ok(())
    }

    pub fn get_int(&mut self, domain: u8, variable: u8, object_id: &str) -> Result<i32, SimError> {
        let value = self.get(domain, variable, object_id)?;
        Decoder::new(&value).typed_int()
    }

    pub fn get_double(
        &mut self,
        domain: u8,
        variable: u8,
        object_id: &str,
    ) -> Result<f64, SimError> {
        let value = self.get(domain, variable, object_id)?;
        Decoder::new(&value).typed_double()
    }

    pub fn get_string_list(
        &mut self,
        domain: u8,
        variable: u8,
        object_id: &str,
    ) -> Result<Vec<String>, SimError> {
        let value = self.get(domain, variable, object_id)?;
        Decoder::new(&value).typed_string_list()
    }

    pub fn get_logics(&mut self, tls_id: &str) -> Result<Vec<ProgramLogic>, SimError> {
        let value = self.get(CMD_GET_TL_VARIABLE, TL_COMPLETE_DEFINITION_RYG, tls_id)?;
        let mut dec = Decoder::new(&value);
        dec.expect_type(TYPE_COMPOUND)?;
        decode_logics(&mut dec)
    }

    pub fn set_logic(&mut self, tls_id: &str, logic: &ProgramLogic) -> Result<(), SimError> {
        let mut enc = Encoder::new();
        enc.u8(TL_COMPLETE_PROGRAM_RYG).string(tls_id);
        encode_logic(&mut enc, logic);
        self.exchange(CMD_SET_TL_VARIABLE, &enc.finish())?;
        Ok(())
    }

    /// Ask the simulator to shut down.
    pub fn close(&mut self) -> Result<(), SimError> {
        self.exchange(CMD_CLOSE, &[])?;
        Ok(())
    }
}
