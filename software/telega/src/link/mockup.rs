//! Software-defined device for running a pipeline with no hardware in the loop.
//!
//! The mockup answers board commands with the confirmation frame, streams
//! generated data frames while measuring, reports the end of the initial
//! setting after a configurable number of frames, and emits `$GPGLL` sentences
//! when posing as the GPS module. Failure modes (rejected commands, failing
//! open, disconnecting mid-stream) are opt-in.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use telega_shared::gps::{hex_digits, xor};
use telega_shared::stm::{
    CommandCode, CommandFrame, ConfirmationFrame, FORMAT_COMMAND, INITIAL_SETTING_DONE, SYNC_1,
    SYNC_2, checksum, data_frame_len, encode_mod_code, write_data_frame,
};
use telega_shared::{ByteStruct, ByteStructLen};

use super::{Port, ReadOutcome};
use crate::device::DeviceKind;
use crate::error::{Error, Result};
use crate::pipeline::PipelineCtx;

/// What the emulated device is doing
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum MockupMode {
    #[default]
    Idle,
    Measuring,
    InitialSetting { remaining: usize },
    Sentences,
}

/// Where a queued byte came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// Reply to a command
    Reply,
    /// Telemetry stream
    Stream,
}

/// State shared between a mockup port and its handles.
#[derive(Debug, Default)]
struct MockupState {
    open: bool,
    open_count: usize,
    mode: MockupMode,
    queue: VecDeque<(u8, Origin)>,
    next_sample: Option<Instant>,
    sample: u64,
    written: Vec<u8>,
    commands: Vec<CommandCode>,
    served_stream: Vec<u8>,
}

fn default_state() -> Arc<Mutex<MockupState>> {
    Arc::new(Mutex::new(MockupState::default()))
}

/// Port backed by an emulated device.
///
/// JSON roundtrips reset the link to any existing [`MockupHandle`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockupPort {
    /// Which device to emulate
    pub device: DeviceKind,

    /// Time between generated frames or sentences
    pub sample_period: Duration,

    /// Number of channels in each generated data frame
    pub channels: usize,

    /// Data frames sent during the initial setting before reporting that it finished
    pub initial_setting_frames: usize,

    /// Answer every command with a negative acknowledgment
    pub reject_commands: bool,

    /// Refuse to open
    pub fail_open: bool,

    /// Fail reads after this many telemetry bytes have been served
    pub disconnect_after: Option<usize>,

    #[serde(skip)]
    read_timeout: Duration,

    #[serde(skip, default = "default_state")]
    state: Arc<Mutex<MockupState>>,
}

/// Cloneable view of a mockup's state for inspecting what passed over the link.
#[derive(Clone, Debug)]
pub struct MockupHandle {
    state: Arc<Mutex<MockupState>>,
}

fn lock(state: &Mutex<MockupState>) -> MutexGuard<'_, MockupState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockupHandle {
    /// Every byte the host wrote
    pub fn written(&self) -> Vec<u8> {
        lock(&self.state).written.clone()
    }

    /// Telemetry bytes the host has read, excluding command confirmations
    pub fn served_stream(&self) -> Vec<u8> {
        lock(&self.state).served_stream.clone()
    }

    /// Commands received with a valid frame, in order
    pub fn commands(&self) -> Vec<CommandCode> {
        lock(&self.state).commands.clone()
    }

    pub fn open_count(&self) -> usize {
        lock(&self.state).open_count
    }

    pub fn is_open(&self) -> bool {
        lock(&self.state).open
    }

    pub fn is_streaming(&self) -> bool {
        lock(&self.state).mode != MockupMode::Idle
    }
}

impl MockupPort {
    pub fn new(device: DeviceKind) -> (Self, MockupHandle) {
        let state = default_state();
        let port = Self {
            device,
            sample_period: Duration::from_millis(5),
            channels: 8,
            initial_setting_frames: 5,
            reject_commands: false,
            fail_open: false,
            disconnect_after: None,
            read_timeout: Duration::from_millis(100),
            state: state.clone(),
        };
        (port, MockupHandle { state })
    }

    pub fn rejecting_commands(mut self) -> Self {
        self.reject_commands = true;
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn disconnecting_after(mut self, bytes: usize) -> Self {
        self.disconnect_after = Some(bytes);
        self
    }

    pub fn with_sample_period(mut self, period: Duration) -> Self {
        self.sample_period = period;
        self
    }

    fn state(&self) -> MutexGuard<'_, MockupState> {
        lock(&self.state)
    }

    fn handle_command(&self, state: &mut MockupState, code: CommandCode) {
        if self.reject_commands {
            let mut nak = ConfirmationFrame::ack();
            nak.status = 0x5555;
            nak.checksum = checksum(&nak.to_bytes()[..5]);
            push(state, &nak.to_bytes(), Origin::Reply);
            return;
        }

        push(state, &ConfirmationFrame::ack().to_bytes(), Origin::Reply);
        state.commands.push(code);
        state.mode = match code {
            CommandCode::StartMeasuring => MockupMode::Measuring,
            CommandCode::StartInitialSetting => MockupMode::InitialSetting {
                remaining: self.initial_setting_frames,
            },
            _ => MockupMode::Idle,
        };
        state.next_sample = (state.mode != MockupMode::Idle).then(Instant::now);
    }

    /// Queue the next frame or sentence.
    fn generate(&self, state: &mut MockupState) {
        let n = state.sample;
        state.sample += 1;
        match state.mode {
            MockupMode::Idle => {}
            MockupMode::Measuring => {
                let frame = self.data_frame(n);
                push(state, &frame, Origin::Stream);
            }
            MockupMode::InitialSetting { remaining: 0 } => {
                let mut echo = vec![SYNC_1, SYNC_2, FORMAT_COMMAND];
                echo.extend_from_slice(&INITIAL_SETTING_DONE);
                echo.push(checksum(&echo));
                push(state, &echo, Origin::Stream);
                state.mode = MockupMode::Idle;
            }
            MockupMode::InitialSetting { remaining } => {
                let frame = self.data_frame(n);
                push(state, &frame, Origin::Stream);
                state.mode = MockupMode::InitialSetting {
                    remaining: remaining - 1,
                };
            }
            MockupMode::Sentences => {
                // The module interleaves other sentence types with position fixes
                if n % 4 == 3 {
                    let gsv = sentence("GPGSV,1,1,02,01,40,083,46,02,17,308,41");
                    push(state, gsv.as_bytes(), Origin::Stream);
                }
                push(state, position_sentence(n).as_bytes(), Origin::Stream);
            }
        }
        state.next_sample =
            (state.mode != MockupMode::Idle).then(|| Instant::now() + self.sample_period);
    }

    /// A data frame with a time counter, slowly varying motion channels
    /// and a temperature near 25 degrees.
    fn data_frame(&self, n: u64) -> Vec<u8> {
        let channels = self.channels.clamp(1, 127);
        let mut body = Vec::with_capacity(2 * channels);
        for i in 0..channels {
            let raw = if i == 0 {
                ((n * 4) % 32_768) as i32
            } else if i == channels - 1 {
                2500 + (n % 100) as i32
            } else {
                ((n * 37 * i as u64) % 2001) as i32 - 1000
            };
            let (low, high) = encode_mod_code(raw);
            body.extend_from_slice(&[low, high]);
        }
        let mut frame = vec![0_u8; data_frame_len(body.len())];
        let _ = write_data_frame(&body, &mut frame);
        frame
    }
}

fn push(state: &mut MockupState, bytes: &[u8], origin: Origin) {
    state.queue.extend(bytes.iter().map(|b| (*b, origin)));
}

/// Wrap the text between `$` and `*` into a full sentence.
fn sentence(body: &str) -> String {
    let [hi, lo] = hex_digits(xor(body.as_bytes()));
    format!("${body}*{}{}\r\n", hi as char, lo as char)
}

fn position_sentence(n: u64) -> String {
    let lat = 5548.0 + (n % 1000) as f64 * 1e-4;
    let lon = 3732.0 + (n % 1000) as f64 * 2e-4;
    let (h, m, s) = ((n / 3600) % 24, (n / 60) % 60, n % 60);
    sentence(&format!(
        "GPGLL,{lat:.4},N,{lon:010.4},E,{h:02}{m:02}{s:02}.00,A,A"
    ))
}

#[typetag::serde]
impl Port for MockupPort {
    fn name(&self) -> String {
        format!("mockup-{}", self.device.tag().to_lowercase())
    }

    fn is_open(&self) -> bool {
        self.state().open
    }

    fn open(&mut self, ctx: &PipelineCtx) -> Result<()> {
        self.read_timeout = ctx.read_timeout;
        let mut state = self.state();
        state.open_count += 1;
        if self.fail_open {
            return Err(Error::PortOpen {
                port: self.name(),
                reason: "no such device".to_owned(),
            });
        }
        state.open = true;
        if self.device == DeviceKind::Gps {
            state.mode = MockupMode::Sentences;
            state.next_sample = Some(Instant::now());
        }
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.state();
        state.open = false;
        state.queue.clear();
    }

    fn clear_input(&mut self) -> Result<()> {
        self.state().queue.clear();
        Ok(())
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let mut state = self.state();
        if !state.open {
            return Err(Error::PortNotOpen(self.name()));
        }
        state.written.extend_from_slice(bytes);

        // The GPS module has no command set
        if self.device == DeviceKind::Stm {
            for chunk in bytes.chunks_exact(CommandFrame::BYTE_LEN) {
                let frame = CommandFrame::read_bytes(chunk);
                if frame.is_valid() {
                    self.handle_command(&mut state, frame.code);
                }
            }
        }
        Ok(())
    }

    fn read_byte(&mut self) -> Result<ReadOutcome> {
        let deadline = Instant::now() + self.read_timeout;
        loop {
            let mut state = self.state();
            if !state.open {
                return Err(Error::PortNotOpen(self.name()));
            }
            if self
                .disconnect_after
                .is_some_and(|limit| state.served_stream.len() >= limit)
            {
                state.open = false;
                return Err(Error::Disconnected(self.name()));
            }

            if let Some((b, origin)) = state.queue.pop_front() {
                if origin == Origin::Stream {
                    state.served_stream.push(b);
                }
                return Ok(ReadOutcome::Byte(b));
            }

            let now = Instant::now();
            if state.next_sample.is_some_and(|t| now >= t) {
                self.generate(&mut state);
                continue;
            }
            if now >= deadline {
                return Ok(ReadOutcome::Timeout);
            }

            let wake = state.next_sample.map_or(deadline, |t| t.min(deadline));
            drop(state);
            thread::sleep(wake.saturating_duration_since(now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{Decoded, decode_bytes};

    fn ctx(device: DeviceKind) -> PipelineCtx {
        let mut ctx = PipelineCtx::new(device);
        ctx.read_timeout = Duration::from_millis(20);
        ctx
    }

    fn read_n(port: &mut MockupPort, n: usize) -> Vec<u8> {
        let mut out = Vec::new();
        while out.len() < n {
            if let ReadOutcome::Byte(b) = port.read_byte().unwrap() {
                out.push(b);
            }
        }
        out
    }

    #[test]
    fn idle_board_times_out() {
        let (mut port, _handle) = MockupPort::new(DeviceKind::Stm);
        port.open(&ctx(DeviceKind::Stm)).unwrap();
        assert_eq!(port.read_byte().unwrap(), ReadOutcome::Timeout);
    }

    #[test]
    fn measuring_streams_valid_frames() {
        let (mut port, handle) = MockupPort::new(DeviceKind::Stm);
        port.open(&ctx(DeviceKind::Stm)).unwrap();
        port.write_all(&CommandFrame::new(CommandCode::StartMeasuring).to_bytes())
            .unwrap();

        let ack = read_n(&mut port, 8);
        assert!(ConfirmationFrame::is_ack(&ack));

        let frame_len = data_frame_len(16);
        let stream = read_n(&mut port, 3 * frame_len);
        assert_eq!(handle.served_stream(), stream);

        let replay = decode_bytes(DeviceKind::Stm, &stream);
        assert_eq!(replay.decoded.len(), 3);
        assert!(replay.messages.is_empty());
        assert_eq!(handle.commands(), vec![CommandCode::StartMeasuring]);
    }

    #[test]
    fn gps_streams_position_sentences() {
        let (mut port, _handle) = MockupPort::new(DeviceKind::Gps);
        port.open(&ctx(DeviceKind::Gps)).unwrap();
        let bytes = read_n(&mut port, 600);
        let replay = decode_bytes(DeviceKind::Gps, &bytes);
        assert!(replay.messages.is_empty());
        assert!(replay.decoded.len() >= 5);
        for d in &replay.decoded {
            let Decoded::Sentence(s) = d else {
                panic!("expected a sentence, got {d:?}");
            };
            let pos = s.position().unwrap();
            assert!((55.0..56.0).contains(&pos.latitude));
        }
    }

    #[test]
    fn disconnects_after_limit() {
        let (port, _handle) = MockupPort::new(DeviceKind::Gps);
        let mut port = port.disconnecting_after(10);
        port.open(&ctx(DeviceKind::Gps)).unwrap();
        read_n(&mut port, 10);
        assert!(matches!(port.read_byte(), Err(Error::Disconnected(_))));
        assert!(!port.is_open());
    }

    #[test]
    fn serde_roundtrip() {
        let (port, _handle) = MockupPort::new(DeviceKind::Gps);
        let port: Box<dyn Port> = Box::new(port.with_sample_period(Duration::from_millis(50)));
        let json = serde_json::to_string(&port).unwrap();
        let back: Box<dyn Port> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name(), "mockup-gps");
        assert!(!back.is_open());
    }
}
