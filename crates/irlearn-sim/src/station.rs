//! Control loop
//!
//! A [`Station`] is the whole device: one slot store, one learner, one
//! transmitter and one receiver, all owned here and driven from a single
//! thread. Commands come in through [`Station::execute`]; between commands
//! the caller keeps calling [`Station::tick`] so the learner sees decoder
//! events and its timeout.
//!
//! Replies are plain text for a human at a console. Diagnostics go through
//! `tracing`, not the reply writer.

use std::io::{self, Write};

use thiserror::Error;
use tracing::{debug, info, trace};

use irlearn_core::{
    CapturedSignal, Clock, ConsensusLearner, IrConfig, IrDecoder, IrError, IrResult, LearnEvent,
    LearnOutcome, LearnerState, NvStorage, Protocol, SendPath, SignalId, SignalRecord, SlotStore,
    TransmitController, VerifyReport,
};

use crate::command::{Command, HELP};
use crate::sim::{pulse_distance_timing, LoopbackAir, SimDecoder, SimEmitter, SimPulseGenerator};

/// Spacing of the frames injected by `press`
pub const PRESS_SPACING_MS: u64 = 250;

/// Upper bound on decoder events handled in one tick
const MAX_FRAMES_PER_TICK: usize = 16;

const RAW_PER_LINE: usize = 10;

#[derive(Debug, Error)]
enum StationError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Ir(#[from] IrError),
}

type Transmitter<C> = TransmitController<SimPulseGenerator, SimEmitter, C>;

/// Device state over simulated peripherals
pub struct Station<S: NvStorage, C: Clock + Clone> {
    clock: C,
    air: LoopbackAir,
    store: SlotStore<S, C>,
    learner: ConsensusLearner,
    transmitter: Transmitter<C>,
    decoder: SimDecoder<C>,
    test_count: u32,
}

fn path_name(path: SendPath) -> &'static str {
    match path {
        SendPath::Protocol => "protocol encoder",
        SendPath::PulseGenerator => "pulse generator",
        SendPath::BitBanged => "bit-banged raw",
    }
}

fn seconds(ms: u64) -> f64 {
    ms as f64 / 1000.0
}

impl<S: NvStorage, C: Clock + Clone> Station<S, C> {
    /// Open the store on `storage` and wire the simulated peripherals to one
    /// loopback medium
    pub fn new(storage: S, clock: C, config: &IrConfig) -> IrResult<Self> {
        let air = LoopbackAir::new();
        let store = SlotStore::open(storage, clock.clone())?;
        let transmitter = TransmitController::with_config(
            SimPulseGenerator::new(air.clone()),
            SimEmitter::new(air.clone()),
            clock.clone(),
            config.transmit.clone(),
            config.verify.clone(),
        );
        info!(
            signals = store.signal_count(),
            hardware = transmitter.hardware_enabled(),
            "Station ready"
        );
        Ok(Self {
            decoder: SimDecoder::new(air.clone(), clock.clone()),
            learner: ConsensusLearner::new(config.learning.clone()),
            test_count: config.verify.test_count,
            clock,
            air,
            store,
            transmitter,
        })
    }

    pub fn store(&self) -> &SlotStore<S, C> {
        &self.store
    }

    pub fn learner(&self) -> &ConsensusLearner {
        &self.learner
    }

    pub fn transmitter(&self) -> &Transmitter<C> {
        &self.transmitter
    }

    pub fn transmitter_mut(&mut self) -> &mut Transmitter<C> {
        &mut self.transmitter
    }

    pub fn decoder_mut(&mut self) -> &mut SimDecoder<C> {
        &mut self.decoder
    }

    pub fn air(&self) -> &LoopbackAir {
        &self.air
    }

    /// Parse and run one line. Parse errors are replies, not failures.
    pub fn execute_line<W: Write>(&mut self, line: &str, out: &mut W) -> io::Result<()> {
        if line.trim().is_empty() {
            return Ok(());
        }
        match Command::parse(line) {
            Ok(command) => self.execute(&command, out),
            Err(e) => writeln!(out, "{}", e),
        }
    }

    /// Run one command. Only writer failures are returned; device errors
    /// are reported on `out`.
    pub fn execute<W: Write>(&mut self, command: &Command, out: &mut W) -> io::Result<()> {
        debug!(command = %command, "Executing command");
        match self.dispatch(command, out) {
            Ok(()) => Ok(()),
            Err(StationError::Io(e)) => Err(e),
            Err(StationError::Ir(e)) => writeln!(out, "Error: {}", e),
        }
    }

    /// Check the learning timeout, then deliver pending decoder events to
    /// the learner
    pub fn tick<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        let now = self.clock.now_millis();
        if let Some(outcome) = self.learner.poll(now, &mut self.store) {
            writeln!(out, "Learning timed out")?;
            Self::report_outcome(&outcome, out)?;
        }

        let mut handled = 0;
        while handled < MAX_FRAMES_PER_TICK && self.decoder.is_available() {
            handled += 1;
            let Some(capture) = self.decoder.decode() else {
                continue;
            };
            if !self.learner.is_collecting() {
                trace!(protocol = %capture.protocol, "Capture ignored while idle");
                continue;
            }
            match self.learner.offer(&capture, now, &mut self.store) {
                LearnEvent::Accepted { collected } => writeln!(
                    out,
                    "Sample {}/{}: {} 0x{:08X} ({} bits)",
                    collected,
                    self.learner.config().max_samples,
                    capture.protocol,
                    capture.value,
                    capture.bits
                )?,
                LearnEvent::Ignored(reason) => {
                    trace!(?reason, "Capture not counted");
                }
                LearnEvent::Finished(outcome) => Self::report_outcome(&outcome, out)?,
            }
        }
        Ok(())
    }

    fn report_outcome<W: Write>(outcome: &LearnOutcome, out: &mut W) -> io::Result<()> {
        match outcome {
            LearnOutcome::Stored { id, consensus } => writeln!(
                out,
                "Learned signal {}: {} 0x{:08X} ({} bits), reliability {:.0}% ({}/{})",
                id,
                consensus.protocol,
                consensus.value,
                consensus.bits,
                consensus.reliability,
                consensus.count,
                consensus.total
            ),
            LearnOutcome::NotStored { consensus, error } => writeln!(
                out,
                "Learned {} 0x{:08X} but could not store it: {}",
                consensus.protocol, consensus.value, error
            ),
            LearnOutcome::Aborted { error } => writeln!(out, "Learning failed: {}", error),
        }
    }

    fn record(&self, id: SignalId) -> IrResult<SignalRecord> {
        self.store
            .get_signal(id)
            .cloned()
            .ok_or(IrError::NotFound(id))
    }

    fn dispatch<W: Write>(&mut self, command: &Command, out: &mut W) -> Result<(), StationError> {
        match command {
            Command::Help => writeln!(out, "{}", HELP)?,
            Command::Learn => {
                self.learner.start(self.clock.now_millis());
                let cfg = self.learner.config();
                writeln!(
                    out,
                    "Learning: press the remote button up to {} times (at least {}), timeout {:.0} s",
                    cfg.max_samples,
                    cfg.min_samples,
                    seconds(cfg.timeout_ms)
                )?;
            }
            Command::Stop => match self.learner.stop(&mut self.store) {
                Some(outcome) => Self::report_outcome(&outcome, out)?,
                None => writeln!(out, "Not learning")?,
            },
            Command::Status => self.status(out)?,
            Command::List => self.list(out)?,
            Command::Clear => {
                self.store.clear_all()?;
                writeln!(out, "All signals cleared")?;
            }
            Command::Send(id) => {
                let record = self.record(*id)?;
                let report = self.transmitter.send(&record)?;
                writeln!(
                    out,
                    "Sent signal {} via {} ({} attempt(s), {} kHz)",
                    id,
                    path_name(report.path),
                    report.attempts,
                    report.carrier_khz
                )?;
            }
            Command::Repeat { id, times } => {
                let record = self.record(*id)?;
                let report = self.transmitter.send_repeated(&record, *times);
                write!(out, "Sent signal {} {}/{} times", id, report.completed, report.requested)?;
                match &report.error {
                    Some(e) => writeln!(out, ", stopped: {}", e)?,
                    None => writeln!(out)?,
                }
            }
            Command::Delete(id) => {
                self.store.delete_signal(*id)?;
                writeln!(out, "Deleted signal {}", id)?;
            }
            Command::Info(id) => {
                let record = self.record(*id)?;
                Self::info(*id, &record, out)?;
            }
            Command::Detail(id) => {
                let record = self.record(*id)?;
                Self::info(*id, &record, out)?;
                Self::detail(&record, out)?;
            }
            Command::Raw(id) => {
                let record = self.record(*id)?;
                Self::raw(*id, &record, out)?;
            }
            Command::Name { id, name } => {
                self.store.set_signal_name(*id, name)?;
                let stored = self.record(*id)?.name;
                writeln!(out, "Signal {} renamed to '{}'", id, stored)?;
            }
            Command::Verify(id) => {
                let record = self.record(*id)?;
                writeln!(out, "Verifying signal {} with {} loopback tests...", id, self.test_count)?;
                let report = self
                    .transmitter
                    .verify(&record, &mut self.decoder, self.test_count)?;
                Self::verify_summary(&report, out)?;
            }
            Command::Continuous(id) => {
                let record = self.record(*id)?;
                let duration = self.transmitter.verify_config().continuous.duration_ms;
                writeln!(out, "Continuous test of signal {} for {:.0} s...", id, seconds(duration))?;
                let report = self
                    .transmitter
                    .verify_continuous(&record, &mut self.decoder)?;
                Self::verify_summary(&report, out)?;
            }
            Command::ToggleHardware => {
                let enabled = !self.transmitter.hardware_enabled();
                self.transmitter.set_hardware_enabled(enabled);
                writeln!(
                    out,
                    "Hardware pulse generator {}",
                    if enabled { "enabled" } else { "disabled" }
                )?;
            }
            Command::Press {
                protocol,
                value,
                bits,
                times,
            } => {
                self.press(*protocol, *value, *bits, *times);
                writeln!(
                    out,
                    "Pressing {} 0x{:08X} ({} bits) {} times",
                    protocol, value, bits, times
                )?;
            }
        }
        Ok(())
    }

    /// Schedule `times` remote frames [`PRESS_SPACING_MS`] apart, the first
    /// one due now
    pub fn press(&mut self, protocol: Protocol, value: u32, bits: u16, times: u32) {
        let now = self.clock.now_millis();
        let timing = pulse_distance_timing(value, bits);
        for i in 0..u64::from(times) {
            let frame = CapturedSignal::new(protocol, value, bits, timing.clone());
            self.decoder.schedule(now + i * PRESS_SPACING_MS, frame);
        }
    }

    fn status<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let now = self.clock.now_millis();
        match self.learner.state() {
            LearnerState::Collecting => writeln!(
                out,
                "Learner:  collecting, {}/{} samples, {:.1} s elapsed",
                self.learner.sample_count(),
                self.learner.config().max_samples,
                seconds(self.learner.elapsed_ms(now))
            )?,
            state => writeln!(out, "Learner:  {:?}", state)?,
        }
        writeln!(
            out,
            "Store:    {}/{} signals ({} free), {} bytes used",
            self.store.signal_count(),
            self.store.capacity(),
            self.store.free_slots(),
            self.store.used_bytes()
        )?;
        let hw = if !self.transmitter.hardware_enabled() {
            "disabled"
        } else if self.transmitter.hardware_ready() {
            "enabled"
        } else {
            "enabled, not ready"
        };
        writeln!(out, "Hardware: {}", hw)?;
        writeln!(out, "Uptime:   {:.1} s", seconds(now))
    }

    fn list<W: Write>(&self, out: &mut W) -> io::Result<()> {
        if self.store.signal_count() == 0 {
            return writeln!(out, "No signals stored");
        }
        writeln!(out, "{} signal(s):", self.store.signal_count())?;
        for (id, record) in self.store.iter() {
            writeln!(
                out,
                "{:>3}. {:<31} {:<9} 0x{:08X} {:>2} bits {:>3} timings",
                id,
                record.name,
                record.protocol.name(),
                record.value,
                record.bits,
                record.timing.len()
            )?;
        }
        Ok(())
    }

    fn info<W: Write>(id: SignalId, record: &SignalRecord, out: &mut W) -> io::Result<()> {
        writeln!(out, "Signal {}: {}", id, record.name)?;
        writeln!(out, "  protocol  {}", record.protocol)?;
        writeln!(out, "  value     0x{:08X}", record.value)?;
        writeln!(out, "  bits      {}", record.bits)?;
        writeln!(out, "  carrier   {} kHz", record.protocol.carrier_khz())?;
        writeln!(out, "  timings   {}", record.timing.len())?;
        writeln!(
            out,
            "  learned   {:.1} s after boot",
            seconds(u64::from(record.created_at_millis))
        )
    }

    fn detail<W: Write>(record: &SignalRecord, out: &mut W) -> io::Result<()> {
        match record.protocol.fields(record.value, record.bits) {
            Some(fields) => {
                writeln!(out, "  address   0x{:02X}", fields.address)?;
                writeln!(out, "  command   0x{:02X}", fields.command)?;
                if let Some(ok) = fields.integrity {
                    writeln!(out, "  integrity {}", if ok { "ok" } else { "FAILED" })?;
                }
            }
            None => writeln!(out, "  no field layout for {}", record.protocol)?,
        }
        match record.timing.stats() {
            Some(stats) => {
                writeln!(out, "  pairs     {}", record.timing.pair_count())?;
                writeln!(out, "  pulse     {}..{} us, mean {} us", stats.min, stats.max, stats.mean_us)?;
                writeln!(out, "  duration  {} us", stats.total_us)
            }
            None => writeln!(out, "  no raw timing"),
        }
    }

    fn raw<W: Write>(id: SignalId, record: &SignalRecord, out: &mut W) -> io::Result<()> {
        if record.timing.is_empty() {
            return writeln!(out, "Signal {} has no raw timing", id);
        }
        writeln!(out, "Signal {} raw timing ({} durations, us):", id, record.timing.len())?;
        for chunk in record.timing.chunks(RAW_PER_LINE) {
            let line: Vec<String> = chunk.iter().map(|d| d.to_string()).collect();
            writeln!(out, "  {}", line.join(", "))?;
        }
        Ok(())
    }

    fn verify_summary<W: Write>(report: &VerifyReport, out: &mut W) -> io::Result<()> {
        writeln!(
            out,
            "  sent      {}/{} ({:.1}%)",
            report.sent_ok,
            report.cycles,
            report.send_rate()
        )?;
        writeln!(
            out,
            "  received  {}/{} ({:.1}%)",
            report.received,
            report.cycles,
            report.receive_rate()
        )?;
        writeln!(
            out,
            "  matched   {}/{} ({:.1}%)",
            report.matched,
            report.cycles,
            report.success_rate()
        )?;
        writeln!(
            out,
            "  result    {}, {:?} (threshold {:.0}%)",
            if report.passed() { "PASS" } else { "FAIL" },
            report.grade(),
            report.threshold
        )
    }
}
