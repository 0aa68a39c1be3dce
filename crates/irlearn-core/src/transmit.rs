//! Signal transmission with retry and path fallback
//!
//! Dispatch for one [`TransmitController::transmit`] call:
//!
//! 1. Protocols with a dedicated encoder go through the software emitter's
//!    protocol encoder, retried under the protocol policy.
//! 2. Unknown signals, protocols without an encoder, and protocol sends that
//!    exhausted their retries fall back to raw pulse-train sending at the
//!    protocol's carrier, retried under the raw policy.
//! 3. Each raw attempt prefers the hardware pulse generator (when enabled
//!    and available) and falls back to bit-banging when the generator fails
//!    and software fallback is enabled.
//!
//! Every loop is bounded by attempt counts or clock deadlines.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::codec;
use crate::error::{IrError, IrResult};
use crate::hal::{CapturedSignal, IrDecoder, PulseGenerator, SoftwareEmitter};
use crate::protocol::Protocol;
use crate::retry::{self, RetryPolicy};
use crate::store::SignalRecord;

/// Upper bound on stale frames drained before a verification send
const MAX_DRAIN: usize = 32;

/// Transmit path parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransmitConfig {
    /// Use the hardware pulse generator for raw sends
    pub hardware_enabled: bool,
    /// Bit-bang raw timing when the generator path fails
    pub software_fallback: bool,
    #[serde(deserialize_with = "retry::protocol_section")]
    pub protocol_retry: RetryPolicy,
    #[serde(deserialize_with = "retry::raw_section")]
    pub raw_retry: RetryPolicy,
    /// Repeat frames handed to protocol encoders
    pub protocol_repeats: u16,
    /// Gap between full transmits of `send_repeated`
    pub repeat_gap_ms: u64,
}

impl Default for TransmitConfig {
    fn default() -> Self {
        Self {
            hardware_enabled: true,
            software_fallback: true,
            protocol_retry: RetryPolicy::protocol(),
            raw_retry: RetryPolicy::raw(),
            protocol_repeats: 2,
            repeat_gap_ms: 300,
        }
    }
}

impl TransmitConfig {
    pub fn validate(&self) -> IrResult<()> {
        self.protocol_retry.validate("transmit.protocol_retry")?;
        self.raw_retry.validate("transmit.raw_retry")
    }
}

/// Fixed-duration soak test parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContinuousConfig {
    pub duration_ms: u64,
    pub send_interval_ms: u64,
    pub window_ms: u64,
    pub pass_rate: f32,
}

impl Default for ContinuousConfig {
    fn default() -> Self {
        Self {
            duration_ms: 10_000,
            send_interval_ms: 500,
            window_ms: 400,
            pass_rate: 75.0,
        }
    }
}

/// Loopback verification parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    pub test_count: u32,
    /// Listening window after each send
    pub window_ms: u64,
    pub poll_ms: u64,
    /// Pause between test cycles
    pub interval_ms: u64,
    /// Success rate (percent) required to pass
    pub pass_rate: f32,
    pub continuous: ContinuousConfig,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            test_count: 5,
            window_ms: 500,
            poll_ms: 5,
            interval_ms: 2000,
            pass_rate: 80.0,
            continuous: ContinuousConfig::default(),
        }
    }
}

impl VerifyConfig {
    pub fn validate(&self) -> IrResult<()> {
        for (name, rate) in [
            ("verify.pass_rate", self.pass_rate),
            ("verify.continuous.pass_rate", self.continuous.pass_rate),
        ] {
            if !(0.0..=100.0).contains(&rate) {
                return Err(IrError::Config(format!("{} {} outside 0..=100", name, rate)));
            }
        }
        if self.continuous.send_interval_ms == 0 {
            return Err(IrError::Config(
                "verify.continuous.send_interval_ms must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Path that carried a successful send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendPath {
    /// Protocol-specific encoder
    Protocol,
    /// Hardware pulse generator fed by the codec
    PulseGenerator,
    /// Software bit-banged raw timing
    BitBanged,
}

/// Successful transmit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransmitReport {
    pub path: SendPath,
    /// Attempts across every path, the successful one included
    pub attempts: u32,
    pub carrier_khz: u16,
}

/// Outcome of `send_repeated`
#[derive(Debug, Clone, PartialEq)]
pub struct RepeatReport {
    pub requested: u32,
    pub completed: u32,
    /// Error that stopped the run early
    pub error: Option<IrError>,
}

impl RepeatReport {
    pub fn is_complete(&self) -> bool {
        self.completed == self.requested
    }
}

/// Verification verdict tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grade {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl Grade {
    /// `Excellent` ≥ 90, `Good` ≥ threshold, `Fair` ≥ 60
    pub fn from_rate(rate: f32, threshold: f32) -> Self {
        if rate >= 90.0 {
            Grade::Excellent
        } else if rate >= threshold {
            Grade::Good
        } else if rate >= 60.0 {
            Grade::Fair
        } else {
            Grade::Poor
        }
    }
}

/// Tally of a verification run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerifyReport {
    pub cycles: u32,
    pub sent_ok: u32,
    pub received: u32,
    pub matched: u32,
    pub threshold: f32,
}

fn percent(n: u32, d: u32) -> f32 {
    if d == 0 {
        0.0
    } else {
        n as f32 / d as f32 * 100.0
    }
}

impl VerifyReport {
    fn new(threshold: f32) -> Self {
        Self {
            cycles: 0,
            sent_ok: 0,
            received: 0,
            matched: 0,
            threshold,
        }
    }

    pub fn send_rate(&self) -> f32 {
        percent(self.sent_ok, self.cycles)
    }

    pub fn receive_rate(&self) -> f32 {
        percent(self.received, self.cycles)
    }

    /// Matching decodes among sends that reached the air
    pub fn match_rate(&self) -> f32 {
        percent(self.matched, self.sent_ok)
    }

    /// Matching decodes among all cycles
    pub fn success_rate(&self) -> f32 {
        percent(self.matched, self.cycles)
    }

    pub fn grade(&self) -> Grade {
        Grade::from_rate(self.success_rate(), self.threshold)
    }

    pub fn passed(&self) -> bool {
        self.cycles > 0 && self.success_rate() >= self.threshold
    }
}

/// Whether a decode matches the record being verified.
///
/// Unknown signals carry a timing hash as their value, so only the value is
/// compared for them.
pub fn capture_matches(record: &SignalRecord, capture: &CapturedSignal) -> bool {
    if record.protocol == Protocol::Unknown {
        capture.protocol == Protocol::Unknown && capture.value == record.value
    } else {
        capture.same_code(record.protocol, record.value, record.bits)
    }
}

/// Drives the emitters for stored records
pub struct TransmitController<G: PulseGenerator, E: SoftwareEmitter, C: Clock> {
    generator: G,
    emitter: E,
    clock: C,
    config: TransmitConfig,
    verify: VerifyConfig,
}

impl<G: PulseGenerator, E: SoftwareEmitter, C: Clock> TransmitController<G, E, C> {
    pub fn new(generator: G, emitter: E, clock: C) -> Self {
        Self::with_config(
            generator,
            emitter,
            clock,
            TransmitConfig::default(),
            VerifyConfig::default(),
        )
    }

    pub fn with_config(
        generator: G,
        emitter: E,
        clock: C,
        config: TransmitConfig,
        verify: VerifyConfig,
    ) -> Self {
        Self {
            generator,
            emitter,
            clock,
            config,
            verify,
        }
    }

    pub fn config(&self) -> &TransmitConfig {
        &self.config
    }

    pub fn verify_config(&self) -> &VerifyConfig {
        &self.verify
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn generator_mut(&mut self) -> &mut G {
        &mut self.generator
    }

    pub fn emitter(&self) -> &E {
        &self.emitter
    }

    pub fn emitter_mut(&mut self) -> &mut E {
        &mut self.emitter
    }

    pub fn hardware_enabled(&self) -> bool {
        self.config.hardware_enabled
    }

    /// Enable or disable the pulse-generator path at runtime
    pub fn set_hardware_enabled(&mut self, enabled: bool) {
        self.config.hardware_enabled = enabled;
        info!(enabled, "Hardware pulse generator path toggled");
    }

    /// Whether raw sends will try the generator first
    pub fn hardware_ready(&self) -> bool {
        self.config.hardware_enabled && self.generator.is_available()
    }

    /// Transmit with the configured protocol repeat count
    pub fn send(&mut self, record: &SignalRecord) -> IrResult<TransmitReport> {
        self.transmit(record, self.config.protocol_repeats)
    }

    /// Transmit one record. `repeats` is the frame repeat count passed to
    /// protocol encoders.
    pub fn transmit(&mut self, record: &SignalRecord, repeats: u16) -> IrResult<TransmitReport> {
        let mut spent = 0;

        if record.protocol.has_dedicated_encoder() && self.emitter.supports(record.protocol) {
            let policy = self.config.protocol_retry;
            let emitter = &mut self.emitter;
            let mut tried = 0;
            let result = policy.run(&self.clock, "protocol", |n| {
                tried = n;
                emitter.send_protocol(record.protocol, record.value, record.bits, repeats)
            });
            match result {
                Ok(()) => {
                    return Ok(TransmitReport {
                        path: SendPath::Protocol,
                        attempts: tried,
                        carrier_khz: record.protocol.carrier_khz(),
                    })
                }
                Err((e, attempts)) => {
                    spent = attempts;
                    warn!(protocol = %record.protocol, "Protocol send exhausted: {}", e);
                }
            }
        }

        if record.timing.is_empty() {
            if spent == 0 {
                return Err(IrError::invalid(format!(
                    "{} signal has no encoder and no raw timing",
                    record.protocol
                )));
            }
            warn!("No raw timing to fall back on");
            return Err(IrError::TransmitFailed { attempts: spent });
        }

        let carrier = record.protocol.carrier_khz();
        debug!(protocol = %record.protocol, carrier_khz = carrier, "Sending raw timing");
        match self.send_raw(record.timing.as_slice(), carrier) {
            Ok(mut report) => {
                report.attempts += spent;
                Ok(report)
            }
            Err(IrError::TransmitFailed { attempts }) => Err(IrError::TransmitFailed {
                attempts: attempts + spent,
            }),
            Err(e) => Err(e),
        }
    }

    /// Send raw timing under the raw retry policy
    pub fn send_raw(&mut self, timing: &[u16], carrier_khz: u16) -> IrResult<TransmitReport> {
        if timing.is_empty() {
            return Err(IrError::invalid("cannot send an empty timing sequence"));
        }
        let train = codec::encode(timing, carrier_khz)?;

        let policy = self.config.raw_retry;
        let use_hardware = self.hardware_ready();
        let fallback = self.config.software_fallback;
        let generator = &mut self.generator;
        let emitter = &mut self.emitter;

        let mut attempts_made = 0;
        let result = policy.run(&self.clock, "raw", |n| {
            attempts_made = n;
            if use_hardware {
                match generator.send_pulse_train(&train) {
                    Ok(()) => return Ok(SendPath::PulseGenerator),
                    Err(e) if !fallback => return Err(e),
                    Err(e) => {
                        warn!(items = train.len(), "Pulse generator failed, bit-banging: {}", e)
                    }
                }
            }
            emitter
                .send_raw_bit_banged(timing, carrier_khz)
                .map(|()| SendPath::BitBanged)
        });

        match result {
            Ok(path) => {
                info!(?path, attempts = attempts_made, carrier_khz, "Raw send complete");
                Ok(TransmitReport {
                    path,
                    attempts: attempts_made,
                    carrier_khz,
                })
            }
            Err((e, attempts)) => {
                warn!(attempts, "Raw send failed: {}", e);
                Err(IrError::TransmitFailed { attempts })
            }
        }
    }

    /// `times` full transmits separated by the repeat gap, stopping at the first failure
    pub fn send_repeated(&mut self, record: &SignalRecord, times: u32) -> RepeatReport {
        let mut report = RepeatReport {
            requested: times,
            completed: 0,
            error: None,
        };
        for i in 0..times {
            if let Err(e) = self.send(record) {
                warn!(sent = i, of = times, "Repeat stopped: {}", e);
                report.error = Some(e);
                break;
            }
            report.completed += 1;
            if i + 1 < times {
                self.clock.delay_ms(self.config.repeat_gap_ms);
            }
        }
        report
    }

    fn drain<D: IrDecoder + ?Sized>(decoder: &mut D) {
        let mut n = 0;
        while n < MAX_DRAIN && decoder.is_available() {
            decoder.decode();
            n += 1;
        }
    }

    /// Listen for `window_ms`; returns (anything decoded, matching decode)
    fn observe<D: IrDecoder + ?Sized>(
        &self,
        decoder: &mut D,
        record: &SignalRecord,
        window_ms: u64,
    ) -> (bool, bool) {
        let start = self.clock.now_millis();
        let poll = self.verify.poll_ms.max(1);
        let mut received = false;
        while self.clock.elapsed_since(start) < window_ms {
            if decoder.is_available() {
                if let Some(capture) = decoder.decode() {
                    received = true;
                    if capture_matches(record, &capture) {
                        return (true, true);
                    }
                    debug!(
                        protocol = %capture.protocol,
                        value = format_args!("0x{:08X}", capture.value),
                        "Decoded frame does not match"
                    );
                }
            }
            self.clock.delay_ms(poll);
        }
        (received, false)
    }

    fn cycle<D: IrDecoder + ?Sized>(
        &mut self,
        record: &SignalRecord,
        decoder: &mut D,
        window_ms: u64,
        report: &mut VerifyReport,
    ) {
        Self::drain(decoder);
        report.cycles += 1;
        if self.send(record).is_err() {
            return;
        }
        report.sent_ok += 1;
        let (received, matched) = self.observe(decoder, record, window_ms);
        report.received += received as u32;
        report.matched += matched as u32;
        debug!(cycle = report.cycles, received, matched, "Verify cycle");
    }

    /// Transmit `count` times, listening for a matching decode after each
    pub fn verify<D: IrDecoder + ?Sized>(
        &mut self,
        record: &SignalRecord,
        decoder: &mut D,
        count: u32,
    ) -> IrResult<VerifyReport> {
        if count == 0 {
            return Err(IrError::invalid("verification needs at least one test"));
        }
        let mut report = VerifyReport::new(self.verify.pass_rate);
        let window = self.verify.window_ms;
        for i in 0..count {
            self.cycle(record, decoder, window, &mut report);
            if i + 1 < count {
                self.clock.delay_ms(self.verify.interval_ms);
            }
        }
        info!(
            cycles = report.cycles,
            matched = report.matched,
            rate = format_args!("{:.1}", report.success_rate()),
            passed = report.passed(),
            "Verification complete"
        );
        Ok(report)
    }

    /// Send on a fixed interval for the configured duration
    pub fn verify_continuous<D: IrDecoder + ?Sized>(
        &mut self,
        record: &SignalRecord,
        decoder: &mut D,
    ) -> IrResult<VerifyReport> {
        let cfg = self.verify.continuous.clone();
        let interval = cfg.send_interval_ms.max(1);
        let mut report = VerifyReport::new(cfg.pass_rate);
        let start = self.clock.now_millis();

        while self.clock.elapsed_since(start) < cfg.duration_ms {
            let cycle_start = self.clock.now_millis();
            self.cycle(record, decoder, cfg.window_ms, &mut report);
            let spent = self.clock.elapsed_since(cycle_start);
            if spent < interval {
                self.clock.delay_ms(interval - spent);
            }
        }
        info!(
            cycles = report.cycles,
            matched = report.matched,
            rate = format_args!("{:.1}", report.success_rate()),
            passed = report.passed(),
            "Continuous test complete"
        );
        Ok(report)
    }
}
