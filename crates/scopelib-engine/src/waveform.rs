//! Binary waveform acquisition and decode.
//!
//! A waveform fetch returns a `;`-separated textual preamble followed by a
//! definite-length block of 1- or 2-byte samples. Decoding is split into
//! pure steps so each can be tested on its own:
//!
//! 1. [`parse_preamble`] pulls sample width, point count, byte order and the
//!    calibration constants out of the model's preamble layout, and locates
//!    the payload behind the `#<d><len>` header.
//! 2. [`decode_samples`] turns the payload into raw sample values.
//! 3. [`render`] cuts the on-screen window selected by the horizontal-scale
//!    table, calibrates it and scales it to display divisions, padding the
//!    fixed-length output with [`SENTINEL`].
//! 4. [`area`] integrates calibrated samples between two markers.

use std::time::Instant;

use tracing::debug;

use scopelib_core::error::{Error, Result};
use scopelib_core::model::{CommandId, HorizontalScale, PreambleFormat};
use scopelib_core::params::Param;
use scopelib_core::types::{NUM_CHANNELS, TraceMode};

use crate::engine::Engine;
use crate::protocol::{Framing, leading_float, leading_int, make_query, parse_block_header};

/// Flat-line value published for disabled channels and failed decodes.
pub const SENTINEL: f64 = 1000.0;

/// Decoded waveform preamble and payload location.
#[derive(Debug, Clone, PartialEq)]
pub struct Preamble {
    /// Bytes per sample, 1 or 2.
    pub sample_width: usize,
    /// Point count declared by the instrument.
    pub points: usize,
    pub y_mult: f64,
    pub y_zero: f64,
    pub y_offset: f64,
    /// Most significant byte first (`MSB`), the instrument default.
    pub big_endian: bool,
    /// Offset of the first sample byte within the reply.
    pub data_offset: usize,
    /// Payload bytes actually present.
    pub data_len: usize,
}

struct Layout {
    width: usize,
    byte_order: usize,
    points: usize,
    y_mult: usize,
    y_zero: usize,
    y_offset: usize,
}

fn layout(format: PreambleFormat) -> Layout {
    match format {
        PreambleFormat::TdsSemicolon16 => Layout {
            width: 0,
            byte_order: 4,
            points: 5,
            y_mult: 12,
            y_zero: 13,
            y_offset: 14,
        },
        PreambleFormat::MdoSemicolon22 => Layout {
            width: 0,
            byte_order: 4,
            points: 6,
            y_mult: 14,
            y_zero: 16,
            y_offset: 15,
        },
    }
}

/// Parse the preamble and block header at the start of a waveform reply.
pub fn parse_preamble(reply: &[u8], format: PreambleFormat) -> Result<Preamble> {
    let hash = reply
        .iter()
        .position(|&b| b == b'#')
        .ok_or_else(|| Error::Protocol("waveform reply has no block header".into()))?;
    let text = std::str::from_utf8(&reply[..hash])
        .map_err(|_| Error::Protocol("waveform preamble is not text".into()))?;

    let mut fields: Vec<&str> = text.split(';').map(str::trim).collect();
    if fields.last() == Some(&"") {
        fields.pop();
    }
    let expected = format.field_count();
    if fields.len() != expected {
        return Err(Error::Protocol(format!(
            "preamble has {} fields, expected {expected}",
            fields.len()
        )));
    }

    let l = layout(format);
    let sample_width = match leading_int(fields[l.width])? {
        1 => 1,
        2 => 2,
        other => {
            return Err(Error::Protocol(format!("unsupported sample width {other}")));
        }
    };
    let points = usize::try_from(leading_int(fields[l.points])?)
        .map_err(|_| Error::Protocol(format!("negative point count {:?}", fields[l.points])))?;
    let big_endian = !fields[l.byte_order].eq_ignore_ascii_case("LSB");

    let (offset, len) = parse_block_header(&reply[hash..])?
        .ok_or_else(|| Error::Protocol("truncated block header".into()))?;
    let data_offset = hash + offset;
    let data_len = len.min(reply.len().saturating_sub(data_offset));

    Ok(Preamble {
        sample_width,
        points,
        y_mult: leading_float(fields[l.y_mult])?,
        y_zero: leading_float(fields[l.y_zero])?,
        y_offset: leading_float(fields[l.y_offset])?,
        big_endian,
        data_offset,
        data_len,
    })
}

/// Raw signed sample values, at most `preamble.points` of them.
pub fn decode_samples(reply: &[u8], preamble: &Preamble) -> Vec<f64> {
    let end = (preamble.data_offset + preamble.data_len).min(reply.len());
    let payload = reply.get(preamble.data_offset..end).unwrap_or(&[]);
    let samples = payload.chunks_exact(preamble.sample_width);
    let count = samples.len().min(preamble.points);
    samples
        .take(count)
        .map(|s| match *s {
            [b] => f64::from(b as i8),
            [a, b] if preamble.big_endian => f64::from(i16::from_be_bytes([a, b])),
            [a, b] => f64::from(i16::from_le_bytes([a, b])),
            _ => 0.0,
        })
        .collect()
}

/// Calibrate one raw sample to physical units.
pub fn physical(raw: f64, preamble: &Preamble) -> f64 {
    (raw - preamble.y_offset) * preamble.y_mult + preamble.y_zero
}

/// One rendered channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    /// Exactly the model's trace length, padded with [`SENTINEL`].
    pub display: Vec<f64>,
    /// Calibrated samples of the on-screen window.
    pub physical: Vec<f64>,
}

/// Cut, calibrate and scale the window `[start, start + points)`.
///
/// A non-positive volts/div is treated as 1.
pub fn render(
    samples: &[f64],
    preamble: &Preamble,
    scale: HorizontalScale,
    volts_per_div: f64,
    position: f64,
    length: usize,
) -> Trace {
    let vdiv = if volts_per_div > 0.0 { volts_per_div } else { 1.0 };
    let end = scale.start.saturating_add(scale.points).min(samples.len());
    let window = samples.get(scale.start..end).unwrap_or(&[]);
    let physical: Vec<f64> = window
        .iter()
        .take(length)
        .map(|&raw| physical(raw, preamble))
        .collect();
    let mut display = vec![SENTINEL; length];
    for (slot, phys) in display.iter_mut().zip(&physical) {
        *slot = phys / vdiv + position;
    }
    Trace { display, physical }
}

/// Integrate calibrated samples between two window indices, inclusive.
///
/// Units are volt-seconds: each sample spans `time_per_div * 10 /
/// record_len`. Markers are clamped to the window.
pub fn area(
    physical: &[f64],
    markers: (usize, usize),
    time_per_div: f64,
    record_len: usize,
) -> f64 {
    let Some(last) = physical.len().checked_sub(1) else {
        return 0.0;
    };
    if record_len == 0 {
        return 0.0;
    }
    let lo = markers.0.min(last);
    let hi = markers.1.min(last);
    if lo > hi {
        return 0.0;
    }
    let dt = time_per_div * (10.0 / record_len as f64);
    physical[lo..=hi].iter().map(|v| v * dt).sum()
}

/// Per-channel analysis settings, written by callers.
#[derive(Debug, Clone, Default)]
pub(crate) struct Analysis {
    pub(crate) enabled: [bool; NUM_CHANNELS],
    pub(crate) markers: [(usize, usize); NUM_CHANNELS],
}

/// Acquisition bookkeeping owned by the poller.
#[derive(Debug)]
pub(crate) struct Acquisition {
    pub(crate) take_pedestal: [bool; NUM_CHANNELS],
    pub(crate) pedestal: [f64; NUM_CHANNELS],
    last_start: Option<Instant>,
    time_min: f64,
    time_max: f64,
    period: f64,
    rate: f64,
}

impl Default for Acquisition {
    fn default() -> Self {
        Acquisition {
            take_pedestal: [false; NUM_CHANNELS],
            pedestal: [0.0; NUM_CHANNELS],
            last_start: None,
            time_min: f64::INFINITY,
            time_max: 0.0,
            period: 0.0,
            rate: 0.0,
        }
    }
}

impl Acquisition {
    /// Fold one acquisition cycle into the timing statistics.
    fn record_cycle(&mut self, start: Instant, elapsed: f64) {
        self.time_min = self.time_min.min(elapsed);
        self.time_max = self.time_max.max(elapsed);
        if let Some(prev) = self.last_start {
            self.period = start.duration_since(prev).as_secs_f64();
            if self.period > 0.0 {
                self.rate = 1.0 / self.period;
            }
        }
        self.last_start = Some(start);
    }

    /// Apply the pedestal rule: a requested pedestal absorbs this area and
    /// yields nothing to publish, otherwise the stored pedestal is
    /// subtracted.
    fn correct(&mut self, ch: usize, area: f64) -> Option<f64> {
        if self.take_pedestal[ch] {
            self.take_pedestal[ch] = false;
            self.pedestal[ch] = area;
            None
        } else {
            Some(area - self.pedestal[ch])
        }
    }
}

impl Engine {
    async fn acquire(&mut self, ch: usize) -> Result<Trace> {
        let cmd = make_query(&self.dispatch.command_for(CommandId::WfData, ch)?);
        let reply = self.dispatch.exchange(&cmd, Framing::Block).await?;
        let preamble = match parse_preamble(&reply, self.model.preamble) {
            Ok(p) => p,
            Err(e) => {
                self.dispatch.record_failure(&e);
                return Err(e);
            }
        };
        self.dispatch.record_success();

        let samples = decode_samples(&reply, &preamble);
        let time_per_div = self.registry.get_float(Param::TimDiv, 0);
        let trace = render(
            &samples,
            &preamble,
            self.model.scale_for(time_per_div),
            self.registry.get_float(Param::ChScl, ch),
            self.registry.get_float(Param::ChPos, ch),
            self.model.trace_length,
        );
        self.analyze(ch, &trace.physical, time_per_div, samples.len());
        Ok(trace)
    }

    fn analyze(&mut self, ch: usize, physical: &[f64], time_per_div: f64, record_len: usize) {
        let (enabled, markers) = {
            let analysis = self.shared.analysis();
            (analysis.enabled[ch], analysis.markers[ch])
        };
        if !enabled {
            return;
        }
        let raw = area(physical, markers, time_per_div, record_len);
        if let Some(corrected) = self.acquisition.correct(ch, raw) {
            self.registry.set_float(Param::Area, ch, corrected);
        }
        self.registry
            .set_float(Param::Pedestal, ch, self.acquisition.pedestal[ch]);
    }

    /// Fetch, decode and publish one channel's trace.
    pub(crate) async fn get_waveform(&mut self, ch: usize) {
        if ch >= NUM_CHANNELS {
            return;
        }
        let length = self.model.trace_length;
        let display = if self.registry.get_int(Param::ChOn, ch) == 0 {
            debug!(ch, "channel off, publishing flat trace");
            vec![SENTINEL; length]
        } else {
            match self.acquire(ch).await {
                Ok(trace) => trace.display,
                Err(e) => {
                    self.dispatch.settle::<()>(CommandId::WfData, Err(e));
                    vec![SENTINEL; length]
                }
            }
        };
        self.registry.set_array(Param::WfTrace, ch, display);
    }

    /// Fetch every channel and publish acquisition timing.
    ///
    /// In synchronous mode acquisition is stopped around the fetch so all
    /// channels come from the same trigger, and nothing is fetched unless the
    /// instrument reports the triggered state.
    pub(crate) async fn get_traces(&mut self) {
        let start = Instant::now();
        let sync = TraceMode::from_index(self.registry.get_int(Param::TraceMode, 0))
            == TraceMode::Sync;

        let mut fetch = true;
        if sync {
            let state = self
                .dispatch
                .get_enum(CommandId::TrState, Param::TrState, 0)
                .await;
            fetch = state == Some(self.model.triggered_state);
            if fetch {
                self.dispatch.write_command(CommandId::Stop, 0).await;
            }
        }
        if fetch {
            for ch in 0..NUM_CHANNELS {
                self.get_waveform(ch).await;
            }
            if sync {
                self.dispatch.write_command(CommandId::Run, 0).await;
            }
        }

        let elapsed = start.elapsed().as_secs_f64();
        let a = &mut self.acquisition;
        a.record_cycle(start, elapsed);
        self.registry.set_float(Param::WfTime, 0, elapsed);
        self.registry.set_float(Param::WfTimeMin, 0, a.time_min);
        self.registry.set_float(Param::WfTimeMax, 0, a.time_max);
        self.registry.set_float(Param::WfPeriod, 0, a.period);
        self.registry.set_float(Param::WfRate, 0, a.rate);
        let count = self.registry.get_int(Param::TraceCount, 0);
        self.registry.set_int(Param::TraceCount, 0, count ^ 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{engine, mdo_preamble, waveform_reply};
    use scopelib_test_harness::MockTransport;

    const TDS_PREAMBLE: &str = "2;16;BIN;RI;LSB;500;\"Ch1, DC coupling, 1.0E0 V/div\";\
                                Y;2.0E-8;0;0.0E0;\"s\";2.0E0;5.0E-1;1.0E1;\"V\";";

    fn preamble(ymult: f64, yzero: f64, yoff: f64) -> Preamble {
        Preamble {
            sample_width: 1,
            points: 16,
            y_mult: ymult,
            y_zero: yzero,
            y_offset: yoff,
            big_endian: true,
            data_offset: 0,
            data_len: 16,
        }
    }

    // =======================================================================
    // Preamble parsing
    // =======================================================================

    #[test]
    fn parses_mdo_preamble() {
        let reply = waveform_reply(&mdo_preamble(4, 0.04, 2.0, 0.5), &[1, 2, 3, 4]);
        let p = parse_preamble(&reply, PreambleFormat::MdoSemicolon22).unwrap();
        assert_eq!(p.sample_width, 1);
        assert_eq!(p.points, 4);
        assert_eq!(p.y_mult, 0.04);
        assert_eq!(p.y_offset, 2.0);
        assert_eq!(p.y_zero, 0.5);
        assert!(p.big_endian);
        assert_eq!(p.data_len, 4);
        assert_eq!(&reply[p.data_offset..p.data_offset + 4], &[1, 2, 3, 4]);
    }

    #[test]
    fn parses_tds_preamble() {
        let reply = waveform_reply(TDS_PREAMBLE, &[0, 15, 0, 10]);
        let p = parse_preamble(&reply, PreambleFormat::TdsSemicolon16).unwrap();
        assert_eq!(p.sample_width, 2);
        assert_eq!(p.points, 500);
        assert_eq!(p.y_mult, 2.0);
        assert_eq!(p.y_zero, 0.5);
        assert_eq!(p.y_offset, 10.0);
        assert!(!p.big_endian);
    }

    #[test]
    fn wrong_layout_is_protocol_error() {
        let reply = waveform_reply(TDS_PREAMBLE, &[0, 0]);
        assert!(matches!(
            parse_preamble(&reply, PreambleFormat::MdoSemicolon22),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn missing_block_is_protocol_error() {
        assert!(parse_preamble(b"1;8;BIN;\n", PreambleFormat::MdoSemicolon22).is_err());
        let truncated = format!("{}#", mdo_preamble(4, 1.0, 0.0, 0.0));
        assert!(parse_preamble(truncated.as_bytes(), PreambleFormat::MdoSemicolon22).is_err());
    }

    #[test]
    fn bad_sample_width_rejected() {
        let text = mdo_preamble(4, 1.0, 0.0, 0.0).replacen('1', "3", 1);
        let reply = waveform_reply(&text, &[0; 4]);
        assert!(parse_preamble(&reply, PreambleFormat::MdoSemicolon22).is_err());
    }

    // =======================================================================
    // Sample decode and calibration
    // =======================================================================

    #[test]
    fn decodes_signed_bytes() {
        let reply = waveform_reply(&mdo_preamble(3, 1.0, 0.0, 0.0), &[0x7f, 0x80, 0xff]);
        let p = parse_preamble(&reply, PreambleFormat::MdoSemicolon22).unwrap();
        assert_eq!(decode_samples(&reply, &p), vec![127.0, -128.0, -1.0]);
    }

    #[test]
    fn decodes_words_in_declared_byte_order() {
        let reply = waveform_reply(TDS_PREAMBLE, &[0x01, 0x02, 0xff, 0xff]);
        let mut p = parse_preamble(&reply, PreambleFormat::TdsSemicolon16).unwrap();
        assert_eq!(decode_samples(&reply, &p), vec![513.0, -1.0]);
        p.big_endian = true;
        assert_eq!(decode_samples(&reply, &p), vec![258.0, -1.0]);
    }

    #[test]
    fn decode_never_exceeds_declared_points() {
        let reply = waveform_reply(&mdo_preamble(2, 1.0, 0.0, 0.0), &[1, 2, 3, 4]);
        let p = parse_preamble(&reply, PreambleFormat::MdoSemicolon22).unwrap();
        assert_eq!(decode_samples(&reply, &p).len(), 2);
    }

    #[test]
    fn calibration() {
        let p = preamble(2.0, 0.5, 10.0);
        assert_eq!(physical(15.0, &p), 10.5);
    }

    #[test]
    fn decode_is_deterministic() {
        let reply = waveform_reply(&mdo_preamble(4, 0.04, 2.0, 0.5), &[9, 250, 3, 128]);
        let p = parse_preamble(&reply, PreambleFormat::MdoSemicolon22).unwrap();
        let a = render(
            &decode_samples(&reply, &p),
            &p,
            HorizontalScale::new(1, 0, 4),
            0.2,
            1.0,
            8,
        );
        let b = render(
            &decode_samples(&reply, &p),
            &p,
            HorizontalScale::new(1, 0, 4),
            0.2,
            1.0,
            8,
        );
        assert_eq!(a, b);
        for (x, y) in a.display.iter().zip(&b.display) {
            assert_eq!(x.to_bits(), y.to_bits());
        }
    }

    // =======================================================================
    // Windowing
    // =======================================================================

    #[test]
    fn render_cuts_window_and_pads() {
        let p = preamble(1.0, 0.0, 0.0);
        let samples: Vec<f64> = (0..10).map(f64::from).collect();
        let t = render(&samples, &p, HorizontalScale::new(1, 3, 4), 2.0, 1.0, 6);
        assert_eq!(t.physical, vec![3.0, 4.0, 5.0, 6.0]);
        assert_eq!(t.display, vec![2.5, 3.0, 3.5, 4.0, SENTINEL, SENTINEL]);
    }

    #[test]
    fn render_clamps_to_output_length() {
        let p = preamble(1.0, 0.0, 0.0);
        let samples = vec![1.0; 100];
        let t = render(&samples, &p, HorizontalScale::new(1, 0, 100), 1.0, 0.0, 10);
        assert_eq!(t.display.len(), 10);
        assert_eq!(t.physical.len(), 10);
    }

    #[test]
    fn render_window_past_capture_is_empty() {
        let p = preamble(1.0, 0.0, 0.0);
        let t = render(&[1.0, 2.0], &p, HorizontalScale::new(1, 50, 10), 1.0, 0.0, 4);
        assert!(t.physical.is_empty());
        assert_eq!(t.display, vec![SENTINEL; 4]);
    }

    #[test]
    fn non_positive_volts_per_div_is_one() {
        let p = preamble(1.0, 0.0, 0.0);
        let t = render(&[4.0], &p, HorizontalScale::new(1, 0, 1), -0.5, 0.0, 1);
        assert_eq!(t.display, vec![4.0]);
    }

    // =======================================================================
    // Area
    // =======================================================================

    #[test]
    fn area_between_markers() {
        let phys = [1.0, 2.0, 3.0, 4.0];
        // dt = 1e-3 * 10 / 10 = 1e-3
        let a = area(&phys, (1, 2), 1e-3, 10);
        assert!((a - 5e-3).abs() < 1e-12);
        // Markers past the window are clamped.
        let a = area(&phys, (2, 99), 1e-3, 10);
        assert!((a - 7e-3).abs() < 1e-12);
        assert_eq!(area(&phys, (3, 1), 1e-3, 10), 0.0);
        assert_eq!(area(&[], (0, 1), 1e-3, 10), 0.0);
    }

    // =======================================================================
    // Engine acquisition
    // =======================================================================

    #[tokio::test]
    async fn disabled_channel_publishes_sentinel() {
        let mock = MockTransport::new();
        let handle = mock.handle();
        let mut e = engine(mock);
        e.get_waveform(1).await;
        assert_eq!(e.registry.get_array(Param::WfTrace, 1), vec![SENTINEL; 8]);
        assert!(handle.sent_data().is_empty());
    }

    #[tokio::test]
    async fn acquires_and_scales_enabled_channel() {
        let mut mock = MockTransport::new();
        let reply = waveform_reply(&mdo_preamble(6, 0.5, 0.0, 0.0), &[0, 2, 4, 6, 8, 10]);
        mock.expect(b"DAT:SOU CH1; :WAVF?\n", &reply);
        let mut e = engine(mock);
        e.registry.set_int(Param::ChOn, 0, 1);
        e.registry.set_float(Param::ChScl, 0, 0.5);
        e.registry.set_float(Param::ChPos, 0, -1.0);
        // 1 ns/div selects start 2, four points.
        e.registry.set_float(Param::TimDiv, 0, 1e-9);

        e.get_waveform(0).await;
        let trace = e.registry.get_array(Param::WfTrace, 0);
        assert_eq!(trace.len(), 8);
        assert_eq!(&trace[..4], &[3.0, 5.0, 7.0, 9.0]);
        assert!(trace[4..].iter().all(|&v| v == SENTINEL));
    }

    #[tokio::test]
    async fn unknown_scale_falls_back_to_last_entry() {
        let mut mock = MockTransport::new();
        let samples: Vec<u8> = (0..8).collect();
        let reply = waveform_reply(&mdo_preamble(8, 1.0, 0.0, 0.0), &samples);
        mock.expect(b"DAT:SOU CH2; :WAVF?\n", &reply);
        let mut e = engine(mock);
        e.registry.set_int(Param::ChOn, 1, 1);
        e.registry.set_float(Param::ChScl, 1, 1.0);
        e.registry.set_float(Param::TimDiv, 0, 0.37);

        e.get_waveform(1).await;
        let trace = e.registry.get_array(Param::WfTrace, 1);
        assert_eq!(trace, (0..8).map(f64::from).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn bad_preamble_publishes_sentinel_and_counts_failure() {
        let mut mock = MockTransport::new();
        mock.expect(b"DAT:SOU CH1; :WAVF?\n", b"1;2;3;#14abcd\n");
        let mut e = engine(mock);
        e.registry.set_int(Param::ChOn, 0, 1);
        e.get_waveform(0).await;
        assert_eq!(e.registry.get_array(Param::WfTrace, 0), vec![SENTINEL; 8]);
        assert_eq!(e.dispatch.health().failures(), 1);
    }

    #[tokio::test]
    async fn pedestal_then_corrected_area() {
        let mut mock = MockTransport::new();
        let reply = waveform_reply(&mdo_preamble(8, 1.0, 0.0, 0.0), &[1; 8]);
        mock.expect(b"DAT:SOU CH1; :WAVF?\n", &reply);
        let reply = waveform_reply(&mdo_preamble(8, 1.0, 0.0, 0.0), &[3; 8]);
        mock.expect(b"DAT:SOU CH1; :WAVF?\n", &reply);
        let mut e = engine(mock);
        e.registry.set_int(Param::ChOn, 0, 1);
        e.registry.set_float(Param::ChScl, 0, 1.0);
        e.registry.set_float(Param::TimDiv, 0, 8e-9);
        {
            let mut a = e.shared.analysis();
            a.enabled[0] = true;
            a.markers[0] = (0, 7);
        }
        e.acquisition.take_pedestal[0] = true;
        e.registry.set_float(Param::Area, 0, -42.0);

        // dt = 8e-9 * 10 / 8 = 1e-8 per sample.
        e.get_waveform(0).await;
        let ped = e.registry.get_float(Param::Pedestal, 0);
        assert!((ped - 8e-8).abs() < 1e-15);
        // The baseline cycle publishes no area.
        assert_eq!(e.registry.get_float(Param::Area, 0), -42.0);
        assert!(!e.acquisition.take_pedestal[0]);

        e.get_waveform(0).await;
        let area = e.registry.get_float(Param::Area, 0);
        assert!((area - (24e-8 - 8e-8)).abs() < 1e-15);
    }

    #[tokio::test]
    async fn sync_mode_skips_untriggered_cycle() {
        let mut mock = MockTransport::new();
        mock.expect(b"TRIG:STATE?\n", b"READY\n");
        let handle = mock.handle();
        let mut e = engine(mock);
        e.registry.set_int(Param::TraceMode, 0, 2);

        e.get_traces().await;
        assert_eq!(handle.sent_lines(), vec!["TRIG:STATE?".to_string()]);
        assert_eq!(e.registry.get_int(Param::TraceCount, 0), 1);
    }

    #[tokio::test]
    async fn sync_mode_stops_and_restarts_around_fetch() {
        let mut mock = MockTransport::new();
        mock.expect(b"TRIG:STATE?\n", b"TRIGGER\n");
        mock.expect(b"ACQ:STATE STOP\n", b"");
        mock.expect(b"ACQ:STATE RUN\n", b"");
        let handle = mock.handle();
        let mut e = engine(mock);
        e.registry.set_int(Param::TraceMode, 0, 2);

        e.get_traces().await;
        assert_eq!(handle.remaining_expectations(), 0);
        assert!(e.registry.get_float(Param::WfTimeMax, 0) >= 0.0);
        for ch in 0..NUM_CHANNELS {
            assert_eq!(e.registry.get_array(Param::WfTrace, ch), vec![SENTINEL; 8]);
        }
    }

    #[tokio::test]
    async fn second_cycle_reports_rate() {
        let mut e = engine(MockTransport::new());
        e.get_traces().await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        e.get_traces().await;
        assert!(e.registry.get_float(Param::WfPeriod, 0) > 0.0);
        assert!(e.registry.get_float(Param::WfRate, 0) > 0.0);
        assert_eq!(e.registry.get_int(Param::TraceCount, 0), 0);
    }
}
