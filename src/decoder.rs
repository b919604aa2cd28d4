//! Wire-protocol decoder.
//!
//! The panel emits fixed-length frames whose geometry is unknown until the
//! first frame is seen:
//!
//! ```text
//! 0xAA | press (1B) | Y0 X0 (bpc B each) | 0xBB | active mask (1B)
//!      | X1 Y1 .. XN-1 YN-1 (bpc B each) | 0xCC | 0x00
//! ```
//!
//! Contact 0 is transmitted with its X and Y swapped; all other contacts use
//! the natural order. Integers are big-endian. The decoder discovers the
//! bytes-per-coordinate and the contact count from the first complete frame
//! and locks them for the lifetime of the process. Decode failures are never
//! fatal: the stream is resynchronised at the next start marker.

use std::time::Instant;

use crate::frame::TouchFrame;

/// Frame start marker.
const FRAME_START: u8 = 0xAA;
/// Separator between contact 0 and the active mask.
const FRAME_MID: u8 = 0xBB;
/// Frame terminator (followed by one padding byte).
const FRAME_END: u8 = 0xCC;

/// Upper bound on the contact count probed during calibration; also the
/// size of the emulated device pool.
pub const MAX_POINTS: usize = 8;

/// Calibration only moves forward: once the first frame has been decoded the
/// geometry is locked for good.
#[derive(Debug, Clone, Copy)]
enum Calibration {
    Uncalibrated,
    Calibrated { bpc: usize, num_points: usize, frame_len: usize, absolute_mode: bool },
}

/// Stateful byte-stream to [`TouchFrame`] decoder.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    calibration: Calibration,
    /// Accept the terminator-less all-zero frame some panels emit on
    /// release.
    allow_zero_line: bool,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self { buf: Vec::new(), calibration: Calibration::Uncalibrated, allow_zero_line: true }
    }

    /// The discovered frame length, once the first frame has been decoded.
    pub fn frame_length(&self) -> Option<usize> {
        match self.calibration {
            Calibration::Uncalibrated => None,
            Calibration::Calibrated { frame_len, .. } => Some(frame_len),
        }
    }

    /// The discovered bytes-per-coordinate.
    pub fn bytes_per_coord(&self) -> Option<usize> {
        match self.calibration {
            Calibration::Uncalibrated => None,
            Calibration::Calibrated { bpc, .. } => Some(bpc),
        }
    }

    /// The discovered contact count.
    pub fn num_points(&self) -> Option<usize> {
        match self.calibration {
            Calibration::Uncalibrated => None,
            Calibration::Calibrated { num_points, .. } => Some(num_points),
        }
    }

    /// Append one input byte; returns a frame when one is complete.
    pub fn feed(&mut self, byte: u8) -> Option<TouchFrame> {
        self.buf.push(byte);
        match self.calibration {
            // Before calibration the frame length is unknown; a terminator
            // byte is the only cue that a full frame may be buffered.
            Calibration::Uncalibrated => {
                if byte == FRAME_END {
                    self.calibrate()
                } else {
                    None
                }
            }
            Calibration::Calibrated { frame_len, .. } => {
                if self.buf.len() >= frame_len {
                    self.decode()
                } else {
                    None
                }
            }
        }
    }

    /// First-frame logic: derive bpc, coordinate mode, contact count and
    /// frame length, then lock them.
    fn calibrate(&mut self) -> Option<TouchFrame> {
        let Some(start) = self.buf.iter().position(|b| *b == FRAME_START) else {
            self.buf.clear();
            return None;
        };
        let len = self.buf.len();

        // Marker, press flag, at least one byte per coordinate half: the
        // mid marker can appear at start + 4 at the earliest.
        if len < start + 5 {
            return None;
        }
        let Some(mid) = self.buf[start + 4..].iter().position(|b| *b == FRAME_MID).map(|p| p + start + 4)
        else {
            self.resync(start);
            return None;
        };

        let span = mid - start - 2;
        if span % 2 == 1 {
            log::debug!("odd coordinate span {span} during calibration, resyncing");
            self.resync(start);
            return None;
        }
        let bpc = span / 2;
        let absolute_mode = bpc == 2;

        let mask_pos = mid + 1;
        if mask_pos >= len {
            return None;
        }
        let active_flags = self.buf[mask_pos];

        // Scan (x, y) pairs until the terminator shows up; the contact count
        // falls out of the scan.
        let mut coords = vec![read_point(&self.buf, start + 2, bpc, true)];
        let mut tmp = mask_pos + 1;
        let mut num_points = None;
        for i in 1..=MAX_POINTS {
            match self.buf.get(tmp) {
                None => return None,
                Some(&FRAME_END) => {
                    num_points = Some(i);
                    break;
                }
                Some(_) => {}
            }
            if tmp + 2 * bpc > len {
                return None;
            }
            coords.push(read_point(&self.buf, tmp, bpc, false));
            tmp += 2 * bpc;
        }
        let Some(num_points) = num_points else {
            log::warn!("no frame terminator within {MAX_POINTS} contacts, resyncing");
            self.resync(start);
            return None;
        };

        let frame_len = tmp - start + 1;
        self.calibration = Calibration::Calibrated { bpc, num_points, frame_len, absolute_mode };
        log::debug!(
            "calibrated: bpc={bpc} absolute_mode={absolute_mode} num_points={num_points} \
             frame_len={frame_len}"
        );

        let pressed = self.buf[start + 1] != 0;
        let active = unpack_mask(active_flags, num_points);
        self.consume(tmp + 2);
        Some(TouchFrame::new(absolute_mode, bpc, pressed, active, coords, Instant::now()))
    }

    /// Fixed-geometry decode for every frame after the first.
    fn decode(&mut self) -> Option<TouchFrame> {
        let Calibration::Calibrated { bpc, num_points, frame_len, absolute_mode } = self.calibration
        else {
            return None;
        };

        let Some(start) = self.buf.iter().position(|b| *b == FRAME_START) else {
            self.buf.clear();
            return None;
        };
        if start > 0 {
            self.buf.drain(..start);
        }
        if self.buf.len() < frame_len {
            return None;
        }

        let bb_pos = 2 + 2 * bpc;
        let mask_pos = bb_pos + 1;
        let cc_pos = mask_pos + 1 + 2 * bpc * (num_points - 1);
        debug_assert_eq!(cc_pos, frame_len - 1);

        if self.buf[bb_pos] != FRAME_MID {
            log::warn!("desync: no mid marker at offset {bb_pos}, dropping to next start marker");
            self.resync(0);
            return None;
        }

        if self.buf[cc_pos] == FRAME_END {
            let pressed = self.buf[1] != 0;
            let active = unpack_mask(self.buf[mask_pos], num_points);
            let mut coords = vec![read_point(&self.buf, 2, bpc, true)];
            let mut pos = mask_pos + 1;
            for _ in 1..num_points {
                coords.push(read_point(&self.buf, pos, bpc, false));
                pos += 2 * bpc;
            }
            self.consume(cc_pos + 2);
            return Some(TouchFrame::new(absolute_mode, bpc, pressed, active, coords, Instant::now()));
        }

        // Terminator missing: either the all-zero release frame, or garbage.
        if self.allow_zero_line && self.is_zero_line(bb_pos, cc_pos) {
            self.consume(cc_pos + 2);
            return Some(TouchFrame::new(
                absolute_mode,
                bpc,
                false,
                vec![false; num_points],
                vec![(0, 0); num_points],
                Instant::now(),
            ));
        }

        log::warn!("desync: no terminator at offset {cc_pos}, dropping to next start marker");
        self.resync(0);
        None
    }

    /// `AA 00…00 BB 00…00` through the terminator position.
    fn is_zero_line(&self, bb_pos: usize, cc_pos: usize) -> bool {
        self.buf[1..bb_pos].iter().all(|b| *b == 0)
            && self.buf[bb_pos + 1..=cc_pos].iter().all(|b| *b == 0)
    }

    /// Drop everything through the start marker at `start`, so the next
    /// search picks up the following frame.
    fn resync(&mut self, start: usize) {
        self.buf.drain(..=start);
    }

    /// Drop a decoded frame's bytes. The trailing padding byte may not have
    /// arrived yet; it is skipped on the next start-marker search instead.
    fn consume(&mut self, upto: usize) {
        let upto = upto.min(self.buf.len());
        self.buf.drain(..upto);
    }
}

/// Read one big-endian (x, y) pair of `bpc`-byte values. Contact 0 arrives
/// with the halves swapped (`invert`).
fn read_point(buf: &[u8], pos: usize, bpc: usize, invert: bool) -> (i32, i32) {
    let a = read_be(&buf[pos..pos + bpc]);
    let b = read_be(&buf[pos + bpc..pos + 2 * bpc]);
    if invert {
        (b, a)
    } else {
        (a, b)
    }
}

fn read_be(bytes: &[u8]) -> i32 {
    bytes.iter().fold(0i32, |acc, b| (acc << 8) | i32::from(*b))
}

/// Bit `i` (LSB first) of the mask is the active flag of contact `i`.
fn unpack_mask(flags: u8, num_points: usize) -> Vec<bool> {
    (0..num_points).map(|i| flags & (1 << i) != 0).collect()
}
