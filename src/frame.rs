//! Per-tick touch snapshots.
//!
//! A [`TouchFrame`] is the immutable value handed from the decoder to the
//! gesture engine: the panel's press flag, the per-contact active mask and
//! the raw coordinate pairs of one wire frame.

use std::time::Instant;

/// Screen geometry in pixels, used to scale percentage-mode coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Screen {
    pub width: u32,
    pub height: u32,
}

/// The full range of a percentage-mode coordinate byte.
const PERCENT_RANGE: i32 = 255;

/// An immutable snapshot of all contact points at one decoder tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TouchFrame {
    absolute_mode: bool,
    bytes_per_coord: usize,
    pressed: bool,
    active: Vec<bool>,
    raw_coords: Vec<(i32, i32)>,
    timestamp: Instant,
}

impl TouchFrame {
    /// Build a frame. `active` and `raw_coords` must describe the same
    /// number of contacts.
    pub fn new(
        absolute_mode: bool,
        bytes_per_coord: usize,
        pressed: bool,
        active: Vec<bool>,
        raw_coords: Vec<(i32, i32)>,
        timestamp: Instant,
    ) -> Self {
        debug_assert_eq!(active.len(), raw_coords.len());
        Self { absolute_mode, bytes_per_coord, pressed, active, raw_coords, timestamp }
    }

    /// An all-released frame with `num_points` idle contacts, used to seed
    /// the engine before the first wire frame arrives.
    pub fn synthetic_release(num_points: usize, timestamp: Instant) -> Self {
        Self::new(true, 1, false, vec![false; num_points], vec![(0, 0); num_points], timestamp)
    }

    pub fn absolute_mode(&self) -> bool {
        self.absolute_mode
    }

    pub fn bytes_per_coord(&self) -> usize {
        self.bytes_per_coord
    }

    /// The panel's press-vs-release flag.
    pub fn pressed(&self) -> bool {
        self.pressed
    }

    pub fn released(&self) -> bool {
        !self.pressed
    }

    pub fn num_points(&self) -> usize {
        self.active.len()
    }

    pub fn active(&self) -> &[bool] {
        &self.active
    }

    pub fn raw_coords(&self) -> &[(i32, i32)] {
        &self.raw_coords
    }

    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    /// Number of contacts currently touching.
    pub fn active_count(&self) -> usize {
        self.active.iter().filter(|a| **a).count()
    }

    /// Coordinates in screen pixels. Percentage-mode sources are scaled by
    /// the screen dimensions.
    pub fn abs_coords(&self, screen: Screen) -> Vec<(i32, i32)> {
        (0..self.num_points()).map(|i| self.abs_point(i, screen)).collect()
    }

    /// One contact's coordinates in screen pixels.
    pub fn abs_point(&self, idx: usize, screen: Screen) -> (i32, i32) {
        let (x, y) = self.raw_coords[idx];
        if self.absolute_mode {
            (x, y)
        } else {
            (x * screen.width as i32 / PERCENT_RANGE, y * screen.height as i32 / PERCENT_RANGE)
        }
    }

    /// Coordinates normalised to `[0, 1]`.
    pub fn rel_coords(&self, screen: Screen) -> Vec<(f64, f64)> {
        self.raw_coords
            .iter()
            .map(|&(x, y)| {
                if self.absolute_mode {
                    (f64::from(x) / f64::from(screen.width), f64::from(y) / f64::from(screen.height))
                } else {
                    (f64::from(x) / f64::from(PERCENT_RANGE), f64::from(y) / f64::from(PERCENT_RANGE))
                }
            })
            .collect()
    }

    /// One contact's `(x, y, active)` state in screen pixels.
    pub fn point(&self, idx: usize, screen: Screen) -> (i32, i32, bool) {
        let (x, y) = self.abs_point(idx, screen);
        (x, y, self.active[idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCREEN: Screen = Screen { width: 1020, height: 510 };

    #[test]
    fn absolute_mode_passes_coords_through() {
        let frame = TouchFrame::new(
            true,
            2,
            true,
            vec![true, false],
            vec![(100, 200), (0, 0)],
            Instant::now(),
        );
        assert_eq!(frame.abs_coords(SCREEN), vec![(100, 200), (0, 0)]);
        assert_eq!(frame.active_count(), 1);
    }

    #[test]
    fn percentage_mode_scales_by_screen() {
        let frame =
            TouchFrame::new(false, 1, true, vec![true], vec![(255, 51)], Instant::now());
        assert_eq!(frame.abs_point(0, SCREEN), (1020, 102));
        let rel = frame.rel_coords(SCREEN);
        assert!((rel[0].0 - 1.0).abs() < 1e-9);
        assert!((rel[0].1 - 0.2).abs() < 1e-9);
    }

    #[test]
    fn synthetic_release_is_idle() {
        let frame = TouchFrame::synthetic_release(8, Instant::now());
        assert!(frame.released());
        assert_eq!(frame.num_points(), 8);
        assert_eq!(frame.active_count(), 0);
    }
}
