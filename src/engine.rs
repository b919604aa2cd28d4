//! Gesture recognition.
//!
//! The engine consumes [`TouchFrame`]s in stream order and decides what the
//! user meant: click, double click, long press, drag, pinch, two-finger
//! scroll or directional navigation. Single-touch frames are buffered until
//! the intent is known, so a touch that turns out to be a drag can be
//! replayed without losing motion, while a touch that turns out to be a
//! click emits exactly one move.

use std::ops::{Add, AddAssign, Mul, Sub};
use std::time::Instant;

use bitflags::bitflags;
use evdev::Key;

use crate::config::Options;
use crate::device::{DeviceError, DevicePool, UinputSink, BTN_MOUSE};
use crate::formula::Vars;
use crate::frame::TouchFrame;

bitflags! {
    /// Recognised intent bits for the current touch cycle.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct GestureMode: u8 {
        /// Second press of a double click.
        const DBL = 0b0001;
        /// A two-finger gesture is in progress.
        const MULTI = 0b0010;
        /// The press outlasted the long-click time.
        const LONG = 0b0100;
        /// Movement exceeded the drag distance.
        const DRAG = 0b1000;
    }
}

/// Minimal 2-vector for the gesture math; not worth a library.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct Vec2 {
    x: f64,
    y: f64,
}

impl Vec2 {
    const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    fn from_point((x, y): (i32, i32)) -> Self {
        Self { x: f64::from(x), y: f64::from(y) }
    }

    fn length(self) -> f64 {
        self.x.hypot(self.y)
    }

    fn dot(self, other: Vec2) -> f64 {
        self.x * other.x + self.y * other.y
    }

    fn is_null(self) -> bool {
        self.length() == 0.0
    }

    /// Angle to `other` in degrees; `None` when either side is a null
    /// vector.
    fn angle_deg(self, other: Vec2) -> Option<f64> {
        let norm = self.length() * other.length();
        if norm == 0.0 {
            return None;
        }
        Some((self.dot(other) / norm).clamp(-1.0, 1.0).acos().to_degrees())
    }
}

impl Add for Vec2 {
    type Output = Vec2;
    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2 { x: self.x + rhs.x, y: self.y + rhs.y }
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Vec2) {
        *self = *self + rhs;
    }
}

impl Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2 { x: self.x - rhs.x, y: self.y - rhs.y }
    }
}

impl Mul<f64> for Vec2 {
    type Output = Vec2;
    fn mul(self, rhs: f64) -> Vec2 {
        Vec2 { x: self.x * rhs, y: self.y * rhs }
    }
}

/// Screen-axis unit vectors, in the order they are probed for a parallel
/// gesture.
const AXIS_POS_Y: Vec2 = Vec2 { x: 0.0, y: 1.0 };
const AXIS_NEG_Y: Vec2 = Vec2 { x: 0.0, y: -1.0 };
const AXIS_POS_X: Vec2 = Vec2 { x: 1.0, y: 0.0 };
const AXIS_NEG_X: Vec2 = Vec2 { x: -1.0, y: 0.0 };

/// The adaptive layer between decoded frames and the device pool.
#[derive(Debug)]
pub struct GestureEngine {
    options: Options,
    mode: GestureMode,
    last_frame: TouchFrame,
    last_press: Option<Instant>,
    press_origin: Vec2,
    multi_origin: [Vec2; 2],
    rel_move: Vec2,
    multi_move: [Vec2; 2],
    event_buffer: Vec<TouchFrame>,
    dead_until: Option<Instant>,
}

impl GestureEngine {
    /// `contacts` sizes the synthetic all-released frame the engine starts
    /// from; it matches the device pool.
    pub fn new(options: Options, contacts: usize) -> Self {
        Self {
            options,
            mode: GestureMode::empty(),
            last_frame: TouchFrame::synthetic_release(contacts, Instant::now()),
            last_press: None,
            press_origin: Vec2::ZERO,
            multi_origin: [Vec2::ZERO; 2],
            rel_move: Vec2::ZERO,
            multi_move: [Vec2::ZERO; 2],
            event_buffer: Vec::new(),
            dead_until: None,
        }
    }

    pub fn mode(&self) -> GestureMode {
        self.mode
    }

    /// Process one frame, driving the pool as a side effect.
    pub fn handle<S: UinputSink>(
        &mut self,
        frame: TouchFrame,
        pool: &mut DevicePool<S>,
    ) -> Result<(), DeviceError> {
        // Cooldown after a completed gesture: frames are dropped outright so
        // trailing finger-lift noise cannot turn into clicks.
        if let Some(deadline) = self.dead_until {
            if frame.timestamp() < deadline {
                log::debug!("inside gesture dead time, dropping frame");
                return Ok(());
            }
            self.dead_until = None;
        }

        // Idle: nothing was touching and nothing is.
        if self.last_frame.released() && frame.released() {
            pool.release_all()?;
            return Ok(());
        }

        let active = frame.active_count();
        let last_active = self.last_frame.active_count();

        if self.options.live {
            self.pass_through(&frame, pool)?;
        } else if (active == 1 && !self.mode.contains(GestureMode::MULTI))
            || (active == 0 && last_active == 1)
        {
            self.single_touch(&frame, pool)?;
        } else if self.mode.contains(GestureMode::MULTI) && (active <= 1 || frame.released()) {
            self.finish_two_finger(&frame, pool)?;
        } else if active == 2 {
            self.two_finger(&frame);
        } else {
            log::debug!("{active} active touch points, no handler");
        }

        self.last_frame = frame;
        Ok(())
    }

    /// Single-touch path: click, double click, long press and drag.
    fn single_touch<S: UinputSink>(
        &mut self,
        frame: &TouchFrame,
        pool: &mut DevicePool<S>,
    ) -> Result<(), DeviceError> {
        let screen = self.options.screen;

        if frame.pressed() && self.last_frame.released() {
            // Press edge.
            let pos = Vec2::from_point(frame.abs_point(0, screen));
            if let Some(last_press) = self.last_press {
                let device_pos = Vec2::from_point(pool.position(0));
                if frame.timestamp().duration_since(last_press) < self.options.dbl_click_time
                    && (pos - device_pos).length() < self.options.drag_dist_px
                {
                    self.mode |= GestureMode::DBL;
                    log::debug!("double click candidate");
                }
            }
            self.last_press = Some(frame.timestamp());
            self.press_origin = pos;
        } else if frame.released() {
            // Release edge.
            let drag = self.mode.contains(GestureMode::DRAG);
            let want_click = drag ^ !self.mode.contains(GestureMode::DBL);
            if want_click {
                let last_pos = Vec2::from_point(self.last_frame.abs_point(0, screen));
                let (x, y) = if drag {
                    self.last_frame.abs_point(0, screen)
                } else {
                    // Halfway between press and release smooths out the
                    // lift-off jitter of the panel.
                    let target = self.press_origin + (last_pos - self.press_origin) * 0.5;
                    (target.x.round_ties_even() as i32, target.y.round_ties_even() as i32)
                };
                pool.device(0).move_to(x, y)?;
                if !drag {
                    if self.mode.contains(GestureMode::LONG) && self.options.hold_for_right_click {
                        log::debug!("long click becomes right click");
                        pool.device(0).press(Key::BTN_RIGHT)?;
                    } else {
                        pool.device(0).press(BTN_MOUSE)?;
                    }
                }
            }
            pool.device(0).release(None)?;

            self.mode = GestureMode::empty();
            self.rel_move = Vec2::ZERO;
            self.event_buffer.clear();
        } else {
            // Hold.
            let pos = Vec2::from_point(frame.abs_point(0, screen));
            let last_pos = Vec2::from_point(self.last_frame.abs_point(0, screen));
            self.rel_move += pos - last_pos;

            if !self.mode.contains(GestureMode::DRAG) {
                if self.rel_move.length() > self.options.drag_dist_px {
                    log::debug!("movement exceeds drag distance, entering drag mode");
                    self.mode |= GestureMode::DRAG;
                } else if let Some(last_press) = self.last_press {
                    if frame.timestamp().duration_since(last_press) > self.options.long_click_time
                        && !self.mode.contains(GestureMode::LONG)
                    {
                        log::debug!("long click detected");
                        self.mode |= GestureMode::LONG;
                    }
                }
            }

            if self.mode.contains(GestureMode::DRAG) {
                self.pass_through(frame, pool)?;
            } else {
                self.event_buffer.push(frame.clone());
            }
        }
        Ok(())
    }

    /// Two-finger entry and accumulation; nothing is emitted until the
    /// gesture completes.
    fn two_finger(&mut self, frame: &TouchFrame) {
        let screen = self.options.screen;
        let p0 = Vec2::from_point(frame.abs_point(0, screen));
        let p1 = Vec2::from_point(frame.abs_point(1, screen));

        if !self.mode.contains(GestureMode::MULTI) {
            log::debug!("entering two-finger gesture mode");
            self.mode |= GestureMode::MULTI;
            self.event_buffer.clear();
            self.multi_origin = [p0, p1];
            self.multi_move = [Vec2::ZERO; 2];
        } else {
            let l0 = Vec2::from_point(self.last_frame.abs_point(0, screen));
            let l1 = Vec2::from_point(self.last_frame.abs_point(1, screen));
            self.multi_move[0] += p0 - l0;
            self.multi_move[1] += p1 - l1;
        }
    }

    /// A finger lifted (or everything released) while a two-finger gesture
    /// was in progress: classify and emit it.
    fn finish_two_finger<S: UinputSink>(
        &mut self,
        frame: &TouchFrame,
        pool: &mut DevicePool<S>,
    ) -> Result<(), DeviceError> {
        let [v1, v2] = self.multi_move;

        if v1.is_null() || v2.is_null() {
            log::debug!("two-finger gesture without movement, ignoring");
        } else if let Some(alpha) = v1.angle_deg(v2) {
            if (alpha - 180.0).abs() < self.options.pinch_angle_threshold {
                self.pinch(pool)?;
            } else if alpha < self.options.parallel_angle_threshold {
                self.parallel(v1, v2, pool)?;
            } else {
                log::debug!("two-finger gesture at ambiguous angle {alpha:.1}°, ignoring");
            }
        }

        self.mode = GestureMode::empty();
        self.rel_move = Vec2::ZERO;
        self.multi_move = [Vec2::ZERO; 2];
        self.event_buffer.clear();
        self.dead_until = Some(frame.timestamp() + self.options.gesture_dead_time);
        Ok(())
    }

    /// Anti-parallel finger movement: zoom.
    fn pinch<S: UinputSink>(&mut self, pool: &mut DevicePool<S>) -> Result<(), DeviceError> {
        let screen = self.options.screen;
        let d1 = (self.multi_origin[0] - self.multi_origin[1]).length();
        let d2 = (Vec2::from_point(self.last_frame.abs_point(0, screen))
            - Vec2::from_point(self.last_frame.abs_point(1, screen)))
        .length();
        if d1 == 0.0 {
            log::debug!("pinch with coincident origins, ignoring");
            return Ok(());
        }
        let k = d2 / d1;
        let [v1, v2] = self.multi_move;
        let vars = Vars {
            l: (v1.length() + v2.length()) / 2.0,
            k,
            p: self.options.ppmm.mean,
        };
        let clicks = self.options.pinch_clicks_formula.eval_amount(&vars);
        log::debug!("pinch k={k:.2}, emitting {clicks} zoom clicks");

        let dev = pool.device(0);
        if self.options.zoom_mode_ctrl_plus_minus {
            // Ctrl held across the clicks; the value-2 autorepeat nudge is
            // what the target panel's desktop expects.
            dev.press(Key::KEY_LEFTCTRL)?;
            dev.press_with(Key::KEY_LEFTCTRL, 2)?;
            let key = if k < 1.0 { Key::KEY_SLASH } else { Key::KEY_RIGHTBRACE };
            for _ in 0..clicks {
                dev.press(key)?;
                dev.release(Some(key))?;
            }
            dev.release(Some(Key::KEY_LEFTCTRL))?;
        } else {
            let key = if k < 1.0 { Key::KEY_ZOOMOUT } else { Key::KEY_ZOOMIN };
            for _ in 0..clicks {
                dev.press(key)?;
                dev.release(Some(key))?;
            }
        }
        Ok(())
    }

    /// Parallel finger movement: scroll, or directional navigation keys.
    fn parallel<S: UinputSink>(
        &mut self,
        v1: Vec2,
        v2: Vec2,
        pool: &mut DevicePool<S>,
    ) -> Result<(), DeviceError> {
        let vm = (v1 + v2) * 0.5;
        let vars = Vars { l: vm.length(), k: 1.0, p: self.options.ppmm.mean };
        let threshold = self.options.direction_angle_threshold;
        let within = |axis: Vec2| vm.angle_deg(axis).map(|a| a < threshold).unwrap_or(false);

        let dev = pool.device(0);
        if within(AXIS_POS_Y) {
            let amount = self.options.scroll_amount_formula.eval_amount(&vars);
            log::debug!("two-finger scroll up by {amount}");
            dev.scroll(amount, false)?;
        } else if within(AXIS_NEG_Y) {
            let amount = self.options.scroll_amount_formula.eval_amount(&vars);
            log::debug!("two-finger scroll down by {amount}");
            dev.scroll(-amount, false)?;
        } else if within(AXIS_POS_X) {
            if self.options.enable_horizontal_scroll {
                let amount = self.options.hor_scroll_amount_formula.eval_amount(&vars);
                dev.scroll(-amount, true)?;
            } else {
                dev.press(Key::KEY_LEFT)?;
                dev.release(Some(Key::KEY_LEFT))?;
            }
        } else if within(AXIS_NEG_X) {
            if self.options.enable_horizontal_scroll {
                let amount = self.options.hor_scroll_amount_formula.eval_amount(&vars);
                dev.scroll(amount, true)?;
            } else {
                dev.press(Key::KEY_RIGHT)?;
                dev.release(Some(Key::KEY_RIGHT))?;
            }
        } else {
            log::debug!("parallel gesture off-axis, ignoring");
        }
        Ok(())
    }

    /// Replay anything buffered, then forward `frame` unfiltered.
    fn pass_through<S: UinputSink>(
        &mut self,
        frame: &TouchFrame,
        pool: &mut DevicePool<S>,
    ) -> Result<(), DeviceError> {
        if !self.event_buffer.is_empty() {
            log::debug!("replaying {} buffered frames", self.event_buffer.len());
            let buffered = std::mem::take(&mut self.event_buffer);
            for buffered_frame in &buffered {
                self.forward(buffered_frame, pool)?;
            }
        }
        self.forward(frame, pool)
    }

    /// Raw per-contact state straight to the pool.
    fn forward<S: UinputSink>(
        &self,
        frame: &TouchFrame,
        pool: &mut DevicePool<S>,
    ) -> Result<(), DeviceError> {
        for id in 0..frame.num_points().min(pool.len()) {
            let (x, y, active) = frame.point(id, self.options.screen);
            if active {
                pool.device(id).move_to(x, y)?;
                pool.device(id).press(BTN_MOUSE)?;
            } else {
                pool.device(id).release(None)?;
            }
        }
        Ok(())
    }

    #[cfg(test)]
    fn buffered(&self) -> usize {
        self.event_buffer.len()
    }

    #[cfg(test)]
    fn accumulators_zeroed(&self) -> bool {
        self.rel_move == Vec2::ZERO && self.multi_move == [Vec2::ZERO; 2]
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use evdev::{AbsoluteAxisType, EventType, RelativeAxisType};

    use super::*;
    use crate::config::{Config, Options};
    use crate::device::testing::{recording_pool, RecordingSink};
    use crate::frame::TouchFrame;

    const POINTS: usize = 5;

    fn options() -> Options {
        Options::resolve(&Config::default()).unwrap()
    }

    fn engine(options: Options) -> GestureEngine {
        GestureEngine::new(options, POINTS)
    }

    /// A pressed frame with the given active contacts, idle contacts zeroed.
    fn pressed(t0: Instant, ms: u64, contacts: &[(i32, i32)]) -> TouchFrame {
        let mut active = vec![false; POINTS];
        let mut coords = vec![(0, 0); POINTS];
        for (i, &(x, y)) in contacts.iter().enumerate() {
            active[i] = true;
            coords[i] = (x, y);
        }
        TouchFrame::new(true, 2, true, active, coords, t0 + Duration::from_millis(ms))
    }

    fn released(t0: Instant, ms: u64) -> TouchFrame {
        TouchFrame::new(
            true,
            2,
            false,
            vec![false; POINTS],
            vec![(0, 0); POINTS],
            t0 + Duration::from_millis(ms),
        )
    }

    /// Kernel-level view of what one device emitted.
    #[derive(Debug, PartialEq)]
    enum Ev {
        Move(i32, i32),
        Key(u16, i32),
        Scroll(u16, i32),
    }

    fn emitted(pool: &mut DevicePool<RecordingSink>, id: usize) -> Vec<Ev> {
        let events = &pool.device(id).sink().events;
        let mut out = Vec::new();
        let mut i = 0;
        while i < events.len() {
            let e = &events[i];
            let ty = e.event_type();
            if ty == EventType::SYNCHRONIZATION {
                i += 1;
            } else if ty == EventType::ABSOLUTE {
                assert_eq!(e.code(), AbsoluteAxisType::ABS_X.0);
                let y = &events[i + 1];
                assert_eq!(y.code(), AbsoluteAxisType::ABS_Y.0);
                out.push(Ev::Move(e.value(), y.value()));
                i += 2;
            } else if ty == EventType::KEY {
                out.push(Ev::Key(e.code(), e.value()));
                i += 1;
            } else if ty == EventType::RELATIVE {
                out.push(Ev::Scroll(e.code(), e.value()));
                i += 1;
            } else {
                panic!("unexpected event type {ty:?}");
            }
        }
        out
    }

    #[test]
    fn single_click_interpolates_and_clicks() {
        let t0 = Instant::now();
        let mut engine = engine(options());
        let mut pool = recording_pool(POINTS);

        engine.handle(pressed(t0, 0, &[(100, 100)]), &mut pool).unwrap();
        engine.handle(pressed(t0, 50, &[(100, 100)]), &mut pool).unwrap();
        engine.handle(pressed(t0, 100, &[(101, 100)]), &mut pool).unwrap();
        engine.handle(released(t0, 150), &mut pool).unwrap();

        assert_eq!(
            emitted(&mut pool, 0),
            vec![
                Ev::Move(100, 100),
                Ev::Key(BTN_MOUSE.code(), 1),
                Ev::Key(BTN_MOUSE.code(), 0),
            ]
        );
        assert_eq!(engine.mode(), GestureMode::empty());
        assert_eq!(engine.buffered(), 0);
        assert!(engine.accumulators_zeroed());
    }

    #[test]
    fn buffered_frames_emit_nothing_before_release() {
        let t0 = Instant::now();
        let mut engine = engine(options());
        let mut pool = recording_pool(POINTS);

        engine.handle(pressed(t0, 0, &[(100, 100)]), &mut pool).unwrap();
        engine.handle(pressed(t0, 40, &[(105, 102)]), &mut pool).unwrap();
        engine.handle(pressed(t0, 80, &[(110, 104)]), &mut pool).unwrap();
        assert!(emitted(&mut pool, 0).is_empty());
        assert_eq!(engine.buffered(), 2);

        engine.handle(released(t0, 120), &mut pool).unwrap();
        let events = emitted(&mut pool, 0);
        // Exactly one move: the interpolated release position.
        assert_eq!(events.iter().filter(|e| matches!(e, Ev::Move(..))).count(), 1);
        assert_eq!(engine.buffered(), 0);
    }

    #[test]
    fn drag_replays_buffer_then_tracks_live() {
        let t0 = Instant::now();
        let mut engine = engine(options());
        let mut pool = recording_pool(POINTS);

        engine.handle(pressed(t0, 0, &[(100, 100)]), &mut pool).unwrap();
        // 20.6 px cumulative: below the 30 px drag distance, buffered.
        engine.handle(pressed(t0, 20, &[(120, 105)]), &mut pool).unwrap();
        assert!(emitted(&mut pool, 0).is_empty());
        // 41 px cumulative: drag mode, buffer replays.
        engine.handle(pressed(t0, 40, &[(140, 110)]), &mut pool).unwrap();
        assert!(engine.mode().contains(GestureMode::DRAG));
        engine.handle(pressed(t0, 60, &[(160, 115)]), &mut pool).unwrap();
        engine.handle(released(t0, 80), &mut pool).unwrap();

        assert_eq!(
            emitted(&mut pool, 0),
            vec![
                Ev::Move(120, 105),
                Ev::Key(BTN_MOUSE.code(), 1),
                Ev::Move(140, 110),
                Ev::Key(BTN_MOUSE.code(), 1),
                Ev::Move(160, 115),
                Ev::Key(BTN_MOUSE.code(), 1),
                Ev::Key(BTN_MOUSE.code(), 0),
            ]
        );
        assert_eq!(engine.mode(), GestureMode::empty());
    }

    #[test]
    fn double_click_suppresses_second_button() {
        let t0 = Instant::now();
        let mut engine = engine(options());
        let mut pool = recording_pool(POINTS);

        engine.handle(pressed(t0, 0, &[(100, 100)]), &mut pool).unwrap();
        engine.handle(released(t0, 100), &mut pool).unwrap();
        engine.handle(pressed(t0, 200, &[(100, 100)]), &mut pool).unwrap();
        assert!(engine.mode().contains(GestureMode::DBL));
        engine.handle(released(t0, 300), &mut pool).unwrap();

        // Only the first cycle clicked.
        assert_eq!(
            emitted(&mut pool, 0),
            vec![
                Ev::Move(100, 100),
                Ev::Key(BTN_MOUSE.code(), 1),
                Ev::Key(BTN_MOUSE.code(), 0),
            ]
        );
    }

    #[test]
    fn long_hold_becomes_right_click() {
        let t0 = Instant::now();
        let mut opts = options();
        opts.hold_for_right_click = true;
        let mut engine = engine(opts);
        let mut pool = recording_pool(POINTS);

        engine.handle(pressed(t0, 0, &[(100, 100)]), &mut pool).unwrap();
        // Past the long-click time (rightClickDelay default, 400 ms).
        engine.handle(pressed(t0, 500, &[(100, 100)]), &mut pool).unwrap();
        assert!(engine.mode().contains(GestureMode::LONG));
        engine.handle(released(t0, 600), &mut pool).unwrap();

        assert_eq!(
            emitted(&mut pool, 0),
            vec![
                Ev::Move(100, 100),
                Ev::Key(Key::BTN_RIGHT.code(), 1),
                Ev::Key(Key::BTN_RIGHT.code(), 0),
            ]
        );
    }

    #[test]
    fn pinch_in_presses_ctrl_minus() {
        let t0 = Instant::now();
        let mut engine = engine(options());
        let mut pool = recording_pool(POINTS);

        engine.handle(pressed(t0, 0, &[(100, 100), (300, 100)]), &mut pool).unwrap();
        engine.handle(pressed(t0, 50, &[(180, 100), (220, 100)]), &mut pool).unwrap();
        assert!(engine.mode().contains(GestureMode::MULTI));
        // One finger lifts: the gesture completes.
        engine.handle(pressed(t0, 100, &[(180, 100)]), &mut pool).unwrap();

        assert_eq!(
            emitted(&mut pool, 0),
            vec![
                Ev::Key(Key::KEY_LEFTCTRL.code(), 1),
                Ev::Key(Key::KEY_LEFTCTRL.code(), 2),
                Ev::Key(Key::KEY_SLASH.code(), 1),
                Ev::Key(Key::KEY_SLASH.code(), 0),
                Ev::Key(Key::KEY_LEFTCTRL.code(), 0),
            ]
        );
        assert_eq!(engine.mode(), GestureMode::empty());
        assert!(engine.accumulators_zeroed());
    }

    #[test]
    fn pinch_out_presses_ctrl_plus() {
        let t0 = Instant::now();
        let mut engine = engine(options());
        let mut pool = recording_pool(POINTS);

        engine.handle(pressed(t0, 0, &[(180, 100), (220, 100)]), &mut pool).unwrap();
        engine.handle(pressed(t0, 50, &[(100, 100), (300, 100)]), &mut pool).unwrap();
        engine.handle(released(t0, 100), &mut pool).unwrap();

        let events = emitted(&mut pool, 0);
        assert!(events.contains(&Ev::Key(Key::KEY_RIGHTBRACE.code(), 1)));
        assert!(!events.iter().any(|e| matches!(e, Ev::Key(code, _) if *code == Key::KEY_SLASH.code())));
    }

    #[test]
    fn pinch_without_ctrl_mode_uses_zoom_keys() {
        let t0 = Instant::now();
        let mut opts = options();
        opts.zoom_mode_ctrl_plus_minus = false;
        let mut engine = engine(opts);
        let mut pool = recording_pool(POINTS);

        engine.handle(pressed(t0, 0, &[(100, 100), (300, 100)]), &mut pool).unwrap();
        engine.handle(pressed(t0, 50, &[(180, 100), (220, 100)]), &mut pool).unwrap();
        engine.handle(pressed(t0, 100, &[(180, 100)]), &mut pool).unwrap();

        assert_eq!(
            emitted(&mut pool, 0),
            vec![
                Ev::Key(Key::KEY_ZOOMOUT.code(), 1),
                Ev::Key(Key::KEY_ZOOMOUT.code(), 0),
            ]
        );
    }

    #[test]
    fn two_finger_translation_scrolls() {
        let t0 = Instant::now();
        let mut engine = engine(options());
        let mut pool = recording_pool(POINTS);

        engine.handle(pressed(t0, 0, &[(100, 200), (200, 200)]), &mut pool).unwrap();
        engine.handle(pressed(t0, 50, &[(100, 160), (200, 160)]), &mut pool).unwrap();
        engine.handle(released(t0, 100), &mut pool).unwrap();

        // Mean move (0, -40): direction "down", default formula l/10.
        assert_eq!(emitted(&mut pool, 0), vec![Ev::Scroll(RelativeAxisType::REL_WHEEL.0, -4)]);
    }

    #[test]
    fn horizontal_translation_scrolls_horizontally() {
        let t0 = Instant::now();
        let mut engine = engine(options());
        let mut pool = recording_pool(POINTS);

        engine.handle(pressed(t0, 0, &[(100, 200), (200, 200)]), &mut pool).unwrap();
        engine.handle(pressed(t0, 50, &[(160, 200), (260, 200)]), &mut pool).unwrap();
        engine.handle(released(t0, 100), &mut pool).unwrap();

        // Mean move (60, 0): +x axis, horizontal scroll by -(l/15).
        assert_eq!(emitted(&mut pool, 0), vec![Ev::Scroll(RelativeAxisType::REL_HWHEEL.0, -4)]);
    }

    #[test]
    fn horizontal_translation_presses_arrows_when_hscroll_disabled() {
        let t0 = Instant::now();
        let mut opts = options();
        opts.enable_horizontal_scroll = false;
        let mut engine = engine(opts);
        let mut pool = recording_pool(POINTS);

        engine.handle(pressed(t0, 0, &[(160, 200), (260, 200)]), &mut pool).unwrap();
        engine.handle(pressed(t0, 50, &[(100, 200), (200, 200)]), &mut pool).unwrap();
        engine.handle(released(t0, 100), &mut pool).unwrap();

        // Mean move (-60, 0): -x axis, "right" navigation.
        assert_eq!(
            emitted(&mut pool, 0),
            vec![Ev::Key(Key::KEY_RIGHT.code(), 1), Ev::Key(Key::KEY_RIGHT.code(), 0)]
        );
    }

    #[test]
    fn motionless_two_finger_touch_is_abandoned() {
        let t0 = Instant::now();
        let mut engine = engine(options());
        let mut pool = recording_pool(POINTS);

        engine.handle(pressed(t0, 0, &[(100, 100), (200, 100)]), &mut pool).unwrap();
        engine.handle(released(t0, 50), &mut pool).unwrap();

        assert!(emitted(&mut pool, 0).is_empty());
        assert_eq!(engine.mode(), GestureMode::empty());
    }

    #[test]
    fn dead_time_swallows_trailing_frames() {
        let t0 = Instant::now();
        let mut engine = engine(options());
        let mut pool = recording_pool(POINTS);

        engine.handle(pressed(t0, 0, &[(100, 200), (200, 200)]), &mut pool).unwrap();
        engine.handle(pressed(t0, 50, &[(100, 160), (200, 160)]), &mut pool).unwrap();
        engine.handle(pressed(t0, 100, &[(100, 160)]), &mut pool).unwrap();
        let after_gesture = emitted(&mut pool, 0).len();

        // 100 ms dead time: this lift-off press would otherwise click.
        engine.handle(pressed(t0, 150, &[(100, 160)]), &mut pool).unwrap();
        engine.handle(released(t0, 180), &mut pool).unwrap();
        assert_eq!(emitted(&mut pool, 0).len(), after_gesture);

        // After the cooldown, the engine processes frames again.
        engine.handle(pressed(t0, 300, &[(50, 50)]), &mut pool).unwrap();
        engine.handle(released(t0, 350), &mut pool).unwrap();
        assert!(emitted(&mut pool, 0).len() > after_gesture);
    }

    #[test]
    fn idle_frames_only_release() {
        let t0 = Instant::now();
        let mut engine = engine(options());
        let mut pool = recording_pool(POINTS);

        engine.handle(released(t0, 0), &mut pool).unwrap();
        engine.handle(released(t0, 50), &mut pool).unwrap();
        engine.handle(released(t0, 100), &mut pool).unwrap();

        for id in 0..POINTS {
            assert!(emitted(&mut pool, id).is_empty());
        }
    }

    #[test]
    fn live_mode_forwards_every_frame() {
        let t0 = Instant::now();
        let mut opts = options();
        opts.live = true;
        let mut engine = engine(opts);
        let mut pool = recording_pool(POINTS);

        engine.handle(pressed(t0, 0, &[(10, 20), (30, 40)]), &mut pool).unwrap();

        assert_eq!(
            emitted(&mut pool, 0),
            vec![Ev::Move(10, 20), Ev::Key(BTN_MOUSE.code(), 1)]
        );
        assert_eq!(
            emitted(&mut pool, 1),
            vec![Ev::Move(30, 40), Ev::Key(BTN_MOUSE.code(), 1)]
        );
    }
}
